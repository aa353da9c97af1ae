//! Top-level wiring and the hooks the host calls.
//!
//! [`Bridge::start`] brings up the puppet reactor, the router and the
//! supervised observer. The host then forwards platform activity through
//! the `on_*` hooks and serves user commands through the remaining
//! methods.

use std::collections::HashSet;
use std::sync::Arc;

use bridge_proto::{ChannelExt, irc_to_lower};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{BridgeError, BridgeResult};
use crate::http;
use crate::link::Connector;
use crate::metrics;
use crate::nick::{NickAllocator, validate_user_nick};
use crate::observer::Observer;
use crate::platform::{GroupId, GroupMessage, OutgoingMessage, Platform};
use crate::puppet::{PuppetInfo, PuppetRegistry};
use crate::router::Router;
use crate::store::{BridgeStore, StoreError};
use crate::supervisor;
use crate::upload::{HttpUploader, Uploader};

/// Result of [`Bridge::join_channel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    pub channel: String,
    pub group: GroupId,
    /// Nick the user appears under on IRC.
    pub nick: String,
    /// True when this join created the group.
    pub created: bool,
}

pub struct Bridge {
    store: Arc<dyn BridgeStore>,
    platform: Arc<dyn Platform>,
    nicks: Arc<NickAllocator>,
    registry: PuppetRegistry,
    observer: Observer,
    router: Arc<Router>,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Start the bridge.
    ///
    /// `uploader` overrides the HTTP uploader built from
    /// `bridge.uploads_url`; with neither, uploads are off.
    pub async fn start(
        config: Config,
        store: Arc<dyn BridgeStore>,
        platform: Arc<dyn Platform>,
        connector: Arc<dyn Connector>,
        uploader: Option<Arc<dyn Uploader>>,
    ) -> BridgeResult<Self> {
        metrics::init();
        let mut tasks = Vec::new();
        if let Some(port) = config.metrics_port.filter(|p| *p != 0) {
            tasks.push(tokio::spawn(http::run_http_server(port)));
        }

        drop_stale_channels(store.as_ref(), platform.as_ref()).await?;

        let delay = config.timing.startup_delay();
        if !delay.is_zero() {
            info!(?delay, "Waiting before connecting to IRC");
            tokio::time::sleep(delay).await;
        }

        let uploader = uploader.or_else(|| {
            config
                .bridge
                .uploads_endpoint()
                .map(|url| Arc::new(HttpUploader::new(url)) as Arc<dyn Uploader>)
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let nicks = Arc::new(NickAllocator::new(store.clone(), platform.clone()));
        let (registry, reactor) = PuppetRegistry::spawn(
            connector.clone(),
            nicks.clone(),
            &config.timing,
            events_tx.clone(),
        );
        tasks.push(reactor);

        let observer = Observer::new(
            &config,
            connector,
            store.clone(),
            registry.clone(),
            events_tx,
        );
        let router = Arc::new(Router::new(
            &config.bridge,
            store.clone(),
            platform.clone(),
            uploader,
            nicks.clone(),
            registry.clone(),
            observer.clone(),
        ));
        tasks.push(tokio::spawn(router.clone().run(events_rx)));

        let supervised = observer.clone();
        tasks.push(supervisor::run_forever(
            "observer",
            config.timing.restart_delay(),
            move || {
                let observer = supervised.clone();
                async move { observer.run().await }
            },
        ));

        info!(host = %config.irc.host, port = config.irc.port, "Bridge started");
        Ok(Self {
            store,
            platform,
            nicks,
            registry,
            observer,
            router,
            tasks,
        })
    }

    /// Stop every worker. Puppet sessions close once the reactor is gone.
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    pub fn registry(&self) -> &PuppetRegistry {
        &self.registry
    }

    /// A user posted in a group.
    pub async fn on_group_message(&self, msg: GroupMessage) -> BridgeResult<()> {
        self.router.relay_message(msg).await
    }

    /// A user sent `/me text` in a group.
    pub async fn on_action(&self, group: GroupId, sender: &str, text: &str) -> BridgeResult<()> {
        self.router.relay_action(group, sender, text).await
    }

    pub async fn on_member_added(&self, group: GroupId, address: &str) -> BridgeResult<()> {
        if address == self.platform.self_address() {
            return Ok(());
        }
        if let Some(channel) = self.store.group_channel(group).await? {
            self.registry.join_channel(address, &channel).await?;
        }
        Ok(())
    }

    /// `address` left `group`. When the bridge itself is removed or the
    /// group is left empty, the mapping goes away.
    pub async fn on_member_removed(&self, group: GroupId, address: &str) -> BridgeResult<()> {
        let self_address = self.platform.self_address();

        if let Some(channel) = self.store.group_channel(group).await? {
            if address == self_address || self.platform.members(group).await?.len() <= 1 {
                info!(%channel, %group, "Group emptied, unbridging channel");
                self.store.remove_channel(&channel).await?;
                self.observer.leave_channel(&channel);
            } else {
                self.registry.leave_channel(address, &channel)?;
            }
            return Ok(());
        }

        if self.store.private_chat_by_group(group).await?.is_some()
            && (address == self_address || self.platform.members(group).await?.len() <= 1)
        {
            info!(%group, "Private chat emptied, removing it");
            self.store.remove_private_chat(group).await?;
        }
        Ok(())
    }

    /// Put `address` in `channel`, creating and bridging the group on
    /// first join. Non-admins may only join whitelisted channels.
    pub async fn join_channel(
        &self,
        address: &str,
        channel: &str,
        is_admin: bool,
    ) -> BridgeResult<Joined> {
        let channel = channel.trim();
        if !channel.is_channel_name() || channel.contains([' ', ',', '\x07']) {
            return Err(BridgeError::InvalidChannel(channel.to_string()));
        }
        if !is_admin && !self.store.is_whitelisted(channel).await? {
            return Err(BridgeError::NotWhitelisted(channel.to_string()));
        }
        let channel = irc_to_lower(channel);

        let (group, created) = match self.store.channel_group(&channel).await? {
            Some(group) => {
                let members = self.platform.members(group).await?;
                if members.iter().any(|m| m == address) {
                    return Err(BridgeError::AlreadyMember(channel));
                }
                self.platform.add_member(group, address).await?;
                (group, false)
            }
            None => {
                let group = self
                    .platform
                    .create_group(&channel, &[address.to_string()])
                    .await?;
                self.store.add_channel(&channel, group).await?;
                self.observer.join_channel(&channel);
                info!(%channel, %group, "Bridged new channel");
                (group, true)
            }
        };
        self.registry.join_channel(address, &channel).await?;

        let nick = self.nicks.nick_for(address).await?;
        Ok(Joined {
            channel,
            group,
            nick,
            created,
        })
    }

    /// IRC nick of `address`, allocated on first use.
    pub async fn nick(&self, address: &str) -> BridgeResult<String> {
        self.nicks.nick_for(address).await
    }

    /// Change the IRC nick of `address`. Applied live if its puppet is up.
    pub async fn set_nick(&self, address: &str, nick: &str) -> BridgeResult<()> {
        validate_user_nick(nick)?;
        if let Some(owner) = self.store.address_for_nick(nick).await?
            && owner != address
        {
            return Err(BridgeError::NickTaken(nick.to_string()));
        }
        match self.store.set_nick(address, nick).await {
            Ok(()) => {}
            Err(StoreError::NickTaken(taken)) => return Err(BridgeError::NickTaken(taken)),
            Err(e) => return Err(e.into()),
        }
        self.registry.set_nick(address, nick)?;
        info!(%address, %nick, "Nick changed");
        Ok(())
    }

    /// Private chat between `address` and the IRC user `nick`.
    pub async fn open_query(&self, address: &str, nick: &str) -> BridgeResult<GroupId> {
        let nick = nick.trim();
        if nick.is_empty() || nick.is_channel_name() || nick.contains(' ') {
            return Err(BridgeError::InvalidNick(nick.to_string()));
        }
        self.router.private_group(address, nick).await
    }

    async fn channel_of(&self, group: GroupId) -> BridgeResult<String> {
        self.store
            .group_channel(group)
            .await?
            .ok_or(BridgeError::NotBridged(group))
    }

    /// Topic of the channel bridged to `group`.
    pub async fn topic(&self, group: GroupId) -> BridgeResult<String> {
        let channel = self.channel_of(group).await?;
        Ok(self.observer.topic(&channel).await)
    }

    /// Nicks in the channel bridged to `group`, sorted.
    pub async fn names(&self, group: GroupId) -> BridgeResult<Vec<String>> {
        let channel = self.channel_of(group).await?;
        let mut names = self.observer.members(&channel);
        names.sort();
        Ok(names)
    }

    /// Remove `target` (an address or a nick) from the channel bridged to
    /// `group`, on behalf of `actor`. Without a target the actor leaves.
    pub async fn remove_member(
        &self,
        group: GroupId,
        actor: &str,
        target: Option<&str>,
    ) -> BridgeResult<String> {
        self.channel_of(group).await?;
        let target = target.map(str::trim).filter(|t| !t.is_empty()).unwrap_or(actor);
        let address = if target.contains('@') {
            target.to_string()
        } else {
            self.store
                .address_for_nick(target)
                .await?
                .ok_or_else(|| BridgeError::UnknownUser(target.to_string()))?
        };

        let members = self.platform.members(group).await?;
        if !members.iter().any(|m| *m == address) {
            return Err(BridgeError::UnknownUser(target.to_string()));
        }
        self.platform.remove_member(group, &address).await?;

        if address != actor {
            let nick = self.nicks.nick_for(&address).await?;
            let by = self.nicks.nick_for(actor).await?;
            self.platform
                .send_text(OutgoingMessage {
                    group,
                    text: format!("** {nick} removed by {by}"),
                    sender: None,
                })
                .await?;
        }
        self.on_member_removed(group, &address).await?;
        Ok(address)
    }

    /// Returns false when `channel` was already listed.
    pub async fn whitelist_add(&self, channel: &str) -> BridgeResult<bool> {
        Ok(self.store.add_to_whitelist(channel).await?)
    }

    /// Returns false when `channel` was not listed.
    pub async fn whitelist_remove(&self, channel: &str) -> BridgeResult<bool> {
        Ok(self.store.remove_from_whitelist(channel).await?)
    }

    pub async fn whitelist(&self) -> BridgeResult<Vec<String>> {
        Ok(self.store.whitelist().await?)
    }

    pub async fn puppets(&self) -> BridgeResult<Vec<PuppetInfo>> {
        self.registry.snapshot().await
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Forget channels whose group the platform no longer knows.
async fn drop_stale_channels(store: &dyn BridgeStore, platform: &dyn Platform) -> BridgeResult<()> {
    let groups: HashSet<GroupId> = match platform.groups().await {
        Ok(groups) => groups.into_iter().collect(),
        Err(e) => {
            warn!(error = %e, "Cannot list groups, keeping every channel mapping");
            return Ok(());
        }
    };
    for channel in store.channels().await? {
        if !groups.contains(&channel.group) {
            warn!(channel = %channel.name, group = %channel.group, "Dropping mapping to missing group");
            store.remove_channel(&channel.name).await?;
        }
    }
    Ok(())
}
