//! Message routing between platform groups and IRC.
//!
//! Outbound, a group message becomes one or more `PRIVMSG`s from the
//! sender's puppet. Inbound, an [`IrcEvent`] becomes a platform message in
//! the bridged group or private chat, posted under the IRC nick.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::BridgeResult;
use crate::event::{IrcEvent, TextKind};
use crate::metrics;
use crate::nick::NickAllocator;
use crate::observer::Observer;
use crate::platform::{GroupId, GroupMessage, OutgoingMessage, Platform, Quote};
use crate::puppet::{PuppetRegistry, RestoredPuppet};
use crate::store::BridgeStore;
use crate::telemetry::RelayTimer;
use crate::upload::Uploader;

/// Name given to uploaded oversized messages.
pub const LONG_MESSAGE_FILE: &str = "long-text-message.txt";

/// Text used in place of an attachment that could not be uploaded.
pub const FILE_PLACEHOLDER: &str = "[File]";

pub struct Router {
    store: Arc<dyn BridgeStore>,
    platform: Arc<dyn Platform>,
    uploader: Option<Arc<dyn Uploader>>,
    nicks: Arc<NickAllocator>,
    registry: PuppetRegistry,
    observer: Observer,
    max_message_len: usize,
    quote_len: usize,
    restored: AtomicBool,
}

impl Router {
    pub fn new(
        config: &BridgeConfig,
        store: Arc<dyn BridgeStore>,
        platform: Arc<dyn Platform>,
        uploader: Option<Arc<dyn Uploader>>,
        nicks: Arc<NickAllocator>,
        registry: PuppetRegistry,
        observer: Observer,
    ) -> Self {
        Self {
            store,
            platform,
            uploader,
            nicks,
            registry,
            observer,
            max_message_len: config.max_message_len,
            quote_len: config.quote_len,
            restored: AtomicBool::new(false),
        }
    }

    /// Deliver inbound IRC events until every sender is gone.
    pub async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<IrcEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle_event(event).await {
                warn!(error = %e, code = e.error_code(), "Failed to deliver IRC event");
            }
        }
        debug!("Router stopped");
    }

    /// IRC side of `group`: the acting address and the target, either a
    /// channel or a remote nick.
    async fn resolve_target(
        &self,
        group: GroupId,
        sender: &str,
    ) -> BridgeResult<Option<(String, String)>> {
        if let Some(channel) = self.store.group_channel(group).await? {
            return Ok(Some((sender.to_string(), channel)));
        }
        Ok(self
            .store
            .private_chat_by_group(group)
            .await?
            .map(|chat| (chat.address, chat.nick)))
    }

    /// Relay a message posted in a bridged group or private chat.
    pub async fn relay_message(&self, msg: GroupMessage) -> BridgeResult<()> {
        let _timer = RelayTimer::new("to_irc");
        let Some((address, target)) = self.resolve_target(msg.group, &msg.sender).await? else {
            return Ok(());
        };

        let mut text = String::new();
        if let Some(quote) = &msg.quote {
            text.push_str(&self.render_quote(quote).await?);
        }
        if let Some(file) = msg.file {
            match self.upload(&file.filename, file.bytes).await {
                Some(url) => text.push_str(&url),
                None => text.push_str(FILE_PLACEHOLDER),
            }
            if !msg.text.is_empty() {
                text.push_str(" - ");
            }
        }
        text.push_str(&msg.text);
        if text.is_empty() {
            return Ok(());
        }

        if text.chars().count() > self.max_message_len
            && let Some(url) = self.upload(LONG_MESSAGE_FILE, text.clone().into_bytes()).await
        {
            self.registry
                .send_message(&address, &target, &format!("Long message: {url}"))
                .await?;
            metrics::record_relay("to_irc");
            return Ok(());
        }

        let parts = fragments(&text, self.max_message_len);
        metrics::record_fragments(parts.len());
        for part in &parts {
            self.registry.send_message(&address, &target, part).await?;
        }
        metrics::record_relay("to_irc");
        Ok(())
    }

    /// Relay a `/me` from a bridged group or private chat.
    pub async fn relay_action(&self, group: GroupId, sender: &str, text: &str) -> BridgeResult<()> {
        let Some((address, target)) = self.resolve_target(group, sender).await? else {
            return Ok(());
        };
        let text = collapse_newlines(text);
        self.registry.send_action(&address, &target, &text).await?;
        metrics::record_relay("to_irc");
        Ok(())
    }

    async fn render_quote(&self, quote: &Quote) -> BridgeResult<String> {
        let nick = if quote.author == self.platform.self_address() {
            quote
                .override_sender_name
                .clone()
                .unwrap_or_else(|| self.observer.nick())
        } else {
            self.nicks.nick_for(&quote.author).await?
        };
        Ok(quote_prefix(&nick, &quote.text, self.quote_len))
    }

    /// Upload through the configured uploader. `None` when uploads are off
    /// or the upload failed.
    async fn upload(&self, filename: &str, content: Vec<u8>) -> Option<String> {
        let uploader = self.uploader.as_ref()?;
        match uploader.upload(filename, content).await {
            Ok(url) => {
                metrics::record_upload("ok");
                Some(url)
            }
            Err(e) => {
                warn!(%filename, error = %e, "Upload failed");
                metrics::record_upload("failed");
                None
            }
        }
    }

    pub async fn handle_event(&self, event: IrcEvent) -> BridgeResult<()> {
        match event {
            IrcEvent::ChannelMessage {
                channel,
                from,
                text,
                kind,
            } => {
                let _timer = RelayTimer::new("from_irc");
                let Some(group) = self.store.channel_group(&channel).await? else {
                    warn!(%channel, "Channel has no bridged group, leaving it");
                    self.store.remove_channel(&channel).await?;
                    self.observer.leave_channel(&channel);
                    metrics::record_desync_heal();
                    return Ok(());
                };
                self.post(group, render(kind, &text), Some(from)).await
            }
            IrcEvent::PrivateMessage {
                address,
                from,
                text,
                kind,
            } => {
                let _timer = RelayTimer::new("from_irc");
                let group = self.private_group(&address, &from).await?;
                self.post(group, render(kind, &text), Some(from)).await
            }
            IrcEvent::NoSuchTarget {
                address,
                target,
                reason,
            } => {
                let group = self.private_group(&address, &target).await?;
                self.post(group, format!("❌ {target}:{reason}"), None).await
            }
            IrcEvent::ObserverWelcomed => {
                // A failed restore is retried on the next welcome.
                if !self.restored.load(Ordering::SeqCst) {
                    self.restore_puppets().await?;
                    self.restored.store(true, Ordering::SeqCst);
                }
                Ok(())
            }
        }
    }

    async fn post(&self, group: GroupId, text: String, sender: Option<String>) -> BridgeResult<()> {
        self.platform
            .send_text(OutgoingMessage {
                group,
                text,
                sender,
            })
            .await?;
        metrics::record_relay("from_irc");
        Ok(())
    }

    /// Private chat between `address` and `nick`, created on first use.
    pub async fn private_group(&self, address: &str, nick: &str) -> BridgeResult<GroupId> {
        if let Some(group) = self.store.private_chat(address, nick).await? {
            return Ok(group);
        }
        let group = self
            .platform
            .create_group(&format!("{nick} [irc]"), &[address.to_string()])
            .await?;
        self.store.add_private_chat(address, nick, group).await?;
        info!(%address, %nick, %group, "Opened private chat");
        Ok(group)
    }

    /// Bring back a puppet for every member of every bridged group.
    async fn restore_puppets(&self) -> BridgeResult<()> {
        let self_address = self.platform.self_address();
        let mut puppets: BTreeMap<String, RestoredPuppet> = BTreeMap::new();

        for channel in self.store.channels().await? {
            let members = match self.platform.members(channel.group).await {
                Ok(members) => members,
                Err(e) => {
                    warn!(channel = %channel.name, error = %e, "Cannot list group members");
                    continue;
                }
            };
            for address in members.into_iter().filter(|a| *a != self_address) {
                if let Some(puppet) = puppets.get_mut(&address) {
                    puppet.channels.push(channel.name.clone());
                    continue;
                }
                let nick = self.nicks.nick_for(&address).await?;
                puppets.insert(
                    address.clone(),
                    RestoredPuppet {
                        address,
                        nick,
                        channels: vec![channel.name.clone()],
                    },
                );
            }
        }

        info!(count = puppets.len(), "Restoring puppets");
        self.registry.restore(puppets.into_values().collect())
    }
}

/// Platform text for an inbound IRC message.
fn render(kind: TextKind, text: &str) -> String {
    match kind {
        TextKind::Text => text.to_string(),
        TextKind::Action => format!("/me {text}"),
    }
}

fn collapse_newlines(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Inline prefix naming the quoted author: `<nick: text> `.
pub fn quote_prefix(nick: &str, text: &str, max_len: usize) -> String {
    let quote = collapse_newlines(text);
    let quote = if quote.chars().count() > max_len {
        let mut cut: String = quote.chars().take(max_len).collect();
        cut.push_str("...");
        cut
    } else {
        quote
    };
    format!("<{nick}: {quote}> ")
}

/// Split `text` into IRC-sized pieces of at most `max_len` characters,
/// newlines turned into spaces.
pub fn fragments(text: &str, max_len: usize) -> Vec<String> {
    let text = collapse_newlines(text);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_len.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}
