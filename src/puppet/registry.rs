//! Handle to the puppet reactor.

use std::sync::Arc;

use bridge_proto::irc_to_lower;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::PuppetCommand;
use super::reactor::{PuppetRequest, Reactor, ReactorMsg};
use super::state::PuppetState;
use crate::config::TimingConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::event::IrcEvent;
use crate::link::Connector;
use crate::nick::NickAllocator;

/// A puppet to bring back at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredPuppet {
    pub address: String,
    pub nick: String,
    pub channels: Vec<String>,
}

/// Point-in-time view of one puppet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuppetInfo {
    pub address: String,
    pub nick: String,
    pub state: PuppetState,
    pub channels: Vec<String>,
    pub pending: usize,
    pub generation: u64,
}

/// Cloneable handle to the puppet reactor.
///
/// Nicks are resolved here, before a request reaches the reactor, so the
/// reactor itself never waits on the store.
#[derive(Clone)]
pub struct PuppetRegistry {
    mailbox: mpsc::UnboundedSender<ReactorMsg>,
    nicks: Arc<NickAllocator>,
    live_nicks: Arc<DashMap<String, String>>,
}

impl PuppetRegistry {
    /// Start the reactor task.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        nicks: Arc<NickAllocator>,
        timing: &TimingConfig,
        events: mpsc::UnboundedSender<IrcEvent>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let live_nicks = Arc::new(DashMap::new());
        let reactor = Reactor::new(
            tx.clone(),
            connector,
            nicks.clone(),
            live_nicks.clone(),
            events,
            timing,
        );
        let task = tokio::spawn(reactor.run(rx));
        (
            Self {
                mailbox: tx,
                nicks,
                live_nicks,
            },
            task,
        )
    }

    fn request(&self, request: PuppetRequest) -> BridgeResult<()> {
        self.mailbox
            .send(ReactorMsg::Request(request))
            .map_err(|_| BridgeError::WorkerGone)
    }

    async fn submit(&self, address: &str, command: PuppetCommand) -> BridgeResult<()> {
        let nick = self.nicks.nick_for(address).await?;
        self.request(PuppetRequest::Submit {
            address: address.to_string(),
            nick,
            command,
        })
    }

    /// Send `PRIVMSG target :text` as `address`, connecting if needed.
    pub async fn send_message(&self, address: &str, target: &str, text: &str) -> BridgeResult<()> {
        self.submit(
            address,
            PuppetCommand::Privmsg {
                target: target.to_string(),
                text: text.to_string(),
            },
        )
        .await
    }

    /// Send a CTCP `ACTION` as `address`.
    pub async fn send_action(&self, address: &str, target: &str, text: &str) -> BridgeResult<()> {
        self.submit(
            address,
            PuppetCommand::Action {
                target: target.to_string(),
                text: text.to_string(),
            },
        )
        .await
    }

    pub async fn join_channel(&self, address: &str, channel: &str) -> BridgeResult<()> {
        let nick = self.nicks.nick_for(address).await?;
        self.request(PuppetRequest::Join {
            address: address.to_string(),
            nick,
            channel: channel.to_string(),
        })
    }

    /// Part `channel`; the puppet closes if it was its last one.
    pub fn leave_channel(&self, address: &str, channel: &str) -> BridgeResult<()> {
        self.request(PuppetRequest::Leave {
            address: address.to_string(),
            channel: channel.to_string(),
        })
    }

    /// Part `channel` on every puppet.
    pub fn leave_all(&self, channel: &str) -> BridgeResult<()> {
        self.request(PuppetRequest::LeaveAll {
            channel: channel.to_string(),
        })
    }

    /// Rename a live puppet. No-op when `address` has none.
    pub fn set_nick(&self, address: &str, nick: &str) -> BridgeResult<()> {
        self.request(PuppetRequest::SetNick {
            address: address.to_string(),
            nick: nick.to_string(),
        })
    }

    pub fn restore(&self, puppets: Vec<RestoredPuppet>) -> BridgeResult<()> {
        self.request(PuppetRequest::Restore { puppets })
    }

    /// Whether `nick` is the wire nick of one of our puppets.
    pub fn is_puppet_nick(&self, nick: &str) -> bool {
        self.live_nicks.contains_key(&irc_to_lower(nick))
    }

    pub async fn snapshot(&self) -> BridgeResult<Vec<PuppetInfo>> {
        let (tx, rx) = oneshot::channel();
        self.request(PuppetRequest::Snapshot { reply: tx })?;
        Ok(rx.await?)
    }
}
