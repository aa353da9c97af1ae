//! The observer: the bridge's own IRC connection.
//!
//! It sits in every bridged channel, reports channel traffic as
//! [`IrcEvent`]s, and keeps a [`ChannelBook`] of topics and members so the
//! platform side can answer `/topic` and `/names` without a round trip per
//! member. Messages from the bridge's own puppets are dropped here.

mod book;

pub use book::{ChannelBook, ChannelInfo};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context;
use bridge_proto::{ChannelExt, Command, Message, Response, irc_eq, irc_to_lower};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::event::{IrcEvent, classify};
use crate::link::{Connector, Link, LinkEvent, LinkHandle, Registration};
use crate::metrics;
use crate::nick::ObserverNick;
use crate::puppet::PuppetRegistry;
use crate::store::{BridgeStore, StoreError};
use crate::supervisor::ReconnectPolicy;
use crate::telemetry::spans;

/// Topic reported when a channel has none, or none could be fetched.
pub const NO_TOPIC: &str = "-";

/// Cloneable handle to the observer connection.
#[derive(Clone)]
pub struct Observer {
    inner: Arc<Inner>,
}

struct Inner {
    base_nick: String,
    reconnect: ReconnectPolicy,
    join_delay: Duration,
    topic_timeout: Duration,
    connector: Arc<dyn Connector>,
    store: Arc<dyn BridgeStore>,
    registry: PuppetRegistry,
    events: mpsc::UnboundedSender<IrcEvent>,
    /// Nick on the wire; tentative until the server welcomes it.
    nick: RwLock<String>,
    link: RwLock<Option<LinkHandle>>,
    /// Set between `RPL_WELCOME` and the end of the session.
    registered: AtomicBool,
    book: ChannelBook,
    /// Lowercased channel -> callers waiting for `RPL_TOPIC`.
    pending_topics: DashMap<String, Vec<oneshot::Sender<String>>>,
    generation: AtomicU64,
}

impl Observer {
    pub fn new(
        config: &Config,
        connector: Arc<dyn Connector>,
        store: Arc<dyn BridgeStore>,
        registry: PuppetRegistry,
        events: mpsc::UnboundedSender<IrcEvent>,
    ) -> Self {
        let timing = &config.timing;
        Self {
            inner: Arc::new(Inner {
                base_nick: config.irc.nick.clone(),
                reconnect: ReconnectPolicy::from_timing(timing),
                join_delay: timing.join_delay(),
                topic_timeout: timing.topic_timeout(),
                connector,
                store,
                registry,
                events,
                nick: RwLock::new(config.irc.nick.clone()),
                link: RwLock::new(None),
                registered: AtomicBool::new(false),
                book: ChannelBook::new(),
                pending_topics: DashMap::new(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current nick of the observer.
    pub fn nick(&self) -> String {
        self.inner.nick.read().clone()
    }

    /// True once the server has welcomed the current session.
    pub fn is_registered(&self) -> bool {
        self.inner.registered.load(Ordering::SeqCst)
    }

    /// Keep a session open forever, reconnecting after each loss.
    ///
    /// Returns only if the store fails while rejoining channels.
    pub async fn run(&self) -> anyhow::Result<()> {
        let inner = &self.inner;
        let mut nicks = ObserverNick::new(&inner.base_nick);

        loop {
            let generation = inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
            let (tx, mut rx) = mpsc::unbounded_channel::<LinkEvent<()>>();
            *inner.nick.write() = nicks.current().to_string();

            let link = Link::spawn(
                inner.connector.clone(),
                Registration::new(nicks.current()),
                (),
                generation,
                tx,
                spans::observer(nicks.current()),
            );
            *inner.link.write() = Some(link.clone());

            while let Some(event) = rx.recv().await {
                match event {
                    LinkEvent::Connected { .. } => {
                        debug!(generation, "Observer connected, registering");
                    }
                    LinkEvent::Message { message, .. } => {
                        self.handle_message(&link, &mut nicks, message)
                            .await
                            .context("rejoining bridged channels")?;
                    }
                    LinkEvent::ConnectFailed { error, .. } => {
                        warn!(%error, "Observer connect failed");
                        break;
                    }
                    LinkEvent::Disconnected { reason, .. } => {
                        warn!(%reason, "Observer disconnected");
                        break;
                    }
                }
            }

            *inner.link.write() = None;
            inner.registered.store(false, Ordering::SeqCst);
            inner.book.clear();
            // Waiters fall back to the cache once their sender is gone.
            inner.pending_topics.clear();

            inner.reconnect.wait("observer").await;
            info!(delay = ?inner.reconnect.delay, "Reconnecting observer");
        }
    }

    fn is_self(&self, nick: &str) -> bool {
        irc_eq(nick, &self.inner.nick.read())
    }

    async fn handle_message(
        &self,
        link: &LinkHandle,
        nicks: &mut ObserverNick,
        message: Message,
    ) -> Result<(), StoreError> {
        let inner = &self.inner;
        let from = message.source_nickname().map(str::to_string);

        match message.command {
            Command::Response(Response::RPL_WELCOME, args) => {
                if let Some(nick) = args.first() {
                    *inner.nick.write() = nick.clone();
                }
                info!(nick = %self.nick(), "Observer welcomed");
                inner.registered.store(true, Ordering::SeqCst);

                for channel in inner.store.channels().await? {
                    link.pause(inner.join_delay);
                    link.join(&channel.name);
                }
                let _ = inner.events.send(IrcEvent::ObserverWelcomed);
            }
            Command::Response(Response::ERR_NICKNAMEINUSE, _) => {
                let next = nicks.next_nick().to_string();
                info!(nick = %next, "Observer nick in use, trying another");
                *inner.nick.write() = next.clone();
                link.nick(&next);
            }
            Command::Response(Response::RPL_NAMREPLY, args) => {
                if let [_, _, channel, names] = args.as_slice() {
                    inner.book.add_names(channel, names);
                }
            }
            Command::Response(Response::RPL_TOPIC, args) => {
                if let [_, channel, topic] = args.as_slice() {
                    inner.book.set_topic(channel, Some(topic.clone()));
                    self.resolve_topic(channel, topic);
                }
            }
            Command::Response(Response::RPL_NOTOPIC, args) => {
                if let Some(channel) = args.get(1) {
                    inner.book.set_topic(channel, None);
                    self.resolve_topic(channel, NO_TOPIC);
                }
            }
            Command::NICK(new) => {
                if let Some(old) = from {
                    if self.is_self(&old) {
                        *inner.nick.write() = new.clone();
                    }
                    inner.book.rename(&old, &new);
                }
            }
            Command::JOIN(channel, _) => {
                if let Some(nick) = from {
                    if self.is_self(&nick) {
                        info!(%channel, "Observer joined");
                        inner.book.joined(&channel);
                    }
                    inner.book.add_member(&channel, &nick);
                }
            }
            Command::PART(channel, _) => {
                if let Some(nick) = from {
                    if self.is_self(&nick) {
                        inner.book.parted(&channel);
                    } else {
                        inner.book.remove_member(&channel, &nick);
                    }
                }
            }
            Command::KICK(channel, victim, reason) => {
                if self.is_self(&victim) {
                    warn!(%channel, reason = reason.as_deref().unwrap_or(""), "Observer was kicked");
                    inner.book.parted(&channel);
                } else {
                    inner.book.remove_member(&channel, &victim);
                }
            }
            Command::QUIT(_) => {
                if let Some(nick) = from {
                    inner.book.quit(&nick);
                }
            }
            Command::TOPIC(channel, topic) => {
                inner.book.set_topic(&channel, topic.filter(|t| !t.is_empty()));
            }
            Command::PRIVMSG(target, body) if target.is_channel_name() => {
                let Some(from) = from else {
                    return Ok(());
                };
                if self.is_self(&from) {
                    return Ok(());
                }
                if inner.registry.is_puppet_nick(&from) {
                    debug!(%from, channel = %target, "Dropping puppet echo");
                    metrics::record_echo_drop();
                    return Ok(());
                }
                if let Some((kind, text)) = classify(&body) {
                    let _ = inner.events.send(IrcEvent::ChannelMessage {
                        channel: target,
                        from,
                        text,
                        kind,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn resolve_topic(&self, channel: &str, topic: &str) {
        if let Some((_, waiters)) = self.inner.pending_topics.remove(&irc_to_lower(channel)) {
            for waiter in waiters {
                let _ = waiter.send(topic.to_string());
            }
        }
    }

    fn link(&self) -> Option<LinkHandle> {
        self.inner.link.read().clone()
    }

    /// Join `channel`. Stored channels are joined on every welcome, so an
    /// unregistered observer picks this up later.
    pub fn join_channel(&self, channel: &str) -> bool {
        if !self.is_registered() {
            return false;
        }
        self.link().is_some_and(|link| link.join(channel))
    }

    /// Part `channel` and take every puppet out of it.
    pub fn leave_channel(&self, channel: &str) {
        if let Err(e) = self.inner.registry.leave_all(channel) {
            warn!(%channel, error = %e, "Failed to part puppets");
        }
        if let Some(link) = self.link() {
            link.part(channel);
        }
        self.inner.book.parted(channel);
    }

    /// Speak as the bridge itself.
    pub fn send_message(&self, target: &str, text: &str) -> bool {
        self.link().is_some_and(|link| link.privmsg(target, text))
    }

    /// Fetch the topic of `channel`, falling back to the last known one
    /// when the server does not answer within the topic timeout.
    pub async fn topic(&self, channel: &str) -> String {
        let cached = || {
            self.inner
                .book
                .topic(channel)
                .unwrap_or_else(|| NO_TOPIC.to_string())
        };
        let Some(link) = self.link() else {
            return cached();
        };

        let (tx, rx) = oneshot::channel();
        self.inner
            .pending_topics
            .entry(irc_to_lower(channel))
            .or_default()
            .push(tx);
        if !link.topic(channel) {
            return cached();
        }

        match tokio::time::timeout(self.inner.topic_timeout, rx).await {
            Ok(Ok(topic)) => topic,
            _ => {
                debug!(%channel, "No topic reply, using cache");
                cached()
            }
        }
    }

    /// Known members of `channel`, sorted case-insensitively.
    pub fn members(&self, channel: &str) -> Vec<String> {
        self.inner.book.members(channel)
    }
}
