//! The task that owns every puppet.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bridge_proto::{ChannelExt, Command, Message, Response, irc_to_lower};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::registry::{PuppetInfo, RestoredPuppet};
use super::state::{Action, Puppet};
use super::PuppetCommand;
use crate::config::TimingConfig;
use crate::event::{IrcEvent, classify};
use crate::link::{Connector, Link, LinkEvent, LinkHandle, Registration};
use crate::metrics;
use crate::nick::NickAllocator;
use crate::supervisor::{ReconnectPolicy, post_after};
use crate::telemetry::spans;

/// Requests from [`super::PuppetRegistry`].
#[derive(Debug)]
pub(crate) enum PuppetRequest {
    Submit {
        address: String,
        nick: String,
        command: PuppetCommand,
    },
    Join {
        address: String,
        nick: String,
        channel: String,
    },
    Leave {
        address: String,
        channel: String,
    },
    LeaveAll {
        channel: String,
    },
    SetNick {
        address: String,
        nick: String,
    },
    Restore {
        puppets: Vec<RestoredPuppet>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<PuppetInfo>>,
    },
}

/// Everything the reactor reacts to.
#[derive(Debug)]
pub(crate) enum ReactorMsg {
    Request(PuppetRequest),
    Link(LinkEvent<String>),
    ReconnectDue { address: String, generation: u64 },
    ConnectDue { address: String },
}

impl From<LinkEvent<String>> for ReactorMsg {
    fn from(event: LinkEvent<String>) -> Self {
        Self::Link(event)
    }
}

struct Slot {
    puppet: Puppet,
    link: Option<LinkHandle>,
    /// Generation of the current (or last) session.
    generation: u64,
    /// Lowercased wire nick published in `live_nicks`.
    published: Option<String>,
}

pub(crate) struct Reactor {
    slots: HashMap<String, Slot>,
    next_generation: u64,
    mailbox: mpsc::UnboundedSender<ReactorMsg>,
    connector: Arc<dyn Connector>,
    /// Renames to persist, written one at a time in arrival order.
    renames: mpsc::UnboundedSender<(String, String)>,
    live_nicks: Arc<DashMap<String, String>>,
    events: mpsc::UnboundedSender<IrcEvent>,
    reconnect: ReconnectPolicy,
    join_delay: Duration,
    stagger: Duration,
}

impl Reactor {
    pub(crate) fn new(
        mailbox: mpsc::UnboundedSender<ReactorMsg>,
        connector: Arc<dyn Connector>,
        nicks: Arc<NickAllocator>,
        live_nicks: Arc<DashMap<String, String>>,
        events: mpsc::UnboundedSender<IrcEvent>,
        timing: &TimingConfig,
    ) -> Self {
        Self {
            slots: HashMap::new(),
            next_generation: 0,
            mailbox,
            connector,
            renames: spawn_rename_writer(nicks),
            live_nicks,
            events,
            reconnect: ReconnectPolicy::from_timing(timing),
            join_delay: timing.join_delay(),
            stagger: timing.puppet_stagger(),
        }
    }

    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ReactorMsg>) {
        while let Some(msg) = rx.recv().await {
            self.handle(msg);
        }
    }

    fn handle(&mut self, msg: ReactorMsg) {
        match msg {
            ReactorMsg::Request(request) => self.handle_request(request),
            ReactorMsg::Link(event) => self.handle_link_event(event),
            ReactorMsg::ReconnectDue {
                address,
                generation,
            } => {
                let Some(slot) = self.slots.get_mut(&address) else {
                    return;
                };
                if slot.generation != generation {
                    return;
                }
                metrics::record_reconnect("puppet");
                let actions = slot.puppet.on_reconnect_due();
                self.apply(&address, actions);
            }
            ReactorMsg::ConnectDue { address } => {
                if let Some(slot) = self.slots.get_mut(&address) {
                    let actions = slot.puppet.start();
                    self.apply(&address, actions);
                }
            }
        }
    }

    fn slot(&mut self, address: &str, nick: &str) -> &mut Slot {
        self.slots
            .entry(address.to_string())
            .or_insert_with(|| Slot {
                puppet: Puppet::new(address, nick),
                link: None,
                generation: 0,
                published: None,
            })
    }

    fn handle_request(&mut self, request: PuppetRequest) {
        match request {
            PuppetRequest::Submit {
                address,
                nick,
                command,
            } => {
                let slot = self.slot(&address, &nick);
                let mut actions = Vec::new();
                if let PuppetCommand::Privmsg { target, .. } | PuppetCommand::Action { target, .. } =
                    &command
                    && target.is_channel_name()
                {
                    actions.extend(slot.puppet.join(target));
                }
                actions.extend(slot.puppet.submit(command));
                self.apply(&address, actions);
            }
            PuppetRequest::Join {
                address,
                nick,
                channel,
            } => {
                let actions = self.slot(&address, &nick).puppet.join(&channel);
                self.apply(&address, actions);
            }
            PuppetRequest::Leave { address, channel } => {
                if let Some(slot) = self.slots.get_mut(&address) {
                    let actions = slot.puppet.leave(&channel);
                    self.apply(&address, actions);
                }
            }
            PuppetRequest::LeaveAll { channel } => {
                let lower = irc_to_lower(&channel);
                let members: Vec<String> = self
                    .slots
                    .iter()
                    .filter(|(_, slot)| slot.puppet.channels().any(|c| c == lower))
                    .map(|(address, _)| address.clone())
                    .collect();
                for address in members {
                    if let Some(slot) = self.slots.get_mut(&address) {
                        let actions = slot.puppet.leave(&channel);
                        self.apply(&address, actions);
                    }
                }
            }
            PuppetRequest::SetNick { address, nick } => match self.slots.get_mut(&address) {
                Some(slot) => {
                    let actions = slot.puppet.submit(PuppetCommand::SetNick { nick });
                    self.apply(&address, actions);
                }
                None => debug!(%address, "No puppet to rename"),
            },
            PuppetRequest::Restore { puppets } => self.restore(puppets),
            PuppetRequest::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Recreate puppets at startup, spacing their first connects.
    fn restore(&mut self, puppets: Vec<RestoredPuppet>) {
        let mut delay = Duration::ZERO;
        for restored in puppets {
            let address = restored.address.clone();
            if self.slots.contains_key(&address) {
                for channel in &restored.channels {
                    let actions = self.slot(&address, &restored.nick).puppet.join(channel);
                    self.apply(&address, actions);
                }
                continue;
            }

            let slot = self.slot(&address, &restored.nick);
            for channel in &restored.channels {
                slot.puppet.remember_channel(channel);
            }
            debug!(%address, ?delay, "Scheduling puppet connect");
            post_after(delay, self.mailbox.clone(), ReactorMsg::ConnectDue { address });
            delay += self.stagger;
        }
        metrics::set_live_puppets(self.slots.len());
    }

    fn handle_link_event(&mut self, event: LinkEvent<String>) {
        let address = event.key().clone();
        let Some(slot) = self.slots.get_mut(&address) else {
            return;
        };
        if slot.generation != event.generation() {
            debug!(%address, generation = event.generation(), "Ignoring stale session event");
            return;
        }

        let actions = match event {
            LinkEvent::Connected { .. } => slot.puppet.on_connected(),
            LinkEvent::ConnectFailed { error, .. } => {
                warn!(%address, %error, "Puppet connect failed");
                slot.link = None;
                slot.puppet.on_disconnected(Vec::new())
            }
            LinkEvent::Disconnected { reason, unsent, .. } => {
                warn!(
                    %address,
                    nick = %slot.puppet.nick(),
                    %reason,
                    unsent = unsent.len(),
                    "Puppet disconnected"
                );
                slot.link = None;
                slot.puppet.on_disconnected(unsent)
            }
            LinkEvent::Message { message, .. } => self.handle_message(&address, message),
        };
        self.apply(&address, actions);
    }

    fn handle_message(&mut self, address: &str, message: Message) -> Vec<Action> {
        let Some(slot) = self.slots.get_mut(address) else {
            return vec![];
        };
        let from = message.source_nickname().map(str::to_string);

        match message.command {
            Command::Response(Response::RPL_WELCOME, _) => {
                info!(%address, nick = %slot.puppet.wire_nick(), "Puppet welcomed");
                slot.puppet.on_welcome()
            }
            Command::Response(Response::ERR_NICKNAMEINUSE, _) => {
                info!(%address, nick = %slot.puppet.wire_nick(), "Puppet nick in use");
                slot.puppet.on_nick_in_use()
            }
            Command::Response(Response::ERR_NOSUCHNICK, args) => {
                let target = args.get(1).cloned().unwrap_or_default();
                let reason = args.get(2).cloned().unwrap_or_default();
                let _ = self.events.send(IrcEvent::NoSuchTarget {
                    address: address.to_string(),
                    target,
                    reason,
                });
                vec![]
            }
            Command::PRIVMSG(target, body) if !target.is_channel_name() => {
                if let (Some(from), Some((kind, text))) = (from, classify(&body)) {
                    let _ = self.events.send(IrcEvent::PrivateMessage {
                        address: address.to_string(),
                        from,
                        text,
                        kind,
                    });
                }
                vec![]
            }
            _ => vec![],
        }
    }

    fn apply(&mut self, address: &str, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Connect { wire_nick } => self.connect(address, wire_nick),
                Action::Send(message) => {
                    let Some(slot) = self.slots.get_mut(address) else {
                        continue;
                    };
                    let sent = slot.link.as_ref().is_some_and(|link| link.send(message.clone()));
                    if !sent {
                        debug!(%address, "Session gone, requeueing command");
                        slot.puppet.requeue(&message);
                    }
                }
                Action::PauseForJoin => {
                    if let Some(link) = self.slots.get(address).and_then(|s| s.link.as_ref()) {
                        link.pause(self.join_delay);
                    }
                }
                Action::ScheduleReconnect => {
                    let Some(slot) = self.slots.get(address) else {
                        continue;
                    };
                    warn!(%address, delay = ?self.reconnect.delay, "Reconnecting puppet");
                    self.reconnect.schedule(
                        self.mailbox.clone(),
                        ReactorMsg::ReconnectDue {
                            address: address.to_string(),
                            generation: slot.generation,
                        },
                    );
                }
                Action::RecordNick(nick) => {
                    let _ = self.renames.send((address.to_string(), nick));
                }
                Action::Close => {
                    if let Some(slot) = self.slots.remove(address) {
                        info!(%address, nick = %slot.puppet.nick(), "Closing puppet");
                        if let Some(link) = slot.link {
                            link.quit(None);
                        }
                        if let Some(published) = slot.published {
                            self.live_nicks.remove(&published);
                        }
                    }
                }
            }
        }
        self.publish_nick(address);
        metrics::set_live_puppets(self.slots.len());
    }

    fn connect(&mut self, address: &str, wire_nick: String) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let Some(slot) = self.slots.get_mut(address) else {
            return;
        };
        debug!(%address, %wire_nick, generation, "Opening puppet session");
        let span = spans::puppet(address, &wire_nick);
        let link = Link::spawn(
            self.connector.clone(),
            Registration::new(wire_nick),
            address.to_string(),
            generation,
            self.mailbox.clone(),
            span,
        );
        if let Some(old) = slot.link.replace(link) {
            old.quit(None);
        }
        slot.generation = generation;
    }

    /// Keep `live_nicks` in step with each puppet's current wire nick.
    fn publish_nick(&mut self, address: &str) {
        let Some(slot) = self.slots.get_mut(address) else {
            return;
        };
        if slot.link.is_none() && slot.published.is_none() {
            return;
        }
        let current = irc_to_lower(&slot.puppet.wire_nick());
        if slot.published.as_deref() == Some(current.as_str()) {
            return;
        }
        if let Some(old) = slot.published.replace(current.clone()) {
            self.live_nicks.remove(&old);
        }
        self.live_nicks.insert(current, address.to_string());
    }

    fn snapshot(&self) -> Vec<PuppetInfo> {
        let mut infos: Vec<PuppetInfo> = self
            .slots
            .iter()
            .map(|(address, slot)| PuppetInfo {
                address: address.clone(),
                nick: slot.puppet.nick().to_string(),
                state: slot.puppet.state(),
                channels: slot.puppet.channels().map(str::to_string).collect(),
                pending: slot.puppet.pending().count(),
                generation: slot.generation,
            })
            .collect();
        infos.sort_by(|a, b| a.address.cmp(&b.address));
        infos
    }
}

/// Persist on-wire renames in order, off the reactor task. The writer stops
/// once the reactor drops its sender.
fn spawn_rename_writer(nicks: Arc<NickAllocator>) -> mpsc::UnboundedSender<(String, String)> {
    let (tx, mut rx) = mpsc::unbounded_channel::<(String, String)>();
    tokio::spawn(async move {
        while let Some((address, nick)) = rx.recv().await {
            if let Err(e) = nicks.record(&address, &nick).await {
                warn!(%address, %nick, error = %e, "Failed to persist renamed nick");
            }
        }
    });
    tx
}
