//! Puppet connection state machine.
//!
//! Pure logic: every input returns the [`Action`]s the reactor must carry
//! out. No I/O and no clocks, so every transition is testable directly.
//!
//! ```text
//! Absent -> Connecting -> AwaitingWelcome -> Welcomed
//!               ^                                |
//!               +------- Disconnected <----------+
//! any state -> Closed (channel set became empty)
//! ```

use std::collections::{BTreeSet, VecDeque};

use bridge_proto::{Message, irc_to_lower};

use super::PuppetCommand;
use crate::nick::{collision_rename, wire_nick};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PuppetState {
    /// Known but never connected.
    Absent,
    /// Transport being opened.
    Connecting,
    /// Registration sent, waiting for `RPL_WELCOME`.
    AwaitingWelcome,
    Welcomed,
    /// Lost the connection; a reconnect is scheduled.
    Disconnected,
    /// Torn down for good.
    Closed,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open a new session registering as this wire nick.
    Connect { wire_nick: String },
    Send(Message),
    /// Hold back later sends by the join delay.
    PauseForJoin,
    /// Call back with [`Puppet::on_reconnect_due`] after the reconnect delay.
    ScheduleReconnect,
    /// Persist a renamed stored nick.
    RecordNick(String),
    /// Quit the session and forget the puppet.
    Close,
}

pub struct Puppet {
    address: String,
    nick: String,
    channels: BTreeSet<String>,
    state: PuppetState,
    pending: VecDeque<PuppetCommand>,
}

impl Puppet {
    pub fn new(address: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            nick: nick.into(),
            channels: BTreeSet::new(),
            state: PuppetState::Absent,
            pending: VecDeque::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Stored nick, without the wire suffix.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn wire_nick(&self) -> String {
        wire_nick(&self.nick)
    }

    pub fn state(&self) -> PuppetState {
        self.state
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(String::as_str)
    }

    pub fn pending(&self) -> impl Iterator<Item = &PuppetCommand> {
        self.pending.iter()
    }

    pub fn is_closed(&self) -> bool {
        self.state == PuppetState::Closed
    }

    fn connect(&mut self) -> Action {
        self.state = PuppetState::Connecting;
        Action::Connect {
            wire_nick: self.wire_nick(),
        }
    }

    fn execute(&mut self, command: PuppetCommand) -> Action {
        if let PuppetCommand::SetNick { nick } = &command {
            self.nick = nick.clone();
        }
        Action::Send(command.to_message())
    }

    /// Record a channel without joining it. Used when restoring at startup.
    pub fn remember_channel(&mut self, channel: &str) {
        self.channels.insert(irc_to_lower(channel));
    }

    /// Open the first session if the puppet never connected.
    pub fn start(&mut self) -> Vec<Action> {
        match self.state {
            PuppetState::Absent => vec![self.connect()],
            _ => vec![],
        }
    }

    /// Deliver now if welcomed, otherwise queue behind earlier commands.
    pub fn submit(&mut self, command: PuppetCommand) -> Vec<Action> {
        match self.state {
            PuppetState::Welcomed => vec![self.execute(command)],
            PuppetState::Closed => vec![],
            PuppetState::Absent => {
                self.pending.push_back(command);
                vec![self.connect()]
            }
            _ => {
                self.pending.push_back(command);
                vec![]
            }
        }
    }

    pub fn join(&mut self, channel: &str) -> Vec<Action> {
        if self.state == PuppetState::Closed {
            return vec![];
        }
        let channel = irc_to_lower(channel);
        let added = self.channels.insert(channel.clone());
        match self.state {
            PuppetState::Welcomed if added => vec![Action::Send(Message::join(channel))],
            PuppetState::Absent => vec![self.connect()],
            _ => vec![],
        }
    }

    /// Part `channel`. Emptying the channel set closes the puppet.
    pub fn leave(&mut self, channel: &str) -> Vec<Action> {
        if !self.channels.remove(&irc_to_lower(channel)) {
            return vec![];
        }
        let mut actions = Vec::new();
        if self.state == PuppetState::Welcomed {
            actions.push(Action::Send(Message::part(irc_to_lower(channel))));
        }
        if self.channels.is_empty() {
            self.state = PuppetState::Closed;
            self.pending.clear();
            actions.push(Action::Close);
        }
        actions
    }

    pub fn on_connected(&mut self) -> Vec<Action> {
        if self.state == PuppetState::Connecting {
            self.state = PuppetState::AwaitingWelcome;
        }
        vec![]
    }

    /// Join every channel (spaced by the join delay), then drain the queue
    /// in submission order.
    pub fn on_welcome(&mut self) -> Vec<Action> {
        if !matches!(
            self.state,
            PuppetState::AwaitingWelcome | PuppetState::Connecting
        ) {
            return vec![];
        }
        self.state = PuppetState::Welcomed;

        let mut actions = Vec::new();
        for channel in &self.channels {
            actions.push(Action::PauseForJoin);
            actions.push(Action::Send(Message::join(channel.as_str())));
        }
        while let Some(command) = self.pending.pop_front() {
            let action = self.execute(command);
            actions.push(action);
        }
        actions
    }

    /// The server refused our nick: rename, persist and try again.
    pub fn on_nick_in_use(&mut self) -> Vec<Action> {
        if !matches!(
            self.state,
            PuppetState::AwaitingWelcome | PuppetState::Welcomed
        ) {
            return vec![];
        }
        self.nick = collision_rename(&self.nick);
        vec![
            Action::RecordNick(self.nick.clone()),
            Action::Send(Message::nick(self.wire_nick())),
        ]
    }

    /// A send was refused because the session already ended. The command
    /// waits for the next welcome, behind anything refused before it.
    pub fn requeue(&mut self, message: &Message) {
        if self.state == PuppetState::Closed {
            return;
        }
        if let Some(command) = PuppetCommand::from_sent(message) {
            self.pending.push_back(command);
        }
    }

    /// Transport lost (or never came up). Queued commands are kept, and
    /// `unsent` (what the session never wrote) goes back in front of them.
    pub fn on_disconnected(&mut self, unsent: Vec<Message>) -> Vec<Action> {
        if self.state == PuppetState::Closed {
            return vec![];
        }
        let recovered: Vec<PuppetCommand> =
            unsent.iter().filter_map(PuppetCommand::from_sent).collect();
        for command in recovered.into_iter().rev() {
            self.pending.push_front(command);
        }
        match self.state {
            PuppetState::Absent | PuppetState::Disconnected => vec![],
            _ => {
                self.state = PuppetState::Disconnected;
                vec![Action::ScheduleReconnect]
            }
        }
    }

    pub fn on_reconnect_due(&mut self) -> Vec<Action> {
        match self.state {
            PuppetState::Disconnected => vec![self.connect()],
            _ => vec![],
        }
    }
}
