//! Commands a puppet executes on behalf of its user.

use bridge_proto::{Command, Message};

use crate::event::{TextKind, classify};
use crate::nick::wire_nick;

/// Work queued on a puppet. Executed in submission order once welcomed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PuppetCommand {
    Privmsg { target: String, text: String },
    Action { target: String, text: String },
    /// Switch to a new stored nick (sent with the wire suffix).
    SetNick { nick: String },
}

impl PuppetCommand {
    pub fn to_message(&self) -> Message {
        match self {
            Self::Privmsg { target, text } => Message::privmsg(target.as_str(), text.as_str()),
            Self::Action { target, text } => Message::action(target.as_str(), text),
            Self::SetNick { nick } => Message::nick(wire_nick(nick)),
        }
    }

    /// The command a message we sent came from, if it needs repeating on a
    /// new session. `JOIN`s are redone on welcome and a `NICK` is already
    /// reflected in the stored nick, so only text comes back.
    pub fn from_sent(message: &Message) -> Option<Self> {
        let Command::PRIVMSG(target, body) = &message.command else {
            return None;
        };
        let (kind, text) = classify(body)?;
        let target = target.clone();
        Some(match kind {
            TextKind::Text => Self::Privmsg { target, text },
            TextKind::Action => Self::Action { target, text },
        })
    }
}
