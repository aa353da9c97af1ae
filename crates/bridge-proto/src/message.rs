//! IRC message type: parsing, construction and serialization.

use std::fmt;
use std::str::FromStr;

use crate::command::Command;
use crate::ctcp::Ctcp;
use crate::error::{MessageParseError, ProtocolError};
use crate::prefix::Prefix;

/// An owned IRC message.
///
/// IRCv3 tags are accepted on input and dropped; the bridge never
/// negotiates capabilities that would make them meaningful.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message {
    /// Message prefix/source (e.g., `nick!user@host`).
    pub prefix: Option<Prefix>,
    /// The IRC command and its parameters.
    pub command: Command,
}

impl Message {
    /// Get the nickname from the message prefix, if present.
    pub fn source_nickname(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(Prefix::nickname)
    }

    /// Attach a prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// `PRIVMSG target :text`
    #[must_use]
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Command::PRIVMSG(target.into(), text.into()).into()
    }

    /// `NOTICE target :text`
    #[must_use]
    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Self {
        Command::NOTICE(target.into(), text.into()).into()
    }

    /// CTCP `ACTION` wrapped in a `PRIVMSG`.
    #[must_use]
    pub fn action(target: impl Into<String>, text: &str) -> Self {
        Command::PRIVMSG(target.into(), Ctcp::action(text)).into()
    }

    /// `JOIN channel`
    #[must_use]
    pub fn join(channel: impl Into<String>) -> Self {
        Command::JOIN(channel.into(), None).into()
    }

    /// `PART channel`
    #[must_use]
    pub fn part(channel: impl Into<String>) -> Self {
        Command::PART(channel.into(), None).into()
    }

    /// `NICK nickname`
    #[must_use]
    pub fn nick(nick: impl Into<String>) -> Self {
        Command::NICK(nick.into()).into()
    }

    /// `USER username 0 * :realname`
    #[must_use]
    pub fn user(username: impl Into<String>, realname: impl Into<String>) -> Self {
        Command::USER(username.into(), "0".into(), realname.into()).into()
    }

    /// `TOPIC channel` (a query, not a change).
    #[must_use]
    pub fn topic(channel: impl Into<String>) -> Self {
        Command::TOPIC(channel.into(), None).into()
    }

    /// `NAMES channel`
    #[must_use]
    pub fn names(channel: impl Into<String>) -> Self {
        Command::NAMES(Some(channel.into())).into()
    }

    /// `PONG token`
    #[must_use]
    pub fn pong(token: impl Into<String>) -> Self {
        Command::PONG(token.into(), None).into()
    }

    /// `QUIT [:reason]`
    #[must_use]
    pub fn quit(reason: Option<String>) -> Self {
        Command::QUIT(reason).into()
    }
}

impl From<Command> for Message {
    fn from(command: Command) -> Self {
        Message {
            prefix: None,
            command,
        }
    }
}

/// Split a line into (prefix, command, params) without allocating.
fn split_line(line: &str) -> Result<(Option<&str>, &str, Vec<&str>), MessageParseError> {
    let mut rest = line.trim_end_matches(&['\r', '\n'][..]).trim_start_matches(' ');

    if rest.starts_with('@') {
        rest = rest
            .split_once(' ')
            .map(|(_, r)| r.trim_start_matches(' '))
            .unwrap_or("");
    }

    let prefix = match rest.strip_prefix(':') {
        Some(after) => {
            let (prefix, r) = after.split_once(' ').unwrap_or((after, ""));
            if prefix.is_empty() {
                return Err(MessageParseError::EmptyPrefix);
            }
            rest = r.trim_start_matches(' ');
            Some(prefix)
        }
        None => None,
    };

    let (command, mut rest) = rest.split_once(' ').unwrap_or((rest, ""));
    if command.is_empty() {
        return Err(if prefix.is_some() {
            MessageParseError::MissingCommand
        } else {
            MessageParseError::EmptyMessage
        });
    }

    let mut params = Vec::new();
    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }
        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing);
            break;
        }
        let (param, r) = rest.split_once(' ').unwrap_or((rest, ""));
        params.push(param);
        rest = r;
    }

    Ok((prefix, command, params))
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, Self::Err> {
        let invalid = |cause| ProtocolError::InvalidMessage {
            string: s.to_owned(),
            cause,
        };

        let (prefix, command, params) = split_line(s).map_err(invalid)?;
        let command = Command::new(command, params).map_err(invalid)?;

        Ok(Message {
            prefix: prefix.map(Prefix::new_from_str),
            command,
        })
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        write!(f, "{}", self.command)
    }
}
