//! IRC command types.
//!
//! Only the commands a bridging client sends or reacts to get their own
//! variant; everything else round-trips through [`Command::Raw`].

use std::fmt::{self, Write as _};

use crate::error::MessageParseError;
use crate::response::Response;

/// IRC command with its parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Command {
    /// `NICK nickname`
    NICK(String),
    /// `USER username mode :realname`
    USER(String, String, String),
    /// `JOIN channel [key]`
    JOIN(String, Option<String>),
    /// `PART channel [:reason]`
    PART(String, Option<String>),
    /// `PRIVMSG target :text`
    PRIVMSG(String, String),
    /// `NOTICE target :text`
    NOTICE(String, String),
    /// `TOPIC channel [:topic]`
    TOPIC(String, Option<String>),
    /// `NAMES [channel]`
    NAMES(Option<String>),
    /// `KICK channel nick [:reason]`
    KICK(String, String, Option<String>),
    /// `PING token [server]`
    PING(String, Option<String>),
    /// `PONG token [server]`
    PONG(String, Option<String>),
    /// `QUIT [:reason]`
    QUIT(Option<String>),
    /// `ERROR :message`
    ERROR(String),
    /// A numeric reply the bridge understands.
    Response(Response, Vec<String>),
    /// Any other command or numeric, kept verbatim.
    Raw(String, Vec<String>),
}

fn arg<'a>(
    command: &'static str,
    args: &[&'a str],
    idx: usize,
    expected: usize,
) -> Result<&'a str, MessageParseError> {
    args.get(idx)
        .copied()
        .ok_or(MessageParseError::NotEnoughArguments {
            command,
            expected,
            got: args.len(),
        })
}

fn opt(args: &[&str], idx: usize) -> Option<String> {
    args.get(idx).map(|s| (*s).to_owned())
}

impl Command {
    /// Build a command from its name and parameters.
    pub fn new(name: &str, args: Vec<&str>) -> Result<Command, MessageParseError> {
        let upper = name.to_ascii_uppercase();
        let cmd = match upper.as_str() {
            "NICK" => Command::NICK(arg("NICK", &args, 0, 1)?.to_owned()),
            "USER" => Command::USER(
                arg("USER", &args, 0, 4)?.to_owned(),
                arg("USER", &args, 1, 4)?.to_owned(),
                args.last().copied().unwrap_or_default().to_owned(),
            ),
            "JOIN" => Command::JOIN(arg("JOIN", &args, 0, 1)?.to_owned(), opt(&args, 1)),
            "PART" => Command::PART(arg("PART", &args, 0, 1)?.to_owned(), opt(&args, 1)),
            "PRIVMSG" => Command::PRIVMSG(
                arg("PRIVMSG", &args, 0, 2)?.to_owned(),
                arg("PRIVMSG", &args, 1, 2)?.to_owned(),
            ),
            "NOTICE" => Command::NOTICE(
                arg("NOTICE", &args, 0, 2)?.to_owned(),
                arg("NOTICE", &args, 1, 2)?.to_owned(),
            ),
            "TOPIC" => Command::TOPIC(arg("TOPIC", &args, 0, 1)?.to_owned(), opt(&args, 1)),
            "NAMES" => Command::NAMES(opt(&args, 0)),
            "KICK" => Command::KICK(
                arg("KICK", &args, 0, 2)?.to_owned(),
                arg("KICK", &args, 1, 2)?.to_owned(),
                opt(&args, 2),
            ),
            "PING" => Command::PING(arg("PING", &args, 0, 1)?.to_owned(), opt(&args, 1)),
            "PONG" => Command::PONG(arg("PONG", &args, 0, 1)?.to_owned(), opt(&args, 1)),
            "QUIT" => Command::QUIT(opt(&args, 0)),
            "ERROR" => Command::ERROR(args.first().copied().unwrap_or_default().to_owned()),
            _ => {
                let owned = args.iter().map(|s| (*s).to_owned()).collect();
                let numeric = (upper.len() == 3)
                    .then(|| upper.parse::<u16>().ok())
                    .flatten()
                    .and_then(Response::from_code);
                match numeric {
                    Some(resp) => Command::Response(resp, owned),
                    None => Command::Raw(upper, owned),
                }
            }
        };
        Ok(cmd)
    }

    /// The command name as it appears on the wire.
    pub fn name(&self) -> String {
        match self {
            Command::NICK(_) => "NICK".into(),
            Command::USER(..) => "USER".into(),
            Command::JOIN(..) => "JOIN".into(),
            Command::PART(..) => "PART".into(),
            Command::PRIVMSG(..) => "PRIVMSG".into(),
            Command::NOTICE(..) => "NOTICE".into(),
            Command::TOPIC(..) => "TOPIC".into(),
            Command::NAMES(_) => "NAMES".into(),
            Command::KICK(..) => "KICK".into(),
            Command::PING(..) => "PING".into(),
            Command::PONG(..) => "PONG".into(),
            Command::QUIT(_) => "QUIT".into(),
            Command::ERROR(_) => "ERROR".into(),
            Command::Response(resp, _) => format!("{:03}", resp.code()),
            Command::Raw(name, _) => name.clone(),
        }
    }

    /// Middle parameters plus an optional trailing parameter.
    fn params(&self) -> (Vec<&str>, Option<&str>) {
        match self {
            Command::NICK(n) => (vec![n.as_str()], None),
            Command::USER(u, m, real) => (vec![u.as_str(), m.as_str(), "*"], Some(real.as_str())),
            Command::JOIN(c, key) => (
                std::iter::once(c.as_str()).chain(key.as_deref()).collect(),
                None,
            ),
            Command::PART(c, reason) => (vec![c.as_str()], reason.as_deref()),
            Command::PRIVMSG(t, text) | Command::NOTICE(t, text) => {
                (vec![t.as_str()], Some(text.as_str()))
            }
            Command::TOPIC(c, topic) => (vec![c.as_str()], topic.as_deref()),
            Command::NAMES(c) => (c.iter().map(String::as_str).collect(), None),
            Command::KICK(c, n, reason) => (vec![c.as_str(), n.as_str()], reason.as_deref()),
            Command::PING(t, s) | Command::PONG(t, s) => (
                std::iter::once(t.as_str()).chain(s.as_deref()).collect(),
                None,
            ),
            Command::QUIT(reason) => (vec![], reason.as_deref()),
            Command::ERROR(msg) => (vec![], Some(msg.as_str())),
            Command::Response(_, args) | Command::Raw(_, args) => match args.split_last() {
                Some((last, rest)) => (
                    rest.iter().map(String::as_str).collect(),
                    Some(last.as_str()),
                ),
                None => (vec![], None),
            },
        }
    }
}

/// Whether a parameter must be sent in trailing (`:`-prefixed) form.
fn needs_colon(param: &str) -> bool {
    param.is_empty() || param.contains(' ') || param.starts_with(':')
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())?;
        let (middle, trailing) = self.params();
        for param in middle {
            f.write_char(' ')?;
            f.write_str(param)?;
        }
        if let Some(trailing) = trailing {
            // Free-text parameters always go out in trailing form; for raw
            // commands only when the content demands it.
            let always = !matches!(self, Command::Response(..) | Command::Raw(..));
            if always || needs_colon(trailing) {
                write!(f, " :{}", trailing)?;
            } else {
                write!(f, " {}", trailing)?;
            }
        }
        Ok(())
    }
}
