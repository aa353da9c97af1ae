//! # bridge-proto
//!
//! The slice of the IRC client protocol that the bridge speaks: message
//! parsing and serialization, the numerics it reacts to, CTCP `ACTION`
//! framing, nickname rules and a tokio codec.
//!
//! ```rust
//! use bridge_proto::{Command, Message};
//!
//! let msg: Message = ":alice!a@host PRIVMSG #rust :hello there".parse().unwrap();
//! assert_eq!(msg.source_nickname(), Some("alice"));
//! assert!(matches!(msg.command, Command::PRIVMSG(ref t, _) if t == "#rust"));
//!
//! assert_eq!(Message::privmsg("#rust", "hi all").to_string(), "PRIVMSG #rust :hi all");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod chan;
pub mod command;
pub mod ctcp;
pub mod error;
#[cfg(feature = "tokio")]
pub mod irc;
pub mod message;
pub mod nick;
pub mod prefix;
pub mod response;

pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::chan::ChannelExt;
pub use self::command::Command;
pub use self::ctcp::{Ctcp, CtcpKind};
pub use self::error::{MessageParseError, ProtocolError};
#[cfg(feature = "tokio")]
pub use self::irc::{IrcCodec, MAX_IRC_LINE_LEN};
pub use self::message::Message;
pub use self::nick::{is_nick_char, sanitize_nick, NickExt};
pub use self::prefix::Prefix;
pub use self::response::Response;
