//! CTCP (Client-to-Client Protocol) framing.
//!
//! CTCP payloads ride inside `PRIVMSG`/`NOTICE` bodies, delimited by
//! `\x01`. The bridge only produces `ACTION` but must recognise the rest
//! so it does not relay them as plain text.

use std::fmt;

/// The CTCP delimiter character (`\x01`).
pub const CTCP_DELIM: char = '\x01';

/// CTCP command types.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CtcpKind {
    /// ACTION, what `/me` produces.
    Action,
    /// VERSION request.
    Version,
    /// PING request.
    Ping,
    /// Anything else.
    Unknown(String),
}

impl CtcpKind {
    /// Parse a CTCP command name.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "ACTION" => Self::Action,
            "VERSION" => Self::Version,
            "PING" => Self::Ping,
            _ => Self::Unknown(name.to_owned()),
        }
    }

    /// Canonical uppercase name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Action => "ACTION",
            Self::Version => "VERSION",
            Self::Ping => "PING",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for CtcpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed CTCP message borrowing from the message body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ctcp<'a> {
    /// The CTCP command type.
    pub kind: CtcpKind,
    /// Text following the command, if any.
    pub params: Option<&'a str>,
}

impl<'a> Ctcp<'a> {
    /// Parse a message body. Returns `None` for ordinary text.
    ///
    /// The closing delimiter is optional; some clients omit it.
    pub fn parse(text: &'a str) -> Option<Self> {
        let text = text.strip_prefix(CTCP_DELIM)?;
        let text = text.strip_suffix(CTCP_DELIM).unwrap_or(text);
        if text.is_empty() {
            return None;
        }

        let (command, params) = match text.split_once(' ') {
            Some((command, params)) => (command, (!params.is_empty()).then_some(params)),
            None => (text, None),
        };

        Some(Ctcp {
            kind: CtcpKind::parse(command),
            params,
        })
    }

    /// Build an `ACTION` body.
    pub fn action(text: &str) -> String {
        format!("{}ACTION {}{}", CTCP_DELIM, text, CTCP_DELIM)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action() {
        let ctcp = Ctcp::parse("\x01ACTION waves hello\x01").unwrap();
        assert_eq!(ctcp.kind, CtcpKind::Action);
        assert_eq!(ctcp.params, Some("waves hello"));
    }

    #[test]
    fn test_parse_without_closing_delimiter() {
        let ctcp = Ctcp::parse("\x01ACTION shrugs").unwrap();
        assert_eq!(ctcp.kind, CtcpKind::Action);
        assert_eq!(ctcp.params, Some("shrugs"));
    }

    #[test]
    fn test_plain_text_is_not_ctcp() {
        assert!(Ctcp::parse("hello").is_none());
        assert!(Ctcp::parse("\x01\x01").is_none());
    }

    #[test]
    fn test_other_kinds() {
        let ctcp = Ctcp::parse("\x01VERSION\x01").unwrap();
        assert_eq!(ctcp.kind, CtcpKind::Version);
        assert_eq!(ctcp.params, None);

        let ctcp = Ctcp::parse("\x01DCC SEND file\x01").unwrap();
        assert_eq!(ctcp.kind, CtcpKind::Unknown("DCC".into()));
    }

    #[test]
    fn test_action_builder() {
        assert_eq!(Ctcp::action("dances"), "\x01ACTION dances\x01");
    }
}
