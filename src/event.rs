//! Inbound IRC traffic, as the router sees it.

/// Plain text or CTCP `ACTION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Text,
    Action,
}

/// Something IRC said that the platform side may need to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    /// Channel traffic seen by the observer, echoes already removed.
    ChannelMessage {
        channel: String,
        from: String,
        text: String,
        kind: TextKind,
    },
    /// A private message to the puppet of `address`.
    PrivateMessage {
        address: String,
        from: String,
        text: String,
        kind: TextKind,
    },
    /// The server rejected a message from the puppet of `address`.
    NoSuchTarget {
        address: String,
        target: String,
        reason: String,
    },
    /// The observer finished registration.
    ObserverWelcomed,
}

/// Split a PRIVMSG body into its kind and text. Returns `None` for CTCP
/// requests other than `ACTION`.
pub(crate) fn classify(body: &str) -> Option<(TextKind, String)> {
    use bridge_proto::{Ctcp, CtcpKind};

    match Ctcp::parse(body) {
        None => Some((TextKind::Text, body.to_string())),
        Some(Ctcp {
            kind: CtcpKind::Action,
            params,
        }) => Some((TextKind::Action, params.unwrap_or_default().to_string())),
        Some(_) => None,
    }
}
