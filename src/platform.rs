//! The messaging-platform side of the bridge.
//!
//! The host application implements [`Platform`] and feeds platform events
//! into the bridge hooks. Groups are opaque to the bridge.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// Opaque platform group identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Error reported by the platform implementation.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PlatformError(pub String);

impl PlatformError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A text message the bridge posts into a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub group: GroupId,
    pub text: String,
    /// Display-name override, used to impersonate an IRC nick.
    /// `None` posts as the bridge itself.
    pub sender: Option<String>,
}

/// File attached to a group message.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// The message a group message replies to.
#[derive(Debug, Clone)]
pub struct Quote {
    /// Address of the quoted message's sender.
    pub author: String,
    /// Display-name override on the quoted message, if any.
    pub override_sender_name: Option<String>,
    pub text: String,
}

/// A message posted in a group by a platform user.
#[derive(Debug, Clone)]
pub struct GroupMessage {
    pub group: GroupId,
    /// Sender's address.
    pub sender: String,
    pub text: String,
    pub file: Option<Attachment>,
    pub quote: Option<Quote>,
}

impl GroupMessage {
    /// Plain text message.
    pub fn text(group: GroupId, sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            group,
            sender: sender.into(),
            text: text.into(),
            file: None,
            quote: None,
        }
    }
}

/// Operations the bridge needs from the messaging platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Address of the bridge's own platform account.
    fn self_address(&self) -> String;

    /// Create a group named `name` with `members` (besides the bridge).
    async fn create_group(&self, name: &str, members: &[String])
    -> Result<GroupId, PlatformError>;

    async fn add_member(&self, group: GroupId, address: &str) -> Result<(), PlatformError>;

    async fn remove_member(&self, group: GroupId, address: &str) -> Result<(), PlatformError>;

    /// Addresses of every member of `group`, the bridge included.
    async fn members(&self, group: GroupId) -> Result<Vec<String>, PlatformError>;

    /// Every group the bridge belongs to.
    async fn groups(&self) -> Result<Vec<GroupId>, PlatformError>;

    /// Display name of the user behind `address`.
    async fn display_name(&self, address: &str) -> Result<String, PlatformError>;

    async fn send_text(&self, msg: OutgoingMessage) -> Result<(), PlatformError>;
}
