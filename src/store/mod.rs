//! Persistent mapping store.
//!
//! The store is the only owner of durable bridge state. Everything else
//! reads and writes through [`BridgeStore`]; nothing keeps a private copy
//! that could drift from it.

mod memory;

pub use memory::MemoryStore;

pub use crate::db::{Database, StoreError};

use async_trait::async_trait;

use crate::platform::GroupId;

/// One IRC channel bridged to one platform group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeChannel {
    /// Channel name, lowercase.
    pub name: String,
    pub group: GroupId,
}

/// A private conversation between a local user and one IRC nick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateBridge {
    /// Local user's address.
    pub address: String,
    /// Remote IRC nick.
    pub nick: String,
    pub group: GroupId,
}

/// Storage for channel, private chat, nick and whitelist records.
///
/// Channel names are compared case-insensitively; nicks too.
#[async_trait]
pub trait BridgeStore: Send + Sync {
    /// Group bridged to `channel`.
    async fn channel_group(&self, channel: &str) -> Result<Option<GroupId>, StoreError>;

    /// Channel bridged to `group`.
    async fn group_channel(&self, group: GroupId) -> Result<Option<String>, StoreError>;

    /// Every bridged channel.
    async fn channels(&self) -> Result<Vec<BridgeChannel>, StoreError>;

    async fn add_channel(&self, channel: &str, group: GroupId) -> Result<(), StoreError>;

    async fn remove_channel(&self, channel: &str) -> Result<(), StoreError>;

    /// Private chat between `address` and `nick`, if one exists.
    async fn private_chat(&self, address: &str, nick: &str) -> Result<Option<GroupId>, StoreError>;

    async fn private_chat_by_group(
        &self,
        group: GroupId,
    ) -> Result<Option<PrivateBridge>, StoreError>;

    async fn add_private_chat(
        &self,
        address: &str,
        nick: &str,
        group: GroupId,
    ) -> Result<(), StoreError>;

    async fn remove_private_chat(&self, group: GroupId) -> Result<(), StoreError>;

    /// Recorded nick for `address`.
    async fn nick(&self, address: &str) -> Result<Option<String>, StoreError>;

    /// Record `nick` for `address`, replacing any previous nick.
    ///
    /// Returns [`StoreError::NickTaken`] when another address holds `nick`.
    async fn set_nick(&self, address: &str, nick: &str) -> Result<(), StoreError>;

    async fn address_for_nick(&self, nick: &str) -> Result<Option<String>, StoreError>;

    /// True when the whitelist is empty or lists `channel`.
    async fn is_whitelisted(&self, channel: &str) -> Result<bool, StoreError>;

    async fn whitelist(&self) -> Result<Vec<String>, StoreError>;

    /// Returns false when `channel` was already listed.
    async fn add_to_whitelist(&self, channel: &str) -> Result<bool, StoreError>;

    /// Returns false when `channel` was not listed.
    async fn remove_from_whitelist(&self, channel: &str) -> Result<bool, StoreError>;
}
