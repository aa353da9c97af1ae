//! In-memory store with the same semantics as the SQLite one.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use bridge_proto::irc_to_lower;
use parking_lot::Mutex;

use super::{BridgeChannel, BridgeStore, PrivateBridge, StoreError};
use crate::platform::GroupId;

#[derive(Default)]
struct Inner {
    channels: BTreeMap<String, GroupId>,
    private_chats: Vec<PrivateBridge>,
    nicks: HashMap<String, String>,
    whitelist: BTreeSet<String>,
}

/// Non-durable [`BridgeStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn same_nick(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[async_trait]
impl BridgeStore for MemoryStore {
    async fn channel_group(&self, channel: &str) -> Result<Option<GroupId>, StoreError> {
        Ok(self.inner.lock().channels.get(&irc_to_lower(channel)).copied())
    }

    async fn group_channel(&self, group: GroupId) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .channels
            .iter()
            .find(|(_, g)| **g == group)
            .map(|(name, _)| name.clone()))
    }

    async fn channels(&self) -> Result<Vec<BridgeChannel>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .channels
            .iter()
            .map(|(name, group)| BridgeChannel {
                name: name.clone(),
                group: *group,
            })
            .collect())
    }

    async fn add_channel(&self, channel: &str, group: GroupId) -> Result<(), StoreError> {
        self.inner.lock().channels.insert(irc_to_lower(channel), group);
        Ok(())
    }

    async fn remove_channel(&self, channel: &str) -> Result<(), StoreError> {
        self.inner.lock().channels.remove(&irc_to_lower(channel));
        Ok(())
    }

    async fn private_chat(&self, address: &str, nick: &str) -> Result<Option<GroupId>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .private_chats
            .iter()
            .find(|p| p.address == address && same_nick(&p.nick, nick))
            .map(|p| p.group))
    }

    async fn private_chat_by_group(
        &self,
        group: GroupId,
    ) -> Result<Option<PrivateBridge>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.private_chats.iter().find(|p| p.group == group).cloned())
    }

    async fn add_private_chat(
        &self,
        address: &str,
        nick: &str,
        group: GroupId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner
            .private_chats
            .retain(|p| !(p.address == address && same_nick(&p.nick, nick)));
        inner.private_chats.push(PrivateBridge {
            address: address.to_string(),
            nick: nick.to_string(),
            group,
        });
        Ok(())
    }

    async fn remove_private_chat(&self, group: GroupId) -> Result<(), StoreError> {
        self.inner.lock().private_chats.retain(|p| p.group != group);
        Ok(())
    }

    async fn nick(&self, address: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().nicks.get(address).cloned())
    }

    async fn set_nick(&self, address: &str, nick: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let taken = inner
            .nicks
            .iter()
            .any(|(addr, n)| addr != address && same_nick(n, nick));
        if taken {
            return Err(StoreError::NickTaken(nick.to_string()));
        }
        inner.nicks.insert(address.to_string(), nick.to_string());
        Ok(())
    }

    async fn address_for_nick(&self, nick: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .nicks
            .iter()
            .find(|(_, n)| same_nick(n, nick))
            .map(|(addr, _)| addr.clone()))
    }

    async fn is_whitelisted(&self, channel: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.whitelist.is_empty() || inner.whitelist.contains(&irc_to_lower(channel)))
    }

    async fn whitelist(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.lock().whitelist.iter().cloned().collect())
    }

    async fn add_to_whitelist(&self, channel: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().whitelist.insert(irc_to_lower(channel)))
    }

    async fn remove_from_whitelist(&self, channel: &str) -> Result<bool, StoreError> {
        Ok(self.inner.lock().whitelist.remove(&irc_to_lower(channel)))
    }
}
