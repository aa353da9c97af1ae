//! What the observer knows about each joined channel.

use std::collections::BTreeMap;

use bridge_proto::irc_to_lower;
use dashmap::DashMap;

/// Membership prefixes that can precede a nick in a `NAMES` reply.
const MEMBER_PREFIXES: &[char] = &['~', '&', '@', '%', '+'];

#[derive(Debug, Default, Clone)]
pub struct ChannelInfo {
    pub topic: Option<String>,
    /// Lowercased nick -> nick as last seen.
    members: BTreeMap<String, String>,
}

impl ChannelInfo {
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.values().map(String::as_str)
    }
}

/// Topic and membership of every channel the observer sits in.
#[derive(Default)]
pub struct ChannelBook {
    channels: DashMap<String, ChannelInfo>,
}

impl ChannelBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn joined(&self, channel: &str) {
        self.channels.entry(irc_to_lower(channel)).or_default();
    }

    pub fn parted(&self, channel: &str) {
        self.channels.remove(&irc_to_lower(channel));
    }

    pub fn clear(&self) {
        self.channels.clear();
    }

    pub fn is_joined(&self, channel: &str) -> bool {
        self.channels.contains_key(&irc_to_lower(channel))
    }

    pub fn add_member(&self, channel: &str, nick: &str) {
        if let Some(mut info) = self.channels.get_mut(&irc_to_lower(channel)) {
            info.members.insert(irc_to_lower(nick), nick.to_string());
        }
    }

    /// Add every nick of a `RPL_NAMREPLY` list, status prefixes stripped.
    pub fn add_names(&self, channel: &str, names: &str) {
        if let Some(mut info) = self.channels.get_mut(&irc_to_lower(channel)) {
            for name in names.split_whitespace() {
                let nick = name.trim_start_matches(MEMBER_PREFIXES);
                if !nick.is_empty() {
                    info.members.insert(irc_to_lower(nick), nick.to_string());
                }
            }
        }
    }

    pub fn remove_member(&self, channel: &str, nick: &str) {
        if let Some(mut info) = self.channels.get_mut(&irc_to_lower(channel)) {
            info.members.remove(&irc_to_lower(nick));
        }
    }

    /// Drop `nick` from every channel.
    pub fn quit(&self, nick: &str) {
        let key = irc_to_lower(nick);
        for mut info in self.channels.iter_mut() {
            info.members.remove(&key);
        }
    }

    pub fn rename(&self, old: &str, new: &str) {
        let old_key = irc_to_lower(old);
        for mut info in self.channels.iter_mut() {
            if info.members.remove(&old_key).is_some() {
                info.members.insert(irc_to_lower(new), new.to_string());
            }
        }
    }

    pub fn set_topic(&self, channel: &str, topic: Option<String>) {
        if let Some(mut info) = self.channels.get_mut(&irc_to_lower(channel)) {
            info.topic = topic;
        }
    }

    pub fn topic(&self, channel: &str) -> Option<String> {
        self.channels
            .get(&irc_to_lower(channel))
            .and_then(|info| info.topic.clone())
    }

    /// Members of `channel`, sorted case-insensitively.
    pub fn members(&self, channel: &str) -> Vec<String> {
        self.channels
            .get(&irc_to_lower(channel))
            .map(|info| info.members().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
