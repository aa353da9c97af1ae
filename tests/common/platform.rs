//! Recording platform.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use slirc_bridge::{GroupId, OutgoingMessage, Platform, PlatformError};
use tokio::sync::mpsc;

pub const BRIDGE_ADDRESS: &str = "bridge@example.org";

/// In-memory platform that records every message the bridge posts.
pub struct FakePlatform {
    groups: Mutex<BTreeMap<GroupId, (String, Vec<String>)>>,
    names: Mutex<HashMap<String, String>>,
    members_down: AtomicBool,
    names_down: AtomicBool,
    sent: Mutex<Vec<OutgoingMessage>>,
    sent_tx: mpsc::UnboundedSender<OutgoingMessage>,
    sent_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<OutgoingMessage>>,
}

#[allow(dead_code)]
impl FakePlatform {
    pub fn new() -> Self {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        Self {
            groups: Mutex::new(BTreeMap::new()),
            names: Mutex::new(HashMap::new()),
            members_down: AtomicBool::new(false),
            names_down: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            sent_tx,
            sent_rx: tokio::sync::Mutex::new(sent_rx),
        }
    }

    /// Give `address` a display name other than its local part.
    pub fn set_name(&self, address: &str, name: &str) {
        self.names.lock().insert(address.into(), name.into());
    }

    /// Create a group holding the bridge and `members`.
    pub fn add_group(&self, name: &str, members: &[&str]) -> GroupId {
        let mut groups = self.groups.lock();
        let id = GroupId(groups.len() as i64 + 100);
        let mut all = vec![BRIDGE_ADDRESS.to_string()];
        all.extend(members.iter().map(|m| m.to_string()));
        groups.insert(id, (name.into(), all));
        id
    }

    /// Make member listing fail until switched back.
    pub fn set_members_down(&self, down: bool) {
        self.members_down.store(down, Ordering::SeqCst);
    }

    /// Make display-name lookups fail until switched back.
    pub fn set_names_down(&self, down: bool) {
        self.names_down.store(down, Ordering::SeqCst);
    }

    pub fn delete_group(&self, group: GroupId) {
        self.groups.lock().remove(&group);
    }

    pub fn group_named(&self, name: &str) -> Option<GroupId> {
        self.groups
            .lock()
            .iter()
            .find(|(_, (n, _))| n == name)
            .map(|(id, _)| *id)
    }

    pub fn group_members(&self, group: GroupId) -> Vec<String> {
        self.groups
            .lock()
            .get(&group)
            .map(|(_, m)| m.clone())
            .unwrap_or_default()
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().clone()
    }

    /// Next message the bridge posts, waiting up to five seconds.
    pub async fn next_sent(&self) -> OutgoingMessage {
        let mut rx = self.sent_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("bridge posted nothing")
            .expect("platform channel open")
    }
}

#[async_trait]
impl Platform for FakePlatform {
    fn self_address(&self) -> String {
        BRIDGE_ADDRESS.to_string()
    }

    async fn create_group(&self, name: &str, members: &[String]) -> Result<GroupId, PlatformError> {
        let members: Vec<&str> = members.iter().map(String::as_str).collect();
        Ok(self.add_group(name, &members))
    }

    async fn add_member(&self, group: GroupId, address: &str) -> Result<(), PlatformError> {
        let mut groups = self.groups.lock();
        let (_, members) = groups
            .get_mut(&group)
            .ok_or_else(|| PlatformError::new("no such group"))?;
        members.push(address.into());
        Ok(())
    }

    async fn remove_member(&self, group: GroupId, address: &str) -> Result<(), PlatformError> {
        let mut groups = self.groups.lock();
        let (_, members) = groups
            .get_mut(&group)
            .ok_or_else(|| PlatformError::new("no such group"))?;
        members.retain(|m| m != address);
        Ok(())
    }

    async fn members(&self, group: GroupId) -> Result<Vec<String>, PlatformError> {
        if self.members_down.load(Ordering::SeqCst) {
            return Err(PlatformError::new("member list unavailable"));
        }
        self.groups
            .lock()
            .get(&group)
            .map(|(_, m)| m.clone())
            .ok_or_else(|| PlatformError::new("no such group"))
    }

    async fn groups(&self) -> Result<Vec<GroupId>, PlatformError> {
        Ok(self.groups.lock().keys().copied().collect())
    }

    async fn display_name(&self, address: &str) -> Result<String, PlatformError> {
        if self.names_down.load(Ordering::SeqCst) {
            return Err(PlatformError::new("profile service unavailable"));
        }
        if let Some(name) = self.names.lock().get(address) {
            return Ok(name.clone());
        }
        Ok(address.split('@').next().unwrap_or(address).to_string())
    }

    async fn send_text(&self, msg: OutgoingMessage) -> Result<(), PlatformError> {
        self.sent.lock().push(msg.clone());
        let _ = self.sent_tx.send(msg);
        Ok(())
    }
}
