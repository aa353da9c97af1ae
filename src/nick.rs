//! Nick allocation.
//!
//! Every bridged user gets one stored nick of at most [`NICK_MAX_LEN`]
//! characters. On the wire a puppet uses the stored nick plus
//! [`WIRE_SUFFIX`], which stays within the common 16-character server limit.

use std::sync::Arc;

use bridge_proto::{NickExt, sanitize_nick};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{BridgeError, BridgeResult};
use crate::platform::Platform;
use crate::store::{BridgeStore, StoreError};

/// Longest stored nick.
pub const NICK_MAX_LEN: usize = 13;

/// Marks a nick on IRC as a bridge puppet.
pub const WIRE_SUFFIX: &str = "|dc";

/// Longest nick the bridge ever puts on the wire.
pub const WIRE_MAX_LEN: usize = 16;

const FALLBACK_NICK: &str = "user";

/// Turn a display name into a legal base nick.
pub fn derive_base(display_name: &str) -> String {
    let legal = sanitize_nick(display_name, usize::MAX);
    let base: String = legal
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '-')
        .chars()
        .take(NICK_MAX_LEN)
        .collect();
    if base.is_empty() {
        FALLBACK_NICK.to_string()
    } else {
        base
    }
}

/// The probe sequence for `base`: `base`, `base2`, `base3`, ...
///
/// When a suffix would push the nick past [`NICK_MAX_LEN`] the base is cut
/// down to make room, so every candidate is legal.
pub fn candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    let first = std::iter::once(base.chars().take(NICK_MAX_LEN).collect::<String>());
    let rest = (2u64..).map_while(move |i| {
        let suffix = i.to_string();
        let room = NICK_MAX_LEN.checked_sub(suffix.len()).filter(|r| *r > 0)?;
        let head: String = base.chars().take(room).collect();
        Some(format!("{head}{suffix}"))
    });
    first.chain(rest)
}

/// Rename after the server rejected `nick` as in use: append `_` while
/// there is room, otherwise drop the last character.
pub fn collision_rename(nick: &str) -> String {
    let len = nick.chars().count();
    if len < NICK_MAX_LEN {
        format!("{nick}_")
    } else {
        nick.chars().take(len.saturating_sub(1)).collect()
    }
}

/// The nick a puppet registers with.
pub fn wire_nick(nick: &str) -> String {
    format!("{nick}{WIRE_SUFFIX}")
}

/// Check a nick a user picked for themselves.
pub fn validate_user_nick(nick: &str) -> BridgeResult<()> {
    if nick.is_valid_nick_len(NICK_MAX_LEN) {
        Ok(())
    } else {
        Err(BridgeError::InvalidNick(nick.to_string()))
    }
}

/// Collision sequence for the bridge's own nick.
///
/// Yields `base2`, `base3`, ... and once that would exceed
/// [`WIRE_MAX_LEN`], shortens the base by one character and starts over.
#[derive(Debug, Clone)]
pub struct ObserverNick {
    base: String,
    counter: u32,
    current: String,
}

impl ObserverNick {
    pub fn new(nick: &str) -> Self {
        let base = sanitize_nick(nick, WIRE_MAX_LEN);
        let base = if base.is_empty() {
            FALLBACK_NICK.to_string()
        } else {
            base
        };
        Self {
            current: base.clone(),
            base,
            counter: 1,
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Advance after a nick-in-use reply.
    pub fn next_nick(&mut self) -> &str {
        self.counter += 1;
        let mut nick = format!("{}{}", self.base, self.counter);
        if nick.chars().count() > WIRE_MAX_LEN {
            self.base.pop();
            if self.base.is_empty() {
                self.base = FALLBACK_NICK.to_string();
            }
            self.counter = 1;
            nick = self.base.clone();
        }
        self.current = nick;
        &self.current
    }
}

/// Hands out stored nicks, allocating on first use.
pub struct NickAllocator {
    store: Arc<dyn BridgeStore>,
    platform: Arc<dyn Platform>,
    alloc: Mutex<()>,
}

impl NickAllocator {
    pub fn new(store: Arc<dyn BridgeStore>, platform: Arc<dyn Platform>) -> Self {
        Self {
            store,
            platform,
            alloc: Mutex::new(()),
        }
    }

    /// Stored nick for `address`, allocating and persisting one if needed.
    pub async fn nick_for(&self, address: &str) -> BridgeResult<String> {
        if let Some(nick) = self.store.nick(address).await? {
            return Ok(nick);
        }

        // One allocation at a time, so two new users never probe the same
        // free candidate concurrently.
        let _guard = self.alloc.lock().await;
        if let Some(nick) = self.store.nick(address).await? {
            return Ok(nick);
        }

        let display_name = self.platform.display_name(address).await?;
        let base = derive_base(&display_name);

        for candidate in candidates(&base) {
            if self.store.address_for_nick(&candidate).await?.is_some() {
                continue;
            }
            match self.store.set_nick(address, &candidate).await {
                Ok(()) => {
                    info!(%address, nick = %candidate, "Allocated nick");
                    return Ok(candidate);
                }
                Err(StoreError::NickTaken(_)) => {
                    debug!(%address, nick = %candidate, "Nick taken during allocation");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(BridgeError::NickTaken(base))
    }

    /// Persist a nick chosen outside the allocator.
    pub async fn record(&self, address: &str, nick: &str) -> BridgeResult<()> {
        self.store.set_nick(address, nick).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::RecordingPlatform;
    use crate::store::MemoryStore;
    use std::collections::HashSet;

    #[test]
    fn test_derive_base() {
        assert_eq!(derive_base("Alice Smith"), "AliceSmith");
        assert_eq!(derive_base("42-answer"), "answer");
        assert_eq!(derive_base("Ω Ω"), "user");
        assert_eq!(derive_base("abcdefghijklmnopqrstuvwxyz"), "abcdefghijklm");
    }

    #[test]
    fn test_candidates_stay_short() {
        let got: Vec<String> = candidates("abcdefghijklm").take(12).collect();
        assert_eq!(got[0], "abcdefghijklm");
        assert_eq!(got[1], "abcdefghijkl2");
        assert_eq!(got[8], "abcdefghijkl9");
        assert_eq!(got[9], "abcdefghijk10");
        assert!(got.iter().all(|n| n.is_valid_nick_len(NICK_MAX_LEN)));

        let short: Vec<String> = candidates("bob").take(3).collect();
        assert_eq!(short, ["bob", "bob2", "bob3"]);
    }

    #[test]
    fn test_collision_rename() {
        assert_eq!(collision_rename("bob"), "bob_");
        assert_eq!(collision_rename("abcdefghijkl_"), "abcdefghijkl");
        assert_eq!(wire_nick(&collision_rename("bob")), "bob_|dc");
    }

    #[test]
    fn test_observer_nick_sequence() {
        let mut nick = ObserverNick::new("DC-Bridge");
        assert_eq!(nick.current(), "DC-Bridge");
        assert_eq!(nick.next_nick(), "DC-Bridge2");

        let mut long = ObserverNick::new("abcdefghijklmnop");
        assert_eq!(long.current(), "abcdefghijklmnop");
        assert_eq!(long.next_nick(), "abcdefghijklmno");
        assert_eq!(long.next_nick(), "abcdefghijklmno2");
        assert_eq!(long.next_nick(), "abcdefghijklmno3");
    }

    #[test]
    fn test_validate_user_nick() {
        assert!(validate_user_nick("bob_42").is_ok());
        assert!(validate_user_nick("4bob").is_err());
        assert!(validate_user_nick("far_too_long_nick").is_err());
    }

    #[tokio::test]
    async fn test_colliding_users_get_distinct_nicks() {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(RecordingPlatform::new());
        for i in 0..25 {
            platform.set_name(&format!("u{i}@x"), "Maximilian Alexander");
        }
        let allocator = Arc::new(NickAllocator::new(store, platform));

        let tasks: Vec<_> = (0..25)
            .map(|i| {
                let allocator = allocator.clone();
                tokio::spawn(async move { allocator.nick_for(&format!("u{i}@x")).await })
            })
            .collect();

        let mut seen = HashSet::new();
        for task in tasks {
            let nick = task.await.unwrap().unwrap();
            assert!(nick.is_valid_nick_len(NICK_MAX_LEN), "{nick}");
            assert!(seen.insert(nick.to_ascii_lowercase()), "duplicate {nick}");
        }
        assert_eq!(seen.len(), 25);
    }

    #[tokio::test]
    async fn test_nick_for_is_stable() {
        let store = Arc::new(MemoryStore::new());
        let platform = Arc::new(RecordingPlatform::new());
        platform.set_name("a@x", "Bob");
        let allocator = NickAllocator::new(store.clone(), platform);

        assert_eq!(allocator.nick_for("a@x").await.unwrap(), "Bob");
        allocator.record("a@x", "Bob_").await.unwrap();
        assert_eq!(allocator.nick_for("a@x").await.unwrap(), "Bob_");
    }
}
