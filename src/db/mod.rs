//! Database module for persistent storage.
//!
//! Async SQLite access through SQLx for the four bridge tables:
//! - channel <-> group mappings
//! - private chat mappings
//! - address <-> nick records
//! - the self-service join whitelist

mod channels;
mod nicks;
mod private_chats;
mod whitelist;

pub use channels::ChannelRepository;
pub use nicks::NickRepository;
pub use private_chats::PrivateChatRepository;
pub use whitelist::WhitelistRepository;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::platform::GroupId;
use crate::store::{BridgeChannel, BridgeStore, PrivateBridge};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
    #[error("migration error: {0}")]
    Migration(sqlx::migrate::MigrateError),
    #[error("nick already taken: {0}")]
    NickTaken(String),
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open the database, running migrations and nick normalization.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            // Each call gets its own named in-memory database so parallel
            // tests never share state.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:slirc-bridge-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Database connected");

        Self::run_migrations(&pool).await?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&pool)
            .await?;

        let db = Self { pool };
        let normalized = db.nicks().normalize_trailing_underscores().await?;
        if normalized > 0 {
            info!(count = normalized, "Normalized nick records with trailing underscores");
        }

        Ok(db)
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(StoreError::Migration)?;

        info!("Database migrations checked/applied");
        Ok(())
    }

    /// Get channel repository.
    pub fn channels(&self) -> ChannelRepository<'_> {
        ChannelRepository::new(&self.pool)
    }

    /// Get private chat repository.
    pub fn private_chats(&self) -> PrivateChatRepository<'_> {
        PrivateChatRepository::new(&self.pool)
    }

    /// Get nick repository.
    pub fn nicks(&self) -> NickRepository<'_> {
        NickRepository::new(&self.pool)
    }

    /// Get whitelist repository.
    pub fn whitelist(&self) -> WhitelistRepository<'_> {
        WhitelistRepository::new(&self.pool)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Sqlx(err)
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Migration(err)
    }
}

/// True when `err` is a UNIQUE/PRIMARY KEY violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl BridgeStore for Database {
    async fn channel_group(&self, channel: &str) -> Result<Option<GroupId>, StoreError> {
        self.channels().group_for(channel).await
    }

    async fn group_channel(&self, group: GroupId) -> Result<Option<String>, StoreError> {
        self.channels().channel_for(group).await
    }

    async fn channels(&self) -> Result<Vec<BridgeChannel>, StoreError> {
        self.channels().list().await
    }

    async fn add_channel(&self, channel: &str, group: GroupId) -> Result<(), StoreError> {
        self.channels().insert(channel, group).await
    }

    async fn remove_channel(&self, channel: &str) -> Result<(), StoreError> {
        self.channels().delete(channel).await
    }

    async fn private_chat(&self, address: &str, nick: &str) -> Result<Option<GroupId>, StoreError> {
        self.private_chats().find(address, nick).await
    }

    async fn private_chat_by_group(
        &self,
        group: GroupId,
    ) -> Result<Option<PrivateBridge>, StoreError> {
        self.private_chats().find_by_group(group).await
    }

    async fn add_private_chat(
        &self,
        address: &str,
        nick: &str,
        group: GroupId,
    ) -> Result<(), StoreError> {
        self.private_chats().insert(address, nick, group).await
    }

    async fn remove_private_chat(&self, group: GroupId) -> Result<(), StoreError> {
        self.private_chats().delete(group).await
    }

    async fn nick(&self, address: &str) -> Result<Option<String>, StoreError> {
        self.nicks().nick_for(address).await
    }

    async fn set_nick(&self, address: &str, nick: &str) -> Result<(), StoreError> {
        self.nicks().upsert(address, nick).await
    }

    async fn address_for_nick(&self, nick: &str) -> Result<Option<String>, StoreError> {
        self.nicks().address_for(nick).await
    }

    async fn is_whitelisted(&self, channel: &str) -> Result<bool, StoreError> {
        self.whitelist().allows(channel).await
    }

    async fn whitelist(&self) -> Result<Vec<String>, StoreError> {
        self.whitelist().list().await
    }

    async fn add_to_whitelist(&self, channel: &str) -> Result<bool, StoreError> {
        self.whitelist().insert(channel).await
    }

    async fn remove_from_whitelist(&self, channel: &str) -> Result<bool, StoreError> {
        self.whitelist().delete(channel).await
    }
}
