//! Whitelist repository: channels open for self-service join.

use bridge_proto::irc_to_lower;
use sqlx::SqlitePool;

use super::StoreError;

/// Repository for the join whitelist.
pub struct WhitelistRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> WhitelistRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// An empty whitelist allows every channel.
    pub async fn allows(&self, channel: &str) -> Result<bool, StoreError> {
        let (total, hits) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COALESCE(SUM(channel = ?), 0) FROM whitelist",
        )
        .bind(irc_to_lower(channel))
        .fetch_one(self.pool)
        .await?;
        Ok(total == 0 || hits > 0)
    }

    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query_scalar::<_, String>("SELECT channel FROM whitelist ORDER BY channel")
            .fetch_all(self.pool)
            .await?;
        Ok(rows)
    }

    /// Returns false when the channel was already listed.
    pub async fn insert(&self, channel: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("INSERT OR IGNORE INTO whitelist (channel) VALUES (?)")
            .bind(irc_to_lower(channel))
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns false when the channel was not listed.
    pub async fn delete(&self, channel: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM whitelist WHERE channel = ?")
            .bind(irc_to_lower(channel))
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
