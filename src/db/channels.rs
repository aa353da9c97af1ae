//! Channel repository: IRC channel <-> platform group.

use bridge_proto::irc_to_lower;
use sqlx::SqlitePool;

use super::StoreError;
use crate::platform::GroupId;
use crate::store::BridgeChannel;

/// Repository for channel mappings.
pub struct ChannelRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChannelRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Group bridged to `channel`.
    pub async fn group_for(&self, channel: &str) -> Result<Option<GroupId>, StoreError> {
        let row = sqlx::query_scalar::<_, i64>("SELECT group_id FROM channels WHERE name = ?")
            .bind(irc_to_lower(channel))
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(GroupId))
    }

    /// Channel bridged to `group`.
    pub async fn channel_for(&self, group: GroupId) -> Result<Option<String>, StoreError> {
        let row = sqlx::query_scalar::<_, String>("SELECT name FROM channels WHERE group_id = ?")
            .bind(group.0)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    /// Every bridged channel, ordered by name.
    pub async fn list(&self) -> Result<Vec<BridgeChannel>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT name, group_id FROM channels ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, group_id)| BridgeChannel {
                name,
                group: GroupId(group_id),
            })
            .collect())
    }

    /// Insert or replace the mapping for `channel`.
    pub async fn insert(&self, channel: &str, group: GroupId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO channels (name, group_id) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET group_id = excluded.group_id
            "#,
        )
        .bind(irc_to_lower(channel))
        .bind(group.0)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, channel: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM channels WHERE name = ?")
            .bind(irc_to_lower(channel))
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
