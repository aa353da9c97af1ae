//! Private chat repository: (local address, remote nick) <-> group.

use sqlx::SqlitePool;

use super::StoreError;
use crate::platform::GroupId;
use crate::store::PrivateBridge;

/// Repository for private chat mappings.
pub struct PrivateChatRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PrivateChatRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, address: &str, nick: &str) -> Result<Option<GroupId>, StoreError> {
        let row = sqlx::query_scalar::<_, i64>(
            "SELECT group_id FROM private_chats WHERE address = ? AND nick = ?",
        )
        .bind(address)
        .bind(nick)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(GroupId))
    }

    pub async fn find_by_group(&self, group: GroupId) -> Result<Option<PrivateBridge>, StoreError> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT address, nick FROM private_chats WHERE group_id = ?",
        )
        .bind(group.0)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(address, nick)| PrivateBridge {
            address,
            nick,
            group,
        }))
    }

    pub async fn insert(&self, address: &str, nick: &str, group: GroupId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO private_chats (address, nick, group_id) VALUES (?, ?, ?)
            ON CONFLICT(address, nick) DO UPDATE SET group_id = excluded.group_id
            "#,
        )
        .bind(address)
        .bind(nick)
        .bind(group.0)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, group: GroupId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM private_chats WHERE group_id = ?")
            .bind(group.0)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
