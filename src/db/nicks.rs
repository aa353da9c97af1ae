//! Nick repository: the address <-> nick bijection.

use sqlx::SqlitePool;
use tracing::debug;

use super::{StoreError, is_unique_violation};

/// Repository for nick records.
pub struct NickRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> NickRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn nick_for(&self, address: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query_scalar::<_, String>("SELECT nick FROM nicks WHERE address = ?")
            .bind(address)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    /// Case-insensitive reverse lookup.
    pub async fn address_for(&self, nick: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query_scalar::<_, String>("SELECT address FROM nicks WHERE nick = ?")
            .bind(nick)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    /// Set the nick for `address`. Fails with `NickTaken` when another
    /// address already holds it.
    pub async fn upsert(&self, address: &str, nick: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO nicks (address, nick) VALUES (?, ?)
            ON CONFLICT(address) DO UPDATE SET nick = excluded.nick
            "#,
        )
        .bind(address)
        .bind(nick)
        .execute(self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::NickTaken(nick.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Strip trailing underscores left by on-wire renames.
    ///
    /// Records whose stripped form is empty or held by another address
    /// keep their current nick. Returns how many records changed.
    pub async fn normalize_trailing_underscores(&self) -> Result<usize, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"SELECT address, nick FROM nicks WHERE nick LIKE '%\_' ESCAPE '\'"#,
        )
        .fetch_all(self.pool)
        .await?;

        let mut changed = 0;
        for (address, nick) in rows {
            let stripped = nick.trim_end_matches('_');
            if stripped.is_empty() {
                continue;
            }
            match self.upsert(&address, stripped).await {
                Ok(()) => changed += 1,
                Err(StoreError::NickTaken(_)) => {
                    debug!(%address, %nick, "Keeping underscored nick, stripped form is taken");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(changed)
    }
}
