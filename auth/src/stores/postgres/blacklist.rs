//! `PostgreSQL` blacklist store.

use super::storage_error;
use crate::providers::{BlacklistEntry, BlacklistStore, StoreResult};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

/// Revoked token hashes in the `blacklist_entries` table.
#[derive(Clone)]
pub struct PostgresBlacklistStore {
    pool: PgPool,
}

impl PostgresBlacklistStore {
    /// Create a store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl BlacklistStore for PostgresBlacklistStore {
    async fn insert(&self, entry: BlacklistEntry) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO blacklist_entries (token_hash, expires_at)
            VALUES ($1, $2)
            ON CONFLICT (token_hash) DO UPDATE
            SET expires_at = GREATEST(blacklist_entries.expires_at, EXCLUDED.expires_at)
            ",
        )
        .bind(&entry.token_hash)
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn lookup(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT expires_at FROM blacklist_entries WHERE token_hash = $1 AND expires_at > $2",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(|r| r.try_get("expires_at"))
            .transpose()
            .map_err(storage_error)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM blacklist_entries WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected())
    }
}
