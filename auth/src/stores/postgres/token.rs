//! `PostgreSQL` token registry.

use super::storage_error;
use crate::providers::{StoreResult, TokenRecord, TokenRegistry};
use crate::state::{SubjectId, TokenKind};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Registered session tokens in the `token_records` table.
#[derive(Clone)]
pub struct PostgresTokenRegistry {
    pool: PgPool,
}

impl PostgresTokenRegistry {
    /// Create a registry over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl TokenRegistry for PostgresTokenRegistry {
    async fn insert(&self, record: TokenRecord) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO token_records (token_hash, subject_id, kind, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (token_hash) DO UPDATE
            SET subject_id = EXCLUDED.subject_id,
                kind = EXCLUDED.kind,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
            ",
        )
        .bind(&record.token_hash)
        .bind(record.subject_id.0)
        .bind(record.kind.as_str())
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn is_registered(
        &self,
        token_hash: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let row = sqlx::query(
            r"
            SELECT 1 FROM token_records
            WHERE token_hash = $1 AND kind = $2 AND expires_at > $3
            ",
        )
        .bind(token_hash)
        .bind(kind.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(row.is_some())
    }

    async fn remove(&self, token_hash: &str) -> StoreResult<bool> {
        let row = sqlx::query("DELETE FROM token_records WHERE token_hash = $1 RETURNING token_hash")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.is_some())
    }

    async fn remove_for_subject(&self, subject: SubjectId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM token_records WHERE subject_id = $1")
            .bind(subject.0)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM token_records WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected())
    }
}
