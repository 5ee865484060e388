//! `PostgreSQL` OTP store.

use super::storage_error;
use crate::error::StorageError;
use crate::providers::{ConsumeOutcome, OtpRecord, OtpStore, StoreResult};
use crate::state::OtpPurpose;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// OTP records in the `otp_records` table.
#[derive(Clone)]
pub struct PostgresOtpStore {
    pool: PgPool,
}

impl PostgresOtpStore {
    /// Create a store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> StoreResult<OtpRecord> {
        let purpose: String = row.try_get("purpose").map_err(storage_error)?;
        Ok(OtpRecord {
            identifier: row.try_get("identifier").map_err(storage_error)?,
            code: row.try_get("code").map_err(storage_error)?,
            purpose: purpose.parse().map_err(StorageError::Serialization)?,
            expires_at: row.try_get("expires_at").map_err(storage_error)?,
            consumed: row.try_get("consumed").map_err(storage_error)?,
            created_at: row.try_get("created_at").map_err(storage_error)?,
        })
    }
}

impl OtpStore for PostgresOtpStore {
    async fn insert(&self, record: OtpRecord) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO otp_records (identifier, code, purpose, expires_at, consumed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(&record.identifier)
        .bind(&record.code)
        .bind(record.purpose.as_str())
        .bind(record.expires_at)
        .bind(record.consumed)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn is_code_active(&self, code: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let row = sqlx::query(
            r"
            SELECT EXISTS (
                SELECT 1 FROM otp_records
                WHERE code = $1 AND NOT consumed AND expires_at > $2
            ) AS active
            ",
        )
        .bind(code)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        row.try_get("active").map_err(storage_error)
    }

    async fn consume(
        &self,
        identifier: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> StoreResult<ConsumeOutcome> {
        // Rows locked by a concurrent consumer are skipped, so at most one
        // caller's UPDATE returns the record.
        let consumed = sqlx::query(
            r"
            UPDATE otp_records
            SET consumed = TRUE
            WHERE id = (
                SELECT id FROM otp_records
                WHERE identifier = $1 AND code = $2 AND purpose = $3
                  AND NOT consumed AND expires_at > $4
                ORDER BY created_at DESC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING identifier, code, purpose, expires_at, consumed, created_at
            ",
        )
        .bind(identifier)
        .bind(code)
        .bind(purpose.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        if let Some(row) = consumed {
            return Ok(ConsumeOutcome::Consumed(Self::row_to_record(&row)?));
        }

        let newest = sqlx::query(
            r"
            SELECT consumed, expires_at FROM otp_records
            WHERE identifier = $1 AND code = $2 AND purpose = $3
            ORDER BY created_at DESC
            LIMIT 1
            ",
        )
        .bind(identifier)
        .bind(code)
        .bind(purpose.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        let Some(row) = newest else {
            return Ok(ConsumeOutcome::NotFound);
        };
        let was_consumed: bool = row.try_get("consumed").map_err(storage_error)?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at").map_err(storage_error)?;

        // An unconsumed live row here is held by a concurrent winner
        if was_consumed || expires_at > now {
            Ok(ConsumeOutcome::AlreadyUsed)
        } else {
            Ok(ConsumeOutcome::Expired)
        }
    }

    async fn purge(&self, now: DateTime<Utc>, consumed_before: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM otp_records
            WHERE expires_at <= $1 OR (consumed AND created_at < $2)
            ",
        )
        .bind(now)
        .bind(consumed_before)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected())
    }
}
