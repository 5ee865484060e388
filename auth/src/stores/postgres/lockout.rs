//! `PostgreSQL` lockout store.
//!
//! Lockout state is two columns on `accounts`. A failure is applied with one
//! conditional `UPDATE`, mirroring [`LockoutState::after_failure`]: an
//! elapsed lock restarts the count, only the threshold-crossing update sets
//! `locked_until`, and an active lock is never extended.

use super::storage_error;
use crate::providers::{LockoutStore, StoreResult};
use crate::state::{LockoutState, SubjectId};
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// Lockout columns on the `accounts` table.
#[derive(Clone)]
pub struct PostgresLockoutStore {
    pool: PgPool,
}

impl PostgresLockoutStore {
    /// Create a store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_state(row: &PgRow) -> StoreResult<LockoutState> {
        let attempts: i32 = row.try_get("failed_attempts").map_err(storage_error)?;
        Ok(LockoutState {
            failed_attempts: u32::try_from(attempts).unwrap_or(0),
            locked_until: row.try_get("locked_until").map_err(storage_error)?,
        })
    }
}

impl LockoutStore for PostgresLockoutStore {
    async fn load(&self, account: SubjectId) -> StoreResult<LockoutState> {
        let row = sqlx::query("SELECT failed_attempts, locked_until FROM accounts WHERE id = $1")
            .bind(account.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref()
            .map_or_else(|| Ok(LockoutState::default()), Self::row_to_state)
    }

    async fn record_failure(
        &self,
        account: SubjectId,
        now: DateTime<Utc>,
        threshold: u32,
        lock_for: Duration,
    ) -> StoreResult<LockoutState> {
        let threshold = i32::try_from(threshold).unwrap_or(i32::MAX);
        let lock_until = now + lock_for;

        let row = sqlx::query(
            r"
            UPDATE accounts
            SET failed_attempts = CASE
                    WHEN locked_until IS NOT NULL AND locked_until <= $2 THEN 1
                    ELSE failed_attempts + 1
                END,
                locked_until = CASE
                    WHEN locked_until IS NOT NULL AND locked_until <= $2 THEN
                        CASE WHEN $3 <= 1 THEN $4 ELSE NULL END
                    WHEN locked_until IS NULL AND failed_attempts + 1 >= $3 THEN $4
                    ELSE locked_until
                END
            WHERE id = $1
            RETURNING failed_attempts, locked_until
            ",
        )
        .bind(account.0)
        .bind(now)
        .bind(threshold)
        .bind(lock_until)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.as_ref()
            .map_or_else(|| Ok(LockoutState::default()), Self::row_to_state)
    }

    async fn reset(&self, account: SubjectId) -> StoreResult<()> {
        sqlx::query("UPDATE accounts SET failed_attempts = 0, locked_until = NULL WHERE id = $1")
            .bind(account.0)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
