//! `PostgreSQL` storage implementations.
//!
//! This module provides durable storage using `PostgreSQL` for:
//! - One-time passcode records
//! - The session token registry
//! - The durable blacklist
//! - Lockout columns on `accounts`
//!
//! All stores share one `PgPool`. Every state transition is a single
//! statement (`UPDATE ... RETURNING`, `DELETE ... RETURNING`), so concurrent
//! workers need no further coordination.
//!
//! # Example
//!
//! ```no_run
//! use keystone_auth::stores::PostgresStores;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stores = PostgresStores::connect("postgresql://localhost/keystone").await?;
//! stores.migrate().await?;
//! let otp = stores.otp();
//! # let _ = otp;
//! # Ok(())
//! # }
//! ```

pub mod blacklist;
pub mod lockout;
pub mod otp;
pub mod token;

// Re-exports
pub use blacklist::PostgresBlacklistStore;
pub use lockout::PostgresLockoutStore;
pub use otp::PostgresOtpStore;
pub use token::PostgresTokenRegistry;

use crate::error::StorageError;
use crate::providers::StoreResult;
use sqlx::PgPool;

/// `PostgreSQL` error code for `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

/// Factory for the `PostgreSQL` stores over one connection pool.
#[derive(Clone)]
pub struct PostgresStores {
    /// `PostgreSQL` connection pool.
    pool: PgPool,
}

impl PostgresStores {
    /// Wrap an existing pool.
    ///
    /// # Arguments
    ///
    /// * `pool` - `PostgreSQL` connection pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the database cannot be reached.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPool::connect(database_url).await.map_err(storage_error)?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Query(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// OTP record store.
    #[must_use]
    pub fn otp(&self) -> PostgresOtpStore {
        PostgresOtpStore::new(self.pool.clone())
    }

    /// Session token registry.
    #[must_use]
    pub fn tokens(&self) -> PostgresTokenRegistry {
        PostgresTokenRegistry::new(self.pool.clone())
    }

    /// Durable blacklist.
    #[must_use]
    pub fn blacklist(&self) -> PostgresBlacklistStore {
        PostgresBlacklistStore::new(self.pool.clone())
    }

    /// Lockout columns on `accounts`.
    #[must_use]
    pub fn lockout(&self) -> PostgresLockoutStore {
        PostgresLockoutStore::new(self.pool.clone())
    }
}

/// Classify a `sqlx` error.
///
/// Connection-level failures become [`StorageError::Unavailable`] (and may
/// trigger the OTP fallback); a missing table becomes
/// [`StorageError::MissingRelation`].
pub(crate) fn storage_error(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNDEFINED_TABLE) => {
            StorageError::MissingRelation(db.message().to_string())
        }
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StorageError::Unavailable(e.to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StorageError::Serialization(e.to_string())
        }
        _ => StorageError::Query(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_failures_are_unavailable() {
        assert!(storage_error(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(storage_error(sqlx::Error::PoolClosed).is_unavailable());
    }

    #[test]
    fn missing_rows_are_query_errors() {
        assert!(matches!(
            storage_error(sqlx::Error::RowNotFound),
            StorageError::Query(_)
        ));
    }
}
