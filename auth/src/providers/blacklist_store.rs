//! Durable blacklist trait.
//!
//! The durable tier of the revocation store and its source of truth. The
//! in-process cache in [`crate::revocation`] only mirrors it.

use super::StoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An explicitly revoked token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    /// Hex SHA-256 of the compact token.
    pub token_hash: String,

    /// The token's own expiry; the entry is meaningless afterwards.
    pub expires_at: DateTime<Utc>,
}

/// Durable blacklist.
pub trait BlacklistStore: Send + Sync {
    /// Insert an entry. Re-inserting the same hash keeps the later expiry.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn insert(
        &self,
        entry: BlacklistEntry,
    ) -> impl std::future::Future<Output = StoreResult<()>> + Send;

    /// Expiry of the active entry for this hash, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn lookup(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = StoreResult<Option<DateTime<Utc>>>> + Send;

    /// Delete entries expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or the table is missing.
    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = StoreResult<u64>> + Send;
}
