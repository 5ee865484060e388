//! Lockout state store trait.
//!
//! Lockout columns live on the account row; this trait is the only way the
//! core touches them.

use super::StoreResult;
use crate::state::{LockoutState, SubjectId};
use chrono::{DateTime, Duration, Utc};

/// Persistence for per-account lockout state.
///
/// Unknown accounts read as [`LockoutState::default`] and writes to them are
/// no-ops, so the store never reveals whether an account exists.
pub trait LockoutStore: Send + Sync {
    /// Current state of `account`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn load(
        &self,
        account: SubjectId,
    ) -> impl std::future::Future<Output = StoreResult<LockoutState>> + Send;

    /// Apply one failure atomically and return the resulting state.
    ///
    /// Must implement exactly [`LockoutState::after_failure`] as a single
    /// conditional update.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn record_failure(
        &self,
        account: SubjectId,
        now: DateTime<Utc>,
        threshold: u32,
        lock_for: Duration,
    ) -> impl std::future::Future<Output = StoreResult<LockoutState>> + Send;

    /// Zero the counter and clear the lock.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn reset(
        &self,
        account: SubjectId,
    ) -> impl std::future::Future<Output = StoreResult<()>> + Send;
}
