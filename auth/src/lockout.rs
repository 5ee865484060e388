//! Account lockout policy.
//!
//! Wrong one-time codes and wrong passwords feed the same counter. The call
//! that reaches the threshold locks the account; further failures inside the
//! window count but never extend it. Locks lift on their own: an elapsed
//! `locked_until` reads as unlocked, and the next failure starts over at 1.

use crate::config::LockoutConfig;
use crate::constants::{STORE_TIMEOUT_MS, metric_names};
use crate::error::{AuthError, Result};
use crate::providers::LockoutStore;
use crate::state::{LockoutState, SubjectId};
use crate::utils::bounded;
use keystone_core::environment::Clock;
use std::time::Duration;

/// Lockout policy over a [`LockoutStore`].
#[derive(Debug, Clone)]
pub struct LockoutPolicy<L, C> {
    store: L,
    clock: C,
    config: LockoutConfig,
    store_timeout: Duration,
}

impl<L, C> LockoutPolicy<L, C>
where
    L: LockoutStore,
    C: Clock,
{
    /// Create a policy with the default threshold and lock duration.
    #[must_use]
    pub fn new(store: L, clock: C) -> Self {
        Self {
            store,
            clock,
            config: LockoutConfig::default(),
            store_timeout: Duration::from_millis(STORE_TIMEOUT_MS),
        }
    }

    /// Replace the lockout settings.
    #[must_use]
    pub fn with_config(mut self, config: LockoutConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the timeout applied to every store call.
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Record one failed credential check.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the store failed or timed out.
    pub async fn record_failure(&self, account: SubjectId) -> Result<LockoutState> {
        let now = self.clock.now();
        let state = bounded(
            self.store_timeout,
            "lockout.record_failure",
            self.store.record_failure(
                account,
                now,
                self.config.threshold,
                self.config.lock_duration,
            ),
        )
        .await?;

        if state.failed_attempts == self.config.threshold && state.is_locked_at(now) {
            metrics::counter!(metric_names::LOCKOUT_LOCKED).increment(1);
            tracing::warn!(
                account = %account,
                failed_attempts = state.failed_attempts,
                locked_until = ?state.locked_until,
                "Account locked after repeated failures"
            );
        } else {
            tracing::info!(
                account = %account,
                failed_attempts = state.failed_attempts,
                "Recorded failed credential check"
            );
        }

        Ok(state)
    }

    /// Record a successful credential check: zero the counter, clear the lock.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the store failed or timed out.
    pub async fn record_success(&self, account: SubjectId) -> Result<()> {
        bounded(self.store_timeout, "lockout.reset", self.store.reset(account)).await?;
        tracing::debug!(account = %account, "Lockout counter reset");
        Ok(())
    }

    /// Is the account locked right now?
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the store failed or timed out.
    pub async fn is_locked(&self, account: SubjectId) -> Result<bool> {
        Ok(self.load(account).await?.is_locked_at(self.clock.now()))
    }

    /// Fail with [`AuthError::Locked`] if the account is locked.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Locked`] with the remaining wait time
    /// - [`AuthError::Storage`] if the store failed or timed out
    pub async fn ensure_unlocked(&self, account: SubjectId) -> Result<()> {
        let now = self.clock.now();
        let state = self.load(account).await?;

        match state.locked_until {
            Some(locked_until) if locked_until > now => Err(AuthError::Locked {
                locked_until,
                retry_after: (locked_until - now).to_std().unwrap_or_default(),
            }),
            _ => Ok(()),
        }
    }

    async fn load(&self, account: SubjectId) -> Result<LockoutState> {
        bounded(self.store_timeout, "lockout.load", self.store.load(account)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockLockoutStore;
    use chrono::Duration as ChronoDuration;
    use keystone_testing::ManualClock;

    const ACCOUNT: SubjectId = SubjectId(7);

    fn policy() -> (LockoutPolicy<MockLockoutStore, ManualClock>, ManualClock) {
        let clock = ManualClock::default();
        let policy = LockoutPolicy::new(MockLockoutStore::with_accounts([ACCOUNT]), clock.clone());
        (policy, clock)
    }

    #[tokio::test]
    async fn fifth_failure_locks_for_thirty_minutes() {
        let (policy, clock) = policy();
        for _ in 0..4 {
            policy.record_failure(ACCOUNT).await.unwrap();
            assert!(!policy.is_locked(ACCOUNT).await.unwrap());
        }

        let state = policy.record_failure(ACCOUNT).await.unwrap();
        assert_eq!(state.failed_attempts, 5);
        assert_eq!(state.locked_until, Some(clock.now() + ChronoDuration::minutes(30)));
        assert!(policy.is_locked(ACCOUNT).await.unwrap());
    }

    #[tokio::test]
    async fn sixth_failure_does_not_extend_lock() {
        let (policy, clock) = policy();
        for _ in 0..5 {
            policy.record_failure(ACCOUNT).await.unwrap();
        }
        let locked_until = clock.now() + ChronoDuration::minutes(30);

        clock.advance(ChronoDuration::minutes(10));
        let state = policy.record_failure(ACCOUNT).await.unwrap();
        assert_eq!(state.failed_attempts, 6);
        assert_eq!(state.locked_until, Some(locked_until));
    }

    #[tokio::test]
    async fn lock_clears_on_its_own() {
        let (policy, clock) = policy();
        for _ in 0..5 {
            policy.record_failure(ACCOUNT).await.unwrap();
        }

        clock.advance(ChronoDuration::minutes(30) + ChronoDuration::seconds(1));
        assert!(!policy.is_locked(ACCOUNT).await.unwrap());
        assert!(policy.ensure_unlocked(ACCOUNT).await.is_ok());

        let state = policy.record_failure(ACCOUNT).await.unwrap();
        assert_eq!(state.failed_attempts, 1);
        assert!(state.locked_until.is_none());
    }

    #[tokio::test]
    async fn ensure_unlocked_reports_wait_time() {
        let (policy, clock) = policy();
        for _ in 0..5 {
            policy.record_failure(ACCOUNT).await.unwrap();
        }
        clock.advance(ChronoDuration::minutes(20));

        let err = policy.ensure_unlocked(ACCOUNT).await.unwrap_err();
        match err {
            AuthError::Locked { retry_after, .. } => {
                assert_eq!(retry_after, Duration::from_secs(10 * 60));
            }
            other => panic!("expected Locked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_resets_counter() {
        let (policy, _) = policy();
        for _ in 0..4 {
            policy.record_failure(ACCOUNT).await.unwrap();
        }
        policy.record_success(ACCOUNT).await.unwrap();

        let state = policy.record_failure(ACCOUNT).await.unwrap();
        assert_eq!(state.failed_attempts, 1);
    }

    #[tokio::test]
    async fn custom_threshold() {
        let clock = ManualClock::default();
        let policy = LockoutPolicy::new(MockLockoutStore::with_accounts([ACCOUNT]), clock)
            .with_config(LockoutConfig::default().with_threshold(2));

        policy.record_failure(ACCOUNT).await.unwrap();
        policy.record_failure(ACCOUNT).await.unwrap();
        assert!(policy.is_locked(ACCOUNT).await.unwrap());
    }
}
