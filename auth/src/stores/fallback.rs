//! Primary/secondary OTP store decorator.
//!
//! Only an error for which [`StorageError::is_unavailable`] holds diverts a
//! call to the secondary tier. Query failures, missing tables and
//! serialization errors surface unchanged: they indicate a bug or a
//! migration problem, and writing around them would hide it.
//!
//! A primary call that does not answer within the primary timeout counts as
//! [`StorageError::Timeout`] and is diverted too. Keep that timeout below the
//! manager's store timeout, otherwise the manager gives up first.
//!
//! A record lives in exactly one tier, so consulting the secondary after the
//! primary answered "no match" can never consume a code twice.

use crate::constants::{FALLBACK_PRIMARY_TIMEOUT_MS, metric_names};
use crate::error::StorageError;
use crate::providers::{ConsumeOutcome, OtpRecord, OtpStore, StoreResult};
use crate::state::OtpPurpose;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

/// OTP store that falls back to a secondary tier when the primary is down.
///
/// # Example
///
/// ```
/// use keystone_auth::mocks::MockOtpStore;
/// use keystone_auth::stores::FallbackOtpStore;
///
/// let primary = MockOtpStore::new();
/// let secondary = MockOtpStore::new();
/// let store = FallbackOtpStore::new(primary, secondary);
/// # let _ = store;
/// ```
#[derive(Debug, Clone)]
pub struct FallbackOtpStore<P, S> {
    primary: P,
    secondary: S,
    primary_timeout: Duration,
}

impl<P, S> FallbackOtpStore<P, S> {
    /// Compose `primary` with `secondary`.
    pub const fn new(primary: P, secondary: S) -> Self {
        Self {
            primary,
            secondary,
            primary_timeout: Duration::from_millis(FALLBACK_PRIMARY_TIMEOUT_MS),
        }
    }

    /// Set how long the primary may take before a call is diverted.
    #[must_use]
    pub const fn with_primary_timeout(mut self, timeout: Duration) -> Self {
        self.primary_timeout = timeout;
        self
    }

    /// The primary tier.
    pub const fn primary(&self) -> &P {
        &self.primary
    }

    /// The secondary tier.
    pub const fn secondary(&self) -> &S {
        &self.secondary
    }
}

impl<P: OtpStore, S> FallbackOtpStore<P, S> {
    async fn on_primary<T, F>(&self, operation: &'static str, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        tokio::time::timeout(self.primary_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(StorageError::Timeout {
                    operation,
                    elapsed: self.primary_timeout,
                })
            })
    }
}

fn divert(operation: &'static str, error: &StorageError) {
    tracing::warn!(
        operation = operation,
        error = %error,
        "Primary OTP store unavailable, using fallback store"
    );
    metrics::counter!(metric_names::OTP_FALLBACK, "operation" => operation).increment(1);
}

impl<P, S> OtpStore for FallbackOtpStore<P, S>
where
    P: OtpStore,
    S: OtpStore,
{
    async fn insert(&self, record: OtpRecord) -> StoreResult<()> {
        match self.on_primary("otp.insert", self.primary.insert(record.clone())).await {
            Err(e) if e.is_unavailable() => {
                divert("insert", &e);
                self.secondary.insert(record).await
            }
            other => other,
        }
    }

    async fn is_code_active(&self, code: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        match self
            .on_primary("otp.is_code_active", self.primary.is_code_active(code, now))
            .await
        {
            Ok(true) => Ok(true),
            Ok(false) => self.secondary.is_code_active(code, now).await,
            Err(e) if e.is_unavailable() => {
                divert("is_code_active", &e);
                self.secondary.is_code_active(code, now).await
            }
            Err(e) => Err(e),
        }
    }

    async fn consume(
        &self,
        identifier: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> StoreResult<ConsumeOutcome> {
        let primary = match self
            .on_primary(
                "otp.consume",
                self.primary.consume(identifier, code, purpose, now),
            )
            .await
        {
            Ok(ConsumeOutcome::Consumed(record)) => return Ok(ConsumeOutcome::Consumed(record)),
            Ok(outcome) => outcome,
            Err(e) if e.is_unavailable() => {
                divert("consume", &e);
                return self.secondary.consume(identifier, code, purpose, now).await;
            }
            Err(e) => return Err(e),
        };

        // Codes written during an earlier outage only exist in the secondary
        match self.secondary.consume(identifier, code, purpose, now).await {
            Ok(ConsumeOutcome::NotFound) => Ok(primary),
            Ok(secondary) if primary == ConsumeOutcome::NotFound => Ok(secondary),
            Ok(ConsumeOutcome::Consumed(record)) => Ok(ConsumeOutcome::Consumed(record)),
            Ok(_) => Ok(primary),
            // No definitive primary answer: the code may live only in the
            // unreadable tier
            Err(e) if primary == ConsumeOutcome::NotFound => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Fallback OTP store unreadable, using primary answer");
                Ok(primary)
            }
        }
    }

    async fn purge(&self, now: DateTime<Utc>, consumed_before: DateTime<Utc>) -> StoreResult<u64> {
        let secondary = match self.secondary.purge(now, consumed_before).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to purge fallback OTP store");
                0
            }
        };
        let primary = self
            .on_primary("otp.purge", self.primary.purge(now, consumed_before))
            .await?;
        Ok(primary + secondary)
    }
}
