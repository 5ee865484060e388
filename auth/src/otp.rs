//! One-time passcode manager.
//!
//! Generates numeric codes, stores them with an expiry, and verifies them
//! exactly once. Storage goes through any [`OtpStore`]; wrap the durable
//! store in [`crate::stores::FallbackOtpStore`] to get the ephemeral tier.
//!
//! # Flow
//!
//! ```text
//! issue(identifier, purpose)
//!   ├─ generate()          random code, best-effort unique among active codes
//!   ├─ store()             record with expires_at = now + ttl
//!   └─ notifier.send()     out-of-band delivery
//!
//! verify(identifier, code, purpose)
//!   └─ store.consume()     atomic: newest active match → consumed
//! ```

use crate::config::OtpConfig;
use crate::constants::{STORE_TIMEOUT_MS, metric_names};
use crate::error::{AuthError, Result};
use crate::providers::{ConsumeOutcome, Notifier, OtpRecord, OtpStore};
use crate::state::OtpPurpose;
use crate::utils::{bounded, normalize_identifier, validate_code};
use chrono::{DateTime, Utc};
use keystone_core::environment::Clock;
use rand::Rng;
use std::time::Duration;

/// Result of presenting a one-time code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpVerdict {
    /// The code matched and has now been consumed.
    Valid,

    /// The most recent matching code was already consumed.
    AlreadyUsed,

    /// The most recent matching code expired before being used.
    Expired,

    /// Nothing matches the identifier, code and purpose.
    Invalid,
}

impl OtpVerdict {
    /// Did the code verify?
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Reason string for the caller.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::AlreadyUsed => "already used",
            Self::Expired => "expired",
            Self::Invalid => "invalid",
        }
    }
}

impl From<ConsumeOutcome> for OtpVerdict {
    fn from(outcome: ConsumeOutcome) -> Self {
        match outcome {
            ConsumeOutcome::Consumed(_) => Self::Valid,
            ConsumeOutcome::AlreadyUsed => Self::AlreadyUsed,
            ConsumeOutcome::Expired => Self::Expired,
            ConsumeOutcome::NotFound => Self::Invalid,
        }
    }
}

/// A code that was stored and handed to the notifier.
///
/// The code itself is not included; it only travels out-of-band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedOtp {
    /// Normalized identifier the code was sent to.
    pub identifier: String,

    /// Purpose the code is valid for.
    pub purpose: OtpPurpose,

    /// When the code stops verifying.
    pub expires_at: DateTime<Utc>,
}

/// One-time passcode manager.
#[derive(Debug, Clone)]
pub struct OtpManager<S, N, C> {
    store: S,
    notifier: N,
    clock: C,
    config: OtpConfig,
    store_timeout: Duration,
}

impl<S, N, C> OtpManager<S, N, C>
where
    S: OtpStore,
    N: Notifier,
    C: Clock,
{
    /// Create a manager with default settings.
    #[must_use]
    pub fn new(store: S, notifier: N, clock: C) -> Self {
        Self {
            store,
            notifier,
            clock,
            config: OtpConfig::default(),
            store_timeout: Duration::from_millis(STORE_TIMEOUT_MS),
        }
    }

    /// Replace the OTP settings.
    #[must_use]
    pub fn with_config(mut self, config: OtpConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the timeout applied to every store call.
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// The underlying store.
    pub const fn otp_store(&self) -> &S {
        &self.store
    }

    /// The clock codes are stamped with.
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Generate a code that no active record currently holds.
    ///
    /// Uniqueness is best effort: if the store cannot be queried the first
    /// candidate is returned unchecked, and if every attempt collides the
    /// last candidate is returned anyway.
    pub async fn generate(&self) -> String {
        let now = self.clock.now();
        let attempts = self.config.generation_attempts.max(1);
        let mut candidate = random_code(self.config.code_length);

        for attempt in 1..=attempts {
            match bounded(
                self.store_timeout,
                "otp.is_code_active",
                self.store.is_code_active(&candidate, now),
            )
            .await
            {
                Ok(false) => return candidate,
                Ok(true) => {
                    tracing::debug!(attempt, "Generated code collides with an active code");
                    if attempt < attempts {
                        candidate = random_code(self.config.code_length);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Could not check code uniqueness, using unverified code");
                    return candidate;
                }
            }
        }

        tracing::warn!(attempts, "Every generated code collided, returning last candidate");
        candidate
    }

    /// Store `code` for `identifier` and `purpose`.
    ///
    /// Earlier unconsumed codes for the same identifier stay valid.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] if the identifier or code is malformed
    /// - [`AuthError::Storage`] if no store tier accepted the write
    pub async fn store(
        &self,
        identifier: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<DateTime<Utc>> {
        let identifier = normalize_identifier(identifier)?;
        validate_code(code, self.config.code_length)?;

        let record = OtpRecord::new(identifier, code, purpose, self.clock.now(), self.config.ttl);
        let expires_at = record.expires_at;

        bounded(self.store_timeout, "otp.insert", self.store.insert(record)).await?;

        tracing::debug!(purpose = %purpose, expires_at = %expires_at, "Stored one-time code");
        Ok(expires_at)
    }

    /// Verify a presented code and consume it.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] if the identifier or code is malformed
    /// - [`AuthError::Storage`] if the store failed or timed out; this is
    ///   never reported as [`OtpVerdict::Invalid`]
    pub async fn verify(
        &self,
        identifier: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<OtpVerdict> {
        let identifier = normalize_identifier(identifier)?;
        validate_code(code, self.config.code_length)?;

        let outcome = bounded(
            self.store_timeout,
            "otp.consume",
            self.store
                .consume(&identifier, code, purpose, self.clock.now()),
        )
        .await?;

        let verdict = OtpVerdict::from(outcome);
        metrics::counter!(metric_names::OTP_VERIFIED, "outcome" => verdict.reason()).increment(1);
        tracing::info!(
            identifier = %identifier,
            purpose = %purpose,
            outcome = verdict.reason(),
            "One-time code verification"
        );
        Ok(verdict)
    }

    /// Generate, store and deliver a code.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Validation`] if the identifier is malformed
    /// - [`AuthError::Storage`] if the code could not be stored
    /// - [`AuthError::DeliveryFailed`] if the notifier failed or refused; the
    ///   stored record is left to expire
    pub async fn issue(&self, identifier: &str, purpose: OtpPurpose) -> Result<IssuedOtp> {
        let identifier = normalize_identifier(identifier)?;
        let code = self.generate().await;
        let expires_at = self.store(&identifier, &code, purpose).await?;

        let report = self
            .notifier
            .send(&identifier, &code, purpose, expires_at)
            .await?;
        if !report.success {
            tracing::warn!(
                identifier = %identifier,
                purpose = %purpose,
                message = %report.message,
                "Notifier refused one-time code"
            );
            return Err(AuthError::DeliveryFailed(report.message));
        }

        metrics::counter!(metric_names::OTP_ISSUED, "purpose" => purpose.as_str()).increment(1);
        tracing::info!(identifier = %identifier, purpose = %purpose, "Issued one-time code");

        Ok(IssuedOtp {
            identifier,
            purpose,
            expires_at,
        })
    }
}

fn random_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
