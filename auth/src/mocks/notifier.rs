//! Mock notifier for testing.

use crate::error::{AuthError, Result};
use crate::providers::{DeliveryReport, Notifier};
use crate::state::OtpPurpose;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A code handed to the mock notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    /// Recipient.
    pub identifier: String,
    /// The delivered code.
    pub code: String,
    /// Purpose it was issued for.
    pub purpose: OtpPurpose,
    /// Expiry announced to the recipient.
    pub expires_at: DateTime<Utc>,
}

/// Mock notifier.
///
/// Records every code it is asked to deliver. Can be switched to refuse
/// deliveries or to fail as if the provider were unreachable.
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<SentCode>>>,
    refuse: Arc<AtomicBool>,
    unreachable: Arc<AtomicBool>,
}

impl MockNotifier {
    /// Create a new mock notifier that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer with `success == false`.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Fail with [`AuthError::DeliveryFailed`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Every code delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// The most recent code sent to `identifier`.
    #[must_use]
    pub fn last_code_for(&self, identifier: &str) -> Option<String> {
        self.sent
            .lock()
            .ok()?
            .iter()
            .rev()
            .find(|s| s.identifier == identifier)
            .map(|s| s.code.clone())
    }
}

impl Notifier for MockNotifier {
    async fn send(
        &self,
        identifier: &str,
        code: &str,
        purpose: OtpPurpose,
        expires_at: DateTime<Utc>,
    ) -> Result<DeliveryReport> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AuthError::DeliveryFailed("mock provider unreachable".into()));
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Ok(DeliveryReport::refused("mock provider refused recipient"));
        }

        self.sent
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".to_string()))?
            .push(SentCode {
                identifier: identifier.to_string(),
                code: code.to_string(),
                purpose,
                expires_at,
            });
        Ok(DeliveryReport::delivered("mock-delivery"))
    }
}
