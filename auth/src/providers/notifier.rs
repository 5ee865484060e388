//! Notifier trait.

use crate::error::Result;
use crate::state::OtpPurpose;
use chrono::{DateTime, Utc};

/// Outcome reported by a notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Whether the message was accepted for delivery.
    pub success: bool,

    /// Provider message (accepted id, or why it was refused).
    pub message: String,
}

impl DeliveryReport {
    /// Successful delivery.
    #[must_use]
    pub fn delivered(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Refused delivery.
    #[must_use]
    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Out-of-band delivery of one-time codes (e-mail, SMS, ...).
///
/// The core invokes it but does not own it. A refused or failed delivery
/// fails the whole "request a code" operation.
pub trait Notifier: Send + Sync {
    /// Deliver `code` to `identifier`.
    ///
    /// # Errors
    ///
    /// Returns error if the provider could not be reached at all; a
    /// provider that answers with a refusal returns `Ok` with
    /// `success == false`.
    fn send(
        &self,
        identifier: &str,
        code: &str,
        purpose: OtpPurpose,
        expires_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<DeliveryReport>> + Send;
}
