//! Error types for the authentication core.
//!
//! The taxonomy separates four things callers must never confuse:
//!
//! - **Validation**: the input was malformed and storage was never touched
//! - **Storage**: infrastructure failed; retryable, never an "invalid code"
//! - **Unauthorized**: a token was rejected; the specific cause is kept for logs
//! - **Locked**: the account is inside its lockout window

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Why a presented token was rejected.
///
/// Only ever surfaced to logs; external callers see a uniform
/// "please log in again".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// Bad signature, wrong kind, malformed claims, or past `exp`.
    InvalidToken,

    /// The token is on the revocation list.
    Revoked,

    /// The signature is fine but the registry has no live record for it.
    NotRegistered,
}

impl TokenRejection {
    /// Short machine-readable reason, used for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid token",
            Self::Revoked => "revoked",
            Self::NotRegistered => "not registered",
        }
    }
}

impl std::fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage-layer failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer within the configured timeout.
    #[error("Store call `{operation}` timed out after {elapsed:?}")]
    Timeout {
        /// Name of the store operation that timed out
        operation: &'static str,
        /// Configured timeout that elapsed
        elapsed: Duration,
    },

    /// The table backing this store does not exist (yet).
    #[error("Relation missing: {0}")]
    MissingRelation(String),

    /// The store answered with an error.
    #[error("Query failed: {0}")]
    Query(String),

    /// Stored data could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Returns `true` when the store could not be reached at all.
    ///
    /// These are the only errors that justify trying a fallback tier.
    ///
    /// # Examples
    ///
    /// ```
    /// # use keystone_auth::StorageError;
    /// assert!(StorageError::Unavailable("refused".into()).is_unavailable());
    /// assert!(!StorageError::Query("syntax".into()).is_unavailable());
    /// ```
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

/// Comprehensive error taxonomy for the authentication core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Malformed identifier or code; rejected before touching storage.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Durable (and, for OTPs, fallback) storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A presented token was not honored.
    ///
    /// The `Display` form is deliberately generic.
    #[error("Unauthorized")]
    Unauthorized(TokenRejection),

    /// The account is locked out.
    #[error("Account locked, retry after {retry_after:?}")]
    Locked {
        /// When the lock lifts
        locked_until: DateTime<Utc>,
        /// Time remaining until the lock lifts
        retry_after: Duration,
    },

    /// The notifier could not deliver a one-time code.
    #[error("Failed to deliver one-time code: {0}")]
    DeliveryFailed(String),

    /// Token signing or key setup failed.
    #[error("Token signing failed: {0}")]
    Signing(String),

    /// Internal error (should not be exposed to users).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Returns `true` if the caller may retry the same request later.
    ///
    /// # Examples
    ///
    /// ```
    /// # use keystone_auth::{AuthError, StorageError};
    /// assert!(AuthError::from(StorageError::Unavailable("down".into())).is_retryable());
    /// assert!(!AuthError::Validation("bad code".into()).is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::DeliveryFailed(_))
    }

    /// The specific rejection reason, if this is a token rejection.
    #[must_use]
    pub const fn rejection(&self) -> Option<TokenRejection> {
        match self {
            Self::Unauthorized(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Message safe to show an end user.
    ///
    /// Token rejections collapse to one message so the caller cannot tell
    /// which check failed.
    ///
    /// # Examples
    ///
    /// ```
    /// # use keystone_auth::{AuthError, TokenRejection};
    /// let revoked = AuthError::Unauthorized(TokenRejection::Revoked);
    /// let unknown = AuthError::Unauthorized(TokenRejection::NotRegistered);
    /// assert_eq!(revoked.user_message(), unknown.user_message());
    /// ```
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Unauthorized(_) => "Please log in again".to_string(),
            Self::Locked { retry_after, .. } => {
                let minutes = retry_after.as_secs().div_ceil(60).max(1);
                format!("Too many failed attempts. Try again in {minutes} minute(s)")
            }
            Self::Storage(_) | Self::DeliveryFailed(_) => {
                "Service temporarily unavailable, please retry".to_string()
            }
            Self::Signing(_) | Self::InternalError(_) => "Internal error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_display_hides_reason() {
        let err = AuthError::Unauthorized(TokenRejection::Revoked);
        assert_eq!(err.to_string(), "Unauthorized");
        assert_eq!(err.rejection(), Some(TokenRejection::Revoked));
    }

    #[test]
    fn timeout_is_unavailable() {
        let err = StorageError::Timeout {
            operation: "otp.consume",
            elapsed: Duration::from_millis(5),
        };
        assert!(err.is_unavailable());
        assert!(!StorageError::MissingRelation("otp_records".into()).is_unavailable());
    }

    #[test]
    fn locked_message_rounds_up_to_minutes() {
        let err = AuthError::Locked {
            locked_until: Utc::now(),
            retry_after: Duration::from_secs(61),
        };
        assert_eq!(
            err.user_message(),
            "Too many failed attempts. Try again in 2 minute(s)"
        );
    }

    #[test]
    fn storage_error_is_transparent() {
        let err: AuthError = StorageError::Query("boom".into()).into();
        assert_eq!(err.to_string(), "Query failed: boom");
        assert!(err.is_retryable());
    }
}
