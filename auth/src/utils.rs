//! Utility functions for authentication.
//!
//! Input shape checks run before anything touches storage; the timeout
//! wrapper bounds every store call a manager makes.

use crate::error::{AuthError, Result, StorageError};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::time::Duration;

/// Longest identifier accepted (RFC 5321 path limit).
const MAX_IDENTIFIER_LEN: usize = 254;

/// Normalize and validate an OTP identifier (e-mail address or phone number).
///
/// Identifiers are trimmed and lower-cased so `A@X.com ` and `a@x.com`
/// address the same records.
///
/// # Errors
///
/// Returns [`AuthError::Validation`] if the identifier is empty, too long,
/// contains whitespace or control characters, or is neither an e-mail
/// address nor a phone number.
///
/// # Examples
///
/// ```
/// use keystone_auth::utils::normalize_identifier;
///
/// assert_eq!(normalize_identifier("  A@X.com ").unwrap(), "a@x.com");
/// assert_eq!(normalize_identifier("+15551234567").unwrap(), "+15551234567");
/// assert!(normalize_identifier("not an address").is_err());
/// ```
pub fn normalize_identifier(raw: &str) -> Result<String> {
    let identifier = raw.trim().to_lowercase();

    if identifier.is_empty() {
        return Err(AuthError::Validation("Identifier is required".into()));
    }
    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(AuthError::Validation("Identifier is too long".into()));
    }
    if identifier
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(AuthError::Validation(
            "Identifier contains invalid characters".into(),
        ));
    }

    if is_email(&identifier) || is_phone(&identifier) {
        Ok(identifier)
    } else {
        Err(AuthError::Validation(
            "Identifier must be an email address or phone number".into(),
        ))
    }
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn is_phone(s: &str) -> bool {
    let digits = s.strip_prefix('+').unwrap_or(s);
    (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

/// Validate the shape of a presented one-time code.
///
/// # Errors
///
/// Returns [`AuthError::Validation`] unless `code` is exactly `length`
/// ASCII digits.
///
/// # Examples
///
/// ```
/// use keystone_auth::utils::validate_code;
///
/// assert!(validate_code("123456", 6).is_ok());
/// assert!(validate_code("12345", 6).is_err());
/// assert!(validate_code("12345a", 6).is_err());
/// ```
pub fn validate_code(code: &str, length: usize) -> Result<()> {
    if code.len() == length && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AuthError::Validation(format!(
            "Code must be exactly {length} digits"
        )))
    }
}

/// Fingerprint of a token as stored in the registry and the blacklist.
///
/// Raw tokens are never persisted; the hex SHA-256 is the lookup key.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Run a store call under `timeout`.
///
/// An elapsed timeout becomes [`StorageError::Timeout`], so callers can never
/// mistake a slow store for a wrong code.
///
/// # Errors
///
/// Returns the store's own error, or [`StorageError::Timeout`].
pub async fn bounded<T, F>(timeout: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, StorageError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(AuthError::from),
        Err(_) => {
            tracing::warn!(
                operation = operation,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "Store call timed out"
            );
            Err(StorageError::Timeout {
                operation,
                elapsed: timeout,
            }
            .into())
        }
    }
}
