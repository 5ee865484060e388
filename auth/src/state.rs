//! Shared domain types.
//!
//! Identifiers, OTP purposes, token kinds and the lockout state carried on
//! the account. Record types live next to the store trait that owns them
//! (see [`crate::providers`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Account primary key; the `sub` claim of every session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(pub i64);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SubjectId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// OTP Purpose
// ═══════════════════════════════════════════════════════════════════════

/// What a one-time code was issued for.
///
/// A code is only ever valid for the purpose it was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    /// Proving ownership of a contact channel during signup.
    Signup,

    /// Passwordless login.
    Login,

    /// Authorizing a password reset.
    PasswordReset,
}

impl OtpPurpose {
    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Signup => "signup",
            Self::Login => "login",
            Self::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signup" => Ok(Self::Signup),
            "login" => Ok(Self::Login),
            "password_reset" | "password-reset" => Ok(Self::PasswordReset),
            other => Err(format!("unknown OTP purpose: {other}")),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Token Kind
// ═══════════════════════════════════════════════════════════════════════

/// Access or refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Bearer credential authorizing API calls.
    Access,

    /// Credential used only to mint a new pair.
    Refresh,
}

impl TokenKind {
    /// Database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(Self::Access),
            "refresh" => Ok(Self::Refresh),
            other => Err(format!("unknown token kind: {other}")),
        }
    }
}

/// Freshly minted access/refresh pair.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Access token (compact JWS).
    pub access_token: String,

    /// Refresh token (compact JWS).
    pub refresh_token: String,

    /// Access token expiry.
    pub access_expires_at: DateTime<Utc>,

    /// Refresh token expiry.
    pub refresh_expires_at: DateTime<Utc>,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Lockout
// ═══════════════════════════════════════════════════════════════════════

/// Lockout columns carried on the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LockoutState {
    /// Consecutive failed credential checks.
    pub failed_attempts: u32,

    /// End of the current lock, if one was ever set and not yet reset.
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutState {
    /// Is the account locked at `now`?
    ///
    /// An elapsed `locked_until` counts as unlocked even though the counter
    /// has not been reset yet.
    #[must_use]
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    /// State after one more failure at `now`.
    ///
    /// - a failure after an elapsed lock restarts the count at 1
    /// - only the call that reaches `threshold` sets `locked_until`
    /// - failures inside the lock window never extend it
    #[must_use]
    pub fn after_failure(
        self,
        now: DateTime<Utc>,
        threshold: u32,
        lock_for: chrono::Duration,
    ) -> Self {
        let (attempts, locked_until) = match self.locked_until {
            Some(until) if until <= now => (1, None),
            other => (self.failed_attempts.saturating_add(1), other),
        };

        let locked_until = match locked_until {
            None if attempts >= threshold => Some(now + lock_for),
            other => other,
        };

        Self {
            failed_attempts: attempts,
            locked_until,
        }
    }
}
