//! Authentication constants.
//!
//! Default values used by the configuration builders, and the metric names
//! emitted by the managers.

/// One-time passcode defaults.
pub mod otp {
    /// Number of digits in a generated code.
    pub const CODE_LENGTH: usize = 6;

    /// Code lifetime in minutes.
    pub const TTL_MINUTES: i64 = 10;

    /// Attempts at finding a code not already active for anyone.
    pub const GENERATION_ATTEMPTS: u32 = 10;

    /// How long consumed codes are kept before the sweeper removes them.
    pub const CONSUMED_RETENTION_HOURS: i64 = 24;
}

/// Session token defaults.
pub mod tokens {
    /// Access token lifetime in days.
    pub const ACCESS_TTL_DAYS: i64 = 7;

    /// Refresh token lifetime in days.
    pub const REFRESH_TTL_DAYS: i64 = 90;

    /// Default `iss` claim.
    pub const ISSUER: &str = "keystone";

    /// Default `aud` claim.
    pub const AUDIENCE: &str = "keystone-api";
}

/// Lockout defaults.
pub mod lockout {
    /// Consecutive failures that lock an account.
    pub const THRESHOLD: u32 = 5;

    /// Lock duration in minutes.
    pub const LOCK_MINUTES: i64 = 30;
}

/// Revocation cache defaults.
pub mod revocation {
    /// Maximum number of entries held in the in-process cache.
    pub const CACHE_CAPACITY: usize = 10_000;
}

/// Sweeper defaults.
pub mod sweeper {
    /// Interval between OTP and token sweeps, in seconds.
    pub const RECORDS_INTERVAL_SECS: u64 = 60 * 60;

    /// Interval between blacklist sweeps, in seconds.
    pub const BLACKLIST_INTERVAL_SECS: u64 = 6 * 60 * 60;
}

/// Timeout applied to every store call, in milliseconds.
pub const STORE_TIMEOUT_MS: u64 = 5_000;

/// Time the fallback decorator gives its primary tier before diverting, in
/// milliseconds. Must stay below [`STORE_TIMEOUT_MS`] or the manager's
/// timeout fires before the secondary is tried.
pub const FALLBACK_PRIMARY_TIMEOUT_MS: u64 = 2_000;

/// Metric names.
pub mod metric_names {
    /// One-time codes issued (generated, stored and delivered).
    pub const OTP_ISSUED: &str = "auth.otp.issued";

    /// OTP verifications, labelled by `outcome`.
    pub const OTP_VERIFIED: &str = "auth.otp.verified";

    /// Writes diverted to the fallback OTP store.
    pub const OTP_FALLBACK: &str = "auth.otp.fallback";

    /// Token pairs issued.
    pub const TOKENS_ISSUED: &str = "auth.tokens.issued";

    /// Token verifications rejected, labelled by `reason`.
    pub const TOKENS_REJECTED: &str = "auth.tokens.rejected";

    /// Tokens revoked.
    pub const TOKENS_REVOKED: &str = "auth.tokens.revoked";

    /// Accounts that crossed the lockout threshold.
    pub const LOCKOUT_LOCKED: &str = "auth.lockout.locked";

    /// Rows deleted by the sweeper, labelled by `table`.
    pub const SWEEPER_DELETED: &str = "auth.sweeper.deleted";
}
