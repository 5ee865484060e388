//! Authentication configuration.
//!
//! This module provides configuration structures for every component of the
//! core. Values should be provided by the application, not hardcoded; the
//! defaults mirror [`crate::constants`].

use crate::constants;
use chrono::Duration;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading / validation error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("Environment variable not set: {0}")]
    EnvVarNotSet(String),

    /// An environment variable could not be parsed.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// Variable name
        var: String,
        /// What was wrong with it
        reason: String,
    },

    /// The assembled configuration is inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One-time passcode configuration.
#[derive(Debug, Clone)]
pub struct OtpConfig {
    /// Number of digits per code.
    ///
    /// Default: 6
    pub code_length: usize,

    /// Code lifetime.
    ///
    /// Default: 10 minutes
    pub ttl: Duration,

    /// Attempts at generating a code that is not already active.
    ///
    /// Default: 10
    pub generation_attempts: u32,

    /// Location of the process-local fallback file.
    pub fallback_path: PathBuf,
}

impl OtpConfig {
    /// Set code length.
    #[must_use]
    pub const fn with_code_length(mut self, digits: usize) -> Self {
        self.code_length = digits;
        self
    }

    /// Set code lifetime.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the number of uniqueness attempts.
    #[must_use]
    pub const fn with_generation_attempts(mut self, attempts: u32) -> Self {
        self.generation_attempts = attempts;
        self
    }

    /// Set the fallback file path.
    #[must_use]
    pub fn with_fallback_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fallback_path = path.into();
        self
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_length: constants::otp::CODE_LENGTH,
            ttl: Duration::minutes(constants::otp::TTL_MINUTES),
            generation_attempts: constants::otp::GENERATION_ATTEMPTS,
            fallback_path: std::env::temp_dir().join("keystone-otp-fallback.json"),
        }
    }
}

/// Session token configuration.
///
/// Access and refresh tokens are signed with distinct secrets, so a token
/// of one kind never verifies as the other.
#[derive(Clone)]
pub struct TokenConfig {
    /// HMAC secret for access tokens.
    pub access_secret: String,

    /// HMAC secret for refresh tokens.
    pub refresh_secret: String,

    /// `iss` claim.
    pub issuer: String,

    /// `aud` claim.
    pub audience: String,

    /// Access token lifetime.
    ///
    /// Default: 7 days
    pub access_ttl: Duration,

    /// Refresh token lifetime.
    ///
    /// Default: 90 days
    pub refresh_ttl: Duration,

    /// Consume the refresh record before minting on rotation, so only one
    /// of several concurrent rotations succeeds.
    ///
    /// Default: true
    pub single_use_refresh: bool,
}

impl TokenConfig {
    /// Create token configuration from the two signing secrets.
    #[must_use]
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            issuer: constants::tokens::ISSUER.to_string(),
            audience: constants::tokens::AUDIENCE.to_string(),
            access_ttl: Duration::days(constants::tokens::ACCESS_TTL_DAYS),
            refresh_ttl: Duration::days(constants::tokens::REFRESH_TTL_DAYS),
            single_use_refresh: true,
        }
    }

    /// Set issuer and audience.
    #[must_use]
    pub fn with_binding(mut self, issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self.audience = audience.into();
        self
    }

    /// Set access token lifetime.
    #[must_use]
    pub const fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    /// Set refresh token lifetime.
    #[must_use]
    pub const fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    /// Enable or disable single-use refresh rotation.
    #[must_use]
    pub const fn with_single_use_refresh(mut self, enabled: bool) -> Self {
        self.single_use_refresh = enabled;
        self
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("single_use_refresh", &self.single_use_refresh)
            .finish()
    }
}

/// Account lockout configuration.
#[derive(Debug, Clone)]
pub struct LockoutConfig {
    /// Consecutive failures that lock the account.
    ///
    /// Default: 5
    pub threshold: u32,

    /// Lock duration.
    ///
    /// Default: 30 minutes
    pub lock_duration: Duration,
}

impl LockoutConfig {
    /// Set failure threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set lock duration.
    #[must_use]
    pub const fn with_lock_duration(mut self, duration: Duration) -> Self {
        self.lock_duration = duration;
        self
    }
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            threshold: constants::lockout::THRESHOLD,
            lock_duration: Duration::minutes(constants::lockout::LOCK_MINUTES),
        }
    }
}

/// Revocation cache configuration.
#[derive(Debug, Clone)]
pub struct RevocationConfig {
    /// Maximum entries in the in-process cache.
    ///
    /// Default: 10 000
    pub cache_capacity: usize,
}

impl RevocationConfig {
    /// Set cache capacity.
    #[must_use]
    pub const fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            cache_capacity: constants::revocation::CACHE_CAPACITY,
        }
    }
}

/// Background sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Interval between OTP and token sweeps.
    ///
    /// Default: 1 hour
    pub records_interval: std::time::Duration,

    /// Interval between blacklist sweeps.
    ///
    /// Default: 6 hours
    pub blacklist_interval: std::time::Duration,

    /// How long consumed OTPs are retained.
    ///
    /// Default: 24 hours
    pub consumed_retention: Duration,
}

impl SweeperConfig {
    /// Set both sweep intervals.
    #[must_use]
    pub const fn with_intervals(
        mut self,
        records: std::time::Duration,
        blacklist: std::time::Duration,
    ) -> Self {
        self.records_interval = records;
        self.blacklist_interval = blacklist;
        self
    }

    /// Set consumed-OTP retention.
    #[must_use]
    pub const fn with_consumed_retention(mut self, retention: Duration) -> Self {
        self.consumed_retention = retention;
        self
    }

    /// Load the schedule from environment variables, falling back to the
    /// defaults.
    ///
    /// Optional: `KEYSTONE_SWEEP_RECORDS_SECS`, `KEYSTONE_SWEEP_BLACKLIST_SECS`.
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but is not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(secs) = optional_secs("KEYSTONE_SWEEP_RECORDS_SECS")? {
            config.records_interval = std::time::Duration::from_secs(secs);
        }
        if let Some(secs) = optional_secs("KEYSTONE_SWEEP_BLACKLIST_SECS")? {
            config.blacklist_interval = std::time::Duration::from_secs(secs);
        }
        Ok(config)
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            records_interval: std::time::Duration::from_secs(
                constants::sweeper::RECORDS_INTERVAL_SECS,
            ),
            blacklist_interval: std::time::Duration::from_secs(
                constants::sweeper::BLACKLIST_INTERVAL_SECS,
            ),
            consumed_retention: Duration::hours(constants::otp::CONSUMED_RETENTION_HOURS),
        }
    }
}

/// Complete configuration for the authentication core.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// One-time passcodes.
    pub otp: OtpConfig,

    /// Session tokens.
    pub tokens: TokenConfig,

    /// Lockout policy.
    pub lockout: LockoutConfig,

    /// Revocation cache.
    pub revocation: RevocationConfig,

    /// Sweeper schedule.
    pub sweeper: SweeperConfig,

    /// Upper bound on every individual store call.
    ///
    /// Default: 5 seconds
    pub store_timeout: std::time::Duration,
}

impl AuthConfig {
    /// Create configuration with default sections and the given token secrets.
    #[must_use]
    pub fn new(tokens: TokenConfig) -> Self {
        Self {
            otp: OtpConfig::default(),
            tokens,
            lockout: LockoutConfig::default(),
            revocation: RevocationConfig::default(),
            sweeper: SweeperConfig::default(),
            store_timeout: std::time::Duration::from_millis(constants::STORE_TIMEOUT_MS),
        }
    }

    /// Replace the OTP section.
    #[must_use]
    pub fn with_otp(mut self, otp: OtpConfig) -> Self {
        self.otp = otp;
        self
    }

    /// Replace the lockout section.
    #[must_use]
    pub fn with_lockout(mut self, lockout: LockoutConfig) -> Self {
        self.lockout = lockout;
        self
    }

    /// Replace the revocation section.
    #[must_use]
    pub const fn with_revocation(mut self, revocation: RevocationConfig) -> Self {
        self.revocation = revocation;
        self
    }

    /// Replace the sweeper section.
    #[must_use]
    pub const fn with_sweeper(mut self, sweeper: SweeperConfig) -> Self {
        self.sweeper = sweeper;
        self
    }

    /// Set the per-call store timeout.
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Required: `KEYSTONE_ACCESS_SECRET`, `KEYSTONE_REFRESH_SECRET`.
    /// Optional: `KEYSTONE_TOKEN_ISSUER`, `KEYSTONE_TOKEN_AUDIENCE`,
    /// `KEYSTONE_OTP_FALLBACK_PATH`, `KEYSTONE_STORE_TIMEOUT_MS`.
    ///
    /// # Errors
    ///
    /// Returns error if a required variable is missing, a value does not
    /// parse, or the result fails [`AuthConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let access = required_var("KEYSTONE_ACCESS_SECRET")?;
        let refresh = required_var("KEYSTONE_REFRESH_SECRET")?;

        let mut tokens = TokenConfig::new(access, refresh);
        if let Ok(issuer) = std::env::var("KEYSTONE_TOKEN_ISSUER") {
            tokens.issuer = issuer;
        }
        if let Ok(audience) = std::env::var("KEYSTONE_TOKEN_AUDIENCE") {
            tokens.audience = audience;
        }

        let mut config = Self::new(tokens);

        if let Ok(path) = std::env::var("KEYSTONE_OTP_FALLBACK_PATH") {
            config.otp.fallback_path = PathBuf::from(path);
        }

        if let Ok(raw) = std::env::var("KEYSTONE_STORE_TIMEOUT_MS") {
            let millis = raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                var: "KEYSTONE_STORE_TIMEOUT_MS".to_string(),
                reason: e.to_string(),
            })?;
            config.store_timeout = std::time::Duration::from_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration.
    ///
    /// # Errors
    ///
    /// Returns error if any section is inconsistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(4..=10).contains(&self.otp.code_length) {
            return Err(ConfigError::Invalid(format!(
                "OTP code length must be 4..=10 digits, got {}",
                self.otp.code_length
            )));
        }
        if self.otp.ttl <= Duration::zero() {
            return Err(ConfigError::Invalid("OTP ttl must be positive".into()));
        }
        if self.tokens.access_secret.is_empty() || self.tokens.refresh_secret.is_empty() {
            return Err(ConfigError::Invalid("token secrets must not be empty".into()));
        }
        if self.tokens.access_secret == self.tokens.refresh_secret {
            return Err(ConfigError::Invalid(
                "access and refresh tokens must use distinct secrets".into(),
            ));
        }
        if self.tokens.access_ttl <= Duration::zero() || self.tokens.refresh_ttl <= Duration::zero()
        {
            return Err(ConfigError::Invalid("token ttls must be positive".into()));
        }
        if self.lockout.threshold == 0 {
            return Err(ConfigError::Invalid("lockout threshold must be at least 1".into()));
        }
        if self.revocation.cache_capacity == 0 {
            return Err(ConfigError::Invalid("revocation cache capacity must be at least 1".into()));
        }
        if self.store_timeout.is_zero() {
            return Err(ConfigError::Invalid("store timeout must be positive".into()));
        }
        if self.sweeper.records_interval.is_zero() || self.sweeper.blacklist_interval.is_zero() {
            return Err(ConfigError::Invalid("sweeper intervals must be positive".into()));
        }
        Ok(())
    }
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::EnvVarNotSet(name.to_string()))
}

fn optional_secs(name: &str) -> Result<Option<u64>, ConfigError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Some(secs)),
        Ok(_) => Err(ConfigError::InvalidValue {
            var: name.to_string(),
            reason: "must be positive".to_string(),
        }),
        Err(e) => Err(ConfigError::InvalidValue {
            var: name.to_string(),
            reason: e.to_string(),
        }),
    }
}
