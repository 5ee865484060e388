//! Storage implementations for the auth core.
//!
//! This module provides durable and ephemeral storage for authentication state:
//!
//! - **`PostgreSQL` stores** - OTP records, token registry, blacklist, lockout columns
//! - **File OTP store** - process-local JSON file, used only as the fallback tier
//! - **Fallback decorator** - diverts OTP traffic to the secondary tier when the
//!   primary is unreachable

pub mod fallback;
pub mod file_otp;
#[cfg(feature = "postgres")]
pub mod postgres;

// Re-exports
pub use fallback::FallbackOtpStore;
pub use file_otp::FileOtpStore;
#[cfg(feature = "postgres")]
pub use postgres::{
    PostgresBlacklistStore, PostgresLockoutStore, PostgresOtpStore, PostgresStores,
    PostgresTokenRegistry,
};
