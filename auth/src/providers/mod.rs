//! Storage and delivery seams.
//!
//! This module defines traits for every external dependency of the core.
//! These traits enable dependency injection and make the core logic testable.
//!
//! # Architecture
//!
//! Providers are **interfaces**, not implementations. The managers depend
//! on these traits, and the application wires in concrete implementations:
//!
//! - **Testing**: in-memory mocks (deterministic, fault-injectable)
//! - **Production**: `PostgreSQL` stores, SMTP notifier
//! - **Degraded**: the file-backed OTP store behind the fallback decorator
//!
//! # Atomicity
//!
//! Every state transition the core relies on is a single store operation:
//! consuming a code, deleting a registry record, incrementing a lockout
//! counter. No trait exposes a read that the caller is expected to follow
//! with a dependent write.

use crate::error::StorageError;

pub mod blacklist_store;
pub mod console_notifier;
pub mod lockout_store;
pub mod notifier;
pub mod otp_store;
pub mod smtp_notifier;
pub mod token_registry;

// Re-export provider traits
pub use blacklist_store::{BlacklistEntry, BlacklistStore};
pub use console_notifier::ConsoleNotifier;
pub use lockout_store::LockoutStore;
pub use notifier::{DeliveryReport, Notifier};
pub use otp_store::{ConsumeOutcome, OtpRecord, OtpStore};
pub use smtp_notifier::SmtpNotifier;
pub use token_registry::{TokenRecord, TokenRegistry};

/// Result type returned by store implementations.
pub type StoreResult<T> = std::result::Result<T, StorageError>;
