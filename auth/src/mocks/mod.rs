//! Mock provider implementations for testing.
//!
//! This module provides simple, in-memory implementations of all provider traits
//! for use in unit and integration tests. Every store carries a [`Faults`]
//! handle so tests can simulate outages, slow stores and missing tables.

pub mod blacklist_store;
pub mod faults;
pub mod lockout_store;
pub mod notifier;
pub mod otp_store;
pub mod token_registry;

pub use blacklist_store::MockBlacklistStore;
pub use faults::Faults;
pub use lockout_store::MockLockoutStore;
pub use notifier::{MockNotifier, SentCode};
pub use otp_store::MockOtpStore;
pub use token_registry::MockTokenRegistry;
