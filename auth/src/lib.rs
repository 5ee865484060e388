//! # Keystone Authentication Core
//!
//! One-time passcodes, session tokens, revocation and account lockout.
//!
//! ## Components
//!
//! - [`OtpManager`]: generate, store and verify single-use numeric codes
//! - [`TokenManager`]: issue, verify, revoke and rotate access/refresh pairs
//! - [`RevocationStore`]: bounded in-process cache in front of a durable blacklist
//! - [`LockoutPolicy`]: lock an account after repeated failed credential checks
//! - [`Sweeper`]: periodic purge of expired state
//! - [`AuthService`]: the login flows built from all of the above
//!
//! ## Storage
//!
//! Every manager is generic over the provider traits in [`providers`].
//! [`stores`] has the `PostgreSQL` implementations (feature `postgres`), a
//! file-backed OTP store and the fallback wrapper that puts it behind the
//! durable one. [`mocks`] has in-memory implementations with fault injection.
//!
//! ## Example
//!
//! ```
//! use keystone_auth::config::{AuthConfig, TokenConfig};
//! use keystone_auth::mocks::{
//!     MockBlacklistStore, MockLockoutStore, MockNotifier, MockOtpStore, MockTokenRegistry,
//! };
//! use keystone_auth::state::{OtpPurpose, SubjectId};
//! use keystone_auth::{AuthService, AuthStores, LoginOutcome};
//! use keystone_core::environment::SystemClock;
//!
//! # tokio_test::block_on(async {
//! let account = SubjectId(1);
//! let config = AuthConfig::new(TokenConfig::new("access-secret", "refresh-secret"));
//! let stores = AuthStores {
//!     otp: MockOtpStore::new(),
//!     tokens: MockTokenRegistry::new(),
//!     blacklist: MockBlacklistStore::new(),
//!     lockout: MockLockoutStore::with_accounts([account]),
//! };
//! let notifier = MockNotifier::new();
//! let service = AuthService::new(&config, stores, notifier.clone(), SystemClock);
//!
//! service.request_otp("user@example.com", OtpPurpose::Login).await?;
//! let code = notifier.last_code_for("user@example.com").unwrap_or_default();
//!
//! let outcome = service.login_with_otp(account, "user@example.com", &code, "user").await?;
//! assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
//! # Ok::<(), keystone_auth::AuthError>(())
//! # });
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod config;
pub mod constants;
pub mod error;
pub mod jwt;
pub mod lockout;
pub mod otp;
pub mod providers;
pub mod revocation;
pub mod service;
pub mod state;
pub mod stores;
pub mod sweeper;
pub mod tokens;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, Result, StorageError, TokenRejection};
pub use lockout::LockoutPolicy;
pub use otp::{IssuedOtp, OtpManager, OtpVerdict};
pub use revocation::{RevocationCache, RevocationStore};
pub use service::{AuthService, AuthStores, LoginOutcome};
pub use state::{LockoutState, OtpPurpose, SubjectId, TokenKind, TokenPair};
pub use sweeper::{SweepReport, Sweeper};
pub use tokens::TokenManager;
