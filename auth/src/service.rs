//! Authentication service.
//!
//! Wires the managers into the login flows the route layer calls:
//!
//! ```text
//! request_otp ──► OtpManager::issue ──► notifier
//!
//! login_with_otp
//!   ├─ LockoutPolicy::ensure_unlocked      (Locked → stop)
//!   ├─ OtpManager::verify
//!   ├─ valid   → record_success → TokenManager::issue_pair
//!   └─ invalid → record_failure
//!
//! authenticate / refresh / logout / logout_everywhere ──► TokenManager
//! ```
//!
//! Wrong codes and wrong passwords count toward the same lockout counter.

use crate::config::{AuthConfig, SweeperConfig};
use crate::error::Result;
use crate::jwt::Claims;
use crate::lockout::LockoutPolicy;
use crate::otp::{IssuedOtp, OtpManager};
use crate::providers::{BlacklistStore, LockoutStore, Notifier, OtpStore, TokenRegistry};
use crate::revocation::RevocationStore;
use crate::state::{LockoutState, OtpPurpose, SubjectId, TokenKind, TokenPair};
use crate::stores::{FallbackOtpStore, FileOtpStore};
use crate::sweeper::Sweeper;
use crate::tokens::TokenManager;
use keystone_core::environment::Clock;
use std::time::Duration;

/// The four stores the core persists to.
#[derive(Debug, Clone)]
pub struct AuthStores<S, R, B, L> {
    /// One-time passcode records.
    pub otp: S,

    /// Session token registry.
    pub tokens: R,

    /// Durable blacklist.
    pub blacklist: B,

    /// Lockout columns.
    pub lockout: L,
}

impl<S, R, B, L> AuthStores<S, R, B, L> {
    /// Put the file-backed OTP store behind the durable OTP store.
    #[must_use]
    pub fn with_file_fallback(
        self,
        path: impl Into<std::path::PathBuf>,
    ) -> AuthStores<FallbackOtpStore<S, FileOtpStore>, R, B, L> {
        AuthStores {
            otp: FallbackOtpStore::new(self.otp, FileOtpStore::new(path)),
            tokens: self.tokens,
            blacklist: self.blacklist,
            lockout: self.lockout,
        }
    }
}

/// Outcome of a credential check that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Credentials accepted; a fresh session.
    Authenticated(TokenPair),

    /// Credentials rejected; the failure has been counted.
    Rejected {
        /// Why, e.g. `"expired"` or `"invalid"`.
        reason: &'static str,

        /// Lockout state after counting this failure.
        lockout: LockoutState,
    },
}

/// Authentication service.
#[derive(Debug, Clone)]
pub struct AuthService<S, N, R, B, L, C> {
    otp: OtpManager<S, N, C>,
    tokens: TokenManager<R, B, C>,
    lockout: LockoutPolicy<L, C>,
    sweeper: SweeperConfig,
    store_timeout: Duration,
}

impl<S, N, R, B, L, C> AuthService<S, N, R, B, L, C>
where
    S: OtpStore,
    N: Notifier,
    R: TokenRegistry,
    B: BlacklistStore,
    L: LockoutStore,
    C: Clock + Clone,
{
    /// Build every manager from one configuration.
    #[must_use]
    pub fn new(config: &AuthConfig, stores: AuthStores<S, R, B, L>, notifier: N, clock: C) -> Self {
        let revocation =
            RevocationStore::with_config(stores.blacklist, clock.clone(), &config.revocation)
                .with_store_timeout(config.store_timeout);

        Self {
            otp: OtpManager::new(stores.otp, notifier, clock.clone())
                .with_config(config.otp.clone())
                .with_store_timeout(config.store_timeout),
            tokens: TokenManager::new(
                config.tokens.clone(),
                stores.tokens,
                revocation,
                clock.clone(),
            )
            .with_store_timeout(config.store_timeout),
            lockout: LockoutPolicy::new(stores.lockout, clock)
                .with_config(config.lockout.clone())
                .with_store_timeout(config.store_timeout),
            sweeper: config.sweeper.clone(),
            store_timeout: config.store_timeout,
        }
    }

    /// OTP manager.
    pub const fn otp(&self) -> &OtpManager<S, N, C> {
        &self.otp
    }

    /// Token manager.
    pub const fn tokens(&self) -> &TokenManager<R, B, C> {
        &self.tokens
    }

    /// Lockout policy.
    pub const fn lockout(&self) -> &LockoutPolicy<L, C> {
        &self.lockout
    }

    /// Send a one-time code to `identifier`.
    ///
    /// # Errors
    ///
    /// See [`OtpManager::issue`].
    pub async fn request_otp(&self, identifier: &str, purpose: OtpPurpose) -> Result<IssuedOtp> {
        self.otp.issue(identifier, purpose).await
    }

    /// Log `account` in with a one-time code sent to `identifier`.
    ///
    /// # Errors
    ///
    /// - [`crate::AuthError::Locked`] if the account is locked; the code is
    ///   not consumed
    /// - [`crate::AuthError::Validation`] for malformed input (not counted)
    /// - [`crate::AuthError::Storage`] if any store failed (not counted)
    pub async fn login_with_otp(
        &self,
        account: SubjectId,
        identifier: &str,
        code: &str,
        role: &str,
    ) -> Result<LoginOutcome> {
        self.lockout.ensure_unlocked(account).await?;

        let verdict = self.otp.verify(identifier, code, OtpPurpose::Login).await?;
        if verdict.is_valid() {
            self.lockout.record_success(account).await?;
            let pair = self.tokens.issue_pair(account, role).await?;
            return Ok(LoginOutcome::Authenticated(pair));
        }

        let lockout = self.lockout.record_failure(account).await?;
        Ok(LoginOutcome::Rejected {
            reason: verdict.reason(),
            lockout,
        })
    }

    /// Finish a password login whose hash check happened elsewhere.
    ///
    /// # Errors
    ///
    /// - [`crate::AuthError::Locked`] if the account is locked, whatever the
    ///   password outcome
    /// - [`crate::AuthError::Storage`] if any store failed
    pub async fn login_with_password(
        &self,
        account: SubjectId,
        password_ok: bool,
        role: &str,
    ) -> Result<LoginOutcome> {
        self.lockout.ensure_unlocked(account).await?;

        if password_ok {
            self.lockout.record_success(account).await?;
            let pair = self.tokens.issue_pair(account, role).await?;
            return Ok(LoginOutcome::Authenticated(pair));
        }

        let lockout = self.lockout.record_failure(account).await?;
        Ok(LoginOutcome::Rejected {
            reason: "invalid credentials",
            lockout,
        })
    }

    /// Verify an access token.
    ///
    /// # Errors
    ///
    /// See [`TokenManager::verify`].
    pub async fn authenticate(&self, access_token: &str) -> Result<Claims> {
        self.tokens.verify(access_token, TokenKind::Access).await
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// # Errors
    ///
    /// See [`TokenManager::rotate`].
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        self.tokens.rotate(refresh_token).await
    }

    /// End one session.
    ///
    /// # Errors
    ///
    /// See [`TokenManager::logout`].
    pub async fn logout(&self, access_token: &str, refresh_token: Option<&str>) -> Result<()> {
        self.tokens.logout(access_token, refresh_token).await
    }

    /// End every session of `account`.
    ///
    /// # Errors
    ///
    /// See [`TokenManager::revoke_all`].
    pub async fn logout_everywhere(&self, account: SubjectId) -> Result<u64> {
        self.tokens.revoke_all(account).await
    }

    /// A sweeper over this service's stores, sharing its revocation cache.
    #[must_use]
    pub fn sweeper(&self) -> Sweeper<S, R, B, C>
    where
        S: Clone,
        R: Clone,
        B: Clone,
    {
        let revocation = self.tokens.revocation().clone();
        let clock = self.otp.clock().clone();
        Sweeper::new(
            self.otp.otp_store().clone(),
            self.tokens.registry().clone(),
            revocation,
            clock,
        )
        .with_config(self.sweeper.clone())
        .with_store_timeout(self.store_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LockoutConfig, TokenConfig};
    use crate::error::{AuthError, TokenRejection};
    use crate::mocks::{
        MockBlacklistStore, MockLockoutStore, MockNotifier, MockOtpStore, MockTokenRegistry,
    };
    use keystone_testing::ManualClock;

    const ACCOUNT: SubjectId = SubjectId(42);

    type Service = AuthService<
        MockOtpStore,
        MockNotifier,
        MockTokenRegistry,
        MockBlacklistStore,
        MockLockoutStore,
        ManualClock,
    >;

    fn service() -> (Service, MockNotifier, ManualClock) {
        let config = AuthConfig::new(TokenConfig::new("access-secret", "refresh-secret"))
            .with_lockout(LockoutConfig::default().with_threshold(3));
        let stores = AuthStores {
            otp: MockOtpStore::new(),
            tokens: MockTokenRegistry::new(),
            blacklist: MockBlacklistStore::new(),
            lockout: MockLockoutStore::with_accounts([ACCOUNT]),
        };
        let notifier = MockNotifier::new();
        let clock = ManualClock::default();
        (
            AuthService::new(&config, stores, notifier.clone(), clock.clone()),
            notifier,
            clock,
        )
    }

    #[tokio::test]
    async fn otp_login_issues_a_session() {
        let (service, notifier, _) = service();
        service.request_otp("a@x.com", OtpPurpose::Login).await.unwrap();
        let code = notifier.last_code_for("a@x.com").unwrap();

        let outcome = service.login_with_otp(ACCOUNT, "a@x.com", &code, "student").await.unwrap();
        let LoginOutcome::Authenticated(pair) = outcome else {
            panic!("expected a session, got {outcome:?}");
        };
        let claims = service.authenticate(&pair.access_token).await.unwrap();
        assert_eq!(claims.sub, ACCOUNT);
    }

    #[tokio::test]
    async fn wrong_codes_and_passwords_share_the_counter() {
        let (service, ..) = service();

        service.login_with_otp(ACCOUNT, "a@x.com", "000000", "user").await.unwrap();
        service.login_with_password(ACCOUNT, false, "user").await.unwrap();
        let outcome = service.login_with_otp(ACCOUNT, "a@x.com", "000000", "user").await.unwrap();

        match outcome {
            LoginOutcome::Rejected { reason, lockout } => {
                assert_eq!(reason, "invalid");
                assert_eq!(lockout.failed_attempts, 3);
                assert!(lockout.locked_until.is_some());
            }
            LoginOutcome::Authenticated(_) => panic!("wrong code must not authenticate"),
        }

        let err = service.login_with_password(ACCOUNT, true, "user").await.unwrap_err();
        assert!(matches!(err, AuthError::Locked { .. }));
    }

    #[tokio::test]
    async fn locked_account_does_not_consume_codes() {
        let (service, notifier, clock) = service();
        for _ in 0..3 {
            service.login_with_password(ACCOUNT, false, "user").await.unwrap();
        }
        service.request_otp("a@x.com", OtpPurpose::Login).await.unwrap();
        let code = notifier.last_code_for("a@x.com").unwrap();

        let err = service.login_with_otp(ACCOUNT, "a@x.com", &code, "user").await.unwrap_err();
        assert!(matches!(err, AuthError::Locked { .. }));

        // Untouched while locked: it reads as expired, not already used
        clock.advance(chrono::Duration::minutes(31));
        let outcome = service.login_with_otp(ACCOUNT, "a@x.com", &code, "user").await.unwrap();
        match outcome {
            LoginOutcome::Rejected { reason, lockout } => {
                assert_eq!(reason, "expired");
                assert_eq!(lockout.failed_attempts, 1);
            }
            LoginOutcome::Authenticated(_) => panic!("expired code must not authenticate"),
        }
    }

    #[tokio::test]
    async fn refresh_then_logout_everywhere() {
        let (service, ..) = service();
        let LoginOutcome::Authenticated(pair) =
            service.login_with_password(ACCOUNT, true, "user").await.unwrap()
        else {
            panic!("expected a session");
        };

        let rotated = service.refresh(&pair.refresh_token).await.unwrap();
        assert!(service.authenticate(&rotated.access_token).await.is_ok());

        assert_eq!(service.logout_everywhere(ACCOUNT).await.unwrap(), 3);
        let err = service.authenticate(&rotated.access_token).await.unwrap_err();
        assert_eq!(err.rejection(), Some(TokenRejection::NotRegistered));
    }

    #[tokio::test]
    async fn file_fallback_from_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuthConfig::new(TokenConfig::new("access-secret", "refresh-secret"))
            .with_otp(crate::config::OtpConfig::default().with_fallback_path(dir.path().join("otp.json")));
        let primary = MockOtpStore::new();
        let stores = AuthStores {
            otp: primary.clone(),
            tokens: MockTokenRegistry::new(),
            blacklist: MockBlacklistStore::new(),
            lockout: MockLockoutStore::with_accounts([ACCOUNT]),
        }
        .with_file_fallback(config.otp.fallback_path.clone());
        let notifier = MockNotifier::new();
        let service = AuthService::new(&config, stores, notifier.clone(), ManualClock::default());

        primary.faults().set_unavailable(true);
        service.request_otp("a@x.com", OtpPurpose::Login).await.unwrap();
        assert!(dir.path().join("otp.json").exists());

        let code = notifier.last_code_for("a@x.com").unwrap();
        let outcome = service.login_with_otp(ACCOUNT, "a@x.com", &code, "user").await.unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
    }

    #[tokio::test]
    async fn sweeper_shares_the_revocation_cache() {
        let (service, _, clock) = service();
        let LoginOutcome::Authenticated(pair) =
            service.login_with_password(ACCOUNT, true, "user").await.unwrap()
        else {
            panic!("expected a session");
        };
        service.logout(&pair.access_token, Some(&pair.refresh_token)).await.unwrap();
        assert_eq!(service.tokens().revocation().cache().len(), 1);

        clock.advance(chrono::Duration::days(8));
        let report = service.sweeper().run_once().await.unwrap();
        assert_eq!(report.blacklist_entries, 1);
        assert!(service.tokens().revocation().cache().is_empty());
    }
}
