//! Session token manager.
//!
//! A presented token is honored only if all of the following hold, checked
//! in this order:
//!
//! 1. signature, issuer, audience and expiry verify ([`TokenRejection::InvalidToken`])
//! 2. it is not on the revocation list ([`TokenRejection::Revoked`])
//! 3. the registry holds a live record of the expected kind ([`TokenRejection::NotRegistered`])
//!
//! The revocation check runs before the registry lookup because a cache hit
//! answers it without a store round trip. Store failures in steps 2 and 3
//! surface as [`AuthError::Storage`], never as a rejection.

use crate::config::TokenConfig;
use crate::constants::{STORE_TIMEOUT_MS, metric_names};
use crate::error::{AuthError, Result, TokenRejection};
use crate::jwt::{Claims, TokenCodec};
use crate::providers::{BlacklistStore, TokenRecord, TokenRegistry};
use crate::revocation::RevocationStore;
use crate::state::{SubjectId, TokenKind, TokenPair};
use crate::utils::{bounded, token_fingerprint};
use chrono::{DateTime, Utc};
use keystone_core::environment::Clock;
use std::time::Duration;

/// Session token manager.
#[derive(Debug, Clone)]
pub struct TokenManager<R, B, C> {
    codec: TokenCodec,
    config: TokenConfig,
    registry: R,
    revocation: RevocationStore<B, C>,
    clock: C,
    store_timeout: Duration,
}

impl<R, B, C> TokenManager<R, B, C>
where
    R: TokenRegistry,
    B: BlacklistStore,
    C: Clock,
{
    /// Create a token manager.
    #[must_use]
    pub fn new(
        config: TokenConfig,
        registry: R,
        revocation: RevocationStore<B, C>,
        clock: C,
    ) -> Self {
        Self {
            codec: TokenCodec::new(&config),
            config,
            registry,
            revocation,
            clock,
            store_timeout: Duration::from_millis(STORE_TIMEOUT_MS),
        }
    }

    /// Set the timeout applied to every registry call.
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// The token registry.
    pub const fn registry(&self) -> &R {
        &self.registry
    }

    /// The revocation store consulted by [`TokenManager::verify`].
    pub const fn revocation(&self) -> &RevocationStore<B, C> {
        &self.revocation
    }

    /// Mint and register an access/refresh pair for `subject`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Signing`] if a token could not be encoded
    /// - [`AuthError::Storage`] if either registry write failed; the minted
    ///   tokens are discarded because they would never verify
    pub async fn issue_pair(&self, subject: SubjectId, role: &str) -> Result<TokenPair> {
        let now = self.clock.now();
        let access_expires_at = now + self.config.access_ttl;
        let refresh_expires_at = now + self.config.refresh_ttl;

        let access_token = self.mint(TokenKind::Access, subject, role, now, access_expires_at)?;
        let refresh_token = self.mint(TokenKind::Refresh, subject, role, now, refresh_expires_at)?;

        self.register(TokenKind::Access, subject, &access_token, now, access_expires_at)
            .await?;
        self.register(TokenKind::Refresh, subject, &refresh_token, now, refresh_expires_at)
            .await?;

        metrics::counter!(metric_names::TOKENS_ISSUED).increment(1);
        tracing::info!(subject = %subject, role = role, "Issued session token pair");

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Verify a presented token of `kind` and return its claims.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Unauthorized`] with the specific [`TokenRejection`]
    /// - [`AuthError::Storage`] if the revocation store or registry failed
    pub async fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        let now = self.clock.now();
        let claims = self
            .codec
            .decode(token, kind, now)
            .map_err(|_| reject(kind, TokenRejection::InvalidToken))?;

        let token_hash = token_fingerprint(token);
        if self.revocation.check(&token_hash).await? {
            return Err(reject(kind, TokenRejection::Revoked));
        }

        let registered = bounded(
            self.store_timeout,
            "tokens.is_registered",
            self.registry.is_registered(&token_hash, kind, now),
        )
        .await?;
        if !registered {
            return Err(reject(kind, TokenRejection::NotRegistered));
        }

        Ok(claims)
    }

    /// Revoke a token of either kind.
    ///
    /// Deletes its registry record and, unless it has already expired,
    /// blacklists it until its own expiry. Revoking twice is harmless.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Unauthorized`] if the token's signature does not verify
    /// - [`AuthError::Storage`] if the registry or blacklist write failed
    pub async fn revoke(&self, token: &str) -> Result<()> {
        let (kind, claims) = self.codec.decode_any(token)?;
        let token_hash = token_fingerprint(token);

        let removed = bounded(
            self.store_timeout,
            "tokens.remove",
            self.registry.remove(&token_hash),
        )
        .await?;

        if !claims.is_expired_at(self.clock.now()) {
            let expires_at = claims.expires_at().unwrap_or_else(|| {
                tracing::warn!(
                    subject = %claims.sub,
                    exp = claims.exp,
                    "Token expiry out of range; revoking indefinitely"
                );
                DateTime::<Utc>::MAX_UTC
            });
            self.revocation.add(&token_hash, expires_at).await?;
        }

        metrics::counter!(metric_names::TOKENS_REVOKED, "kind" => kind.as_str()).increment(1);
        tracing::info!(subject = %claims.sub, kind = %kind, removed, "Revoked session token");
        Ok(())
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// With single-use rotation (the default) the old refresh record is
    /// deleted before the new pair is minted, and only the caller whose
    /// delete removed it proceeds.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Unauthorized`] if the refresh token does not verify or
    ///   lost a concurrent rotation
    /// - [`AuthError::Storage`] / [`AuthError::Signing`] as for
    ///   [`TokenManager::issue_pair`]
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair> {
        let claims = self.verify(refresh_token, TokenKind::Refresh).await?;
        let token_hash = token_fingerprint(refresh_token);

        if self.config.single_use_refresh {
            let removed = bounded(
                self.store_timeout,
                "tokens.remove",
                self.registry.remove(&token_hash),
            )
            .await?;
            if !removed {
                return Err(reject(TokenKind::Refresh, TokenRejection::NotRegistered));
            }
            return self.issue_pair(claims.sub, &claims.role).await;
        }

        let pair = self.issue_pair(claims.sub, &claims.role).await?;
        bounded(
            self.store_timeout,
            "tokens.remove",
            self.registry.remove(&token_hash),
        )
        .await?;
        Ok(pair)
    }

    /// End a session.
    ///
    /// The access token is revoked outright; the refresh token, if given,
    /// is only unregistered, which is enough to stop it rotating.
    ///
    /// # Errors
    ///
    /// As for [`TokenManager::revoke`].
    pub async fn logout(&self, access_token: &str, refresh_token: Option<&str>) -> Result<()> {
        self.revoke(access_token).await?;

        if let Some(refresh_token) = refresh_token {
            bounded(
                self.store_timeout,
                "tokens.remove",
                self.registry.remove(&token_fingerprint(refresh_token)),
            )
            .await?;
        }
        Ok(())
    }

    /// Unregister every token belonging to `subject` ("log out everywhere").
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the registry failed.
    pub async fn revoke_all(&self, subject: SubjectId) -> Result<u64> {
        let removed = bounded(
            self.store_timeout,
            "tokens.remove_for_subject",
            self.registry.remove_for_subject(subject),
        )
        .await?;

        tracing::info!(subject = %subject, removed, "Unregistered all session tokens");
        Ok(removed)
    }

    fn mint(
        &self,
        kind: TokenKind,
        subject: SubjectId,
        role: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<String> {
        let claims = self.codec.claims(subject, role, now, expires_at);
        self.codec.encode(kind, &claims)
    }

    async fn register(
        &self,
        kind: TokenKind,
        subject: SubjectId,
        token: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let record = TokenRecord {
            subject_id: subject,
            kind,
            token_hash: token_fingerprint(token),
            expires_at,
            created_at: now,
        };
        bounded(self.store_timeout, "tokens.insert", self.registry.insert(record)).await
    }
}

fn reject(kind: TokenKind, reason: TokenRejection) -> AuthError {
    metrics::counter!(metric_names::TOKENS_REJECTED, "reason" => reason.as_str()).increment(1);
    tracing::info!(kind = %kind, reason = reason.as_str(), "Rejected session token");
    AuthError::Unauthorized(reason)
}
