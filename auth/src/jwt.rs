//! Session token encoding.
//!
//! Tokens are compact JWS (HS256). Access and refresh tokens are signed with
//! different secrets, so one can never be presented as the other. Expiry is
//! checked against the caller's clock instead of the system clock.

use crate::config::TokenConfig;
use crate::error::{AuthError, Result, TokenRejection};
use crate::state::{SubjectId, TokenKind};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by every session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account the token was issued to.
    pub sub: SubjectId,

    /// Role granted to the session.
    pub role: String,

    /// Issuer.
    pub iss: String,

    /// Audience.
    pub aud: String,

    /// Issued at (seconds since the epoch).
    pub iat: i64,

    /// Expiry (seconds since the epoch).
    pub exp: i64,

    /// Unique token id; two tokens minted in the same second still differ.
    pub jti: String,
}

impl Claims {
    /// Expiry as a timestamp, or `None` if `exp` is outside the range
    /// chrono can represent.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Has the token expired at `now`?
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }
}

/// HS256 encoder/decoder for access and refresh tokens.
#[derive(Clone)]
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from the token settings.
    #[must_use]
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }

    /// Build claims for a token of `subject` valid from `now` until `expires_at`.
    #[must_use]
    pub fn claims(
        &self,
        subject: SubjectId,
        role: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Claims {
        Claims {
            sub: subject,
            role: role.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: format!("{:032x}", rand::random::<u128>()),
        }
    }

    /// Sign `claims` as a token of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] if encoding fails.
    pub fn encode(&self, kind: TokenKind, claims: &Claims) -> Result<String> {
        let key = match kind {
            TokenKind::Access => &self.access_encoding,
            TokenKind::Refresh => &self.refresh_encoding,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, key)
            .map_err(|e| AuthError::Signing(format!("JWT encode: {e}")))
    }

    /// Verify signature, binding and expiry of a token of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthorized`] with
    /// [`TokenRejection::InvalidToken`] for any failure.
    pub fn decode(&self, token: &str, kind: TokenKind, now: DateTime<Utc>) -> Result<Claims> {
        let claims = self.decode_signed(token, kind)?;
        if claims.is_expired_at(now) {
            tracing::debug!(kind = %kind, "Token expired");
            return Err(AuthError::Unauthorized(TokenRejection::InvalidToken));
        }
        Ok(claims)
    }

    /// Verify signature and binding with either secret, ignoring expiry.
    ///
    /// Used by revocation, which must accept tokens of either kind and
    /// tokens that have already expired.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthorized`] with
    /// [`TokenRejection::InvalidToken`] if neither secret verifies the token.
    pub fn decode_any(&self, token: &str) -> Result<(TokenKind, Claims)> {
        self.decode_signed(token, TokenKind::Access)
            .map(|claims| (TokenKind::Access, claims))
            .or_else(|_| {
                self.decode_signed(token, TokenKind::Refresh)
                    .map(|claims| (TokenKind::Refresh, claims))
            })
    }

    fn decode_signed(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        let key = match kind {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        // `sub` is numeric, so its presence is enforced by `Claims` itself
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        jsonwebtoken::decode::<Claims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(kind = %kind, error = %e, "Token failed verification");
                AuthError::Unauthorized(TokenRejection::InvalidToken)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new(&TokenConfig::new("access-secret", "refresh-secret"))
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap()
    }

    #[test]
    fn access_token_round_trip() {
        let codec = codec();
        let claims = codec.claims(SubjectId(42), "student", now(), now() + Duration::days(7));
        let token = codec.encode(TokenKind::Access, &claims).unwrap();

        let decoded = codec.decode(&token, TokenKind::Access, now()).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(decoded.sub, SubjectId(42));
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let codec = codec();
        let claims = codec.claims(SubjectId(1), "user", now(), now() + Duration::days(1));
        let refresh = codec.encode(TokenKind::Refresh, &claims).unwrap();

        let err = codec.decode(&refresh, TokenKind::Access, now()).unwrap_err();
        assert_eq!(err.rejection(), Some(TokenRejection::InvalidToken));
        assert_eq!(codec.decode_any(&refresh).unwrap().0, TokenKind::Refresh);
    }

    #[test]
    fn unrepresentable_expiry_has_no_timestamp() {
        let mut claims = codec().claims(SubjectId(1), "user", now(), now() + Duration::hours(1));
        assert_eq!(claims.expires_at(), Some(now() + Duration::hours(1)));

        claims.exp = i64::MAX;
        assert_eq!(claims.expires_at(), None);
    }

    #[test]
    fn expiry_follows_supplied_time() {
        let codec = codec();
        let claims = codec.claims(SubjectId(1), "user", now(), now() + Duration::hours(1));
        let token = codec.encode(TokenKind::Access, &claims).unwrap();

        assert!(codec.decode(&token, TokenKind::Access, now() + Duration::minutes(59)).is_ok());
        assert!(codec.decode(&token, TokenKind::Access, now() + Duration::hours(1)).is_err());

        // Revocation still recognizes expired tokens
        assert!(codec.decode_any(&token).is_ok());
    }

    #[test]
    fn foreign_audience_is_rejected() {
        let other = TokenCodec::new(
            &TokenConfig::new("access-secret", "refresh-secret").with_binding("keystone", "elsewhere"),
        );
        let claims = other.claims(SubjectId(1), "user", now(), now() + Duration::hours(1));
        let token = other.encode(TokenKind::Access, &claims).unwrap();

        assert!(codec().decode(&token, TokenKind::Access, now()).is_err());
    }

    #[test]
    fn jti_differs_between_tokens() {
        let codec = codec();
        let a = codec.claims(SubjectId(1), "user", now(), now() + Duration::hours(1));
        let b = codec.claims(SubjectId(1), "user", now(), now() + Duration::hours(1));
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(codec().decode_any("not.a.token").is_err());
    }
}
