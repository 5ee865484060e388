//! Token registry trait.
//!
//! The registry is the server-side list of session tokens that should be
//! honored. A token with a valid signature but no live record here is
//! rejected, which is what makes logout and rotation stick.

use super::StoreResult;
use crate::state::{SubjectId, TokenKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Account the token was issued to.
    pub subject_id: SubjectId,

    /// Access or refresh.
    pub kind: TokenKind,

    /// Hex SHA-256 of the compact token.
    pub token_hash: String,

    /// Same instant as the token's `exp` claim.
    pub expires_at: DateTime<Utc>,

    /// Issuance time.
    pub created_at: DateTime<Utc>,
}

/// Registry of issued session tokens.
///
/// # Implementation Notes
///
/// - `token_hash` is the primary key
/// - **CRITICAL**: `remove()` must report whether *this* call deleted the row
///   (`DELETE ... RETURNING`), so concurrent revocations and rotations can
///   tell who won
pub trait TokenRegistry: Send + Sync {
    /// Register a token.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or rejects the write.
    fn insert(
        &self,
        record: TokenRecord,
    ) -> impl std::future::Future<Output = StoreResult<()>> + Send;

    /// Is there an unexpired record of `kind` for this hash?
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn is_registered(
        &self,
        token_hash: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = StoreResult<bool>> + Send;

    /// Delete the record for this hash.
    ///
    /// Returns `true` only if this call removed a row.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn remove(
        &self,
        token_hash: &str,
    ) -> impl std::future::Future<Output = StoreResult<bool>> + Send;

    /// Delete every record belonging to `subject` (global logout).
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn remove_for_subject(
        &self,
        subject: SubjectId,
    ) -> impl std::future::Future<Output = StoreResult<u64>> + Send;

    /// Delete records expired at `now`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or the table is missing.
    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = StoreResult<u64>> + Send;
}
