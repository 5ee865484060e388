//! One-time passcode store trait.
//!
//! Stores [`OtpRecord`]s and consumes them with atomic single-use semantics.

use super::StoreResult;
use crate::state::OtpPurpose;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A one-time passcode as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpRecord {
    /// Normalized subject (e-mail address or phone number).
    pub identifier: String,

    /// Fixed-length numeric code.
    pub code: String,

    /// What the code authorizes.
    pub purpose: OtpPurpose,

    /// Expiration time.
    pub expires_at: DateTime<Utc>,

    /// Set exactly once, by the verification that succeeds.
    pub consumed: bool,

    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl OtpRecord {
    /// Create an unconsumed record created at `now` that lives for `ttl`.
    #[must_use]
    pub fn new(
        identifier: impl Into<String>,
        code: impl Into<String>,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            code: code.into(),
            purpose,
            expires_at: now + ttl,
            consumed: false,
            created_at: now,
        }
    }

    /// Does this record match the presented tuple?
    #[must_use]
    pub fn matches(&self, identifier: &str, code: &str, purpose: OtpPurpose) -> bool {
        self.purpose == purpose
            && self.identifier == identifier
            && constant_time_eq::constant_time_eq(self.code.as_bytes(), code.as_bytes())
    }

    /// Unconsumed and unexpired at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && self.expires_at > now
    }
}

/// Result of an atomic consume attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The most recent active match was marked consumed by this call.
    Consumed(OtpRecord),

    /// The most recent match had already been consumed.
    AlreadyUsed,

    /// The most recent match expired before being consumed.
    Expired,

    /// Nothing matches the tuple.
    NotFound,
}

/// One-time passcode store.
///
/// # Implementation Notes
///
/// - Several unconsumed codes may coexist for one `(identifier, purpose)`
/// - **CRITICAL**: `consume()` MUST be atomic (conditional update or mutex)
/// - `now` is always supplied by the caller's clock, never read by the store
pub trait OtpStore: Send + Sync {
    /// Persist a new record.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or rejects the write.
    fn insert(
        &self,
        record: OtpRecord,
    ) -> impl std::future::Future<Output = StoreResult<()>> + Send;

    /// Is `code` held by any active record, for any identifier?
    ///
    /// Used by generation to avoid handing out a value already in flight.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn is_code_active(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = StoreResult<bool>> + Send;

    /// Consume the most recent active record matching the tuple.
    ///
    /// This operation MUST be atomic: of any number of concurrent callers
    /// presenting the same code, at most one receives
    /// [`ConsumeOutcome::Consumed`].
    ///
    /// When nothing is consumable, the most recent match decides between
    /// [`ConsumeOutcome::AlreadyUsed`] and [`ConsumeOutcome::Expired`].
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn consume(
        &self,
        identifier: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = StoreResult<ConsumeOutcome>> + Send;

    /// Delete records expired at `now`, and consumed records created before
    /// `consumed_before`.
    ///
    /// Returns the number of records deleted. Must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable or the table is missing.
    fn purge(
        &self,
        now: DateTime<Utc>,
        consumed_before: DateTime<Utc>,
    ) -> impl std::future::Future<Output = StoreResult<u64>> + Send;
}

/// Classify `records` for a consume attempt and mark the winner consumed.
///
/// Shared by the in-memory and file stores, which both hold the full record
/// set under a lock while calling this.
pub(crate) fn consume_in_place(
    records: &mut [OtpRecord],
    identifier: &str,
    code: &str,
    purpose: OtpPurpose,
    now: DateTime<Utc>,
) -> ConsumeOutcome {
    let newest_active = records
        .iter_mut()
        .filter(|r| r.matches(identifier, code, purpose) && r.is_active(now))
        .max_by_key(|r| r.created_at);

    if let Some(record) = newest_active {
        record.consumed = true;
        return ConsumeOutcome::Consumed(record.clone());
    }

    match records
        .iter()
        .filter(|r| r.matches(identifier, code, purpose))
        .max_by_key(|r| r.created_at)
    {
        Some(r) if r.consumed => ConsumeOutcome::AlreadyUsed,
        Some(_) => ConsumeOutcome::Expired,
        None => ConsumeOutcome::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    #[test]
    fn newest_active_match_wins() {
        let older = OtpRecord::new("a@x.com", "111111", OtpPurpose::Login, now(), Duration::minutes(10));
        let newer = OtpRecord::new(
            "a@x.com",
            "111111",
            OtpPurpose::Login,
            now() + Duration::seconds(5),
            Duration::minutes(10),
        );
        let mut records = vec![older, newer.clone()];

        let outcome = consume_in_place(&mut records, "a@x.com", "111111", OtpPurpose::Login, now() + Duration::seconds(6));

        let mut expected = newer;
        expected.consumed = true;
        assert_eq!(outcome, ConsumeOutcome::Consumed(expected));
        assert!(!records[0].consumed);
    }

    #[test]
    fn purpose_must_match() {
        let mut records = vec![OtpRecord::new("a@x.com", "111111", OtpPurpose::Signup, now(), Duration::minutes(10))];
        let outcome = consume_in_place(&mut records, "a@x.com", "111111", OtpPurpose::PasswordReset, now());
        assert_eq!(outcome, ConsumeOutcome::NotFound);
    }

    #[test]
    fn expired_match_is_reported() {
        let mut records = vec![OtpRecord::new("a@x.com", "111111", OtpPurpose::Login, now(), Duration::minutes(10))];
        let outcome = consume_in_place(&mut records, "a@x.com", "111111", OtpPurpose::Login, now() + Duration::minutes(10));
        assert_eq!(outcome, ConsumeOutcome::Expired);
        assert!(!records[0].consumed);
    }
}
