//! Mock OTP store for testing.

use super::faults::{Faults, poisoned};
use crate::providers::otp_store::consume_in_place;
use crate::providers::{ConsumeOutcome, OtpRecord, OtpStore, StoreResult};
use crate::state::OtpPurpose;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Mock OTP store.
///
/// In-memory OTP store with atomic single-use semantics.
#[derive(Debug, Clone, Default)]
pub struct MockOtpStore {
    records: Arc<Mutex<Vec<OtpRecord>>>,
    faults: Faults,
}

impl MockOtpStore {
    /// Create a new mock OTP store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault switches for this store.
    #[must_use]
    pub const fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Get all stored records (for testing).
    #[must_use]
    pub fn get_all(&self) -> Vec<OtpRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Clear all records (for testing).
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl OtpStore for MockOtpStore {
    async fn insert(&self, record: OtpRecord) -> StoreResult<()> {
        self.faults.check("otp_records").await?;
        self.records.lock().map_err(poisoned)?.push(record);
        Ok(())
    }

    async fn is_code_active(&self, code: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        self.faults.check("otp_records").await?;
        let records = self.records.lock().map_err(poisoned)?;
        Ok(records.iter().any(|r| r.code == code && r.is_active(now)))
    }

    async fn consume(
        &self,
        identifier: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> StoreResult<ConsumeOutcome> {
        self.faults.check("otp_records").await?;

        // Classification and the consumed flip happen under one lock
        let mut records = self.records.lock().map_err(poisoned)?;
        Ok(consume_in_place(&mut records, identifier, code, purpose, now))
    }

    async fn purge(&self, now: DateTime<Utc>, consumed_before: DateTime<Utc>) -> StoreResult<u64> {
        self.faults.check("otp_records").await?;
        let mut records = self.records.lock().map_err(poisoned)?;
        let before = records.len();
        records.retain(|r| r.expires_at > now && !(r.consumed && r.created_at < consumed_before));
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use chrono::Duration;

    fn record(code: &str, created: DateTime<Utc>) -> OtpRecord {
        OtpRecord::new("a@x.com", code, OtpPurpose::Signup, created, Duration::minutes(10))
    }

    #[tokio::test]
    async fn test_store_and_consume() {
        let store = MockOtpStore::new();
        let now = Utc::now();
        store.insert(record("123456", now)).await.unwrap();

        assert!(store.is_code_active("123456", now).await.unwrap());

        let first = store.consume("a@x.com", "123456", OtpPurpose::Signup, now).await.unwrap();
        assert!(matches!(first, ConsumeOutcome::Consumed(_)));

        let second = store.consume("a@x.com", "123456", OtpPurpose::Signup, now).await.unwrap();
        assert_eq!(second, ConsumeOutcome::AlreadyUsed);
        assert!(!store.is_code_active("123456", now).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_consume_atomicity() {
        let store = MockOtpStore::new();
        let now = Utc::now();
        store.insert(record("654321", now)).await.unwrap();

        let store1 = store.clone();
        let store2 = store.clone();

        let (result1, result2) = tokio::join!(
            store1.consume("a@x.com", "654321", OtpPurpose::Signup, now),
            store2.consume("a@x.com", "654321", OtpPurpose::Signup, now),
        );

        let outcomes = [result1.unwrap(), result2.unwrap()];
        let winners = outcomes
            .iter()
            .filter(|o| matches!(o, ConsumeOutcome::Consumed(_)))
            .count();
        assert_eq!(winners, 1, "Exactly one concurrent request should succeed");
        assert!(outcomes.contains(&ConsumeOutcome::AlreadyUsed));
    }

    #[tokio::test]
    async fn test_purge_expired_and_old_consumed() {
        let store = MockOtpStore::new();
        let now = Utc::now();

        store.insert(record("111111", now - Duration::hours(2))).await.unwrap(); // expired
        store.insert(record("222222", now - Duration::hours(30))).await.unwrap(); // expired
        store.insert(record("333333", now)).await.unwrap(); // live

        let purged = store.purge(now, now - Duration::hours(24)).await.unwrap();
        assert_eq!(purged, 2);
        assert_eq!(store.get_all().len(), 1);

        // Idempotent
        assert_eq!(store.purge(now, now - Duration::hours(24)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_outage_is_reported_as_unavailable() {
        let store = MockOtpStore::new();
        store.faults().set_unavailable(true);

        let err = store.insert(record("123456", Utc::now())).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert!(store.get_all().is_empty());
    }
}
