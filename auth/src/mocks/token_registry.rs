//! Mock token registry for testing.

use super::faults::{Faults, poisoned};
use crate::providers::{StoreResult, TokenRecord, TokenRegistry};
use crate::state::{SubjectId, TokenKind};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock token registry.
///
/// Stores records in a `HashMap` keyed by token hash.
#[derive(Debug, Clone, Default)]
pub struct MockTokenRegistry {
    records: Arc<Mutex<HashMap<String, TokenRecord>>>,
    faults: Faults,
}

impl MockTokenRegistry {
    /// Create a new mock token registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault switches for this store.
    #[must_use]
    pub const fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Number of registered records (for testing).
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Records belonging to `subject` (for testing).
    #[must_use]
    pub fn records_for(&self, subject: SubjectId) -> Vec<TokenRecord> {
        self.records
            .lock()
            .map(|r| {
                r.values()
                    .filter(|rec| rec.subject_id == subject)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl TokenRegistry for MockTokenRegistry {
    async fn insert(&self, record: TokenRecord) -> StoreResult<()> {
        self.faults.check("token_records").await?;
        self.records
            .lock()
            .map_err(poisoned)?
            .insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn is_registered(
        &self,
        token_hash: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.faults.check("token_records").await?;
        let records = self.records.lock().map_err(poisoned)?;
        Ok(records
            .get(token_hash)
            .is_some_and(|r| r.kind == kind && r.expires_at > now))
    }

    async fn remove(&self, token_hash: &str) -> StoreResult<bool> {
        self.faults.check("token_records").await?;
        Ok(self
            .records
            .lock()
            .map_err(poisoned)?
            .remove(token_hash)
            .is_some())
    }

    async fn remove_for_subject(&self, subject: SubjectId) -> StoreResult<u64> {
        self.faults.check("token_records").await?;
        let mut records = self.records.lock().map_err(poisoned)?;
        let before = records.len();
        records.retain(|_, r| r.subject_id != subject);
        Ok((before - records.len()) as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.faults.check("token_records").await?;
        let mut records = self.records.lock().map_err(poisoned)?;
        let before = records.len();
        records.retain(|_, r| r.expires_at > now);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(hash: &str, subject: i64, kind: TokenKind, expires_at: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            subject_id: SubjectId(subject),
            kind,
            token_hash: hash.to_string(),
            expires_at,
            created_at: expires_at - Duration::days(1),
        }
    }

    #[tokio::test]
    async fn registration_checks_kind_and_expiry() {
        let registry = MockTokenRegistry::new();
        let now = Utc::now();
        registry
            .insert(record("h1", 1, TokenKind::Access, now + Duration::hours(1)))
            .await
            .unwrap();

        assert!(registry.is_registered("h1", TokenKind::Access, now).await.unwrap());
        assert!(!registry.is_registered("h1", TokenKind::Refresh, now).await.unwrap());
        assert!(
            !registry
                .is_registered("h1", TokenKind::Access, now + Duration::hours(2))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn only_one_remove_wins() {
        let registry = MockTokenRegistry::new();
        let now = Utc::now();
        registry
            .insert(record("h1", 1, TokenKind::Refresh, now + Duration::days(1)))
            .await
            .unwrap();

        let (a, b) = tokio::join!(registry.remove("h1"), registry.remove("h1"));
        assert_eq!(u8::from(a.unwrap()) + u8::from(b.unwrap()), 1);
    }

    #[tokio::test]
    async fn bulk_removal_is_scoped_to_subject() {
        let registry = MockTokenRegistry::new();
        let later = Utc::now() + Duration::days(1);
        registry.insert(record("a", 1, TokenKind::Access, later)).await.unwrap();
        registry.insert(record("b", 1, TokenKind::Refresh, later)).await.unwrap();
        registry.insert(record("c", 2, TokenKind::Access, later)).await.unwrap();

        assert_eq!(registry.remove_for_subject(SubjectId(1)).await.unwrap(), 2);
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.records_for(SubjectId(2)).len(), 1);
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let registry = MockTokenRegistry::new();
        let now = Utc::now();
        registry.insert(record("old", 1, TokenKind::Access, now - Duration::seconds(1))).await.unwrap();
        registry.insert(record("new", 1, TokenKind::Access, now + Duration::hours(1))).await.unwrap();

        assert_eq!(registry.purge_expired(now).await.unwrap(), 1);
        assert_eq!(registry.purge_expired(now).await.unwrap(), 0);
        assert_eq!(registry.count(), 1);
    }
}
