//! Mock blacklist store for testing.

use super::faults::{Faults, poisoned};
use crate::providers::{BlacklistEntry, BlacklistStore, StoreResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Mock durable blacklist.
///
/// Counts lookups so tests can observe whether the revocation cache
/// answered without reaching the durable tier.
#[derive(Debug, Clone, Default)]
pub struct MockBlacklistStore {
    entries: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
    lookups: Arc<AtomicUsize>,
    faults: Faults,
}

impl MockBlacklistStore {
    /// Create a new mock blacklist store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fault switches for this store.
    #[must_use]
    pub const fn faults(&self) -> &Faults {
        &self.faults
    }

    /// Number of `lookup` calls served so far.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of stored entries, expired or not.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl BlacklistStore for MockBlacklistStore {
    async fn insert(&self, entry: BlacklistEntry) -> StoreResult<()> {
        self.faults.check("blacklist_entries").await?;
        let mut entries = self.entries.lock().map_err(poisoned)?;
        entries
            .entry(entry.token_hash)
            .and_modify(|existing| *existing = (*existing).max(entry.expires_at))
            .or_insert(entry.expires_at);
        Ok(())
    }

    async fn lookup(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        self.faults.check("blacklist_entries").await?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let entries = self.entries.lock().map_err(poisoned)?;
        Ok(entries.get(token_hash).copied().filter(|exp| *exp > now))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.faults.check("blacklist_entries").await?;
        let mut entries = self.entries.lock().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|_, exp| *exp > now);
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn reinsert_keeps_later_expiry() {
        let store = MockBlacklistStore::new();
        let now = Utc::now();
        let later = now + Duration::hours(2);

        for expires_at in [later, now + Duration::hours(1)] {
            store
                .insert(BlacklistEntry {
                    token_hash: "h".into(),
                    expires_at,
                })
                .await
                .unwrap();
        }

        assert_eq!(store.lookup("h", now).await.unwrap(), Some(later));
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_invisible_and_purged() {
        let store = MockBlacklistStore::new();
        let now = Utc::now();
        store
            .insert(BlacklistEntry {
                token_hash: "h".into(),
                expires_at: now,
            })
            .await
            .unwrap();

        assert_eq!(store.lookup("h", now).await.unwrap(), None);
        assert_eq!(store.lookups(), 1);
        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert_eq!(store.count(), 0);
    }
}
