//! Two-tier revocation store.
//!
//! # Architecture
//!
//! - **Cache**: bounded in-process map of token hash → expiry. Per process,
//!   never a correctness mechanism; an empty cache only costs lookups.
//! - **Durable**: a [`BlacklistStore`], the source of truth.
//!
//! A check consults the cache first; on a miss it asks the durable tier and
//! remembers a hit. Entries are keyed by [`crate::utils::token_fingerprint`],
//! never by the raw token.

use crate::config::RevocationConfig;
use crate::constants::STORE_TIMEOUT_MS;
use crate::error::Result;
use crate::providers::{BlacklistEntry, BlacklistStore};
use crate::utils::bounded;
use chrono::{DateTime, Utc};
use keystone_core::environment::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Bounded in-process cache of revoked token hashes.
///
/// When full, expired entries are pruned first; if that frees nothing, the
/// entry closest to its own expiry is evicted. Clones share the same map.
#[derive(Debug, Clone)]
pub struct RevocationCache {
    entries: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
    capacity: usize,
}

impl RevocationCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Is the cache empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Is `token_hash` revoked at `now`? Drops the entry if it has expired.
    #[must_use]
    pub fn contains(&self, token_hash: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.lock();
        match entries.get(token_hash) {
            Some(expires_at) if *expires_at > now => true,
            Some(_) => {
                entries.remove(token_hash);
                false
            }
            None => false,
        }
    }

    /// Remember `token_hash` until `expires_at`.
    pub fn insert(&self, token_hash: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) {
        let mut entries = self.lock();

        if let Some(existing) = entries.get_mut(token_hash) {
            *existing = (*existing).max(expires_at);
            return;
        }

        if entries.len() >= self.capacity {
            entries.retain(|_, exp| *exp > now);
        }
        if entries.len() >= self.capacity {
            let nearest = entries
                .iter()
                .min_by_key(|(_, exp)| **exp)
                .map(|(hash, _)| hash.clone());
            if let Some(hash) = nearest {
                entries.remove(&hash);
                tracing::debug!(capacity = self.capacity, "Revocation cache full, evicted nearest-expiry entry");
            }
        }

        entries.insert(token_hash.to_string(), expires_at);
    }

    /// Drop entries expired at `now`. Returns how many were removed.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, exp| *exp > now);
        before - entries.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Revocation store: bounded cache in front of a durable blacklist.
#[derive(Debug, Clone)]
pub struct RevocationStore<B, C> {
    cache: RevocationCache,
    durable: B,
    clock: C,
    store_timeout: Duration,
}

impl<B, C> RevocationStore<B, C>
where
    B: BlacklistStore,
    C: Clock,
{
    /// Create a store with the default cache capacity.
    #[must_use]
    pub fn new(durable: B, clock: C) -> Self {
        Self::with_config(durable, clock, &RevocationConfig::default())
    }

    /// Create a store from explicit settings.
    #[must_use]
    pub fn with_config(durable: B, clock: C, config: &RevocationConfig) -> Self {
        Self {
            cache: RevocationCache::new(config.cache_capacity),
            durable,
            clock,
            store_timeout: Duration::from_millis(STORE_TIMEOUT_MS),
        }
    }

    /// Set the timeout applied to every durable call.
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// The in-process tier.
    #[must_use]
    pub const fn cache(&self) -> &RevocationCache {
        &self.cache
    }

    /// Is `token_hash` revoked?
    ///
    /// # Errors
    ///
    /// Returns [`crate::AuthError::Storage`] if the cache misses and the
    /// durable tier cannot answer.
    pub async fn check(&self, token_hash: &str) -> Result<bool> {
        let now = self.clock.now();
        if self.cache.contains(token_hash, now) {
            return Ok(true);
        }

        let hit = bounded(
            self.store_timeout,
            "blacklist.lookup",
            self.durable.lookup(token_hash, now),
        )
        .await?;

        match hit {
            Some(expires_at) => {
                self.cache.insert(token_hash, expires_at, now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Revoke `token_hash` until `expires_at`.
    ///
    /// Entries that are already past expiry are skipped; the token is
    /// rejected on expiry anyway.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AuthError::Storage`] if the durable write fails. The
    /// cache entry is kept in that case, so this process still rejects the
    /// token.
    pub async fn add(&self, token_hash: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let now = self.clock.now();
        if expires_at <= now {
            tracing::debug!("Skipping revocation of an already expired token");
            return Ok(());
        }

        self.cache.insert(token_hash, expires_at, now);
        bounded(
            self.store_timeout,
            "blacklist.insert",
            self.durable.insert(BlacklistEntry {
                token_hash: token_hash.to_string(),
                expires_at,
            }),
        )
        .await
    }

    /// Purge expired entries from both tiers.
    ///
    /// Returns the number of durable entries deleted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AuthError::Storage`] if the durable purge fails; the
    /// cache is pruned regardless.
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = self.clock.now();
        let pruned = self.cache.prune(now);
        tracing::debug!(pruned, "Pruned revocation cache");

        bounded(
            self.store_timeout,
            "blacklist.purge_expired",
            self.durable.purge_expired(now),
        )
        .await
    }
}
