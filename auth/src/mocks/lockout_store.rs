//! Mock lockout store for testing.

use super::faults::{Faults, poisoned};
use crate::providers::{LockoutStore, StoreResult};
use crate::state::{LockoutState, SubjectId};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock lockout store.
///
/// Only accounts added with [`MockLockoutStore::register`] exist.
#[derive(Debug, Clone, Default)]
pub struct MockLockoutStore {
    accounts: Arc<Mutex<HashMap<SubjectId, LockoutState>>>,
    faults: Faults,
}

impl MockLockoutStore {
    /// Create a new, empty mock lockout store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already knows `accounts`.
    #[must_use]
    pub fn with_accounts(accounts: impl IntoIterator<Item = SubjectId>) -> Self {
        let store = Self::new();
        for account in accounts {
            store.register(account);
        }
        store
    }

    /// Add an account with a clean lockout state.
    pub fn register(&self, account: SubjectId) {
        if let Ok(mut accounts) = self.accounts.lock() {
            accounts.entry(account).or_default();
        }
    }

    /// Fault switches for this store.
    #[must_use]
    pub const fn faults(&self) -> &Faults {
        &self.faults
    }
}

impl LockoutStore for MockLockoutStore {
    async fn load(&self, account: SubjectId) -> StoreResult<LockoutState> {
        self.faults.check("accounts").await?;
        let accounts = self.accounts.lock().map_err(poisoned)?;
        Ok(accounts.get(&account).copied().unwrap_or_default())
    }

    async fn record_failure(
        &self,
        account: SubjectId,
        now: DateTime<Utc>,
        threshold: u32,
        lock_for: Duration,
    ) -> StoreResult<LockoutState> {
        self.faults.check("accounts").await?;
        let mut accounts = self.accounts.lock().map_err(poisoned)?;
        Ok(match accounts.get_mut(&account) {
            Some(state) => {
                *state = state.after_failure(now, threshold, lock_for);
                *state
            }
            None => LockoutState::default(),
        })
    }

    async fn reset(&self, account: SubjectId) -> StoreResult<()> {
        self.faults.check("accounts").await?;
        let mut accounts = self.accounts.lock().map_err(poisoned)?;
        if let Some(state) = accounts.get_mut(&account) {
            *state = LockoutState::default();
        }
        Ok(())
    }
}
