//! Fault injection shared by the mock stores.

use crate::error::StorageError;
use crate::providers::StoreResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct FaultState {
    unavailable: AtomicBool,
    missing_relation: AtomicBool,
    latency_ms: AtomicU64,
}

/// Switches for simulating store failures.
///
/// Clones share state, so a test can keep one handle and flip switches while
/// the store is owned by a manager.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    state: Arc<FaultState>,
}

impl Faults {
    /// Make every call fail with [`StorageError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every call fail with [`StorageError::MissingRelation`].
    pub fn set_missing_relation(&self, missing: bool) {
        self.state.missing_relation.store(missing, Ordering::SeqCst);
    }

    /// Delay every call by `latency` before answering.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.state.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Apply the configured faults for a call against `relation`.
    pub(crate) async fn check(&self, relation: &'static str) -> StoreResult<()> {
        let latency = self.state.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!(
                "{relation}: simulated outage"
            )));
        }
        if self.state.missing_relation.load(Ordering::SeqCst) {
            return Err(StorageError::MissingRelation(relation.to_string()));
        }
        Ok(())
    }
}

/// Map a poisoned lock to a storage error.
pub(crate) fn poisoned<T>(_: T) -> StorageError {
    StorageError::Query("Mutex lock failed".to_string())
}
