//! File-backed OTP store.
//!
//! The ephemeral tier used when the database is unreachable. All records are
//! held in one JSON array; every mutation rewrites the file through a sibling
//! temp file and a rename, so a crash never leaves a half-written file.
//!
//! The store is process-local: the async mutex serializes callers within one
//! process, and nothing coordinates separate processes sharing the path.

use crate::error::StorageError;
use crate::providers::otp_store::consume_in_place;
use crate::providers::{ConsumeOutcome, OtpRecord, OtpStore, StoreResult};
use crate::state::OtpPurpose;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// OTP store persisted to a local JSON file.
#[derive(Debug, Clone)]
pub struct FileOtpStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileOtpStore {
    /// Create a store writing to `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StoreResult<Vec<OtpRecord>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::Serialization(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StorageError::Unavailable(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, records: &[OtpRecord]) -> StoreResult<()> {
        let bytes = serde_json::to_vec(records)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(unavailable)?;
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(unavailable)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(e: std::io::Error) -> StorageError {
    StorageError::Unavailable(format!("fallback file: {e}"))
}

impl OtpStore for FileOtpStore {
    async fn insert(&self, record: OtpRecord) -> StoreResult<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        records.push(record);
        self.save(&records).await
    }

    async fn is_code_active(&self, code: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let _guard = self.lock.lock().await;
        let records = self.load().await?;
        Ok(records.iter().any(|r| r.code == code && r.is_active(now)))
    }

    async fn consume(
        &self,
        identifier: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> StoreResult<ConsumeOutcome> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let outcome = consume_in_place(&mut records, identifier, code, purpose, now);
        if matches!(outcome, ConsumeOutcome::Consumed(_)) {
            self.save(&records).await?;
        }
        Ok(outcome)
    }

    async fn purge(&self, now: DateTime<Utc>, consumed_before: DateTime<Utc>) -> StoreResult<u64> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let before = records.len();
        records.retain(|r| r.expires_at > now && !(r.consumed && r.created_at < consumed_before));

        let purged = before - records.len();
        if purged > 0 {
            self.save(&records).await?;
        }
        Ok(purged as u64)
    }
}
