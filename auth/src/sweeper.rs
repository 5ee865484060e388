//! Background sweeper.
//!
//! Deletes expired state from every store:
//!
//! - OTP records past expiry, or consumed longer ago than the retention
//! - token registry records past expiry
//! - blacklist entries past expiry, in both revocation tiers
//!
//! OTPs and tokens are swept on one schedule (hourly by default), the
//! blacklist on a slower one (every six hours). Every delete is filtered by
//! timestamp, so several processes may sweep concurrently and sweeping twice
//! is harmless. A table that does not exist yet counts as nothing to sweep.

use crate::config::SweeperConfig;
use crate::constants::{STORE_TIMEOUT_MS, metric_names};
use crate::error::{AuthError, Result, StorageError};
use crate::providers::{BlacklistStore, OtpStore, TokenRegistry};
use crate::revocation::RevocationStore;
use crate::utils::bounded;
use keystone_core::environment::Clock;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Rows deleted by one full sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// OTP records deleted.
    pub otp_records: u64,

    /// Token registry records deleted.
    pub token_records: u64,

    /// Durable blacklist entries deleted.
    pub blacklist_entries: u64,
}

impl SweepReport {
    /// Total rows deleted.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.otp_records + self.token_records + self.blacklist_entries
    }
}

/// Periodic purge of expired authentication state.
#[derive(Debug, Clone)]
pub struct Sweeper<S, R, B, C> {
    otp_store: S,
    registry: R,
    revocation: RevocationStore<B, C>,
    clock: C,
    config: SweeperConfig,
    store_timeout: Duration,
}

impl<S, R, B, C> Sweeper<S, R, B, C>
where
    S: OtpStore,
    R: TokenRegistry,
    B: BlacklistStore,
    C: Clock,
{
    /// Create a sweeper with the default schedule.
    #[must_use]
    pub fn new(otp_store: S, registry: R, revocation: RevocationStore<B, C>, clock: C) -> Self {
        Self {
            otp_store,
            registry,
            revocation,
            clock,
            config: SweeperConfig::default(),
            store_timeout: Duration::from_millis(STORE_TIMEOUT_MS),
        }
    }

    /// Replace the schedule and retention settings.
    #[must_use]
    pub fn with_config(mut self, config: SweeperConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the timeout applied to every store call.
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Delete expired and long-consumed OTP records.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] for any failure except a missing table.
    pub async fn sweep_otps(&self) -> Result<u64> {
        let now = self.clock.now();
        let consumed_before = now - self.config.consumed_retention;
        let result = bounded(
            self.store_timeout,
            "otp.purge",
            self.otp_store.purge(now, consumed_before),
        )
        .await;
        finish("otp_records", result)
    }

    /// Delete expired token registry records.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] for any failure except a missing table.
    pub async fn sweep_tokens(&self) -> Result<u64> {
        let result = bounded(
            self.store_timeout,
            "tokens.purge_expired",
            self.registry.purge_expired(self.clock.now()),
        )
        .await;
        finish("token_records", result)
    }

    /// Delete expired blacklist entries from both tiers.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] for any failure except a missing table.
    pub async fn sweep_blacklist(&self) -> Result<u64> {
        let result = self.revocation.purge_expired().await;
        finish("blacklist_entries", result)
    }

    /// Sweep everything now.
    ///
    /// # Errors
    ///
    /// Returns the first failure; tables swept before it stay swept.
    pub async fn run_once(&self) -> Result<SweepReport> {
        Ok(SweepReport {
            otp_records: self.sweep_otps().await?,
            token_records: self.sweep_tokens().await?,
            blacklist_entries: self.sweep_blacklist().await?,
        })
    }

    /// Sweep on both schedules until `shutdown` turns `true` or its sender
    /// is dropped.
    ///
    /// Both schedules fire once immediately on start. Failures are logged
    /// and retried on the next tick.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut records = tokio::time::interval(self.config.records_interval);
        records.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut blacklist = tokio::time::interval(self.config.blacklist_interval);
        blacklist.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            records_interval_secs = self.config.records_interval.as_secs(),
            blacklist_interval_secs = self.config.blacklist_interval.as_secs(),
            "Sweeper started"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = records.tick() => {
                    if let Err(e) = self.sweep_otps().await {
                        tracing::warn!(error = %e, "OTP sweep failed");
                    }
                    if let Err(e) = self.sweep_tokens().await {
                        tracing::warn!(error = %e, "Token sweep failed");
                    }
                }
                _ = blacklist.tick() => {
                    if let Err(e) = self.sweep_blacklist().await {
                        tracing::warn!(error = %e, "Blacklist sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Sweeper stopped");
    }

    /// Run the sweeper on a background task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()>
    where
        S: 'static,
        R: 'static,
        B: 'static,
        C: 'static,
    {
        tokio::spawn(self.run(shutdown))
    }
}

fn finish(table: &'static str, result: Result<u64>) -> Result<u64> {
    match result {
        Ok(deleted) => {
            metrics::counter!(metric_names::SWEEPER_DELETED, "table" => table).increment(deleted);
            tracing::debug!(table = table, deleted, "Swept expired rows");
            Ok(deleted)
        }
        Err(AuthError::Storage(StorageError::MissingRelation(relation))) => {
            tracing::debug!(table = table, relation = %relation, "Table missing, nothing to sweep");
            Ok(0)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockBlacklistStore, MockOtpStore, MockTokenRegistry};
    use crate::providers::{OtpRecord, TokenRecord};
    use crate::state::{OtpPurpose, SubjectId, TokenKind};
    use chrono::Duration as ChronoDuration;
    use keystone_testing::ManualClock;

    type TestSweeper = Sweeper<MockOtpStore, MockTokenRegistry, MockBlacklistStore, ManualClock>;

    struct Fixture {
        sweeper: TestSweeper,
        otp: MockOtpStore,
        registry: MockTokenRegistry,
        blacklist: MockBlacklistStore,
        revocation: RevocationStore<MockBlacklistStore, ManualClock>,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let otp = MockOtpStore::new();
        let registry = MockTokenRegistry::new();
        let blacklist = MockBlacklistStore::new();
        let clock = ManualClock::default();
        let revocation = RevocationStore::new(blacklist.clone(), clock.clone());
        let sweeper = Sweeper::new(otp.clone(), registry.clone(), revocation.clone(), clock.clone());
        Fixture {
            sweeper,
            otp,
            registry,
            blacklist,
            revocation,
            clock,
        }
    }

    async fn seed(f: &Fixture) {
        let now = f.clock.now();
        f.otp
            .insert(OtpRecord::new("a@x.com", "111111", OtpPurpose::Login, now, ChronoDuration::minutes(10)))
            .await
            .unwrap();
        f.registry
            .insert(TokenRecord {
                subject_id: SubjectId(1),
                kind: TokenKind::Access,
                token_hash: "t".into(),
                expires_at: now + ChronoDuration::hours(1),
                created_at: now,
            })
            .await
            .unwrap();
        f.revocation.add("b", now + ChronoDuration::hours(2)).await.unwrap();
    }

    #[tokio::test]
    async fn sweeps_only_expired_rows() {
        let f = fixture();
        seed(&f).await;

        assert_eq!(f.sweeper.run_once().await.unwrap(), SweepReport::default());

        f.clock.advance(ChronoDuration::hours(3));
        let report = f.sweeper.run_once().await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                otp_records: 1,
                token_records: 1,
                blacklist_entries: 1,
            }
        );
        assert!(f.revocation.cache().is_empty());
    }

    #[tokio::test]
    async fn sweeping_is_idempotent() {
        let f = fixture();
        seed(&f).await;
        f.clock.advance(ChronoDuration::hours(3));

        assert_eq!(f.sweeper.run_once().await.unwrap().total(), 3);
        assert_eq!(f.sweeper.run_once().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn consumed_codes_are_kept_for_retention_period() {
        let f = fixture();
        let now = f.clock.now();
        f.otp
            .insert(OtpRecord::new("a@x.com", "111111", OtpPurpose::Login, now, ChronoDuration::days(2)))
            .await
            .unwrap();
        f.otp.consume("a@x.com", "111111", OtpPurpose::Login, now).await.unwrap();

        f.clock.advance(ChronoDuration::hours(23));
        assert_eq!(f.sweeper.sweep_otps().await.unwrap(), 0);

        f.clock.advance(ChronoDuration::hours(2));
        assert_eq!(f.sweeper.sweep_otps().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_tables_are_tolerated() {
        let f = fixture();
        f.otp.faults().set_missing_relation(true);
        f.registry.faults().set_missing_relation(true);
        f.blacklist.faults().set_missing_relation(true);

        assert_eq!(f.sweeper.run_once().await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn outages_are_reported() {
        let f = fixture();
        f.registry.faults().set_unavailable(true);

        let err = f.sweeper.run_once().await.unwrap_err();
        assert!(matches!(err, AuthError::Storage(StorageError::Unavailable(_))));
    }

    #[tokio::test]
    async fn background_task_stops_on_shutdown() {
        let f = fixture();
        seed(&f).await;
        f.clock.advance(ChronoDuration::hours(3));

        let (tx, rx) = watch::channel(false);
        let handle = f.sweeper.spawn(rx);

        // The first tick of each schedule fires immediately
        tokio::time::timeout(Duration::from_secs(5), async {
            while f.otp.get_all().len() + f.registry.count() + f.blacklist.count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
