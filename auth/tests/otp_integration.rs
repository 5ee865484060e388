//! One-time passcode integration tests.
//!
//! Drives [`OtpManager`] end to end over the in-memory and file-backed
//! stores:
//!
//! - issue → deliver → verify round trip
//! - exactly one winner among concurrent verifications
//! - expiry driven by a simulated clock
//! - transparent fallback to the file store during an outage
//! - slow stores surface as storage errors, never as "invalid"

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::Duration;
use keystone_auth::mocks::{MockNotifier, MockOtpStore};
use keystone_auth::state::OtpPurpose;
use keystone_auth::stores::{FallbackOtpStore, FileOtpStore};
use keystone_auth::{AuthError, OtpManager, OtpVerdict, StorageError};
use keystone_testing::ManualClock;
use std::sync::Arc;
use tokio::task::JoinSet;

type Manager = OtpManager<MockOtpStore, MockNotifier, ManualClock>;

fn manager() -> (Manager, MockOtpStore, MockNotifier, ManualClock) {
    let store = MockOtpStore::new();
    let notifier = MockNotifier::new();
    let clock = ManualClock::default();
    let manager = OtpManager::new(store.clone(), notifier.clone(), clock.clone());
    (manager, store, notifier, clock)
}

#[tokio::test]
async fn signup_code_round_trip() {
    // Arrange
    let (manager, _, notifier, _) = manager();

    // Act
    let issued = manager
        .issue("  New.User@Example.com ", OtpPurpose::Signup)
        .await
        .unwrap();
    let code = notifier.last_code_for("new.user@example.com").unwrap();

    // Assert
    assert_eq!(issued.identifier, "new.user@example.com");
    assert_eq!(
        manager.verify("new.user@example.com", &code, OtpPurpose::Signup).await.unwrap(),
        OtpVerdict::Valid
    );
    assert_eq!(
        manager.verify("new.user@example.com", &code, OtpPurpose::Signup).await.unwrap(),
        OtpVerdict::AlreadyUsed
    );
}

#[tokio::test]
async fn code_is_bound_to_its_purpose() {
    let (manager, _, notifier, _) = manager();
    manager.issue("a@x.com", OtpPurpose::Signup).await.unwrap();
    let code = notifier.last_code_for("a@x.com").unwrap();

    assert_eq!(
        manager.verify("a@x.com", &code, OtpPurpose::PasswordReset).await.unwrap(),
        OtpVerdict::Invalid
    );
    assert_eq!(
        manager.verify("a@x.com", &code, OtpPurpose::Signup).await.unwrap(),
        OtpVerdict::Valid
    );
}

#[tokio::test]
async fn concurrent_verifications_have_one_winner() {
    // Arrange
    let (manager, _, notifier, _) = manager();
    manager.issue("race@x.com", OtpPurpose::Login).await.unwrap();
    let code = Arc::new(notifier.last_code_for("race@x.com").unwrap());

    // Act
    let mut tasks = JoinSet::new();
    for _ in 0..16 {
        let manager = manager.clone();
        let code = Arc::clone(&code);
        tasks.spawn(async move { manager.verify("race@x.com", &code, OtpPurpose::Login).await });
    }

    let mut verdicts = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        verdicts.push(joined.unwrap().unwrap());
    }

    // Assert
    assert_eq!(verdicts.iter().filter(|v| v.is_valid()).count(), 1);
    assert!(
        verdicts
            .iter()
            .filter(|v| !v.is_valid())
            .all(|v| *v == OtpVerdict::AlreadyUsed)
    );
}

#[tokio::test]
async fn code_expires_after_ttl() {
    let (manager, _, notifier, clock) = manager();
    manager.issue("slow@x.com", OtpPurpose::Login).await.unwrap();
    let code = notifier.last_code_for("slow@x.com").unwrap();

    clock.advance(Duration::minutes(10) + Duration::seconds(1));

    let verdict = manager.verify("slow@x.com", &code, OtpPurpose::Login).await.unwrap();
    assert_eq!(verdict, OtpVerdict::Expired);
    assert_eq!(verdict.reason(), "expired");
}

#[tokio::test]
async fn earlier_codes_stay_valid_after_reissue() {
    let (manager, _, notifier, _) = manager();
    manager.issue("a@x.com", OtpPurpose::Login).await.unwrap();
    let first = notifier.last_code_for("a@x.com").unwrap();
    manager.issue("a@x.com", OtpPurpose::Login).await.unwrap();
    let second = notifier.last_code_for("a@x.com").unwrap();

    assert!(manager.verify("a@x.com", &first, OtpPurpose::Login).await.unwrap().is_valid());
    assert!(manager.verify("a@x.com", &second, OtpPurpose::Login).await.unwrap().is_valid());
}

#[tokio::test]
async fn refused_delivery_is_reported() {
    let (manager, store, notifier, _) = manager();
    notifier.set_refuse(true);

    let err = manager.issue("a@x.com", OtpPurpose::Login).await.unwrap_err();
    assert!(matches!(err, AuthError::DeliveryFailed(_)));
    assert_eq!(store.get_all().len(), 1, "the stored record is left to expire");
}

#[tokio::test]
async fn malformed_input_never_reaches_the_store() {
    let (manager, store, _, _) = manager();
    store.faults().set_unavailable(true);

    let err = manager.verify("not-an-identifier", "123456", OtpPurpose::Login).await.unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));

    let err = manager.verify("a@x.com", "12ab56", OtpPurpose::Login).await.unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));
}

#[tokio::test]
async fn outage_falls_back_to_file_store() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let primary = MockOtpStore::new();
    let store = FallbackOtpStore::new(primary.clone(), FileOtpStore::new(dir.path().join("otp.json")));
    let notifier = MockNotifier::new();
    let manager = OtpManager::new(store, notifier.clone(), ManualClock::default());

    // Act: issue during the outage, verify after recovery
    primary.faults().set_unavailable(true);
    manager.issue("a@x.com", OtpPurpose::Login).await.unwrap();
    let code = notifier.last_code_for("a@x.com").unwrap();
    primary.faults().set_unavailable(false);

    // Assert
    assert!(primary.get_all().is_empty());
    assert_eq!(
        manager.verify("a@x.com", &code, OtpPurpose::Login).await.unwrap(),
        OtpVerdict::Valid
    );
    assert_eq!(
        manager.verify("a@x.com", &code, OtpPurpose::Login).await.unwrap(),
        OtpVerdict::AlreadyUsed
    );
}

#[tokio::test]
async fn hung_primary_falls_back_within_the_store_timeout() {
    // Arrange
    let primary = MockOtpStore::new();
    let secondary = MockOtpStore::new();
    let store = FallbackOtpStore::new(primary.clone(), secondary.clone())
        .with_primary_timeout(std::time::Duration::from_millis(50));
    let manager = OtpManager::new(store, MockNotifier::new(), ManualClock::default())
        .with_store_timeout(std::time::Duration::from_millis(200));
    primary.faults().set_latency(std::time::Duration::from_secs(2));

    // Act
    manager.store("a@x.com", "123456", OtpPurpose::Login).await.unwrap();

    // Assert
    assert_eq!(secondary.get_all().len(), 1);
    assert_eq!(
        manager.verify("a@x.com", "123456", OtpPurpose::Login).await.unwrap(),
        OtpVerdict::Valid
    );
}

#[tokio::test]
async fn unreadable_fallback_tier_is_not_a_wrong_code() {
    let primary = MockOtpStore::new();
    let secondary = MockOtpStore::new();
    let store = FallbackOtpStore::new(primary.clone(), secondary.clone());
    let manager = OtpManager::new(store, MockNotifier::new(), ManualClock::default());

    primary.faults().set_unavailable(true);
    manager.store("a@x.com", "123456", OtpPurpose::Login).await.unwrap();
    primary.faults().set_unavailable(false);
    secondary.faults().set_unavailable(true);

    let err = manager.verify("a@x.com", "123456", OtpPurpose::Login).await.unwrap_err();
    assert!(matches!(err, AuthError::Storage(StorageError::Unavailable(_))));
}

#[tokio::test]
async fn slow_store_is_a_storage_error() {
    let (manager, store, notifier, _) = manager();
    let manager = manager.with_store_timeout(std::time::Duration::from_millis(20));
    manager.issue("a@x.com", OtpPurpose::Login).await.unwrap();
    let code = notifier.last_code_for("a@x.com").unwrap();

    store.faults().set_latency(std::time::Duration::from_millis(200));

    let err = manager.verify("a@x.com", &code, OtpPurpose::Login).await.unwrap_err();
    assert!(matches!(err, AuthError::Storage(StorageError::Timeout { .. })));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn outage_without_fallback_is_a_storage_error() {
    let (manager, store, _, _) = manager();
    store.faults().set_unavailable(true);

    let err = manager.verify("a@x.com", "123456", OtpPurpose::Login).await.unwrap_err();
    assert!(matches!(err, AuthError::Storage(StorageError::Unavailable(_))));
}
