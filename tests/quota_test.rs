// tests/quota_test.rs — Integration test: daily quota ledger

use chatrelay::infra::config::QuotaConfig;
use chatrelay::store::quota::QuotaLedger;
use chatrelay::store::settings::SettingsStore;
use chatrelay::store::{KvHandle, StoreManager};

fn spawn_store() -> KvHandle {
    let manager = StoreManager::in_memory().unwrap();
    let (kv, _join) = manager.spawn();
    kv
}

fn limited(limit: u32) -> QuotaConfig {
    QuotaConfig {
        enabled: true,
        daily_limit: Some(limit),
    }
}

#[tokio::test]
async fn test_quota_monotonicity_without_key() {
    let kv = spawn_store();
    let ledger = QuotaLedger::new(kv, limited(3));

    for expected in 1..=3u32 {
        let outcome = ledger.claim("u1", Some("s1")).await;
        assert!(outcome.allowed, "claim {expected} should pass");
        assert_eq!(outcome.count, expected);
        assert_eq!(outcome.limit, 3);
        assert!(!outcome.has_own_key);
    }

    let fourth = ledger.claim("u1", Some("s1")).await;
    assert!(!fourth.allowed);
    assert_eq!(fourth.count, 3);

    // denial records nothing: a fifth claim sees the same count
    let fifth = ledger.claim("u1", Some("s1")).await;
    assert!(!fifth.allowed);
    assert_eq!(fifth.count, 3);
}

#[tokio::test]
async fn test_quota_is_per_user() {
    let kv = spawn_store();
    let ledger = QuotaLedger::new(kv, limited(1));

    assert!(ledger.claim("u1", None).await.allowed);
    assert!(!ledger.claim("u1", None).await.allowed);
    assert!(ledger.claim("u2", None).await.allowed);
}

#[tokio::test]
async fn test_key_holder_is_never_limited() {
    let kv = spawn_store();
    let settings = SettingsStore::new(kv.clone(), limited(5));
    settings.save_api_key("u1", "sk-test-key-000000000000").await.unwrap();

    let ledger = QuotaLedger::new(kv.clone(), limited(5));
    for _ in 0..50 {
        let outcome = ledger.claim("u1", Some("s1")).await;
        assert!(outcome.allowed);
        assert!(outcome.has_own_key);
        assert_eq!(outcome.count, 0);
    }

    // usage is still recorded for analytics
    let recorded = kv.zmembers("usage:u1").await.unwrap();
    assert_eq!(recorded.len(), 50);
}

#[tokio::test]
async fn test_disabled_limiting_admits_everything() {
    let kv = spawn_store();
    let ledger = QuotaLedger::new(
        kv.clone(),
        QuotaConfig {
            enabled: false,
            daily_limit: None,
        },
    );

    for _ in 0..10 {
        let outcome = ledger.claim("u1", None).await;
        assert!(outcome.allowed);
        assert_eq!(outcome.count, 0);
        assert_eq!(outcome.limit, 0);
    }

    // nothing is counted when limiting is off
    assert!(kv.zmembers("usage:u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_usage_member_carries_session_and_time() {
    let kv = spawn_store();
    let ledger = QuotaLedger::new(kv.clone(), limited(5));
    ledger.claim("u1", Some("chat-9")).await;
    ledger.claim("u1", None).await;

    let members = kv.zmembers("usage:u1").await.unwrap();
    assert_eq!(members.len(), 2);
    assert!(members.iter().any(|m| m.starts_with("chat-9:")));
    assert!(members.iter().any(|m| m.starts_with("unknown:")));
}

#[tokio::test]
async fn test_snapshot_zeroes_count_for_key_holders() {
    let kv = spawn_store();
    let settings = SettingsStore::new(kv.clone(), limited(5));
    let ledger = QuotaLedger::new(kv.clone(), limited(5));

    // two charged questions, then the user adds a key
    ledger.claim("u1", None).await;
    ledger.claim("u1", None).await;
    settings.save_api_key("u1", "sk-test-key-000000000000").await.unwrap();

    let snapshot = settings.snapshot("u1", "u1@example.com").await;
    assert!(snapshot.has_api_key);
    assert_eq!(snapshot.daily_count, 0);
    assert_eq!(snapshot.daily_limit, 5);
    assert!(snapshot.limits_enabled);
}

#[tokio::test]
async fn test_snapshot_counts_for_anonymous_key_users() {
    let kv = spawn_store();
    let settings = SettingsStore::new(kv.clone(), limited(5));
    let ledger = QuotaLedger::new(kv.clone(), limited(5));

    ledger.claim("u1", None).await;
    ledger.claim("u1", None).await;

    let snapshot = settings.snapshot("u1", "u1@example.com").await;
    assert!(!snapshot.has_api_key);
    assert_eq!(snapshot.daily_count, 2);
    assert!(snapshot.api_key_masked.is_none());
}

#[tokio::test]
async fn test_snapshot_masks_key() {
    let kv = spawn_store();
    let settings = SettingsStore::new(kv.clone(), limited(5));
    settings
        .save_api_key("u1", "sk-ant-REDACTED")
        .await
        .unwrap();

    let snapshot = settings.snapshot("u1", "u1@example.com").await;
    assert_eq!(
        snapshot.api_key_masked.as_deref(),
        Some("sk-ant-api03-abc...0123")
    );
}
