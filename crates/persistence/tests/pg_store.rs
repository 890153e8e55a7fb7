//! PostgreSQL store tests.
//!
//! These run only when `TEST_DATABASE_URL` points at a disposable database;
//! otherwise every test returns early.

use std::sync::{Arc, Mutex, MutexGuard};

use domain::models::{CallerIdentity, CodeStatus, Feedback, NewInviteCode, UsageStatus};
use domain::services::{AllocationStore, CodeRepository, InviteStore, UsageLedger};
use domain::InviteError;
use persistence::db::{create_pool, run_migrations, DatabaseConfig};
use persistence::PgInviteStore;
use uuid::Uuid;

/// Tests share one database and the claim path picks the globally oldest
/// code, so they run one at a time.
static SERIAL: Mutex<()> = Mutex::new(());

async fn test_store() -> Option<(MutexGuard<'static, ()>, PgInviteStore)> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let guard = SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let config = DatabaseConfig {
        url,
        max_connections: 10,
        min_connections: 1,
        connect_timeout_secs: 10,
        idle_timeout_secs: 60,
    };
    let pool = create_pool(&config).await.expect("connect to test database");
    run_migrations(&pool).await.expect("run migrations");
    Some((guard, PgInviteStore::new(pool)))
}

/// Code values are unique per test run so tests can share a database.
fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

fn caller(ip_hash: &str) -> CallerIdentity {
    CallerIdentity::new(ip_hash, Some("pg-test".to_string()))
}

#[tokio::test]
async fn test_create_and_find_code() {
    let Some((_guard, store)) = test_store().await else { return };
    let value = unique("FIND");

    let created = store
        .create_code(NewInviteCode::available(value.clone(), 4))
        .await
        .unwrap();
    assert_eq!(created.status, CodeStatus::Available);
    assert_eq!(created.max_uses, 4);

    let by_value = store.find_code_by_value(&value).await.unwrap().unwrap();
    assert_eq!(by_value.id, created.id);

    let duplicate = store
        .create_code(NewInviteCode::available(value.clone(), 4))
        .await;
    assert!(matches!(duplicate, Err(InviteError::DuplicateCode(c)) if c == value));

    assert!(store.delete_code(created.id).await.unwrap());
}

#[tokio::test]
async fn test_claim_excluding_everything_else() {
    let Some((_guard, store)) = test_store().await else { return };
    let code = store
        .create_code(NewInviteCode::available(unique("CLAIM"), 2))
        .await
        .unwrap();

    // Exclude every other claimable code so the test owns the selection.
    let others: Vec<Uuid> = store
        .list_codes()
        .await
        .unwrap()
        .into_iter()
        .filter(|c| c.id != code.id)
        .map(|c| c.id)
        .collect();

    let first = store
        .claim_next(&caller("pg-a"), &others)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.code.id, code.id);
    assert_eq!(first.code.status, CodeStatus::Active);
    assert_eq!(first.usage.status, UsageStatus::Claimed);

    let second = store
        .claim_next(&caller("pg-b"), &others)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.code.status, CodeStatus::Exhausted);

    // Leftovers from earlier runs are excluded; nothing else is claimable.
    let third = store
        .claim_next(&caller("pg-c"), &others)
        .await
        .unwrap();
    assert!(third.is_none());

    assert!(store.delete_code(code.id).await.unwrap());
    assert!(store.find_usage_by_id(first.usage.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_claims_respect_capacity() {
    let Some((_guard, store)) = test_store().await else { return };
    let store = Arc::new(store);
    let code = store
        .create_code(NewInviteCode::available(unique("RACE"), 3))
        .await
        .unwrap();
    let others: Arc<Vec<Uuid>> = Arc::new(
        store
            .list_codes()
            .await
            .unwrap()
            .into_iter()
            .filter(|c| c.id != code.id)
            .map(|c| c.id)
            .collect(),
    );

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        let others = others.clone();
        handles.push(tokio::spawn(async move {
            store
                .claim_next(&caller(&format!("race-{}", i)), &others)
                .await
        }));
    }

    let mut won = 0;
    for handle in handles {
        if let Some(claim) = handle.await.unwrap().unwrap() {
            if claim.code.id == code.id {
                won += 1;
            }
        }
    }
    assert_eq!(won, 3);

    let stored = store.find_code_by_id(code.id).await.unwrap().unwrap();
    assert_eq!(stored.usage_count, 3);
    assert_eq!(stored.status, CodeStatus::Exhausted);
    assert_eq!(store.list_usages_for_code(code.id).await.unwrap().len(), 3);

    store.delete_code(code.id).await.unwrap();
}

#[tokio::test]
async fn test_contribute_attributes_latest_usage_once() {
    let Some((_guard, store)) = test_store().await else { return };
    let pool_code = store
        .create_code(NewInviteCode::available(unique("POOL"), 6))
        .await
        .unwrap();
    let ip_hash = unique("ip");
    let usage = store
        .record_claim(pool_code.id, &ip_hash, None)
        .await
        .unwrap();

    let first = store
        .contribute(NewInviteCode::available(unique("GIFT"), 6), &ip_hash)
        .await
        .unwrap();
    let linked = first.attributed_usage.unwrap();
    assert_eq!(linked.id, usage.id);
    assert_eq!(linked.status, UsageStatus::Confirmed);

    let second = store
        .contribute(NewInviteCode::available(unique("GIFT"), 6), &ip_hash)
        .await
        .unwrap();
    assert!(second.attributed_usage.is_none());

    let duplicate = store
        .contribute(
            NewInviteCode::available(first.code.code.clone(), 6),
            &ip_hash,
        )
        .await;
    assert!(matches!(duplicate, Err(InviteError::DuplicateCode(_))));

    for id in [pool_code.id, first.code.id, second.code.id] {
        store.delete_code(id).await.unwrap();
    }
}

#[tokio::test]
async fn test_record_feedback_once() {
    let Some((_guard, store)) = test_store().await else { return };
    let code = store
        .create_code(NewInviteCode::available(unique("FB"), 6))
        .await
        .unwrap();
    let usage = store.record_claim(code.id, "fb", None).await.unwrap();

    let first = store
        .record_feedback(usage.id, Feedback::NotWorking, Some("rejected"))
        .await
        .unwrap()
        .unwrap();
    assert!(first.newly_recorded);

    let again = store
        .record_feedback(usage.id, Feedback::NotWorking, None)
        .await
        .unwrap()
        .unwrap();
    assert!(!again.newly_recorded);
    assert_eq!(again.usage.note.as_deref(), Some("rejected"));

    let stored = store.find_code_by_id(code.id).await.unwrap().unwrap();
    assert_eq!(stored.not_working_reports, 1);

    store.delete_code(code.id).await.unwrap();
}

#[tokio::test]
async fn test_create_codes_rejects_existing_values() {
    let Some((_guard, store)) = test_store().await else { return };
    let existing = store
        .create_code(NewInviteCode::available(unique("BATCH"), 6))
        .await
        .unwrap();
    let fresh = unique("BATCH");

    let result = store
        .create_codes(vec![
            NewInviteCode::available(fresh.clone(), 6),
            NewInviteCode::available(existing.code.clone(), 6),
        ])
        .await;
    assert!(matches!(result, Err(InviteError::DuplicateCode(c)) if c == existing.code));
    assert!(store.find_code_by_value(&fresh).await.unwrap().is_none());

    let created = store
        .create_codes(vec![NewInviteCode::available(fresh.clone(), 2)])
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].max_uses, 2);

    store.delete_code(existing.id).await.unwrap();
    store.delete_code(created[0].id).await.unwrap();
}

#[tokio::test]
async fn test_create_codes_names_only_the_repeated_value() {
    let Some((_guard, store)) = test_store().await else { return };
    let repeated = unique("REPEAT");
    let other = unique("OTHER");

    // The pre-check sees nothing stored; the unique index rejects the insert
    let result = store
        .create_codes(vec![
            NewInviteCode::available(other.clone(), 6),
            NewInviteCode::available(repeated.clone(), 6),
            NewInviteCode::available(repeated.clone(), 6),
        ])
        .await;
    assert!(matches!(result, Err(InviteError::DuplicateCode(c)) if c == repeated));
    assert!(store.find_code_by_value(&other).await.unwrap().is_none());
}

#[tokio::test]
async fn test_mark_usage_used_never_downgrades() {
    let Some((_guard, store)) = test_store().await else { return };
    let code = store
        .create_code(NewInviteCode::available(unique("USED"), 6))
        .await
        .unwrap();
    let plain = store.record_claim(code.id, &unique("ip"), None).await.unwrap();
    let ip_hash = unique("ip");
    let linked = store.record_claim(code.id, &ip_hash, None).await.unwrap();

    let used = store.mark_usage_used(plain.id).await.unwrap().unwrap();
    assert_eq!(used.status, UsageStatus::Used);
    let again = store.mark_usage_used(plain.id).await.unwrap().unwrap();
    assert_eq!(again, used);

    let gift = store
        .contribute(NewInviteCode::available(unique("GIFT"), 6), &ip_hash)
        .await
        .unwrap();
    let confirmed = store.mark_usage_used(linked.id).await.unwrap().unwrap();
    assert_eq!(confirmed.status, UsageStatus::Confirmed);
    assert_eq!(confirmed.contributed_code_id, Some(gift.code.id));

    assert!(store.mark_usage_used(Uuid::new_v4()).await.unwrap().is_none());

    store.delete_code(code.id).await.unwrap();
    store.delete_code(gift.code.id).await.unwrap();
}

#[tokio::test]
async fn test_restore_code_status_from_counters() {
    let Some((_guard, store)) = test_store().await else { return };
    let code = store
        .create_code(NewInviteCode::available(unique("RESTORE"), 6))
        .await
        .unwrap();

    store
        .update_code_status(code.id, CodeStatus::Invalid)
        .await
        .unwrap();
    let restored = store.restore_code_status(code.id).await.unwrap().unwrap();
    assert_eq!(restored.status, CodeStatus::Available);
    assert!(restored.updated_at >= code.updated_at);

    assert!(store.restore_code_status(Uuid::new_v4()).await.unwrap().is_none());
    store.delete_code(code.id).await.unwrap();
}

#[tokio::test]
async fn test_ping() {
    let Some((_guard, store)) = test_store().await else { return };
    store.ping().await.unwrap();
    assert_eq!(store.backend(), "postgres");
}
