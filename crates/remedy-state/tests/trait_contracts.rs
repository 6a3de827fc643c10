//! Trait contract tests for RemediationStore, DiagnosticReader and CounterStore.
//!
//! Store contracts run against both the in-memory fake and the in-memory
//! SurrealDB backend. Any conforming implementation must pass these.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use remedy_state::fakes::{MemoryCounterStore, MemoryRemediationStore};
use remedy_state::storage_traits::*;
use remedy_state::{StorageError, SurrealRemediationStore};

fn sample_error(id: i64) -> DetectedError {
    DetectedError::new(
        ErrorId(id),
        "runtime",
        ErrorSeverity::High,
        "TypeError: cannot read property 'total' of undefined",
        "server/billing.ts",
    )
}

fn sample_patch(id: i64, error_id: i64) -> Patch {
    Patch::new(
        PatchId(id),
        ErrorId(error_id),
        "v1",
        format!("fix/error-{error_id}"),
        vec!["server/billing.ts".to_string()],
    )
}

// ===========================================================================
// RemediationStore contracts (shared)
// ===========================================================================

async fn contract_error_round_trip(store: &dyn RemediationStore) {
    store.put_error(sample_error(42)).await.unwrap();
    let loaded = store.get_error(ErrorId(42)).await.unwrap();
    assert_eq!(loaded.id, ErrorId(42));
    assert_eq!(loaded.location.file, "server/billing.ts");
    assert_eq!(loaded.status, ErrorStatus::Detected);

    store
        .set_error_status(ErrorId(42), ErrorStatus::Resolved)
        .await
        .unwrap();
    let loaded = store.get_error(ErrorId(42)).await.unwrap();
    assert_eq!(loaded.status, ErrorStatus::Resolved);
}

async fn contract_missing_records(store: &dyn RemediationStore) {
    let err = store.get_error(ErrorId(999)).await.unwrap_err();
    assert!(matches!(err, StorageError::ErrorNotFound { id: 999 }));

    let err = store.get_patch(PatchId(999)).await.unwrap_err();
    assert!(matches!(err, StorageError::PatchNotFound { id: 999 }));

    let err = store
        .set_error_status(ErrorId(999), ErrorStatus::Resolved)
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = store.update_patch(&sample_patch(999, 1)).await.unwrap_err();
    assert!(err.is_not_found());
}

async fn contract_compare_and_set(store: &dyn RemediationStore) {
    let patch = sample_patch(7, 42);
    store.put_patch(patch.clone()).await.unwrap();

    let mut testing = patch.clone();
    testing.validation_status = ValidationStatus::Testing;

    let won = store
        .update_patch_if(&testing, patch.state())
        .await
        .unwrap();
    assert!(won);

    // Second writer still expects the original state and must lose.
    let lost = store
        .update_patch_if(&testing, patch.state())
        .await
        .unwrap();
    assert!(!lost);

    let stored = store.get_patch(PatchId(7)).await.unwrap();
    assert_eq!(stored.validation_status, ValidationStatus::Testing);
    assert_eq!(stored.deployment_status, DeploymentStatus::Generated);
}

async fn contract_update_keeps_fields(store: &dyn RemediationStore) {
    let mut patch = sample_patch(8, 42);
    store.put_patch(patch.clone()).await.unwrap();

    patch.deployment_status = DeploymentStatus::Rejected;
    patch.rejection_reason = Some("kill switch".to_string());
    patch.test_results = Some(serde_json::json!({"success": false}));
    store.update_patch(&patch).await.unwrap();

    let stored = store.get_patch(PatchId(8)).await.unwrap();
    assert_eq!(stored.deployment_status, DeploymentStatus::Rejected);
    assert_eq!(stored.rejection_reason.as_deref(), Some("kill switch"));
    assert_eq!(stored.test_results, Some(serde_json::json!({"success": false})));
    assert_eq!(stored.modified_files, vec!["server/billing.ts".to_string()]);
}

async fn contract_windows(store: &dyn RemediationStore) {
    let now = Utc::now();

    let mut old = sample_error(1);
    old.first_seen = now - ChronoDuration::hours(30);
    let mut recent = sample_error(2);
    recent.first_seen = now - ChronoDuration::hours(2);
    store.put_error(old).await.unwrap();
    store.put_error(recent).await.unwrap();

    let mut old_patch = sample_patch(1, 1);
    old_patch.created_at = now - ChronoDuration::hours(30);
    let mut recent_patch = sample_patch(2, 2);
    recent_patch.created_at = now - ChronoDuration::hours(1);
    store.put_patch(old_patch).await.unwrap();
    store.put_patch(recent_patch).await.unwrap();

    let from = now - ChronoDuration::hours(12);
    let errors = store.list_errors_between(from, now).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].id, ErrorId(2));

    let patches = store.list_patches_between(from, now).await.unwrap();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].id, PatchId(2));
}

async fn contract_health_snapshots(store: &dyn RemediationStore) {
    assert!(store.latest_health_check().await.unwrap().is_none());

    let mut first = HealthCheckResult::from_probes(true, true, false, vec!["endpoint down".into()]);
    first.checked_at = Utc::now() - ChronoDuration::minutes(10);
    let second = HealthCheckResult::from_probes(true, true, true, vec![]);
    store.record_health_check(&first).await.unwrap();
    store.record_health_check(&second).await.unwrap();

    let latest = store.latest_health_check().await.unwrap().unwrap();
    assert!(latest.healthy);
}

async fn contract_latest_diagnostic<S: RemediationStore + DiagnosticReader>(store: &S) {
    for (id, impact) in [(1, "high"), (2, "low")] {
        store
            .put_diagnostic(Diagnostic {
                id: DiagnosticId(id),
                error_id: ErrorId(42),
                root_cause: serde_json::json!({"summary": "null total"}),
                impact: impact.to_string(),
                affected_features: vec!["billing".to_string()],
                confidence: 0.8,
            })
            .await
            .unwrap();
    }

    let diag = store.diagnostic_for_error(ErrorId(42)).await.unwrap().unwrap();
    assert_eq!(diag.id, DiagnosticId(2));
    assert_eq!(diag.impact, "low");
    assert!(store
        .diagnostic_for_error(ErrorId(43))
        .await
        .unwrap()
        .is_none());
}

// ===========================================================================
// Memory store
// ===========================================================================

#[tokio::test]
async fn memory_error_round_trip() {
    contract_error_round_trip(&MemoryRemediationStore::new()).await;
}

#[tokio::test]
async fn memory_missing_records() {
    contract_missing_records(&MemoryRemediationStore::new()).await;
}

#[tokio::test]
async fn memory_compare_and_set() {
    contract_compare_and_set(&MemoryRemediationStore::new()).await;
}

#[tokio::test]
async fn memory_update_keeps_fields() {
    contract_update_keeps_fields(&MemoryRemediationStore::new()).await;
}

#[tokio::test]
async fn memory_windows() {
    contract_windows(&MemoryRemediationStore::new()).await;
}

#[tokio::test]
async fn memory_health_snapshots() {
    contract_health_snapshots(&MemoryRemediationStore::new()).await;
}

#[tokio::test]
async fn memory_latest_diagnostic() {
    contract_latest_diagnostic(&MemoryRemediationStore::new()).await;
}

#[tokio::test]
async fn memory_ping_reflects_offline_flag() {
    let store = MemoryRemediationStore::new();
    assert!(store.ping().await.is_ok());
    store.set_offline(true);
    assert!(matches!(
        store.ping().await.unwrap_err(),
        StorageError::Unavailable(_)
    ));
}

// ===========================================================================
// SurrealDB store (in-memory engine)
// ===========================================================================

#[tokio::test]
async fn surreal_error_round_trip() {
    let store = SurrealRemediationStore::in_memory().await.unwrap();
    contract_error_round_trip(&store).await;
}

#[tokio::test]
async fn surreal_missing_records() {
    let store = SurrealRemediationStore::in_memory().await.unwrap();
    contract_missing_records(&store).await;
}

#[tokio::test]
async fn surreal_compare_and_set() {
    let store = SurrealRemediationStore::in_memory().await.unwrap();
    contract_compare_and_set(&store).await;
}

#[tokio::test]
async fn surreal_update_keeps_fields() {
    let store = SurrealRemediationStore::in_memory().await.unwrap();
    contract_update_keeps_fields(&store).await;
}

#[tokio::test]
async fn surreal_windows() {
    let store = SurrealRemediationStore::in_memory().await.unwrap();
    contract_windows(&store).await;
}

#[tokio::test]
async fn surreal_health_snapshots() {
    let store = SurrealRemediationStore::in_memory().await.unwrap();
    contract_health_snapshots(&store).await;
}

#[tokio::test]
async fn surreal_latest_diagnostic() {
    let store = SurrealRemediationStore::in_memory().await.unwrap();
    contract_latest_diagnostic(&store).await;
}

#[tokio::test]
async fn surreal_ping_succeeds() {
    let store = SurrealRemediationStore::in_memory().await.unwrap();
    store.ping().await.unwrap();
}

// ===========================================================================
// CounterStore contracts (memory)
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn counter_increments_within_window() {
    let counters = MemoryCounterStore::new();
    let ttl = Duration::from_secs(1800);

    let first = counters.incr_with_ttl("k", ttl).await.unwrap();
    assert_eq!(first.value, 1);
    assert_eq!(first.ttl, Some(ttl));

    tokio::time::advance(Duration::from_secs(60)).await;
    let second = counters.incr_with_ttl("k", ttl).await.unwrap();
    assert_eq!(second.value, 2);
    // The window is fixed from the first increment.
    assert_eq!(second.ttl, Some(Duration::from_secs(1740)));
}

#[tokio::test(start_paused = true)]
async fn counter_expires_after_ttl() {
    let counters = MemoryCounterStore::new();
    let ttl = Duration::from_secs(1800);

    counters.incr_with_ttl("k", ttl).await.unwrap();
    counters.incr_with_ttl("k", ttl).await.unwrap();

    tokio::time::advance(Duration::from_secs(1801)).await;
    assert!(counters.peek("k").await.unwrap().is_none());

    let restarted = counters.incr_with_ttl("k", ttl).await.unwrap();
    assert_eq!(restarted.value, 1);
}

#[tokio::test]
async fn counter_clear_removes_key() {
    let counters = MemoryCounterStore::new();
    counters
        .incr_with_ttl("k", Duration::from_secs(60))
        .await
        .unwrap();
    counters.clear("k").await.unwrap();
    assert!(counters.peek("k").await.unwrap().is_none());
    // Clearing an absent key is a no-op.
    counters.clear("k").await.unwrap();
}

#[tokio::test]
async fn counter_unavailable_surfaces_error() {
    let counters = MemoryCounterStore::new();
    counters.set_unavailable(true);
    let err = counters
        .incr_with_ttl("k", Duration::from_secs(60))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(_)));
}

// ===========================================================================
// CounterStore on SurrealDB
// ===========================================================================

#[tokio::test]
async fn surreal_counter_increments_within_window() {
    let counters = SurrealRemediationStore::in_memory().await.unwrap();
    let ttl = Duration::from_secs(1800);

    let first = counters.incr_with_ttl("safety_lock:a1", ttl).await.unwrap();
    assert_eq!(first.value, 1);
    let second = counters.incr_with_ttl("safety_lock:a1", ttl).await.unwrap();
    assert_eq!(second.value, 2);
    // The deadline is fixed by the first increment.
    assert!(second.ttl.unwrap() <= first.ttl.unwrap());
    assert!(second.ttl.unwrap() > Duration::from_secs(1790));

    let other = counters.incr_with_ttl("safety_lock:b2", ttl).await.unwrap();
    assert_eq!(other.value, 1);

    let peeked = counters.peek("safety_lock:a1").await.unwrap().unwrap();
    assert_eq!(peeked.value, 2);
    assert!(counters.peek("safety_lock:missing").await.unwrap().is_none());
}

#[tokio::test]
async fn surreal_counter_restarts_after_expiry() {
    let counters = SurrealRemediationStore::in_memory().await.unwrap();
    let ttl = Duration::from_secs(1);

    counters.incr_with_ttl("k", ttl).await.unwrap();
    counters.incr_with_ttl("k", ttl).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(counters.peek("k").await.unwrap().is_none());

    let restarted = counters.incr_with_ttl("k", ttl).await.unwrap();
    assert_eq!(restarted.value, 1);
}

#[tokio::test]
async fn surreal_counter_clear_removes_key() {
    let counters = SurrealRemediationStore::in_memory().await.unwrap();
    counters
        .incr_with_ttl("k", Duration::from_secs(60))
        .await
        .unwrap();
    counters.clear("k").await.unwrap();
    assert!(counters.peek("k").await.unwrap().is_none());
    counters.clear("k").await.unwrap();

    let fresh = counters
        .incr_with_ttl("k", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(fresh.value, 1);
}

#[tokio::test]
async fn surreal_counter_is_shared_between_handles() {
    let store = SurrealRemediationStore::in_memory().await.unwrap();
    let other = store.clone();
    let ttl = Duration::from_secs(600);

    store.incr_with_ttl("k", ttl).await.unwrap();
    store.incr_with_ttl("k", ttl).await.unwrap();
    let third = other.incr_with_ttl("k", ttl).await.unwrap();

    assert_eq!(third.value, 3);
}

#[tokio::test]
async fn surreal_file_backend_initializes() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("surrealkv://{}", dir.path().join("db").display());
    let store = SurrealRemediationStore::connect(&url).await.unwrap();
    store.put_error(sample_error(42)).await.unwrap();
    store
        .incr_with_ttl("k", Duration::from_secs(600))
        .await
        .unwrap();
    store
        .record_health_check(&HealthCheckResult::from_probes(true, true, true, vec![]))
        .await
        .unwrap();
    assert!(store.latest_health_check().await.unwrap().unwrap().healthy);
}
