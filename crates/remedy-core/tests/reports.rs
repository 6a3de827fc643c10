//! Report aggregation and dispatch.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use remedy_core::fakes::MemoryNotifier;
use remedy_core::report::MAX_LISTED_ERRORS;
use remedy_core::{Impact, NotificationService, Priority, ReportGenerator, ReportPeriod};
use remedy_state::fakes::MemoryRemediationStore;
use remedy_state::{
    DeploymentStatus, DetectedError, Diagnostic, DiagnosticId, ErrorId, ErrorSeverity,
    ErrorStatus, HealthCheckResult, Patch, PatchId, RemediationStore,
};

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, hour, 0, 0).unwrap()
}

fn error_at(id: i64, severity: ErrorSeverity, seen: DateTime<Utc>) -> DetectedError {
    let mut error = DetectedError::new(ErrorId(id), "runtime", severity, "boom", "src/app.ts");
    error.first_seen = seen;
    error.last_seen = seen;
    error
}

fn patch_at(id: i64, error_id: i64, status: DeploymentStatus, created: DateTime<Utc>) -> Patch {
    let mut patch = Patch::new(
        PatchId(id),
        ErrorId(error_id),
        "v1",
        format!("fix/error-{error_id}"),
        vec!["src/app.ts".to_string()],
    );
    patch.deployment_status = status;
    patch.created_at = created;
    patch.updated_at = created;
    patch
}

struct Fixture {
    store: Arc<MemoryRemediationStore>,
    notifier: Arc<MemoryNotifier>,
    generator: ReportGenerator,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryRemediationStore::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let notifications = NotificationService::new(store.clone(), notifier.clone());
    let generator = ReportGenerator::new(store.clone(), store.clone(), notifications);
    Fixture {
        store,
        notifier,
        generator,
    }
}

#[tokio::test]
async fn evening_report_counts_only_the_window() {
    let f = fixture();
    let mut resolved = error_at(1, ErrorSeverity::Critical, at(9));
    resolved.status = ErrorStatus::Resolved;
    f.store.put_error(resolved).await.unwrap();
    f.store
        .put_error(error_at(2, ErrorSeverity::Low, at(10)))
        .await
        .unwrap();
    f.store
        .put_error(error_at(3, ErrorSeverity::Critical, at(7)))
        .await
        .unwrap();

    f.store
        .put_patch(patch_at(10, 1, DeploymentStatus::Deployed, at(11)))
        .await
        .unwrap();
    f.store
        .put_patch(patch_at(11, 2, DeploymentStatus::RolledBack, at(12)))
        .await
        .unwrap();
    f.store
        .put_patch(patch_at(12, 3, DeploymentStatus::Generated, at(21)))
        .await
        .unwrap();
    f.store
        .put_diagnostic(Diagnostic {
            id: DiagnosticId(1),
            error_id: ErrorId(1),
            root_cause: serde_json::json!({}),
            impact: "low".to_string(),
            affected_features: Vec::new(),
            confidence: 0.8,
        })
        .await
        .unwrap();

    let report = f
        .generator
        .generate_report(ReportPeriod::Evening, &at(20))
        .await
        .unwrap();

    assert_eq!(report.window.start, at(8));
    assert_eq!(report.window.end, at(20));
    assert_eq!(report.errors.total, 2);
    assert_eq!(report.errors.critical, 1);
    assert_eq!(report.errors.resolved, 1);
    assert_eq!(report.patches.generated, 2);
    assert_eq!(report.patches.deployed, 1);
    assert_eq!(report.patches.rolled_back, 1);
    assert_eq!(report.patch_lines[0].impact, Impact::Low);
    assert_eq!(report.patch_lines[1].impact, Impact::Unknown);
    assert_eq!(report.priority(), Priority::High);
}

#[tokio::test]
async fn quiet_period_uses_default_priority() {
    let f = fixture();
    f.store
        .put_error(error_at(1, ErrorSeverity::Medium, at(6)))
        .await
        .unwrap();

    let report = f
        .generator
        .generate_report(ReportPeriod::Morning, &at(8))
        .await
        .unwrap();

    assert_eq!(report.errors.total, 1);
    assert_eq!(report.priority(), Priority::Medium);
    assert!(report.latest_health.is_none());
    let (message, details) = report.render();
    assert!(message.starts_with("Morning remediation report"));
    assert!(details
        .iter()
        .any(|(k, v)| k == "Latest health" && v == "no health checks recorded"));
}

#[tokio::test]
async fn error_listing_is_bounded() {
    let f = fixture();
    for id in 0..12 {
        f.store
            .put_error(error_at(id, ErrorSeverity::Low, at(9)))
            .await
            .unwrap();
    }

    let report = f
        .generator
        .generate_report(ReportPeriod::Evening, &at(20))
        .await
        .unwrap();

    assert_eq!(report.errors.total, 12);
    assert_eq!(report.listed_errors.len(), MAX_LISTED_ERRORS);
    let (message, _) = report.render();
    assert!(message.contains("... and 2 more"));
}

#[tokio::test]
async fn report_includes_latest_health_snapshot() {
    let f = fixture();
    let health = HealthCheckResult::from_probes(
        true,
        false,
        true,
        vec!["data store unreachable".to_string()],
    );
    f.store.record_health_check(&health).await.unwrap();

    let report = f
        .generator
        .generate_report(ReportPeriod::Evening, &at(20))
        .await
        .unwrap();

    let latest = report.latest_health.clone().unwrap();
    assert!(!latest.healthy);
    let (_, details) = report.render();
    let (_, line) = details.iter().find(|(k, _)| k == "Latest health").unwrap();
    assert!(line.starts_with("unhealthy at"));
    assert!(line.contains("data store unreachable"));
}

#[tokio::test]
async fn dispatch_sends_daily_report_alert() {
    let f = fixture();
    f.store
        .put_error(error_at(1, ErrorSeverity::Critical, at(9)))
        .await
        .unwrap();

    f.generator
        .send_report_at(ReportPeriod::Evening, &at(20))
        .await
        .unwrap();

    let sent = f.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, "[HIGH] Remediation Report");
    assert!(sent[0].body.contains("Errors detected"));
    assert!(sent[0].body.contains("#1 [critical] boom"));
}

#[tokio::test]
async fn delivery_failure_is_returned() {
    let f = fixture();
    f.notifier.fail_next("webhook down");

    let err = f
        .generator
        .send_report_at(ReportPeriod::Morning, &at(8))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("webhook down"));
}

#[tokio::test]
async fn test_report_uses_current_time() {
    let f = fixture();
    let report = f
        .generator
        .send_test_report(ReportPeriod::Evening)
        .await
        .unwrap();
    assert!(report.window.start < report.window.end);
    assert_eq!(f.notifier.sent().len(), 1);
}
