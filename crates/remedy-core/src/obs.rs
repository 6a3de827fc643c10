//! Structured observability hooks for the remediation lifecycle.
//!
//! - [`recovery_span`] scopes every event of one orchestration run to its
//!   patch id. Attach it with `tracing::Instrument` rather than entering it,
//!   so the future stays `Send`.
//! - `emit_*` functions log the key lifecycle events at `info!` (failures
//!   and degraded modes at `warn!`/`error!`).

use tracing::{error, info, warn};

/// Span for one recovery run.
pub fn recovery_span(patch_id: i64) -> tracing::Span {
    tracing::info_span!("remedy.recovery", patch_id = patch_id)
}

pub fn emit_recovery_started(patch_id: i64, error_id: i64, auto_deploy: bool) {
    info!(
        event = "recovery.started",
        patch_id = patch_id,
        error_id = error_id,
        auto_deploy = auto_deploy,
    );
}

pub fn emit_recovery_finished(
    patch_id: i64,
    duration_ms: u64,
    success: bool,
    deployed: bool,
    killed_by_circuit_breaker: bool,
) {
    info!(
        event = "recovery.finished",
        patch_id = patch_id,
        duration_ms = duration_ms,
        success = success,
        deployed = deployed,
        killed_by_circuit_breaker = killed_by_circuit_breaker,
    );
}

pub fn emit_safety_lock_engaged(file: &str, error_id: i64, attempts: u64) {
    warn!(
        event = "safety_lock.engaged",
        file = %file,
        error_id = error_id,
        attempts = attempts,
    );
}

/// The counter store could not be reached and the lock failed open.
pub fn emit_safety_lock_degraded(file: &str, error_id: i64, error: &dyn std::fmt::Display) {
    error!(
        event = "safety_lock.degraded",
        file = %file,
        error_id = error_id,
        error = %error,
        "safety lock unavailable, allowing attempt without circuit breaker",
    );
}

pub fn emit_deploy_finished(branch: &str, duration_ms: u64, success: bool) {
    info!(
        event = "deploy.finished",
        branch = %branch,
        duration_ms = duration_ms,
        success = success,
    );
}

pub fn emit_rollback_finished(target: &str, commit: Option<&str>, success: bool) {
    if success {
        info!(event = "rollback.finished", target = %target, commit = ?commit, success = true);
    } else {
        error!(event = "rollback.finished", target = %target, commit = ?commit, success = false);
    }
}

pub fn emit_health_checked(healthy: bool, process_alive: bool, store_reachable: bool, endpoints: bool) {
    info!(
        event = "health.checked",
        healthy = healthy,
        process_alive = process_alive,
        store_reachable = store_reachable,
        endpoints_responsive = endpoints,
    );
}

pub fn emit_report_dispatched(period: &str, total_errors: usize, total_patches: usize) {
    info!(
        event = "report.dispatched",
        period = %period,
        total_errors = total_errors,
        total_patches = total_patches,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn recovery_events_carry_patch_id() {
        emit_recovery_started(7, 42, true);
        emit_recovery_finished(7, 120, true, true, false);
        assert!(logs_contain("recovery.started"));
        assert!(logs_contain("recovery.finished"));
        assert!(logs_contain("patch_id=7"));
    }

    #[traced_test]
    #[test]
    fn degraded_lock_logs_cause() {
        emit_safety_lock_degraded("src/app.ts", 42, &"connection refused");
        assert!(logs_contain("safety_lock.degraded"));
        assert!(logs_contain("connection refused"));
    }

    #[traced_test]
    #[test]
    fn failed_rollback_logs_at_error() {
        emit_rollback_finished("main", Some("abc123"), false);
        assert!(logs_contain("ERROR"));
        assert!(logs_contain("rollback.finished"));
    }

    #[test]
    fn recovery_span_has_expected_name() {
        let span = recovery_span(7);
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "remedy.recovery");
        }
    }
}
