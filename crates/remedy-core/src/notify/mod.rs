//! Notification Service: operator alerts for the remediation lifecycle.
//!
//! Each sender loads the entity it reports on, renders an [`Alert`] and
//! hands the `{title, body}` pair to the configured [`Notifier`]. A missing
//! entity is a typed [`NotifyError`], never a silent no-op.

mod alert;
mod notifier;

use std::sync::Arc;

use remedy_state::{ErrorId, HealthCheckResult, PatchId, RemediationStore};
use tracing::debug;

use crate::domain::NotifyError;
use crate::metrics::METRICS;

pub use alert::{Alert, AlertKind, AlertMessage, Priority};
pub use notifier::{LogNotifier, Notifier, WebhookNotifier};

/// Renders and dispatches operator alerts.
#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn RemediationStore>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn RemediationStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Send an already-built alert.
    pub async fn dispatch(&self, alert: Alert) -> Result<(), NotifyError> {
        debug!(kind = alert.kind.as_str(), priority = alert.priority.as_str(), alert_id = %alert.id, "dispatching alert");
        self.notifier.send(&alert.to_message()).await?;
        METRICS.inc_alerts();
        Ok(())
    }

    pub async fn critical_error(&self, error_id: ErrorId) -> Result<(), NotifyError> {
        let error = self.store.get_error(error_id).await?;
        let alert = Alert::new(
            AlertKind::CriticalError,
            format!(
                "A {} {} error was detected in {}: {}",
                error.severity.as_str(),
                error.category,
                error.location,
                error.message
            ),
        )
        .detail("Error ID", error.id)
        .detail("Severity", error.severity.as_str())
        .detail("Location", &error.location)
        .detail("Occurrences", error.occurrences)
        .detail("First seen", error.first_seen.to_rfc3339())
        .detail("Last seen", error.last_seen.to_rfc3339());
        self.dispatch(alert).await
    }

    pub async fn manual_review_required(
        &self,
        error_id: ErrorId,
        reason: &str,
    ) -> Result<(), NotifyError> {
        let error = self.store.get_error(error_id).await?;
        let alert = Alert::new(
            AlertKind::ManualReviewRequired,
            format!("Automated remediation stopped and needs a human decision: {reason}"),
        )
        .detail("Error ID", error.id)
        .detail("Location", &error.location)
        .detail("Error", &error.message)
        .detail("Reason", reason);
        self.dispatch(alert).await
    }

    pub async fn patch_generated(&self, patch_id: PatchId) -> Result<(), NotifyError> {
        let patch = self.store.get_patch(patch_id).await?;
        let alert = Alert::new(
            AlertKind::PatchGenerated,
            format!(
                "Patch {} ({}) was generated for error {}",
                patch.id, patch.version, patch.error_id
            ),
        )
        .detail("Patch ID", patch.id)
        .detail("Error ID", patch.error_id)
        .detail("Branch", &patch.branch)
        .detail("Files", patch.modified_files.join(", "));
        self.dispatch(alert).await
    }

    pub async fn deployment_success(&self, patch_id: PatchId) -> Result<(), NotifyError> {
        let patch = self.store.get_patch(patch_id).await?;
        let deployed_at = patch
            .deployed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        let alert = Alert::new(
            AlertKind::DeploymentSuccess,
            format!("Patch {} was merged and deployed", patch.id),
        )
        .detail("Patch ID", patch.id)
        .detail("Error ID", patch.error_id)
        .detail("Branch", &patch.branch)
        .detail("Deployed at", deployed_at);
        self.dispatch(alert).await
    }

    pub async fn deployment_failed(
        &self,
        patch_id: PatchId,
        reason: &str,
    ) -> Result<(), NotifyError> {
        let patch = self.store.get_patch(patch_id).await?;
        let alert = Alert::new(
            AlertKind::DeploymentFailed,
            format!("Deployment of patch {} failed: {reason}", patch.id),
        )
        .detail("Patch ID", patch.id)
        .detail("Error ID", patch.error_id)
        .detail("Branch", &patch.branch)
        .detail("Reason", reason);
        self.dispatch(alert).await
    }

    /// `priority` overrides the default (`high`), e.g. to escalate a rollback
    /// that itself failed.
    pub async fn rollback_triggered(
        &self,
        patch_id: PatchId,
        reason: &str,
        priority: Option<Priority>,
    ) -> Result<(), NotifyError> {
        let patch = self.store.get_patch(patch_id).await?;
        let mut alert = Alert::new(
            AlertKind::RollbackTriggered,
            format!("Patch {} was rolled back: {reason}", patch.id),
        )
        .detail("Patch ID", patch.id)
        .detail("Error ID", patch.error_id)
        .detail("Branch", &patch.branch)
        .detail("Reason", reason);
        if let Some(priority) = priority {
            alert = alert.with_priority(priority);
        }
        self.dispatch(alert).await
    }

    pub async fn health_check_failed(
        &self,
        patch_id: PatchId,
        health: &HealthCheckResult,
    ) -> Result<(), NotifyError> {
        let patch = self.store.get_patch(patch_id).await?;
        let mut alert = Alert::new(
            AlertKind::HealthCheckFailed,
            format!("Post-deployment health check failed for patch {}", patch.id),
        )
        .detail("Patch ID", patch.id)
        .detail("Process alive", health.process_alive)
        .detail("Store reachable", health.store_reachable)
        .detail("Endpoints responsive", health.endpoints_responsive)
        .detail("Checked at", health.checked_at.to_rfc3339());
        for (i, line) in health.details.iter().enumerate() {
            alert = alert.detail(format!("Failure {}", i + 1), line);
        }
        self.dispatch(alert).await
    }

    /// Scheduled report. The body is pre-rendered by the report generator.
    pub async fn daily_report(
        &self,
        message: String,
        details: Vec<(String, String)>,
        priority: Priority,
    ) -> Result<(), NotifyError> {
        let mut alert = Alert::new(AlertKind::DailyReport, message).with_priority(priority);
        alert.details = details;
        self.dispatch(alert).await
    }
}
