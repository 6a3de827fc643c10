//! Alert vocabulary and rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const FOOTER: &str =
    "Sent by the Remedy self-healing pipeline. Reply in the on-call channel before acting on production.";

/// Alert urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// Badge shown in the title and the first body line.
    pub fn badge(&self) -> &'static str {
        match self {
            Priority::Low => "[LOW]",
            Priority::Medium => "[MEDIUM]",
            Priority::High => "[HIGH]",
            Priority::Critical => "[CRITICAL]",
        }
    }
}

/// The eight alert categories operators receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CriticalError,
    ManualReviewRequired,
    PatchGenerated,
    DeploymentSuccess,
    DeploymentFailed,
    RollbackTriggered,
    HealthCheckFailed,
    DailyReport,
}

impl AlertKind {
    pub const ALL: [AlertKind; 8] = [
        AlertKind::CriticalError,
        AlertKind::ManualReviewRequired,
        AlertKind::PatchGenerated,
        AlertKind::DeploymentSuccess,
        AlertKind::DeploymentFailed,
        AlertKind::RollbackTriggered,
        AlertKind::HealthCheckFailed,
        AlertKind::DailyReport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::CriticalError => "critical_error",
            AlertKind::ManualReviewRequired => "manual_review_required",
            AlertKind::PatchGenerated => "patch_generated",
            AlertKind::DeploymentSuccess => "deployment_success",
            AlertKind::DeploymentFailed => "deployment_failed",
            AlertKind::RollbackTriggered => "rollback_triggered",
            AlertKind::HealthCheckFailed => "health_check_failed",
            AlertKind::DailyReport => "daily_report",
        }
    }

    pub fn default_priority(&self) -> Priority {
        match self {
            AlertKind::CriticalError => Priority::Critical,
            AlertKind::ManualReviewRequired => Priority::High,
            AlertKind::PatchGenerated => Priority::Low,
            AlertKind::DeploymentSuccess => Priority::Medium,
            AlertKind::DeploymentFailed => Priority::High,
            AlertKind::RollbackTriggered => Priority::High,
            AlertKind::HealthCheckFailed => Priority::Critical,
            AlertKind::DailyReport => Priority::Medium,
        }
    }

    pub fn header(&self) -> &'static str {
        match self {
            AlertKind::CriticalError => "Critical Error Detected",
            AlertKind::ManualReviewRequired => "Manual Review Required",
            AlertKind::PatchGenerated => "Patch Generated",
            AlertKind::DeploymentSuccess => "Deployment Succeeded",
            AlertKind::DeploymentFailed => "Deployment Failed",
            AlertKind::RollbackTriggered => "Rollback Triggered",
            AlertKind::HealthCheckFailed => "Health Check Failed",
            AlertKind::DailyReport => "Remediation Report",
        }
    }
}

/// An alert built in memory for one notification. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub priority: Priority,
    pub message: String,
    /// Ordered key/value detail block.
    pub details: Vec<(String, String)>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(kind: AlertKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            priority: kind.default_priority(),
            message: message.into(),
            details: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.push((key.into(), value.to_string()));
        self
    }

    pub fn title(&self) -> String {
        format!("{} {}", self.priority.badge(), self.kind.header())
    }

    /// Header, priority badge, timestamp, message, detail block, footer.
    pub fn render_body(&self) -> String {
        let mut body = String::new();
        body.push_str(self.kind.header());
        body.push('\n');
        body.push_str(&format!("Priority: {}\n", self.priority.badge()));
        body.push_str(&format!(
            "Time: {}\n\n",
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        body.push_str(&self.message);
        body.push('\n');

        if !self.details.is_empty() {
            body.push_str("\nDetails:\n");
            let width = self.details.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
            for (key, value) in &self.details {
                body.push_str(&format!("  {:<width$} : {}\n", key, value, width = width));
            }
        }

        body.push_str("\n--\n");
        body.push_str(FOOTER);
        body.push('\n');
        body
    }

    /// The `{title, body}` pair handed to a [`super::Notifier`].
    pub fn to_message(&self) -> AlertMessage {
        AlertMessage {
            title: self.title(),
            body: self.render_body(),
        }
    }
}

/// Wire shape of one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub title: String,
    pub body: String,
}
