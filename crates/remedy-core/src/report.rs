//! Report Generator: twice-daily summary of errors, patches and health.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, TimeZone, Utc};
use remedy_state::{
    DeploymentStatus, DetectedError, DiagnosticReader, ErrorId, ErrorStatus, HealthCheckResult,
    PatchId, RemediationStore, ValidationStatus,
};
use serde::{Deserialize, Serialize};

use crate::domain::{Impact, RemedyError, Result};
use crate::notify::{NotificationService, Priority};
use crate::obs;

/// Errors listed individually in a report; the counts cover the rest.
pub const MAX_LISTED_ERRORS: usize = 10;

const MORNING_HOUR: u32 = 8;
const EVENING_HOUR: u32 = 20;

/// Named reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod {
    /// 20:00 the previous day to 08:00 today.
    Morning,
    /// 08:00 to 20:00 today.
    Evening,
}

impl ReportPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportPeriod::Morning => "morning",
            ReportPeriod::Evening => "evening",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "morning" => Some(ReportPeriod::Morning),
            "evening" => Some(ReportPeriod::Evening),
            _ => None,
        }
    }
}

impl std::str::FromStr for ReportPeriod {
    type Err = RemedyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| {
            RemedyError::Config(format!("unknown report period {s:?}, expected morning or evening"))
        })
    }
}

/// Half-open `[start, end)` interval in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

fn at_hour<Tz: TimeZone>(tz: &Tz, date: NaiveDate, hour: u32) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(hour, 0, 0)?;
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

/// The window `period` covers on the local day of `now`.
pub fn report_window<Tz: TimeZone>(period: ReportPeriod, now: &DateTime<Tz>) -> ReportWindow {
    let tz = now.timezone();
    let today = now.date_naive();
    let now_utc = now.with_timezone(&Utc);

    let (start, end) = match period {
        ReportPeriod::Morning => {
            let yesterday = today.pred_opt().unwrap_or(today);
            (
                at_hour(&tz, yesterday, EVENING_HOUR),
                at_hour(&tz, today, MORNING_HOUR),
            )
        }
        ReportPeriod::Evening => (
            at_hour(&tz, today, MORNING_HOUR),
            at_hour(&tz, today, EVENING_HOUR),
        ),
    };

    // A DST gap swallowed the boundary hour; fall back to a 12h window.
    let end = end.unwrap_or(now_utc);
    let start = start.unwrap_or(end - ChronoDuration::hours(12));
    ReportWindow { start, end }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounts {
    pub total: usize,
    pub critical: usize,
    pub resolved: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchCounts {
    pub generated: usize,
    pub deployed: usize,
    pub rolled_back: usize,
}

/// One patch in the report listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchLine {
    pub id: PatchId,
    pub error_id: ErrorId,
    pub branch: String,
    pub files: Vec<String>,
    pub impact: Impact,
    pub validation: ValidationStatus,
    pub deployment: DeploymentStatus,
}

/// Aggregated report for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationReport {
    pub period: ReportPeriod,
    pub window: ReportWindow,
    pub errors: ErrorCounts,
    pub patches: PatchCounts,
    pub latest_health: Option<HealthCheckResult>,
    /// First [`MAX_LISTED_ERRORS`] errors of the window, oldest first.
    pub listed_errors: Vec<DetectedError>,
    pub patch_lines: Vec<PatchLine>,
}

impl RemediationReport {
    /// `high` when any critical error occurred, otherwise the default.
    pub fn priority(&self) -> Priority {
        if self.errors.critical > 0 {
            Priority::High
        } else {
            Priority::Medium
        }
    }

    /// Message text and key/value details for the alert.
    pub fn render(&self) -> (String, Vec<(String, String)>) {
        let mut message = format!(
            "{} remediation report for {} to {}\n",
            capitalize(self.period.as_str()),
            self.window.start.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            self.window.end.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        );

        message.push_str("\nErrors:\n");
        if self.listed_errors.is_empty() {
            message.push_str("  none\n");
        }
        for error in &self.listed_errors {
            message.push_str(&format!(
                "  #{} [{}] {} at {} ({})\n",
                error.id,
                error.severity.as_str(),
                error.message,
                error.location,
                error.status.as_str()
            ));
        }
        if self.errors.total > self.listed_errors.len() {
            message.push_str(&format!(
                "  ... and {} more\n",
                self.errors.total - self.listed_errors.len()
            ));
        }

        message.push_str("\nPatches:\n");
        if self.patch_lines.is_empty() {
            message.push_str("  none\n");
        }
        for line in &self.patch_lines {
            message.push_str(&format!(
                "  #{} for error #{} on {} [{} / {}] impact={} files={}\n",
                line.id,
                line.error_id,
                line.branch,
                line.validation,
                line.deployment,
                line.impact,
                line.files.join(", ")
            ));
        }

        let health = match &self.latest_health {
            Some(h) if h.healthy => format!("healthy at {}", h.checked_at.to_rfc3339()),
            Some(h) => format!(
                "unhealthy at {}: {}",
                h.checked_at.to_rfc3339(),
                h.details.join("; ")
            ),
            None => "no health checks recorded".to_string(),
        };

        let details = vec![
            ("Errors detected".to_string(), self.errors.total.to_string()),
            ("Critical errors".to_string(), self.errors.critical.to_string()),
            ("Errors resolved".to_string(), self.errors.resolved.to_string()),
            ("Patches generated".to_string(), self.patches.generated.to_string()),
            ("Patches deployed".to_string(), self.patches.deployed.to_string()),
            ("Patches rolled back".to_string(), self.patches.rolled_back.to_string()),
            ("Latest health".to_string(), health),
        ];
        (message, details)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Builds and dispatches period reports from the shared store.
#[derive(Clone)]
pub struct ReportGenerator {
    store: Arc<dyn RemediationStore>,
    diagnostics: Arc<dyn DiagnosticReader>,
    notifications: NotificationService,
}

impl ReportGenerator {
    pub fn new(
        store: Arc<dyn RemediationStore>,
        diagnostics: Arc<dyn DiagnosticReader>,
        notifications: NotificationService,
    ) -> Self {
        Self {
            store,
            diagnostics,
            notifications,
        }
    }

    pub async fn generate_report<Tz: TimeZone>(
        &self,
        period: ReportPeriod,
        now: &DateTime<Tz>,
    ) -> Result<RemediationReport> {
        let window = report_window(period, now);
        let errors = self
            .store
            .list_errors_between(window.start, window.end)
            .await?;
        let patches = self
            .store
            .list_patches_between(window.start, window.end)
            .await?;
        let latest_health = self.store.latest_health_check().await?;

        let error_counts = ErrorCounts {
            total: errors.len(),
            critical: errors.iter().filter(|e| e.is_critical()).count(),
            resolved: errors
                .iter()
                .filter(|e| e.status == ErrorStatus::Resolved)
                .count(),
        };
        let patch_counts = PatchCounts {
            generated: patches.len(),
            deployed: patches
                .iter()
                .filter(|p| p.deployment_status == DeploymentStatus::Deployed)
                .count(),
            rolled_back: patches
                .iter()
                .filter(|p| p.deployment_status == DeploymentStatus::RolledBack)
                .count(),
        };

        let mut patch_lines = Vec::with_capacity(patches.len());
        for patch in patches {
            let impact = self
                .diagnostics
                .diagnostic_for_error(patch.error_id)
                .await?
                .map(|d| Impact::parse(&d.impact))
                .unwrap_or(Impact::Unknown);
            patch_lines.push(PatchLine {
                id: patch.id,
                error_id: patch.error_id,
                branch: patch.branch,
                files: patch.modified_files,
                impact,
                validation: patch.validation_status,
                deployment: patch.deployment_status,
            });
        }

        let listed_errors = errors.into_iter().take(MAX_LISTED_ERRORS).collect();

        Ok(RemediationReport {
            period,
            window,
            errors: error_counts,
            patches: patch_counts,
            latest_health,
            listed_errors,
            patch_lines,
        })
    }

    /// Generate the report for `period` as of `now` and send it.
    pub async fn send_report_at<Tz: TimeZone>(
        &self,
        period: ReportPeriod,
        now: &DateTime<Tz>,
    ) -> Result<RemediationReport> {
        let report = self.generate_report(period, now).await?;
        let (message, details) = report.render();
        self.notifications
            .daily_report(message, details, report.priority())
            .await?;
        obs::emit_report_dispatched(
            period.as_str(),
            report.errors.total,
            report.patches.generated,
        );
        Ok(report)
    }

    /// Generate and send the report for `period` as of now (local time).
    pub async fn send_test_report(&self, period: ReportPeriod) -> Result<RemediationReport> {
        self.send_report_at(period, &Local::now()).await
    }
}
