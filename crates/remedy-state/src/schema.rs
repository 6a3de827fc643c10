//! Schema definitions for Remedy SurrealDB tables
//!
//! Tables:
//! - detected_errors: errors reported by the detector
//! - diagnostics: diagnosis output (read-only for the pipeline)
//! - patches: candidate fixes and their validation/deployment state
//! - health_checks: post-deployment health snapshots
//! - safety_counters: safety lock attempt counters with an expiry
//!
//! Rows store statuses as snake_case strings and convert to the
//! `storage_traits` types at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{
    CounterSnapshot, DeploymentStatus, DetectedError, Diagnostic, DiagnosticId, ErrorId,
    ErrorSeverity, ErrorStatus, HealthCheckResult, Patch, PatchId, SourceLocation,
    ValidationStatus,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
pub(crate) mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
pub(crate) mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

fn invalid(table: &str, reason: impl Into<String>) -> StorageError {
    StorageError::InvalidRecord {
        table: table.to_string(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// detected_errors
// ---------------------------------------------------------------------------

/// Row in `detected_errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub error_id: i64,
    pub category: String,
    /// "low" | "medium" | "high" | "critical"
    pub severity: String,
    pub message: String,
    pub file: String,
    pub line: Option<u32>,
    #[serde(with = "surreal_datetime")]
    pub first_seen: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub last_seen: DateTime<Utc>,
    pub occurrences: u64,
    /// "detected" | "resolved"
    pub status: String,
}

impl From<&DetectedError> for ErrorRow {
    fn from(e: &DetectedError) -> Self {
        Self {
            id: None,
            error_id: e.id.0,
            category: e.category.clone(),
            severity: e.severity.as_str().to_string(),
            message: e.message.clone(),
            file: e.location.file.clone(),
            line: e.location.line,
            first_seen: e.first_seen,
            last_seen: e.last_seen,
            occurrences: e.occurrences,
            status: e.status.as_str().to_string(),
        }
    }
}

impl TryFrom<ErrorRow> for DetectedError {
    type Error = StorageError;

    fn try_from(row: ErrorRow) -> Result<Self, Self::Error> {
        let severity = ErrorSeverity::parse(&row.severity)
            .ok_or_else(|| invalid("detected_errors", format!("severity '{}'", row.severity)))?;
        let status = ErrorStatus::parse(&row.status)
            .ok_or_else(|| invalid("detected_errors", format!("status '{}'", row.status)))?;
        Ok(DetectedError {
            id: ErrorId(row.error_id),
            category: row.category,
            severity,
            message: row.message,
            location: SourceLocation {
                file: row.file,
                line: row.line,
            },
            first_seen: row.first_seen,
            last_seen: row.last_seen,
            occurrences: row.occurrences,
            status,
        })
    }
}

// ---------------------------------------------------------------------------
// diagnostics
// ---------------------------------------------------------------------------

/// Row in `diagnostics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub diagnostic_id: i64,
    pub error_id: i64,
    pub root_cause: serde_json::Value,
    pub impact: String,
    pub affected_features: Vec<String>,
    pub confidence: f32,
}

impl From<&Diagnostic> for DiagnosticRow {
    fn from(d: &Diagnostic) -> Self {
        Self {
            id: None,
            diagnostic_id: d.id.0,
            error_id: d.error_id.0,
            root_cause: d.root_cause.clone(),
            impact: d.impact.clone(),
            affected_features: d.affected_features.clone(),
            confidence: d.confidence,
        }
    }
}

impl From<DiagnosticRow> for Diagnostic {
    fn from(row: DiagnosticRow) -> Self {
        Diagnostic {
            id: DiagnosticId(row.diagnostic_id),
            error_id: ErrorId(row.error_id),
            root_cause: row.root_cause,
            impact: row.impact,
            affected_features: row.affected_features,
            confidence: row.confidence,
        }
    }
}

// ---------------------------------------------------------------------------
// patches
// ---------------------------------------------------------------------------

/// Row in `patches`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub patch_id: i64,
    pub error_id: i64,
    pub version: String,
    pub branch: String,
    pub modified_files: Vec<String>,
    /// "none" | "testing" | "passed" | "failed"
    pub validation_status: String,
    /// "generated" | "deploying" | "deployed" | "rolled_back" | "rejected"
    pub deployment_status: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub deployed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub rollback_reason: Option<String>,
    pub test_results: Option<serde_json::Value>,
}

impl From<&Patch> for PatchRow {
    fn from(p: &Patch) -> Self {
        Self {
            id: None,
            patch_id: p.id.0,
            error_id: p.error_id.0,
            version: p.version.clone(),
            branch: p.branch.clone(),
            modified_files: p.modified_files.clone(),
            validation_status: p.validation_status.as_str().to_string(),
            deployment_status: p.deployment_status.as_str().to_string(),
            created_at: p.created_at,
            updated_at: p.updated_at,
            deployed_at: p.deployed_at,
            rolled_back_at: p.rolled_back_at,
            rejection_reason: p.rejection_reason.clone(),
            rollback_reason: p.rollback_reason.clone(),
            test_results: p.test_results.clone(),
        }
    }
}

impl TryFrom<PatchRow> for Patch {
    type Error = StorageError;

    fn try_from(row: PatchRow) -> Result<Self, Self::Error> {
        let validation_status = ValidationStatus::parse(&row.validation_status).ok_or_else(
            || invalid("patches", format!("validation_status '{}'", row.validation_status)),
        )?;
        let deployment_status = DeploymentStatus::parse(&row.deployment_status).ok_or_else(
            || invalid("patches", format!("deployment_status '{}'", row.deployment_status)),
        )?;
        Ok(Patch {
            id: PatchId(row.patch_id),
            error_id: ErrorId(row.error_id),
            version: row.version,
            branch: row.branch,
            modified_files: row.modified_files,
            validation_status,
            deployment_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deployed_at: row.deployed_at,
            rolled_back_at: row.rolled_back_at,
            rejection_reason: row.rejection_reason,
            rollback_reason: row.rollback_reason,
            test_results: row.test_results,
        })
    }
}

// ---------------------------------------------------------------------------
// health_checks
// ---------------------------------------------------------------------------

/// Row in `health_checks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub process_alive: bool,
    pub store_reachable: bool,
    pub endpoints_responsive: bool,
    pub healthy: bool,
    #[serde(with = "surreal_datetime")]
    pub checked_at: DateTime<Utc>,
    pub details: Vec<String>,
}

impl From<&HealthCheckResult> for HealthRow {
    fn from(h: &HealthCheckResult) -> Self {
        Self {
            id: None,
            process_alive: h.process_alive,
            store_reachable: h.store_reachable,
            endpoints_responsive: h.endpoints_responsive,
            healthy: h.healthy,
            checked_at: h.checked_at,
            details: h.details.clone(),
        }
    }
}

impl From<HealthRow> for HealthCheckResult {
    fn from(row: HealthRow) -> Self {
        HealthCheckResult {
            process_alive: row.process_alive,
            store_reachable: row.store_reachable,
            endpoints_responsive: row.endpoints_responsive,
            healthy: row.healthy,
            checked_at: row.checked_at,
            details: row.details,
        }
    }
}

/// Safety lock counter record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub count: u64,
    #[serde(with = "surreal_datetime")]
    pub expires_at: DateTime<Utc>,
}

impl CounterRow {
    /// Snapshot as seen at `now`; `None` once the window has closed.
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Option<CounterSnapshot> {
        let remaining = (self.expires_at - now).to_std().ok()?;
        if remaining.is_zero() {
            return None;
        }
        Some(CounterSnapshot {
            value: self.count,
            ttl: Some(remaining),
        })
    }
}
