//! Storage trait definitions for Remedy
//!
//! These traits define the storage abstractions the remediation pipeline
//! consumes:
//! - `RemediationStore`: durable detected errors, patches and health snapshots
//! - `DiagnosticReader`: read-only access to diagnosis output
//! - `CounterStore`: shared atomic counter-with-expiry (safety lock backing)
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a detected runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorId(pub i64);

/// Identifier of a generated patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchId(pub i64);

/// Identifier of a diagnosis record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagnosticId(pub i64);

impl std::fmt::Display for ErrorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for PatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for DiagnosticId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// DetectedError / Diagnostic
// ---------------------------------------------------------------------------

/// Severity assigned by the error detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Low => "low",
            ErrorSeverity::Medium => "medium",
            ErrorSeverity::High => "high",
            ErrorSeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(ErrorSeverity::Low),
            "medium" => Some(ErrorSeverity::Medium),
            "high" => Some(ErrorSeverity::High),
            "critical" => Some(ErrorSeverity::Critical),
            _ => None,
        }
    }
}

/// Lifecycle of a detected error. Only `Resolved` is ever written here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStatus {
    Detected,
    Resolved,
}

impl ErrorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::Detected => "detected",
            ErrorStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "detected" => Some(ErrorStatus::Detected),
            "resolved" => Some(ErrorStatus::Resolved),
            _ => None,
        }
    }
}

/// Where in the platform source an error was raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: Option<u32>,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.file, line),
            None => write!(f, "{}", self.file),
        }
    }
}

/// A runtime error reported by the (external) detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedError {
    pub id: ErrorId,
    pub category: String,
    pub severity: ErrorSeverity,
    pub message: String,
    pub location: SourceLocation,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrences: u64,
    pub status: ErrorStatus,
}

impl DetectedError {
    /// A freshly detected error seen once, now.
    pub fn new(
        id: ErrorId,
        category: impl Into<String>,
        severity: ErrorSeverity,
        message: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            category: category.into(),
            severity,
            message: message.into(),
            location: SourceLocation {
                file: file.into(),
                line: None,
            },
            first_seen: now,
            last_seen: now,
            occurrences: 1,
            status: ErrorStatus::Detected,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == ErrorSeverity::Critical
    }
}

/// Diagnosis output for an error. Read-only for the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub id: DiagnosticId,
    pub error_id: ErrorId,
    /// Free-form root-cause payload produced by the diagnoser.
    pub root_cause: serde_json::Value,
    /// Impact classification label ("low", "medium", "high", ...).
    pub impact: String,
    /// Feature tags touched by the error; used for medical-pathway detection.
    pub affected_features: Vec<String>,
    pub confidence: f32,
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Test validation status of a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    None,
    Testing,
    Passed,
    Failed,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::None => "none",
            ValidationStatus::Testing => "testing",
            ValidationStatus::Passed => "passed",
            ValidationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(ValidationStatus::None),
            "testing" => Some(ValidationStatus::Testing),
            "passed" => Some(ValidationStatus::Passed),
            "failed" => Some(ValidationStatus::Failed),
            _ => None,
        }
    }
}

/// Deployment status of a patch.
///
/// `Generated → Deploying → Deployed → RolledBack`, or `Rejected` from any
/// pre-deployment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Generated,
    Deploying,
    Deployed,
    RolledBack,
    Rejected,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Generated => "generated",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Deployed => "deployed",
            DeploymentStatus::RolledBack => "rolled_back",
            DeploymentStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generated" => Some(DeploymentStatus::Generated),
            "deploying" => Some(DeploymentStatus::Deploying),
            "deployed" => Some(DeploymentStatus::Deployed),
            "rolled_back" => Some(DeploymentStatus::RolledBack),
            "rejected" => Some(DeploymentStatus::Rejected),
            _ => None,
        }
    }

    /// No further automated transitions start from these states.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Deployed | DeploymentStatus::RolledBack | DeploymentStatus::Rejected
        )
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The (validation, deployment) status pair used for compare-and-set updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchState {
    pub validation: ValidationStatus,
    pub deployment: DeploymentStatus,
}

/// A candidate fix for a detected error, produced by the (external) patch
/// generator as a branch plus the list of files it touches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub id: PatchId,
    pub error_id: ErrorId,
    pub version: String,
    pub branch: String,
    pub modified_files: Vec<String>,
    pub validation_status: ValidationStatus,
    pub deployment_status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deployed_at: Option<DateTime<Utc>>,
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub rollback_reason: Option<String>,
    /// Captured test-runner report, if tests ran.
    pub test_results: Option<serde_json::Value>,
}

impl Patch {
    /// A freshly generated, untested patch.
    pub fn new(
        id: PatchId,
        error_id: ErrorId,
        version: impl Into<String>,
        branch: impl Into<String>,
        modified_files: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            error_id,
            version: version.into(),
            branch: branch.into(),
            modified_files,
            validation_status: ValidationStatus::None,
            deployment_status: DeploymentStatus::Generated,
            created_at: now,
            updated_at: now,
            deployed_at: None,
            rolled_back_at: None,
            rejection_reason: None,
            rollback_reason: None,
            test_results: None,
        }
    }

    pub fn state(&self) -> PatchState {
        PatchState {
            validation: self.validation_status,
            deployment: self.deployment_status,
        }
    }
}

// ---------------------------------------------------------------------------
// Health snapshots
// ---------------------------------------------------------------------------

/// Outcome of one post-deployment health probe round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub process_alive: bool,
    pub store_reachable: bool,
    pub endpoints_responsive: bool,
    /// Conjunction of the three probes.
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
    /// One line per failed probe.
    pub details: Vec<String>,
}

impl HealthCheckResult {
    pub fn from_probes(
        process_alive: bool,
        store_reachable: bool,
        endpoints_responsive: bool,
        details: Vec<String>,
    ) -> Self {
        Self {
            process_alive,
            store_reachable,
            endpoints_responsive,
            healthy: process_alive && store_reachable && endpoints_responsive,
            checked_at: Utc::now(),
            details,
        }
    }
}

// ---------------------------------------------------------------------------
// RemediationStore / DiagnosticReader
// ---------------------------------------------------------------------------

/// Durable store for remediation records.
///
/// Guarantees:
/// - `update_patch_if` writes only when the stored status pair equals
///   `expected`, atomically with respect to other writers of the same store.
/// - `list_*_between` return records ordered oldest first.
#[async_trait]
pub trait RemediationStore: Send + Sync {
    /// Insert or replace a detected error.
    async fn put_error(&self, error: DetectedError) -> StorageResult<()>;

    /// Fetch an error. Returns `StorageError::ErrorNotFound` if absent.
    async fn get_error(&self, id: ErrorId) -> StorageResult<DetectedError>;

    /// Set the lifecycle status of an error.
    async fn set_error_status(&self, id: ErrorId, status: ErrorStatus) -> StorageResult<()>;

    /// Errors first seen within `[from, to)`.
    async fn list_errors_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<DetectedError>>;

    /// Insert or replace a diagnosis record.
    async fn put_diagnostic(&self, diagnostic: Diagnostic) -> StorageResult<()>;

    /// Insert or replace a patch.
    async fn put_patch(&self, patch: Patch) -> StorageResult<()>;

    /// Fetch a patch. Returns `StorageError::PatchNotFound` if absent.
    async fn get_patch(&self, id: PatchId) -> StorageResult<Patch>;

    /// Overwrite an existing patch. Fails with `PatchNotFound` if absent.
    async fn update_patch(&self, patch: &Patch) -> StorageResult<()>;

    /// Overwrite a patch only if its stored status pair equals `expected`.
    ///
    /// Returns `Ok(false)` when the stored state differs (another worker won).
    async fn update_patch_if(&self, patch: &Patch, expected: PatchState) -> StorageResult<bool>;

    /// Patches created within `[from, to)`.
    async fn list_patches_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Patch>>;

    /// Append a health snapshot.
    async fn record_health_check(&self, result: &HealthCheckResult) -> StorageResult<()>;

    /// The most recent health snapshot, if any.
    async fn latest_health_check(&self) -> StorageResult<Option<HealthCheckResult>>;

    /// Cheap round-trip used as the data-store reachability probe.
    async fn ping(&self) -> StorageResult<()>;
}

/// Read-only view over diagnosis output.
#[async_trait]
pub trait DiagnosticReader: Send + Sync {
    /// The newest diagnostic for an error, if one exists.
    async fn diagnostic_for_error(&self, error_id: ErrorId) -> StorageResult<Option<Diagnostic>>;
}

// ---------------------------------------------------------------------------
// CounterStore: shared counter with expiry
// ---------------------------------------------------------------------------

/// Value and remaining lifetime of a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub value: u64,
    /// Remaining time before the counter expires, `None` if it never does.
    pub ttl: Option<Duration>,
}

/// Atomic counter store with per-key expiry.
///
/// Guarantees:
/// - `incr_with_ttl` is atomic across concurrent callers and processes.
/// - The expiry is set when the key is created and is not extended by later
///   increments, so a window is fixed from its first increment.
/// - An expired key behaves exactly like an absent one.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, creating it with lifetime `ttl` if absent.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StorageResult<CounterSnapshot>;

    /// Read a counter without modifying it.
    async fn peek(&self, key: &str) -> StorageResult<Option<CounterSnapshot>>;

    /// Remove a counter. No-op if absent.
    async fn clear(&self, key: &str) -> StorageResult<()>;
}

/// Build a stable counter key from a namespace and arbitrary parts.
///
/// Parts are hashed so file paths and other free text never leak into the
/// backend's key syntax.
pub fn counter_key(namespace: &str, parts: &[&str]) -> String {
    use sha2::Digest;
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(part.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!("{}:{}", namespace, &digest[..16])
}
