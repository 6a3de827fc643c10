//! Test Runner seam.
//!
//! The orchestrator only depends on [`TestRunner`]; the subprocess-backed
//! implementation lives in `remedy-ci`. Suite failures, timeouts and spawn
//! errors are all reported as failed suites, never as `Err`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The four validation suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteKind {
    Unit,
    Integration,
    TypeCheck,
    Lint,
}

impl SuiteKind {
    pub const ALL: [SuiteKind; 4] = [
        SuiteKind::Unit,
        SuiteKind::Integration,
        SuiteKind::TypeCheck,
        SuiteKind::Lint,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SuiteKind::Unit => "unit_tests",
            SuiteKind::Integration => "integration_tests",
            SuiteKind::TypeCheck => "type_check",
            SuiteKind::Lint => "linting",
        }
    }
}

/// Outcome of one suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub kind: SuiteKind,
    pub passed: bool,
    /// `None` when the process never produced an exit status.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, tail-truncated.
    pub output: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub note: Option<String>,
}

impl SuiteResult {
    /// A disabled suite. Counts as passed.
    pub fn skipped(kind: SuiteKind) -> Self {
        Self {
            kind,
            passed: true,
            exit_code: None,
            output: String::new(),
            duration_ms: 0,
            timed_out: false,
            note: Some("skipped".to_string()),
        }
    }

    /// A suite that could not be started at all.
    pub fn spawn_failed(kind: SuiteKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            passed: false,
            exit_code: None,
            output: String::new(),
            duration_ms: 0,
            timed_out: false,
            note: Some(reason.into()),
        }
    }
}

/// Result of `run_all_tests`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunReport {
    /// Conjunction of the four suites.
    pub success: bool,
    pub unit_tests: SuiteResult,
    pub integration_tests: SuiteResult,
    pub type_check: SuiteResult,
    pub linting: SuiteResult,
    pub total_duration_ms: u64,
}

impl TestRunReport {
    pub fn from_suites(
        unit_tests: SuiteResult,
        integration_tests: SuiteResult,
        type_check: SuiteResult,
        linting: SuiteResult,
        total_duration_ms: u64,
    ) -> Self {
        let success =
            unit_tests.passed && integration_tests.passed && type_check.passed && linting.passed;
        Self {
            success,
            unit_tests,
            integration_tests,
            type_check,
            linting,
            total_duration_ms,
        }
    }

    pub fn suites(&self) -> [&SuiteResult; 4] {
        [
            &self.unit_tests,
            &self.integration_tests,
            &self.type_check,
            &self.linting,
        ]
    }

    pub fn failed_suites(&self) -> Vec<SuiteKind> {
        self.suites()
            .iter()
            .filter(|s| !s.passed)
            .map(|s| s.kind)
            .collect()
    }

    /// One-line summary for logs and patch records.
    pub fn summary(&self) -> String {
        if self.success {
            return format!("all suites passed in {}ms", self.total_duration_ms);
        }
        let failed: Vec<_> = self
            .suites()
            .iter()
            .filter(|s| !s.passed)
            .map(|s| {
                if s.timed_out {
                    format!("{} (timed out)", s.kind.name())
                } else {
                    s.kind.name().to_string()
                }
            })
            .collect();
        format!("failed: {}", failed.join(", "))
    }
}

/// Result of `run_tests_for_files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetedTestReport {
    pub success: bool,
    /// Test files matched by naming convention.
    pub test_files: Vec<String>,
    /// `None` when no test files matched and nothing ran.
    pub suite: Option<SuiteResult>,
}

impl TargetedTestReport {
    pub fn nothing_to_run() -> Self {
        Self {
            success: true,
            test_files: Vec::new(),
            suite: None,
        }
    }
}

/// Runs validation suites in the repository's current checkout.
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Unit, type-check and lint concurrently, then integration.
    async fn run_all_tests(&self) -> TestRunReport;

    /// Only the unit tests that belong to `files` by naming convention.
    async fn run_tests_for_files(&self, files: &[String]) -> TargetedTestReport;
}
