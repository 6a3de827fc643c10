//! [`TestRunner`] backed by real subprocesses.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use remedy_core::{
    SuiteKind, SuiteResult, TargetedTestReport, TestRunReport, TestRunner, TestsConfig,
};
use tracing::{info, warn};

use crate::runner::CiRunner;
use crate::stage::SuiteConfig;
use crate::verdict::suite_passed;

/// Test files that belong to `source` by naming convention:
/// `name.test.ext`, `name.spec.ext` and `__tests__/name.test.ext`.
pub fn test_candidates(source: &str) -> Vec<String> {
    let path = Path::new(source);
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return Vec::new();
    };
    if stem.ends_with(".test") || stem.ends_with(".spec") {
        return vec![source.to_string()];
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    [
        parent.join(format!("{stem}.test{ext}")),
        parent.join(format!("{stem}.spec{ext}")),
        parent.join("__tests__").join(format!("{stem}.test{ext}")),
    ]
    .iter()
    .map(|p| p.to_string_lossy().into_owned())
    .collect()
}

/// Runs the four suites in the platform checkout at `repo_dir`.
#[derive(Debug, Clone)]
pub struct SuiteRunner {
    repo_dir: PathBuf,
    unit: SuiteConfig,
    integration: SuiteConfig,
    type_check: SuiteConfig,
    lint: SuiteConfig,
}

impl SuiteRunner {
    pub fn new(repo_dir: impl Into<PathBuf>, config: &TestsConfig) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            unit: SuiteConfig::from_settings(SuiteKind::Unit, config.suite(SuiteKind::Unit)),
            integration: SuiteConfig::from_settings(
                SuiteKind::Integration,
                config.suite(SuiteKind::Integration),
            ),
            type_check: SuiteConfig::from_settings(
                SuiteKind::TypeCheck,
                config.suite(SuiteKind::TypeCheck),
            ),
            lint: SuiteConfig::from_settings(SuiteKind::Lint, config.suite(SuiteKind::Lint)),
        }
    }

    /// Replace one suite's configuration.
    pub fn with_suite(mut self, config: SuiteConfig) -> Self {
        match config.kind {
            SuiteKind::Unit => self.unit = config,
            SuiteKind::Integration => self.integration = config,
            SuiteKind::TypeCheck => self.type_check = config,
            SuiteKind::Lint => self.lint = config,
        }
        self
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    async fn run_suite(&self, config: &SuiteConfig) -> SuiteResult {
        let kind = config.kind;
        if !config.enabled {
            info!(suite = kind.name(), "suite disabled, skipping");
            return SuiteResult::skipped(kind);
        }

        match CiRunner::execute_suite(config, &self.repo_dir).await {
            Ok(execution) => {
                let passed = suite_passed(kind, &execution);
                info!(
                    suite = kind.name(),
                    passed,
                    exit_code = ?execution.exit_code,
                    duration_ms = execution.duration_ms,
                    timed_out = execution.timed_out,
                    "suite finished"
                );
                SuiteResult {
                    kind,
                    passed,
                    exit_code: execution.exit_code,
                    output: execution.output,
                    duration_ms: execution.duration_ms,
                    timed_out: execution.timed_out,
                    note: None,
                }
            }
            Err(e) => {
                warn!(suite = kind.name(), error = %e, "suite could not start");
                SuiteResult::spawn_failed(kind, format!("could not start: {e}"))
            }
        }
    }
}

#[async_trait]
impl TestRunner for SuiteRunner {
    async fn run_all_tests(&self) -> TestRunReport {
        let start = Instant::now();

        let (unit, type_check, lint) = tokio::join!(
            self.run_suite(&self.unit),
            self.run_suite(&self.type_check),
            self.run_suite(&self.lint),
        );
        let integration = self.run_suite(&self.integration).await;

        let report = TestRunReport::from_suites(
            unit,
            integration,
            type_check,
            lint,
            start.elapsed().as_millis() as u64,
        );
        info!(
            success = report.success,
            total_duration_ms = report.total_duration_ms,
            "test run complete"
        );
        report
    }

    async fn run_tests_for_files(&self, files: &[String]) -> TargetedTestReport {
        let test_files: Vec<String> = files
            .iter()
            .flat_map(|f| test_candidates(f))
            .filter(|candidate| self.repo_dir.join(candidate).is_file())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if test_files.is_empty() {
            info!(files = ?files, "no tests match the modified files");
            return TargetedTestReport::nothing_to_run();
        }

        let suite = self.run_suite(&self.unit.with_args(&test_files)).await;
        TargetedTestReport {
            success: suite.passed,
            test_files,
            suite: Some(suite),
        }
    }
}
