//! Remedy Core Library
//!
//! The remediation pipeline: safety lock, test runner seam, deployment,
//! notifications, reports and the recovery orchestrator that sequences them.

pub mod config;
pub mod deploy;
pub mod domain;
pub mod fakes;
pub mod git;
pub mod health;
pub mod metrics;
pub mod notify;
pub mod obs;
pub mod orchestrator;
pub mod platform;
pub mod report;
pub mod safety_lock;
pub mod scheduler;
pub mod telemetry;
pub mod test_runner;

pub use config::{
    DeployConfig, NotifyConfig, OrchestratorConfig, PeakHours, RemedyConfig, SafetyLockConfig,
    SuiteSettings, TestsConfig, WorkspaceConfig,
};

pub use deploy::{
    deployment_window_at, should_auto_deploy_patch, DeployOptions, DeploymentManager,
    DeploymentResult, DeploymentWindow, RollbackResult,
};

pub use domain::{Impact, NotifyError, RemedyError, Result};

pub use git::{GitCli, SourceControl};
pub use health::{HealthProbe, SystemHealthProbe};

pub use notify::{
    Alert, AlertKind, AlertMessage, LogNotifier, NotificationService, Notifier, Priority,
    WebhookNotifier,
};

pub use orchestrator::{
    MonitorIssue, MonitorReport, RecoveryOptions, RecoveryOrchestrator, RecoveryResult,
    MANUAL_ROLLBACK_REASON,
};

pub use platform::{Backends, Platform};
pub use report::{ReportGenerator, ReportPeriod, ReportWindow, RemediationReport};
pub use safety_lock::{SafetyLock, SafetyLockStatus};
pub use scheduler::{ReportScheduler, REPORT_SCHEDULE};
pub use telemetry::init_tracing;
pub use test_runner::{SuiteKind, SuiteResult, TargetedTestReport, TestRunReport, TestRunner};

/// Crate version, reported by the CLI and daemon.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
