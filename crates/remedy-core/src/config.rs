//! Runtime configuration for Remedy.
//!
//! Loaded from a TOML file (every section optional, missing keys fall back
//! to defaults), then overridden from `REMEDY_*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{RemedyError, Result};
use crate::test_runner::SuiteKind;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemedyConfig {
    pub workspace: WorkspaceConfig,
    pub tests: TestsConfig,
    pub safety_lock: SafetyLockConfig,
    pub deploy: DeployConfig,
    pub orchestrator: OrchestratorConfig,
    pub notify: NotifyConfig,
}

/// Repository the pipeline operates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub repo_dir: PathBuf,
    pub main_branch: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("."),
            main_branch: "main".to_string(),
        }
    }
}

/// Per-suite overrides. `command = None` keeps the builtin command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteSettings {
    #[serde(default)]
    pub command: Option<Vec<String>>,
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SuiteSettings {
    fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            command: None,
            timeout_secs,
            enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Test, type-check and lint suites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestsConfig {
    pub unit: SuiteSettings,
    pub integration: SuiteSettings,
    pub type_check: SuiteSettings,
    pub lint: SuiteSettings,
}

impl TestsConfig {
    pub fn suite(&self, kind: SuiteKind) -> &SuiteSettings {
        match kind {
            SuiteKind::Unit => &self.unit,
            SuiteKind::Integration => &self.integration,
            SuiteKind::TypeCheck => &self.type_check,
            SuiteKind::Lint => &self.lint,
        }
    }
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            unit: SuiteSettings::with_timeout(120),
            integration: SuiteSettings::with_timeout(180),
            type_check: SuiteSettings::with_timeout(60),
            lint: SuiteSettings::with_timeout(60),
        }
    }
}

/// Circuit breaker limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyLockConfig {
    /// Attempts allowed per file/error pair within one window.
    pub max_attempts: u64,
    pub window_secs: u64,
    /// Shared counter store. Without it the lock only counts within this
    /// process.
    pub redis_url: Option<String>,
}

impl Default for SafetyLockConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            window_secs: 30 * 60,
            redis_url: None,
        }
    }
}

/// Local-time band `[start_hour, end_hour)` in which deploys are deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

/// Deployment and health probing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub stabilization_delay_secs: u64,
    pub peak_hours: Option<PeakHours>,
    /// Liveness command for the platform process; exit 0 means alive.
    pub process_check: Vec<String>,
    /// Critical endpoints that must answer 2xx.
    pub endpoints: Vec<String>,
    pub probe_timeout_secs: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            stabilization_delay_secs: 15,
            peak_hours: None,
            process_check: vec!["pgrep".to_string(), "-f".to_string(), "node".to_string()],
            endpoints: vec!["http://127.0.0.1:5000/api/health".to_string()],
            probe_timeout_secs: 5,
        }
    }
}

/// Recovery orchestration policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Feature tags that mark a clinically sensitive pathway.
    pub medical_tags: Vec<String>,
    pub monitor_interval_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            medical_tags: [
                "medical",
                "clinical",
                "patient-care",
                "medication",
                "prescription",
                "diagnosis",
                "treatment",
                "vital-signs",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
            monitor_interval_secs: 5 * 60,
        }
    }
}

/// Alert delivery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// POST target for alerts. Alerts go to the log when unset.
    pub webhook_url: Option<String>,
}

impl RemedyConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or defaults when `path` is `None`, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "loading configuration");
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `REMEDY_*` overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("REMEDY_REPO_DIR") {
            self.workspace.repo_dir = PathBuf::from(dir);
        }
        if let Some(branch) = lookup("REMEDY_MAIN_BRANCH") {
            self.workspace.main_branch = branch;
        }
        if let Some(url) = lookup("REMEDY_REDIS_URL") {
            self.safety_lock.redis_url = Some(url);
        }
        if let Some(url) = lookup("REMEDY_WEBHOOK_URL") {
            self.notify.webhook_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.safety_lock.max_attempts == 0 {
            return Err(RemedyError::Config(
                "safety_lock.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.safety_lock.window_secs == 0 {
            return Err(RemedyError::Config(
                "safety_lock.window_secs must be positive".to_string(),
            ));
        }
        if self.workspace.main_branch.trim().is_empty() {
            return Err(RemedyError::Config(
                "workspace.main_branch must not be empty".to_string(),
            ));
        }
        if let Some(peak) = self.deploy.peak_hours {
            if peak.start_hour > 23 || peak.end_hour > 24 || peak.start_hour >= peak.end_hour {
                return Err(RemedyError::Config(format!(
                    "deploy.peak_hours must satisfy 0 <= start < end <= 24, got {}..{}",
                    peak.start_hour, peak.end_hour
                )));
            }
        }
        if self.orchestrator.monitor_interval_secs == 0 {
            return Err(RemedyError::Config(
                "orchestrator.monitor_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
