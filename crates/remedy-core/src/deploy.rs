//! Deployment Manager: merge a patch branch into mainline, probe health, roll
//! back.
//!
//! Every deploy records the branch it started on. Any failure after the
//! checkout moved triggers a restore to that branch; a failed restore is
//! reported separately from the original failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone, Timelike, Utc};
use remedy_state::HealthCheckResult;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{DeployConfig, PeakHours};
use crate::domain::Impact;
use crate::git::SourceControl;
use crate::health::HealthProbe;
use crate::metrics::METRICS;
use crate::obs;
use crate::test_runner::{TestRunReport, TestRunner};

/// Options for [`DeploymentManager::deploy_patch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeployOptions {
    /// Skip the pre-merge test run (tests already passed elsewhere).
    pub skip_tests: bool,
    /// Record mainline `HEAD` before merging.
    pub create_backup: bool,
}

/// Outcome of one deploy attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub success: bool,
    pub deployed_branch: String,
    /// Branch checked out when the deploy started.
    pub previous_branch: Option<String>,
    pub duration_ms: u64,
    pub errors: Vec<String>,
    /// Mainline commit before the merge, when a backup was requested.
    pub backup_commit: Option<String>,
    pub rollback_attempted: bool,
    pub rollback_failed: bool,
    pub test_report: Option<TestRunReport>,
}

/// Outcome of a rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackResult {
    pub success: bool,
    pub target_branch: String,
    /// Revision the branch was reset to.
    pub reset_to: String,
    /// `HEAD` of the target branch before the reset, when known.
    pub previous_head: Option<String>,
    pub errors: Vec<String>,
}

/// When the next deploy may happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeploymentWindow {
    Now,
    Deferred { not_before: DateTime<Utc> },
}

/// Auto-deploy policy.
///
/// A medical pathway always blocks; otherwise only low and medium impact
/// are eligible.
pub fn should_auto_deploy_patch(impact: Impact, affects_medical_pathway: bool) -> bool {
    if affects_medical_pathway {
        return false;
    }
    matches!(impact, Impact::Low | Impact::Medium)
}

/// Window for a deploy requested at `now`.
///
/// Inside the peak band `[start_hour, end_hour)` the deploy is deferred until
/// the band closes; outside it, or with no band, it may go now.
pub fn deployment_window_at<Tz: TimeZone>(
    peak: Option<PeakHours>,
    now: &DateTime<Tz>,
) -> DeploymentWindow {
    let Some(peak) = peak else {
        return DeploymentWindow::Now;
    };
    let hour = now.hour();
    if hour < peak.start_hour || hour >= peak.end_hour {
        return DeploymentWindow::Now;
    }

    let fallback = now.with_timezone(&Utc)
        + ChronoDuration::hours(i64::from(peak.end_hour - hour))
        - ChronoDuration::minutes(i64::from(now.minute()))
        - ChronoDuration::seconds(i64::from(now.second()));
    let not_before = band_end(peak, now).unwrap_or(fallback);
    DeploymentWindow::Deferred { not_before }
}

fn band_end<Tz: TimeZone>(peak: PeakHours, now: &DateTime<Tz>) -> Option<DateTime<Utc>> {
    let today = now.date_naive();
    let naive = if peak.end_hour >= 24 {
        today.succ_opt()?.and_hms_opt(0, 0, 0)?
    } else {
        today.and_hms_opt(peak.end_hour, 0, 0)?
    };
    now.timezone()
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

/// Merges patch branches into mainline and undoes them.
///
/// Deploys and rollbacks against one repository must be serialized by the
/// caller.
#[derive(Clone)]
pub struct DeploymentManager {
    scm: Arc<dyn SourceControl>,
    tests: Arc<dyn TestRunner>,
    probe: Arc<dyn HealthProbe>,
    main_branch: String,
    stabilization_delay: Duration,
    peak_hours: Option<PeakHours>,
}

impl DeploymentManager {
    pub fn new(
        scm: Arc<dyn SourceControl>,
        tests: Arc<dyn TestRunner>,
        probe: Arc<dyn HealthProbe>,
        main_branch: impl Into<String>,
        config: &DeployConfig,
    ) -> Self {
        Self {
            scm,
            tests,
            probe,
            main_branch: main_branch.into(),
            stabilization_delay: Duration::from_secs(config.stabilization_delay_secs),
            peak_hours: config.peak_hours,
        }
    }

    pub fn main_branch(&self) -> &str {
        &self.main_branch
    }

    pub fn source_control(&self) -> &Arc<dyn SourceControl> {
        &self.scm
    }

    /// Switch to `branch`, optionally test it, then merge it into mainline.
    pub async fn deploy_patch(&self, branch: &str, options: DeployOptions) -> DeploymentResult {
        let start = Instant::now();
        let mut result = DeploymentResult {
            success: false,
            deployed_branch: branch.to_string(),
            previous_branch: None,
            duration_ms: 0,
            errors: Vec::new(),
            backup_commit: None,
            rollback_attempted: false,
            rollback_failed: false,
            test_report: None,
        };

        info!(branch = %branch, skip_tests = options.skip_tests, "starting deployment");

        if let Err(e) = self.run_deploy_steps(branch, options, &mut result).await {
            result.errors.push(e);
            self.restore_previous_branch(&mut result).await;
        } else {
            result.success = true;
            METRICS.inc_deployments();
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_deploy_finished(branch, result.duration_ms, result.success);
        result
    }

    /// The happy path. Returns the first failure as a message.
    async fn run_deploy_steps(
        &self,
        branch: &str,
        options: DeployOptions,
        result: &mut DeploymentResult,
    ) -> std::result::Result<(), String> {
        let previous = self
            .scm
            .current_branch()
            .await
            .map_err(|e| format!("could not determine current branch: {e}"))?;
        result.previous_branch = Some(previous);

        self.scm
            .switch_branch(branch)
            .await
            .map_err(|e| format!("could not switch to {branch}: {e}"))?;

        if !options.skip_tests {
            let report = self.tests.run_all_tests().await;
            let passed = report.success;
            let summary = report.summary();
            result.test_report = Some(report);
            if !passed {
                return Err(format!("tests failed on {branch}: {summary}"));
            }
        } else {
            warn!(branch = %branch, "deploying without running tests");
        }

        self.scm
            .switch_branch(&self.main_branch)
            .await
            .map_err(|e| format!("could not switch to {}: {e}", self.main_branch))?;

        if options.create_backup {
            let head = self
                .scm
                .head_commit()
                .await
                .map_err(|e| format!("could not record backup commit: {e}"))?;
            info!(commit = %head, "recorded pre-deploy backup commit");
            result.backup_commit = Some(head);
        }

        let message = format!("Deploy patch branch {branch}");
        if let Err(e) = self.scm.merge(branch, &message).await {
            if let Err(abort) = self.scm.abort_merge().await {
                warn!(error = %abort, "failed to abort merge");
            }
            return Err(format!("merge of {branch} into {} failed: {e}", self.main_branch));
        }

        Ok(())
    }

    async fn restore_previous_branch(&self, result: &mut DeploymentResult) {
        let Some(previous) = result.previous_branch.clone() else {
            return;
        };
        result.rollback_attempted = true;
        if let Err(e) = self.scm.switch_branch(&previous).await {
            result.rollback_failed = true;
            result
                .errors
                .push(format!("rollback to {previous} failed: {e}"));
            warn!(branch = %previous, error = %e, "failed to restore previous branch");
        } else {
            info!(branch = %previous, "restored previous branch after failed deployment");
        }
    }

    /// Reset `target` (default mainline) to `commit`, or one commit back.
    pub async fn rollback_deployment(
        &self,
        target: Option<&str>,
        commit: Option<&str>,
    ) -> RollbackResult {
        let target = target.unwrap_or(&self.main_branch).to_string();
        let reset_to = commit.unwrap_or("HEAD~1").to_string();
        let mut result = RollbackResult {
            success: false,
            target_branch: target.clone(),
            reset_to: reset_to.clone(),
            previous_head: None,
            errors: Vec::new(),
        };

        if let Err(e) = self.scm.switch_branch(&target).await {
            result.errors.push(format!("could not switch to {target}: {e}"));
        } else {
            result.previous_head = self.scm.head_commit().await.ok();
            match self.scm.reset_hard(&reset_to).await {
                Ok(()) => {
                    result.success = true;
                    METRICS.inc_rollbacks();
                }
                Err(e) => result
                    .errors
                    .push(format!("reset of {target} to {reset_to} failed: {e}")),
            }
        }

        obs::emit_rollback_finished(&target, commit, result.success);
        result
    }

    /// Wait for the stabilization delay, then probe.
    pub async fn perform_health_check(&self) -> HealthCheckResult {
        if !self.stabilization_delay.is_zero() {
            info!(
                delay_secs = self.stabilization_delay.as_secs(),
                "waiting for platform to stabilize"
            );
            tokio::time::sleep(self.stabilization_delay).await;
        }
        self.probe_health().await
    }

    /// Probe immediately, without the stabilization delay.
    pub async fn probe_health(&self) -> HealthCheckResult {
        let result = self.probe.probe().await;
        if !result.healthy {
            METRICS.inc_health_failures();
        }
        obs::emit_health_checked(
            result.healthy,
            result.process_alive,
            result.store_reachable,
            result.endpoints_responsive,
        );
        result
    }

    pub fn get_next_deployment_window(&self) -> DeploymentWindow {
        deployment_window_at(self.peak_hours, &Local::now())
    }
}
