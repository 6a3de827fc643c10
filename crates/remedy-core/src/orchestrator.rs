//! Recovery Orchestrator: drives one patch from `generated` to a terminal
//! state.
//!
//! ```text
//! generated ─▶ testing ─▶ passed ─┬─▶ (manual)
//!                  │              └─▶ deploying ─▶ deployed ─▶ resolved
//!                  ▼                      │            │
//!               failed                    ▼            ▼
//!                                     rolled_back  rolled_back
//! ```
//!
//! The order is fixed: safety lock, tests, deploy policy, deploy, health
//! check. Entering `testing` and `deploying` is a compare-and-set on the
//! stored status pair, so two runs for the same patch never both proceed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use remedy_state::{
    DeploymentStatus, DetectedError, DiagnosticReader, ErrorStatus, HealthCheckResult, Patch,
    PatchId, PatchState, RemediationStore, ValidationStatus,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn, Instrument};

use crate::config::OrchestratorConfig;
use crate::deploy::{should_auto_deploy_patch, DeployOptions, DeploymentManager, RollbackResult};
use crate::domain::{Impact, RemedyError, Result};
use crate::metrics::METRICS;
use crate::notify::{NotificationService, Priority};
use crate::obs;
use crate::safety_lock::SafetyLock;
use crate::test_runner::{TestRunReport, TestRunner};

pub const MANUAL_ROLLBACK_REASON: &str = "manual rollback requested";

/// Caller intent for one recovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryOptions {
    /// Deploy when policy allows. `false` stops after validation.
    pub auto_deploy: bool,
    pub skip_tests: bool,
    pub require_health_check: bool,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            auto_deploy: true,
            skip_tests: false,
            require_health_check: true,
        }
    }
}

/// Outcome of [`RecoveryOrchestrator::run_recovery_procedure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub patch_id: PatchId,
    pub success: bool,
    pub tests_passed: bool,
    pub deployed: bool,
    pub health_check_passed: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub killed_by_circuit_breaker: bool,
}

impl RecoveryResult {
    fn new(patch_id: PatchId) -> Self {
        Self {
            patch_id,
            success: false,
            tests_passed: false,
            deployed: false,
            health_check_passed: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            killed_by_circuit_breaker: false,
        }
    }

    fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(patch_id = %self.patch_id, "{message}");
        self.warnings.push(message);
    }
}

/// One unhealthy probe seen while monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorIssue {
    pub at: DateTime<Utc>,
    pub details: Vec<String>,
}

/// Outcome of [`RecoveryOrchestrator::monitor_deployed_patch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorReport {
    pub patch_id: PatchId,
    /// No probe failed during the window.
    pub stable: bool,
    pub checks: usize,
    pub issues: Vec<MonitorIssue>,
}

/// Health checks that fit in `window`; at least one.
fn monitor_rounds(window: Duration, interval: Duration) -> u64 {
    (window.as_secs() / interval.as_secs().max(1)).max(1)
}

/// Lowercase, with runs of non-alphanumerics collapsed to one `-`.
fn normalize_tag(tag: &str) -> String {
    tag.trim()
        .to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

pub struct RecoveryOrchestrator {
    store: Arc<dyn RemediationStore>,
    diagnostics: Arc<dyn DiagnosticReader>,
    safety_lock: SafetyLock,
    tests: Arc<dyn TestRunner>,
    deployer: DeploymentManager,
    notifications: NotificationService,
    medical_tags: Vec<String>,
    monitor_interval: Duration,
}

impl RecoveryOrchestrator {
    pub fn new(
        store: Arc<dyn RemediationStore>,
        diagnostics: Arc<dyn DiagnosticReader>,
        safety_lock: SafetyLock,
        tests: Arc<dyn TestRunner>,
        deployer: DeploymentManager,
        notifications: NotificationService,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            diagnostics,
            safety_lock,
            tests,
            deployer,
            notifications,
            medical_tags: config.medical_tags.iter().map(|t| normalize_tag(t)).collect(),
            monitor_interval: Duration::from_secs(config.monitor_interval_secs.max(1)),
        }
    }

    pub fn deployer(&self) -> &DeploymentManager {
        &self.deployer
    }

    pub fn safety_lock(&self) -> &SafetyLock {
        &self.safety_lock
    }

    /// Run the full lock → tests → policy → deploy → health pipeline.
    ///
    /// Never fails: infrastructure errors land in `errors` with
    /// `success = false`.
    pub async fn run_recovery_procedure(
        &self,
        patch_id: PatchId,
        options: RecoveryOptions,
    ) -> RecoveryResult {
        self.recover(patch_id, options)
            .instrument(obs::recovery_span(patch_id.0))
            .await
    }

    async fn recover(&self, patch_id: PatchId, options: RecoveryOptions) -> RecoveryResult {
        let start = Instant::now();
        METRICS.inc_recoveries();
        let mut result = RecoveryResult::new(patch_id);

        if let Err(e) = self.recover_steps(patch_id, options, &mut result).await {
            error!(patch_id = %patch_id, error = %e, "recovery aborted");
            result.success = false;
            result.errors.push(e.to_string());
        }

        obs::emit_recovery_finished(
            patch_id.0,
            start.elapsed().as_millis() as u64,
            result.success,
            result.deployed,
            result.killed_by_circuit_breaker,
        );
        result
    }

    async fn recover_steps(
        &self,
        patch_id: PatchId,
        options: RecoveryOptions,
        result: &mut RecoveryResult,
    ) -> Result<()> {
        let mut patch = self.store.get_patch(patch_id).await?;
        let error = self.store.get_error(patch.error_id).await?;
        obs::emit_recovery_started(patch.id.0, error.id.0, options.auto_deploy);

        if patch.validation_status == ValidationStatus::Testing
            || patch.deployment_status == DeploymentStatus::Deploying
        {
            result.warn(format!(
                "patch {} is already being processed ({} / {})",
                patch.id, patch.validation_status, patch.deployment_status
            ));
            return Ok(());
        }
        if patch.deployment_status.is_final() {
            result.errors.push(format!(
                "patch {} is already {}; nothing to do",
                patch.id, patch.deployment_status
            ));
            return Ok(());
        }

        if let Some(file) = self.first_refused_file(&patch, &error).await {
            return self.reject_by_kill_switch(&mut patch, &file, result).await;
        }

        let original = patch.state();
        let outcome = self
            .validate_and_deploy(&mut patch, &error, options, result)
            .await;
        if outcome.is_err() {
            self.release_claim(patch.id, original).await;
        }
        outcome
    }

    /// Consult the lock for every modified file (or the error's file when
    /// the patch lists none). Stops at the first refusal.
    async fn first_refused_file(&self, patch: &Patch, error: &DetectedError) -> Option<String> {
        let files: Vec<&str> = if patch.modified_files.is_empty() {
            vec![error.location.file.as_str()]
        } else {
            patch.modified_files.iter().map(String::as_str).collect()
        };
        for file in files {
            if !self.safety_lock.check_safety_lock(file, error.id).await {
                return Some(file.to_string());
            }
        }
        None
    }

    async fn reject_by_kill_switch(
        &self,
        patch: &mut Patch,
        file: &str,
        result: &mut RecoveryResult,
    ) -> Result<()> {
        let expected = patch.state();
        patch.deployment_status = DeploymentStatus::Rejected;
        patch.rejection_reason = Some(format!("kill switch engaged for {file}"));
        patch.updated_at = Utc::now();
        result.killed_by_circuit_breaker = true;
        result.errors.push(format!(
            "kill switch engaged: too many remediation attempts for {file} (error {})",
            patch.error_id
        ));
        if !self.store.update_patch_if(patch, expected).await? {
            result.warn(format!(
                "patch {} changed concurrently; rejection not recorded",
                patch.id
            ));
        }
        Ok(())
    }

    async fn validate_and_deploy(
        &self,
        patch: &mut Patch,
        error: &DetectedError,
        options: RecoveryOptions,
        result: &mut RecoveryResult,
    ) -> Result<()> {
        if options.skip_tests {
            result.warn("tests skipped at caller request");
        } else {
            let expected = patch.state();
            patch.validation_status = ValidationStatus::Testing;
            patch.updated_at = Utc::now();
            if !self.store.update_patch_if(patch, expected).await? {
                result.warn(format!("patch {} was claimed by another run", patch.id));
                return Ok(());
            }

            let report = self.run_tests_on_branch(&patch.branch).await?;
            patch.validation_status = if report.success {
                ValidationStatus::Passed
            } else {
                ValidationStatus::Failed
            };
            patch.test_results = Some(serde_json::to_value(&report)?);
            patch.updated_at = Utc::now();
            self.store.update_patch(patch).await?;

            if !report.success {
                result
                    .errors
                    .push(format!("tests failed: {}", report.summary()));
                return Ok(());
            }
            result.tests_passed = true;
        }

        let (impact, medical) = self.assess(error, result).await?;
        if !options.auto_deploy {
            result.warn("auto-deploy disabled by caller; patch awaits manual deployment");
            result.success = true;
            return Ok(());
        }
        if !should_auto_deploy_patch(impact, medical) {
            let why = if medical {
                "patch affects a medical pathway".to_string()
            } else {
                format!("impact is {impact}")
            };
            result.warn(format!(
                "{why}; patch left validated for manual deployment"
            ));
            result.success = true;
            return Ok(());
        }

        self.deploy_and_verify(patch, error, options, result).await
    }

    /// Check out the patch branch, run every suite, and switch back.
    async fn run_tests_on_branch(&self, branch: &str) -> Result<TestRunReport> {
        let scm = self.deployer.source_control();
        let previous = scm.current_branch().await?;
        scm.switch_branch(branch).await?;
        let report = self.tests.run_all_tests().await;
        if let Err(e) = scm.switch_branch(&previous).await {
            warn!(branch = %previous, error = %e, "failed to switch back after tests");
        }
        info!(branch = %branch, success = report.success, summary = %report.summary(), "test run finished");
        Ok(report)
    }

    /// Impact and medical-pathway flag from the error's diagnostic.
    async fn assess(
        &self,
        error: &DetectedError,
        result: &mut RecoveryResult,
    ) -> Result<(Impact, bool)> {
        let Some(diagnostic) = self.diagnostics.diagnostic_for_error(error.id).await? else {
            result.warn(format!(
                "no diagnostic for error {}; impact treated as unknown",
                error.id
            ));
            return Ok((Impact::Unknown, false));
        };
        let medical = diagnostic
            .affected_features
            .iter()
            .any(|tag| self.is_medical_tag(tag));
        Ok((Impact::parse(&diagnostic.impact), medical))
    }

    /// A tag is medical when it contains a configured medical tag as whole words,
    /// so `Clinical-Reasoning` and `medical_pathway` both count.
    fn is_medical_tag(&self, tag: &str) -> bool {
        let padded = format!("-{}-", normalize_tag(tag));
        self.medical_tags
            .iter()
            .any(|m| padded.contains(&format!("-{m}-")))
    }

    async fn deploy_and_verify(
        &self,
        patch: &mut Patch,
        error: &DetectedError,
        options: RecoveryOptions,
        result: &mut RecoveryResult,
    ) -> Result<()> {
        let expected = patch.state();
        patch.deployment_status = DeploymentStatus::Deploying;
        patch.updated_at = Utc::now();
        if !self.store.update_patch_if(patch, expected).await? {
            result.warn(format!("patch {} was claimed by another run", patch.id));
            return Ok(());
        }

        let deploy = self
            .deployer
            .deploy_patch(
                &patch.branch,
                DeployOptions {
                    skip_tests: true,
                    create_backup: true,
                },
            )
            .await;

        if !deploy.success {
            let reason = format!("deployment failed: {}", deploy.errors.join("; "));
            self.mark_rolled_back(patch, &reason).await?;
            result.errors.extend(deploy.errors);
            if let Err(e) = self.notifications.deployment_failed(patch.id, &reason).await {
                warn!(error = %e, "failed to send deployment-failed alert");
            }
            return Ok(());
        }

        let now = Utc::now();
        patch.deployment_status = DeploymentStatus::Deployed;
        patch.deployed_at = Some(now);
        patch.updated_at = now;
        result.deployed = true;
        if let Err(e) = self.store.update_patch(patch).await {
            // Mainline already carries the merge; the stored patch stays
            // `deploying` so no other run picks it up.
            patch.deployment_status = DeploymentStatus::Deploying;
            patch.deployed_at = None;
            let reason = format!(
                "patch {} was merged into {} but could not be recorded as deployed, \
                 manual intervention required: {e}",
                patch.id,
                self.deployer.main_branch()
            );
            error!(patch_id = %patch.id, error = %e, "deployed patch not recorded");
            result.errors.push(reason.clone());
            if let Err(e) = self
                .notifications
                .manual_review_required(error.id, &reason)
                .await
            {
                warn!(error = %e, "failed to send manual review alert");
            }
            return Ok(());
        }
        if let Err(e) = self.notifications.deployment_success(patch.id).await {
            warn!(error = %e, "failed to send deployment-success alert");
        }

        if !options.require_health_check {
            result.warn("post-deployment health check disabled by caller");
            self.resolve(error).await?;
            result.success = true;
            return Ok(());
        }

        let health = self.deployer.perform_health_check().await;
        self.record_snapshot(&health, result).await;
        if health.healthy {
            result.health_check_passed = true;
            self.resolve(error).await?;
            result.success = true;
            return Ok(());
        }

        let reason = format!("health check failed: {}", health.details.join("; "));
        let rollback = self
            .deployer
            .rollback_deployment(None, deploy.backup_commit.as_deref())
            .await;
        self.mark_rolled_back(patch, &reason).await?;
        if let Err(e) = self.notifications.health_check_failed(patch.id, &health).await {
            warn!(error = %e, "failed to send health-check-failed alert");
        }

        result.errors.push(format!("{reason}; deployment rolled back"));
        let escalation = if rollback.success {
            None
        } else {
            result.errors.push(format!(
                "rollback after failed health check did not complete, manual intervention required: {}",
                rollback.errors.join("; ")
            ));
            Some(Priority::Critical)
        };
        if let Err(e) = self
            .notifications
            .rollback_triggered(patch.id, &reason, escalation)
            .await
        {
            warn!(error = %e, "failed to send rollback alert");
        }
        Ok(())
    }

    async fn mark_rolled_back(&self, patch: &mut Patch, reason: &str) -> Result<()> {
        let now = Utc::now();
        patch.deployment_status = DeploymentStatus::RolledBack;
        patch.rolled_back_at = Some(now);
        patch.rollback_reason = Some(reason.to_string());
        patch.updated_at = now;
        self.store.update_patch(patch).await?;
        Ok(())
    }

    async fn resolve(&self, error: &DetectedError) -> Result<()> {
        self.store
            .set_error_status(error.id, ErrorStatus::Resolved)
            .await?;
        info!(error_id = %error.id, "error resolved");
        Ok(())
    }

    async fn record_snapshot(&self, health: &HealthCheckResult, result: &mut RecoveryResult) {
        if let Err(e) = self.store.record_health_check(health).await {
            result.warn(format!("health snapshot not recorded: {e}"));
        }
    }

    /// Put a transient status left behind by a failed run back to the pair
    /// it was claimed from.
    async fn release_claim(&self, patch_id: PatchId, original: PatchState) {
        let mut stored = match self.store.get_patch(patch_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(patch_id = %patch_id, error = %e, "could not reload patch to release claim");
                return;
            }
        };
        let mut changed = false;
        if stored.validation_status == ValidationStatus::Testing {
            stored.validation_status = original.validation;
            changed = true;
        }
        if stored.deployment_status == DeploymentStatus::Deploying {
            stored.deployment_status = original.deployment;
            changed = true;
        }
        if !changed {
            return;
        }
        stored.updated_at = Utc::now();
        match self.store.update_patch(&stored).await {
            Ok(()) => info!(patch_id = %patch_id, "released patch claim after failure"),
            Err(e) => warn!(patch_id = %patch_id, error = %e, "failed to release patch claim"),
        }
    }

    /// Operator-approved deploy: same pipeline with `auto_deploy` forced on.
    /// The impact policy still applies.
    pub async fn manually_deploy_patch(&self, patch_id: PatchId) -> RecoveryResult {
        self.run_recovery_procedure(
            patch_id,
            RecoveryOptions {
                auto_deploy: true,
                ..RecoveryOptions::default()
            },
        )
        .await
    }

    /// Roll mainline back one commit and mark the patch `rolled_back`.
    ///
    /// Only a `deployed` patch can be rolled back; anything else is refused
    /// without touching mainline.
    pub async fn manually_rollback_patch(&self, patch_id: PatchId) -> Result<RollbackResult> {
        let mut patch = self.store.get_patch(patch_id).await?;
        if patch.deployment_status != DeploymentStatus::Deployed {
            return Err(RemedyError::InvalidState(format!(
                "patch {} is {}, not deployed",
                patch.id, patch.deployment_status
            )));
        }
        let rollback = self.deployer.rollback_deployment(None, None).await;
        if !rollback.success {
            warn!(patch_id = %patch_id, errors = ?rollback.errors, "manual rollback failed");
            return Ok(rollback);
        }

        self.mark_rolled_back(&mut patch, MANUAL_ROLLBACK_REASON)
            .await?;
        if let Err(e) = self
            .notifications
            .rollback_triggered(patch_id, MANUAL_ROLLBACK_REASON, None)
            .await
        {
            warn!(error = %e, "failed to send rollback alert");
        }
        Ok(rollback)
    }

    /// Probe every monitor interval for `minutes`; at least one probe.
    pub async fn monitor_deployed_patch(
        &self,
        patch_id: PatchId,
        minutes: u64,
    ) -> Result<MonitorReport> {
        let patch = self.store.get_patch(patch_id).await?;
        if patch.deployment_status != DeploymentStatus::Deployed {
            return Err(RemedyError::InvalidState(format!(
                "patch {} is {}, not deployed",
                patch.id, patch.deployment_status
            )));
        }

        let window = Duration::from_secs(minutes.saturating_mul(60));
        let rounds = monitor_rounds(window, self.monitor_interval);
        info!(patch_id = %patch_id, minutes, rounds, "monitoring deployed patch");

        let mut issues = Vec::new();
        for _ in 0..rounds {
            if window >= self.monitor_interval {
                tokio::time::sleep(self.monitor_interval).await;
            }
            let health = self.deployer.probe_health().await;
            if let Err(e) = self.store.record_health_check(&health).await {
                warn!(error = %e, "health snapshot not recorded");
            }
            if !health.healthy {
                issues.push(MonitorIssue {
                    at: health.checked_at,
                    details: health.details,
                });
            }
        }

        Ok(MonitorReport {
            patch_id,
            stable: issues.is_empty(),
            checks: rounds as usize,
            issues,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_normalized_to_dashed_lowercase() {
        assert_eq!(normalize_tag(" Clinical_Reasoning "), "clinical-reasoning");
        assert_eq!(normalize_tag("vital  signs"), "vital-signs");
        assert_eq!(normalize_tag("--"), "");
    }

    #[test]
    fn monitor_rounds_survive_huge_windows() {
        let interval = Duration::from_secs(300);
        let window = Duration::from_secs(u64::MAX.saturating_mul(60));
        assert_eq!(monitor_rounds(window, interval), u64::MAX / 300);
        assert_eq!(monitor_rounds(Duration::ZERO, interval), 1);
        assert_eq!(monitor_rounds(Duration::from_secs(1800), interval), 6);
    }
}
