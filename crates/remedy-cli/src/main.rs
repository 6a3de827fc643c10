//! Remedy CLI
//!
//! The `remedy` command drives the remediation pipeline by hand.
//!
//! ## Commands
//!
//! - `recover`: run the full pipeline for a generated patch
//! - `deploy` / `rollback`: operator-approved deploy and rollback
//! - `monitor`: watch a deployed patch's health for a while
//! - `lock`: inspect or reset the safety lock for a file/error pair
//! - `report`: send a morning or evening report now
//! - `health`: probe the platform once
//! - `window`: show when the next deploy may happen

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use remedy_ci::SuiteRunner;
use remedy_core::{
    deployment_window_at, init_tracing, DeploymentWindow, MonitorReport, Platform,
    RecoveryOptions, RecoveryResult, RemedyConfig, ReportPeriod, RollbackResult,
};
use remedy_state::{ErrorId, PatchId};
use tracing::Level;

#[derive(Parser)]
#[command(name = "remedy")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Self-healing remediation pipeline", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "REMEDY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run lock, tests, deploy policy, deploy and health check for a patch
    Recover {
        /// Patch id
        patch: i64,

        /// Stop after validation even when policy would deploy
        #[arg(long)]
        no_auto_deploy: bool,

        /// Skip the test suites (logged as a warning)
        #[arg(long)]
        skip_tests: bool,

        /// Resolve the error without a post-deploy health check
        #[arg(long)]
        no_health_check: bool,
    },

    /// Deploy a patch on operator approval (impact policy still applies)
    Deploy {
        /// Patch id
        patch: i64,
    },

    /// Roll mainline back one commit and mark the patch rolled back
    Rollback {
        /// Patch id
        patch: i64,
    },

    /// Probe health periodically for a deployed patch
    Monitor {
        /// Patch id
        patch: i64,

        /// Monitoring window in minutes
        #[arg(short, long, default_value = "30")]
        minutes: u64,
    },

    /// Inspect or reset the safety lock
    Lock {
        #[command(subcommand)]
        action: LockAction,
    },

    /// Generate and send a report now
    Report {
        #[arg(value_enum)]
        period: PeriodArg,
    },

    /// Probe process, data store and endpoints once
    Health,

    /// Show the next deployment window
    Window,
}

#[derive(Subcommand)]
enum LockAction {
    /// Show attempts and remaining window for a file/error pair
    Status {
        /// Source file the patch modifies
        file: String,

        /// Error id
        error: i64,
    },

    /// Clear the attempt counter for a file/error pair
    Reset {
        /// Source file the patch modifies
        file: String,

        /// Error id
        error: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PeriodArg {
    Morning,
    Evening,
}

impl From<PeriodArg> for ReportPeriod {
    fn from(arg: PeriodArg) -> Self {
        match arg {
            PeriodArg::Morning => ReportPeriod::Morning,
            PeriodArg::Evening => ReportPeriod::Evening,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let config = RemedyConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Commands::Window = cli.command {
        return cmd_window(&config);
    }

    let tests = Arc::new(SuiteRunner::new(
        config.workspace.repo_dir.clone(),
        &config.tests,
    ));
    let platform = Platform::connect(config, tests)
        .await
        .context("Failed to connect remediation backends")?;

    match cli.command {
        Commands::Recover {
            patch,
            no_auto_deploy,
            skip_tests,
            no_health_check,
        } => {
            let options = RecoveryOptions {
                auto_deploy: !no_auto_deploy,
                skip_tests,
                require_health_check: !no_health_check,
            };
            cmd_recover(&platform, PatchId(patch), options).await
        }
        Commands::Deploy { patch } => cmd_deploy(&platform, PatchId(patch)).await,
        Commands::Rollback { patch } => cmd_rollback(&platform, PatchId(patch)).await,
        Commands::Monitor { patch, minutes } => {
            cmd_monitor(&platform, PatchId(patch), minutes).await
        }
        Commands::Lock { action } => match action {
            LockAction::Status { file, error } => {
                cmd_lock_status(&platform, &file, ErrorId(error)).await
            }
            LockAction::Reset { file, error } => {
                cmd_lock_reset(&platform, &file, ErrorId(error)).await
            }
        },
        Commands::Report { period } => cmd_report(&platform, period.into()).await,
        Commands::Health => cmd_health(&platform).await,
        Commands::Window => cmd_window(&platform.config),
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn print_recovery(result: &RecoveryResult) {
    let outcome = if result.killed_by_circuit_breaker {
        "stopped by kill switch"
    } else if result.success {
        "succeeded"
    } else {
        "failed"
    };
    println!("Recovery for patch {}: {}", result.patch_id, outcome);
    println!("  tests passed:  {}", yes_no(result.tests_passed));
    println!("  deployed:      {}", yes_no(result.deployed));
    println!("  health check:  {}", yes_no(result.health_check_passed));
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }
    for error in &result.errors {
        println!("  error:   {error}");
    }
}

fn finish_recovery(result: RecoveryResult) -> Result<()> {
    print_recovery(&result);
    if !result.success {
        anyhow::bail!("recovery of patch {} did not succeed", result.patch_id);
    }
    Ok(())
}

/// Run the full recovery pipeline
async fn cmd_recover(platform: &Platform, patch: PatchId, options: RecoveryOptions) -> Result<()> {
    let result = platform
        .orchestrator
        .run_recovery_procedure(patch, options)
        .await;
    finish_recovery(result)
}

/// Operator-approved deploy
async fn cmd_deploy(platform: &Platform, patch: PatchId) -> Result<()> {
    let result = platform.orchestrator.manually_deploy_patch(patch).await;
    finish_recovery(result)
}

fn print_rollback(patch: PatchId, rollback: &RollbackResult) {
    let head = rollback
        .previous_head
        .as_deref()
        .map(|h| &h[..8.min(h.len())])
        .unwrap_or("unknown");
    println!(
        "Rollback of patch {} on '{}': {} (was {}, reset to {})",
        patch,
        rollback.target_branch,
        if rollback.success { "done" } else { "failed" },
        head,
        rollback.reset_to
    );
    for error in &rollback.errors {
        println!("  error: {error}");
    }
}

/// Manual rollback
async fn cmd_rollback(platform: &Platform, patch: PatchId) -> Result<()> {
    let rollback = platform
        .orchestrator
        .manually_rollback_patch(patch)
        .await
        .context(format!("Failed to roll back patch {patch}"))?;
    print_rollback(patch, &rollback);
    if !rollback.success {
        anyhow::bail!("rollback of patch {patch} failed");
    }
    Ok(())
}

fn print_monitor(report: &MonitorReport) {
    println!(
        "Patch {}: {} after {} checks",
        report.patch_id,
        if report.stable { "stable" } else { "unstable" },
        report.checks
    );
    for issue in &report.issues {
        println!(
            "  {}  {}",
            issue.at.format("%Y-%m-%d %H:%M:%S UTC"),
            issue.details.join("; ")
        );
    }
}

/// Watch a deployed patch
async fn cmd_monitor(platform: &Platform, patch: PatchId, minutes: u64) -> Result<()> {
    let report = platform
        .orchestrator
        .monitor_deployed_patch(patch, minutes)
        .await
        .context(format!("Failed to monitor patch {patch}"))?;
    print_monitor(&report);
    Ok(())
}

/// Show safety lock state
async fn cmd_lock_status(platform: &Platform, file: &str, error: ErrorId) -> Result<()> {
    let status = platform
        .safety_lock
        .get_safety_lock_status(file, error)
        .await
        .context("Failed to read safety lock")?;
    println!(
        "{} / error {}: {}/{} attempts{}",
        status.file,
        status.error_id,
        status.attempts,
        status.max_attempts,
        if status.engaged { " (engaged)" } else { "" }
    );
    match status.remaining_secs {
        Some(secs) => println!("  window resets in {}m {}s", secs / 60, secs % 60),
        None => println!("  no open window"),
    }
    Ok(())
}

/// Clear the safety lock
async fn cmd_lock_reset(platform: &Platform, file: &str, error: ErrorId) -> Result<()> {
    platform
        .safety_lock
        .reset_safety_lock(file, error)
        .await
        .context("Failed to reset safety lock")?;
    println!("Reset safety lock for {file} / error {error}");
    Ok(())
}

/// Send a report now
async fn cmd_report(platform: &Platform, period: ReportPeriod) -> Result<()> {
    let report = platform
        .reports
        .send_test_report(period)
        .await
        .context(format!("Failed to send {} report", period.as_str()))?;
    println!(
        "Sent {} report: {} errors ({} critical, {} resolved), {} patches ({} deployed, {} rolled back)",
        period.as_str(),
        report.errors.total,
        report.errors.critical,
        report.errors.resolved,
        report.patches.generated,
        report.patches.deployed,
        report.patches.rolled_back
    );
    Ok(())
}

/// Probe health once
async fn cmd_health(platform: &Platform) -> Result<()> {
    let health = platform.deployer().probe_health().await;
    platform
        .store
        .record_health_check(&health)
        .await
        .context("Failed to record health snapshot")?;

    println!("process alive:        {}", yes_no(health.process_alive));
    println!("store reachable:      {}", yes_no(health.store_reachable));
    println!("endpoints responsive: {}", yes_no(health.endpoints_responsive));
    for line in &health.details {
        println!("  {line}");
    }
    if !health.healthy {
        anyhow::bail!("platform is unhealthy");
    }
    Ok(())
}

/// Show the next deployment window
fn cmd_window(config: &RemedyConfig) -> Result<()> {
    match deployment_window_at(config.deploy.peak_hours, &Local::now()) {
        DeploymentWindow::Now => println!("Deployments allowed now"),
        DeploymentWindow::Deferred { not_before } => println!(
            "Peak hours: deployments deferred until {}",
            not_before.with_timezone(&Local).format("%Y-%m-%d %H:%M %Z")
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_core::fakes::{
        MemoryNotifier, MemorySourceControl, ScriptedTestRunner, StaticHealthProbe,
    };
    use remedy_core::{Backends, PeakHours};
    use remedy_state::fakes::{MemoryCounterStore, MemoryRemediationStore};
    use remedy_state::{
        DeploymentStatus, DetectedError, Diagnostic, DiagnosticId, ErrorSeverity, ErrorStatus,
        Patch, RemediationStore,
    };

    struct Fixture {
        store: Arc<MemoryRemediationStore>,
        notifier: Arc<MemoryNotifier>,
        platform: Platform,
    }

    async fn fixture(probe: StaticHealthProbe) -> Fixture {
        let store = Arc::new(MemoryRemediationStore::new());
        store
            .put_error(DetectedError::new(
                ErrorId(42),
                "runtime",
                ErrorSeverity::High,
                "invoice total is undefined",
                "src/billing/invoice.ts",
            ))
            .await
            .unwrap();
        store
            .put_patch(Patch::new(
                PatchId(7),
                ErrorId(42),
                "v1",
                "fix/error-42",
                vec!["src/billing/invoice.ts".to_string()],
            ))
            .await
            .unwrap();
        store
            .put_diagnostic(Diagnostic {
                id: DiagnosticId(1),
                error_id: ErrorId(42),
                root_cause: Default::default(),
                impact: "low".to_string(),
                affected_features: vec!["billing".to_string()],
                confidence: 0.9,
            })
            .await
            .unwrap();

        let scm = Arc::new(MemorySourceControl::new("main"));
        scm.add_branch("fix/error-42");
        let notifier = Arc::new(MemoryNotifier::new());
        let mut config = RemedyConfig::default();
        config.deploy.stabilization_delay_secs = 0;

        let platform = Platform::assemble(
            config,
            Backends {
                store: store.clone(),
                counters: Arc::new(MemoryCounterStore::new()),
                notifier: notifier.clone(),
                scm,
                probe: Arc::new(probe),
            },
            Arc::new(ScriptedTestRunner::passing()),
        );
        Fixture {
            store,
            notifier,
            platform,
        }
    }

    #[test]
    fn recover_flags_parse() {
        let cli = Cli::parse_from(["remedy", "recover", "7", "--no-auto-deploy", "--skip-tests"]);
        match cli.command {
            Commands::Recover {
                patch,
                no_auto_deploy,
                skip_tests,
                no_health_check,
            } => {
                assert_eq!(patch, 7);
                assert!(no_auto_deploy);
                assert!(skip_tests);
                assert!(!no_health_check);
            }
            _ => panic!("expected recover"),
        }
    }

    #[test]
    fn lock_and_report_parse() {
        let cli = Cli::parse_from(["remedy", "lock", "reset", "src/app.ts", "42"]);
        assert!(matches!(
            cli.command,
            Commands::Lock {
                action: LockAction::Reset { error: 42, .. }
            }
        ));

        let cli = Cli::parse_from(["remedy", "--json", "report", "evening"]);
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Report {
                period: PeriodArg::Evening
            }
        ));
    }

    #[tokio::test]
    async fn test_cmd_recover_deploys_and_resolves() {
        let f = fixture(StaticHealthProbe::healthy()).await;

        cmd_recover(&f.platform, PatchId(7), RecoveryOptions::default())
            .await
            .unwrap();

        let patch = f.store.get_patch(PatchId(7)).await.unwrap();
        assert_eq!(patch.deployment_status, DeploymentStatus::Deployed);
        let error = f.store.get_error(ErrorId(42)).await.unwrap();
        assert_eq!(error.status, ErrorStatus::Resolved);
    }

    #[tokio::test]
    async fn test_cmd_recover_fails_on_unhealthy_deploy() {
        let f = fixture(StaticHealthProbe::unhealthy()).await;

        let result = cmd_recover(&f.platform, PatchId(7), RecoveryOptions::default()).await;

        assert!(result.is_err());
        let patch = f.store.get_patch(PatchId(7)).await.unwrap();
        assert_eq!(patch.deployment_status, DeploymentStatus::RolledBack);
    }

    #[tokio::test]
    async fn test_cmd_rollback_after_deploy() {
        let f = fixture(StaticHealthProbe::healthy()).await;
        cmd_deploy(&f.platform, PatchId(7)).await.unwrap();

        cmd_rollback(&f.platform, PatchId(7)).await.unwrap();

        let patch = f.store.get_patch(PatchId(7)).await.unwrap();
        assert_eq!(patch.deployment_status, DeploymentStatus::RolledBack);
    }

    #[tokio::test]
    async fn test_cmd_lock_status_and_reset() {
        let f = fixture(StaticHealthProbe::healthy()).await;
        let lock = &f.platform.safety_lock;
        for _ in 0..3 {
            assert!(lock.check_safety_lock("src/app.ts", ErrorId(42)).await);
        }

        cmd_lock_status(&f.platform, "src/app.ts", ErrorId(42))
            .await
            .unwrap();
        assert!(lock
            .get_safety_lock_status("src/app.ts", ErrorId(42))
            .await
            .unwrap()
            .engaged);

        cmd_lock_reset(&f.platform, "src/app.ts", ErrorId(42))
            .await
            .unwrap();
        let status = lock
            .get_safety_lock_status("src/app.ts", ErrorId(42))
            .await
            .unwrap();
        assert_eq!(status.attempts, 0);
        assert!(!status.engaged);
    }

    #[tokio::test]
    async fn test_cmd_report_sends_alert() {
        let f = fixture(StaticHealthProbe::healthy()).await;

        cmd_report(&f.platform, ReportPeriod::Morning).await.unwrap();

        assert!(f.notifier.has_title("Remediation Report"));
    }

    #[tokio::test]
    async fn test_cmd_health_records_snapshot() {
        let f = fixture(StaticHealthProbe::healthy()).await;

        cmd_health(&f.platform).await.unwrap();

        assert_eq!(f.store.health_check_count(), 1);
    }

    #[tokio::test]
    async fn test_cmd_health_fails_when_unhealthy() {
        let f = fixture(StaticHealthProbe::unhealthy()).await;
        assert!(cmd_health(&f.platform).await.is_err());
        assert_eq!(f.store.health_check_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cmd_monitor_requires_deployed_patch() {
        let f = fixture(StaticHealthProbe::healthy()).await;
        assert!(cmd_monitor(&f.platform, PatchId(7), 5).await.is_err());

        cmd_deploy(&f.platform, PatchId(7)).await.unwrap();
        cmd_monitor(&f.platform, PatchId(7), 5).await.unwrap();
    }

    #[test]
    fn test_cmd_window_with_and_without_peak_hours() {
        let mut config = RemedyConfig::default();
        cmd_window(&config).unwrap();
        config.deploy.peak_hours = Some(PeakHours {
            start_hour: 0,
            end_hour: 24,
        });
        cmd_window(&config).unwrap();
    }
}
