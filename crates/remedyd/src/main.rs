//! Remedy daemon.
//!
//! Sends the morning (08:00) and evening (20:00) remediation reports until
//! interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use remedy_ci::SuiteRunner;
use remedy_core::metrics::METRICS;
use remedy_core::{init_tracing, Platform, RemedyConfig, ReportScheduler};
use tokio::sync::watch;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "remedyd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Remedy daemon: scheduled remediation reports", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "REMEDY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(args.json, level);

    let config = RemedyConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let tests = Arc::new(SuiteRunner::new(
        config.workspace.repo_dir.clone(),
        &config.tests,
    ));
    let platform = Platform::connect(config, tests)
        .await
        .context("Failed to connect remediation backends")?;

    if let Err(e) = platform.store.ping().await {
        warn!(error = %e, "remediation store not reachable at startup");
    }

    let scheduler =
        ReportScheduler::new(platform.reports.clone()).context("Failed to build report schedule")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = scheduler.spawn(shutdown_rx);

    info!(version = remedy_core::VERSION, "remedyd started");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutdown requested");

    shutdown_tx.send(true).ok();
    handle
        .await
        .context("Report scheduler task panicked")?
        .context("Report scheduler failed")?;

    METRICS.flush();
    info!("remedyd stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_config_and_flags() {
        let args = Args::parse_from(["remedyd", "--config", "remedy.toml", "--json"]);
        assert_eq!(args.config, Some(PathBuf::from("remedy.toml")));
        assert!(args.json);
        assert!(!args.verbose);
    }
}
