//! Post-deployment health probes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use remedy_state::{HealthCheckResult, RemediationStore};
use tokio::process::Command;

use crate::config::DeployConfig;

/// One round of process, data-store and endpoint probes.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> HealthCheckResult;
}

/// Probes the running platform.
///
/// - process: run the configured command, exit 0 means alive
/// - data store: `RemediationStore::ping`
/// - endpoints: GET each URL, every one must answer 2xx
///
/// All three run concurrently; a probe error counts as `false` and lands in
/// `details`.
pub struct SystemHealthProbe {
    store: Arc<dyn RemediationStore>,
    process_check: Vec<String>,
    endpoints: Vec<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl SystemHealthProbe {
    pub fn new(store: Arc<dyn RemediationStore>, config: &DeployConfig) -> Self {
        Self {
            store,
            process_check: config.process_check.clone(),
            endpoints: config.endpoints.clone(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(config.probe_timeout_secs.max(1)),
        }
    }

    async fn check_process(&self) -> Result<(), String> {
        let Some((exe, args)) = self.process_check.split_first() else {
            return Ok(());
        };
        let run = Command::new(exe).args(args).kill_on_drop(true).output();
        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => Err(format!(
                "process check `{}` exited with {}",
                self.process_check.join(" "),
                output.status
            )),
            Ok(Err(e)) => Err(format!("process check could not run: {e}")),
            Err(_) => Err(format!(
                "process check timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }

    async fn check_store(&self) -> Result<(), String> {
        match tokio::time::timeout(self.timeout, self.store.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("data store unreachable: {e}")),
            Err(_) => Err(format!(
                "data store ping timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }

    async fn check_endpoint(&self, url: &str) -> Result<(), String> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("endpoint {url} unreachable: {e}"))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("endpoint {url} returned {}", response.status()))
        }
    }

    async fn check_endpoints(&self) -> Vec<String> {
        join_all(self.endpoints.iter().map(|url| self.check_endpoint(url)))
            .await
            .into_iter()
            .filter_map(|r| r.err())
            .collect()
    }
}

#[async_trait]
impl HealthProbe for SystemHealthProbe {
    async fn probe(&self) -> HealthCheckResult {
        let (process, store, endpoint_failures) = tokio::join!(
            self.check_process(),
            self.check_store(),
            self.check_endpoints()
        );

        let mut details = Vec::new();
        if let Err(e) = &process {
            details.push(e.clone());
        }
        if let Err(e) = &store {
            details.push(e.clone());
        }
        let endpoints_ok = endpoint_failures.is_empty();
        details.extend(endpoint_failures);

        HealthCheckResult::from_probes(process.is_ok(), store.is_ok(), endpoints_ok, details)
    }
}
