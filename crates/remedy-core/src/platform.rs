//! Service wiring shared by the `remedy` CLI and the `remedyd` daemon.

use std::sync::Arc;

use remedy_state::{
    CounterStore, DiagnosticReader, RedisCounterStore, RemediationStore, SurrealRemediationStore,
};
use tracing::info;

use crate::config::RemedyConfig;
use crate::deploy::DeploymentManager;
use crate::domain::Result;
use crate::git::{GitCli, SourceControl};
use crate::health::{HealthProbe, SystemHealthProbe};
use crate::notify::{LogNotifier, NotificationService, Notifier, WebhookNotifier};
use crate::orchestrator::RecoveryOrchestrator;
use crate::report::ReportGenerator;
use crate::safety_lock::SafetyLock;
use crate::test_runner::TestRunner;

/// Every service, wired to one store.
pub struct Platform {
    pub config: RemedyConfig,
    pub store: Arc<dyn RemediationStore>,
    pub notifications: NotificationService,
    pub safety_lock: SafetyLock,
    pub orchestrator: RecoveryOrchestrator,
    pub reports: ReportGenerator,
}

/// Collaborators the services are built from.
pub struct Backends<S> {
    pub store: Arc<S>,
    pub counters: Arc<dyn CounterStore>,
    pub notifier: Arc<dyn Notifier>,
    pub scm: Arc<dyn SourceControl>,
    pub probe: Arc<dyn HealthProbe>,
}

impl Platform {
    /// Connect the configured backends: SurrealDB (`SURREALDB_URL` or local
    /// files), Redis counters when a url is set, webhook alerts when a url is
    /// set, git in the configured repository.
    pub async fn connect(config: RemedyConfig, tests: Arc<dyn TestRunner>) -> Result<Self> {
        let store = Arc::new(SurrealRemediationStore::from_env().await?);
        Self::with_store(config, store, tests)
    }

    /// Wire the services onto an opened store.
    ///
    /// Without a redis url the safety lock counters are kept in the store
    /// itself, so attempts are shared by every process using it. Redis is
    /// contacted on first use; while it is down the lock lets attempts
    /// through.
    pub fn with_store(
        config: RemedyConfig,
        store: Arc<SurrealRemediationStore>,
        tests: Arc<dyn TestRunner>,
    ) -> Result<Self> {
        let counters: Arc<dyn CounterStore> = match &config.safety_lock.redis_url {
            Some(url) => Arc::new(RedisCounterStore::new(url)?),
            None => {
                info!("no redis url configured; safety lock counters kept in the remediation store");
                let counters: Arc<dyn CounterStore> = store.clone();
                counters
            }
        };

        let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
            None => {
                info!("no webhook url configured; alerts go to the log");
                Arc::new(LogNotifier)
            }
        };

        let scm = Arc::new(GitCli::new(config.workspace.repo_dir.clone()));
        let probe = Arc::new(SystemHealthProbe::new(store.clone(), &config.deploy));

        Ok(Self::assemble(
            config,
            Backends {
                store,
                counters,
                notifier,
                scm,
                probe,
            },
            tests,
        ))
    }

    pub fn assemble<S>(config: RemedyConfig, backends: Backends<S>, tests: Arc<dyn TestRunner>) -> Self
    where
        S: RemediationStore + DiagnosticReader + 'static,
    {
        let store: Arc<dyn RemediationStore> = backends.store.clone();
        let diagnostics: Arc<dyn DiagnosticReader> = backends.store;

        let notifications = NotificationService::new(store.clone(), backends.notifier);
        let safety_lock = SafetyLock::new(backends.counters, &config.safety_lock)
            .with_notifications(notifications.clone());
        let deployer = DeploymentManager::new(
            backends.scm,
            tests.clone(),
            backends.probe,
            config.workspace.main_branch.clone(),
            &config.deploy,
        );
        let orchestrator = RecoveryOrchestrator::new(
            store.clone(),
            diagnostics.clone(),
            safety_lock.clone(),
            tests,
            deployer,
            notifications.clone(),
            &config.orchestrator,
        );
        let reports = ReportGenerator::new(store.clone(), diagnostics, notifications.clone());

        Self {
            config,
            store,
            notifications,
            safety_lock,
            orchestrator,
            reports,
        }
    }

    pub fn deployer(&self) -> &DeploymentManager {
        self.orchestrator.deployer()
    }
}
