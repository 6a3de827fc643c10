//! Global atomic counters for the remediation pipeline.
//!
//! Counters are bumped at the call site. [`Metrics::flush`] emits the
//! current values as one `tracing::info!` event (end of a CLI command,
//! scheduler tick).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lock-free counters.
pub struct Metrics {
    recoveries_started: AtomicU64,
    kill_switch_trips: AtomicU64,
    deployments: AtomicU64,
    rollbacks: AtomicU64,
    health_failures: AtomicU64,
    alerts_sent: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            recoveries_started: AtomicU64::new(0),
            kill_switch_trips: AtomicU64::new(0),
            deployments: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            health_failures: AtomicU64::new(0),
            alerts_sent: AtomicU64::new(0),
        }
    }

    pub fn inc_recoveries(&self) {
        self.recoveries_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "recoveries_started", "counter incremented");
    }

    pub fn inc_kill_switch(&self) {
        self.kill_switch_trips.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "kill_switch_trips", "counter incremented");
    }

    pub fn inc_deployments(&self) {
        self.deployments.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "deployments", "counter incremented");
    }

    pub fn inc_rollbacks(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rollbacks", "counter incremented");
    }

    pub fn inc_health_failures(&self) {
        self.health_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "health_failures", "counter incremented");
    }

    pub fn inc_alerts(&self) {
        self.alerts_sent.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "alerts_sent", "counter incremented");
    }

    /// Emit all counters as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            recoveries_started = self.recoveries_started(),
            kill_switch_trips = self.kill_switch_trips(),
            deployments = self.deployments(),
            rollbacks = self.rollbacks(),
            health_failures = self.health_failures(),
            alerts_sent = self.alerts_sent(),
        );
    }

    pub fn recoveries_started(&self) -> u64 {
        self.recoveries_started.load(Ordering::Relaxed)
    }

    pub fn kill_switch_trips(&self) -> u64 {
        self.kill_switch_trips.load(Ordering::Relaxed)
    }

    pub fn deployments(&self) -> u64 {
        self.deployments.load(Ordering::Relaxed)
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    pub fn health_failures(&self) -> u64 {
        self.health_failures.load(Ordering::Relaxed)
    }

    pub fn alerts_sent(&self) -> u64 {
        self.alerts_sent.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.recoveries_started.store(0, Ordering::Relaxed);
        self.kill_switch_trips.store(0, Ordering::Relaxed);
        self.deployments.store(0, Ordering::Relaxed);
        self.rollbacks.store(0, Ordering::Relaxed);
        self.health_failures.store(0, Ordering::Relaxed);
        self.alerts_sent.store(0, Ordering::Relaxed);
    }
}
