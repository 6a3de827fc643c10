//! Safety Lock: circuit breaker on repeated remediation of the same fault.
//!
//! Each `(file, error)` pair gets an attempt counter in a shared
//! [`CounterStore`]. The first attempt opens a fixed window; once the
//! counter exceeds `max_attempts` within that window, further attempts are
//! refused until the window expires or an operator resets it.
//!
//! If the counter store is unreachable the lock fails open: the attempt is
//! allowed and a degraded-safety error is logged.

use std::sync::Arc;
use std::time::Duration;

use remedy_state::{counter_key, CounterStore, ErrorId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SafetyLockConfig;
use crate::domain::Result;
use crate::metrics::METRICS;
use crate::notify::NotificationService;
use crate::obs;

const KEY_NAMESPACE: &str = "safety_lock";

/// Snapshot of one lock entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyLockStatus {
    pub file: String,
    pub error_id: ErrorId,
    pub attempts: u64,
    pub max_attempts: u64,
    /// Seconds until the window expires; `None` when no window is open.
    pub remaining_secs: Option<u64>,
    /// The next check will be refused.
    pub engaged: bool,
}

/// Per file/error attempt limiter.
#[derive(Clone)]
pub struct SafetyLock {
    counters: Arc<dyn CounterStore>,
    notifications: Option<NotificationService>,
    max_attempts: u64,
    window: Duration,
}

impl SafetyLock {
    pub fn new(counters: Arc<dyn CounterStore>, config: &SafetyLockConfig) -> Self {
        Self {
            counters,
            notifications: None,
            max_attempts: config.max_attempts,
            window: Duration::from_secs(config.window_secs),
        }
    }

    /// Send a manual-review alert whenever the lock refuses an attempt.
    pub fn with_notifications(mut self, notifications: NotificationService) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn max_attempts(&self) -> u64 {
        self.max_attempts
    }

    fn key(file_path: &str, error_id: ErrorId) -> String {
        counter_key(KEY_NAMESPACE, &[file_path, &error_id.to_string()])
    }

    /// Record an attempt. Returns `false` when the kill switch is engaged.
    pub async fn check_safety_lock(&self, file_path: &str, error_id: ErrorId) -> bool {
        let key = Self::key(file_path, error_id);
        let snapshot = match self.counters.incr_with_ttl(&key, self.window).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                obs::emit_safety_lock_degraded(file_path, error_id.0, &e);
                return true;
            }
        };

        debug!(
            file = %file_path,
            error_id = %error_id,
            attempts = snapshot.value,
            max_attempts = self.max_attempts,
            "safety lock attempt recorded"
        );

        if snapshot.value <= self.max_attempts {
            return true;
        }

        obs::emit_safety_lock_engaged(file_path, error_id.0, snapshot.value);
        METRICS.inc_kill_switch();

        if let Some(notifications) = &self.notifications {
            let reason = format!(
                "kill switch engaged for {file_path}: {} attempts within {} minutes",
                snapshot.value,
                self.window.as_secs() / 60
            );
            if let Err(e) = notifications.manual_review_required(error_id, &reason).await {
                warn!(error_id = %error_id, error = %e, "failed to send manual review alert");
            }
        }
        false
    }

    /// Clear the entry immediately (admin override).
    pub async fn reset_safety_lock(&self, file_path: &str, error_id: ErrorId) -> Result<()> {
        self.counters.clear(&Self::key(file_path, error_id)).await?;
        info!(file = %file_path, error_id = %error_id, "safety lock reset");
        Ok(())
    }

    pub async fn get_safety_lock_status(
        &self,
        file_path: &str,
        error_id: ErrorId,
    ) -> Result<SafetyLockStatus> {
        let snapshot = self.counters.peek(&Self::key(file_path, error_id)).await?;
        let (attempts, remaining_secs) = match snapshot {
            Some(s) => (s.value, s.ttl.map(|ttl| ttl.as_secs())),
            None => (0, None),
        };
        Ok(SafetyLockStatus {
            file: file_path.to_string(),
            error_id,
            attempts,
            max_attempts: self.max_attempts,
            remaining_secs,
            engaged: attempts >= self.max_attempts,
        })
    }
}
