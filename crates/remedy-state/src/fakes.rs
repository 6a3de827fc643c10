//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryRemediationStore` and `MemoryCounterStore` that satisfy the
//! trait contracts without any external dependencies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryRemediationStore
// ---------------------------------------------------------------------------

/// In-memory remediation store backed by `HashMap`s.
///
/// Also implements [`DiagnosticReader`], so one instance can serve both
/// seams in tests.
#[derive(Debug, Default)]
pub struct MemoryRemediationStore {
    errors: Mutex<HashMap<ErrorId, DetectedError>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
    patches: Mutex<HashMap<PatchId, Patch>>,
    health: Mutex<Vec<HealthCheckResult>>,
    offline: AtomicBool,
}

impl MemoryRemediationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `ping` fail, simulating an unreachable data store.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of health snapshots recorded so far.
    pub fn health_check_count(&self) -> usize {
        self.health.lock().unwrap().len()
    }
}

#[async_trait]
impl RemediationStore for MemoryRemediationStore {
    async fn put_error(&self, error: DetectedError) -> StorageResult<()> {
        let mut errors = self.errors.lock().unwrap();
        errors.insert(error.id, error);
        Ok(())
    }

    async fn get_error(&self, id: ErrorId) -> StorageResult<DetectedError> {
        let errors = self.errors.lock().unwrap();
        errors
            .get(&id)
            .cloned()
            .ok_or(StorageError::ErrorNotFound { id: id.0 })
    }

    async fn set_error_status(&self, id: ErrorId, status: ErrorStatus) -> StorageResult<()> {
        let mut errors = self.errors.lock().unwrap();
        let error = errors
            .get_mut(&id)
            .ok_or(StorageError::ErrorNotFound { id: id.0 })?;
        error.status = status;
        Ok(())
    }

    async fn list_errors_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<DetectedError>> {
        let errors = self.errors.lock().unwrap();
        let mut found: Vec<DetectedError> = errors
            .values()
            .filter(|e| e.first_seen >= from && e.first_seen < to)
            .cloned()
            .collect();
        found.sort_by_key(|e| (e.first_seen, e.id));
        Ok(found)
    }

    async fn put_diagnostic(&self, diagnostic: Diagnostic) -> StorageResult<()> {
        let mut diagnostics = self.diagnostics.lock().unwrap();
        diagnostics.retain(|d| d.id != diagnostic.id);
        diagnostics.push(diagnostic);
        Ok(())
    }

    async fn put_patch(&self, patch: Patch) -> StorageResult<()> {
        let mut patches = self.patches.lock().unwrap();
        patches.insert(patch.id, patch);
        Ok(())
    }

    async fn get_patch(&self, id: PatchId) -> StorageResult<Patch> {
        let patches = self.patches.lock().unwrap();
        patches
            .get(&id)
            .cloned()
            .ok_or(StorageError::PatchNotFound { id: id.0 })
    }

    async fn update_patch(&self, patch: &Patch) -> StorageResult<()> {
        let mut patches = self.patches.lock().unwrap();
        let slot = patches
            .get_mut(&patch.id)
            .ok_or(StorageError::PatchNotFound { id: patch.id.0 })?;
        *slot = patch.clone();
        Ok(())
    }

    async fn update_patch_if(&self, patch: &Patch, expected: PatchState) -> StorageResult<bool> {
        let mut patches = self.patches.lock().unwrap();
        let slot = patches
            .get_mut(&patch.id)
            .ok_or(StorageError::PatchNotFound { id: patch.id.0 })?;
        if slot.state() != expected {
            return Ok(false);
        }
        *slot = patch.clone();
        Ok(true)
    }

    async fn list_patches_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Patch>> {
        let patches = self.patches.lock().unwrap();
        let mut found: Vec<Patch> = patches
            .values()
            .filter(|p| p.created_at >= from && p.created_at < to)
            .cloned()
            .collect();
        found.sort_by_key(|p| (p.created_at, p.id));
        Ok(found)
    }

    async fn record_health_check(&self, result: &HealthCheckResult) -> StorageResult<()> {
        let mut health = self.health.lock().unwrap();
        health.push(result.clone());
        Ok(())
    }

    async fn latest_health_check(&self) -> StorageResult<Option<HealthCheckResult>> {
        let health = self.health.lock().unwrap();
        Ok(health.iter().max_by_key(|h| h.checked_at).cloned())
    }

    async fn ping(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory store marked offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DiagnosticReader for MemoryRemediationStore {
    async fn diagnostic_for_error(&self, error_id: ErrorId) -> StorageResult<Option<Diagnostic>> {
        let diagnostics = self.diagnostics.lock().unwrap();
        Ok(diagnostics
            .iter()
            .filter(|d| d.error_id == error_id)
            .max_by_key(|d| d.id)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// MemoryCounterStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    value: u64,
    expires_at: Instant,
}

/// In-memory counter store with lazy expiry.
///
/// Uses `tokio::time::Instant`, so tests running with paused time can move
/// a window forward with `tokio::time::advance`.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, CounterEntry>>,
    unavailable: AtomicBool,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory counter store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StorageResult<CounterSnapshot> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(key.to_string())
            .and_modify(|e| {
                if e.expires_at <= now {
                    *e = CounterEntry {
                        value: 0,
                        expires_at: now + ttl,
                    };
                }
            })
            .or_insert(CounterEntry {
                value: 0,
                expires_at: now + ttl,
            });
        entry.value += 1;
        Ok(CounterSnapshot {
            value: entry.value,
            ttl: Some(entry.expires_at.saturating_duration_since(now)),
        })
    }

    async fn peek(&self, key: &str) -> StorageResult<Option<CounterSnapshot>> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key).copied() {
            Some(entry) if entry.expires_at > now => Ok(Some(CounterSnapshot {
                value: entry.value,
                ttl: Some(entry.expires_at.saturating_duration_since(now)),
            })),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn clear(&self, key: &str) -> StorageResult<()> {
        self.check_available()?;
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key);
        Ok(())
    }
}
