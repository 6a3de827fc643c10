//! SurrealDB-backed RemediationStore implementation
//!
//! Uses the row types in `schema` for persistence, converting to/from
//! `storage_traits` types at the boundary. The same store doubles as the
//! safety lock's `CounterStore` when no Redis is configured.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::{CounterRow, DiagnosticRow, ErrorRow, HealthRow, PatchRow};
use crate::storage_traits::{
    CounterSnapshot, CounterStore, DetectedError, Diagnostic, DiagnosticReader, ErrorId,
    ErrorStatus, HealthCheckResult, Patch, PatchId, PatchState, RemediationStore, StorageResult,
};

const NAMESPACE: &str = "remedy";
const DATABASE: &str = "main";
const LOCAL_DB_PATH: &str = ".remedy/db";

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// SurrealDB-backed implementation of [`RemediationStore`] and
/// [`DiagnosticReader`].
#[derive(Clone)]
pub struct SurrealRemediationStore {
    db: Surreal<Any>,
}

impl SurrealRemediationStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `remedy/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect("mem://").await
    }

    /// Connect to an explicit endpoint (`mem://`, `surrealkv://path`, `ws://host`).
    pub async fn connect(url: &str) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        info!("SurrealRemediationStore connected ({})", url);
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// Uses `SURREALDB_URL` when set, otherwise local persistence in
    /// `.remedy/db`.
    pub async fn from_env() -> crate::Result<Self> {
        if let Ok(url) = std::env::var("SURREALDB_URL") {
            return Self::connect(&url).await;
        }

        std::fs::create_dir_all(LOCAL_DB_PATH).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                LOCAL_DB_PATH, e
            ))
        })?;
        let url = format!("surrealkv://{}", LOCAL_DB_PATH);
        info!("No SURREALDB_URL found, using local persistence: {}", url);
        Self::connect(&url).await
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_patch_row(&self, id: PatchId) -> StorageResult<PatchRow> {
        let mut res = self
            .db
            .query("SELECT * FROM patches WHERE patch_id = $pid")
            .bind(("pid", id.0))
            .await
            .map_err(backend)?;

        let rows: Vec<PatchRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or(StorageError::PatchNotFound { id: id.0 })
    }
}

#[async_trait]
impl RemediationStore for SurrealRemediationStore {
    async fn put_error(&self, error: DetectedError) -> StorageResult<()> {
        debug!(error_id = %error.id, "upserting detected error");
        let row = ErrorRow::from(&error);
        self.db
            .query("DELETE detected_errors WHERE error_id = $eid; CREATE detected_errors CONTENT $row;")
            .bind(("eid", error.id.0))
            .bind(("row", row))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    async fn get_error(&self, id: ErrorId) -> StorageResult<DetectedError> {
        let mut res = self
            .db
            .query("SELECT * FROM detected_errors WHERE error_id = $eid")
            .bind(("eid", id.0))
            .await
            .map_err(backend)?;

        let rows: Vec<ErrorRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or(StorageError::ErrorNotFound { id: id.0 })?
            .try_into()
    }

    async fn set_error_status(&self, id: ErrorId, status: ErrorStatus) -> StorageResult<()> {
        let mut res = self
            .db
            .query("UPDATE detected_errors SET status = $status WHERE error_id = $eid RETURN AFTER")
            .bind(("status", status.as_str().to_string()))
            .bind(("eid", id.0))
            .await
            .map_err(backend)?;

        let rows: Vec<ErrorRow> = res.take(0).map_err(backend)?;
        if rows.is_empty() {
            return Err(StorageError::ErrorNotFound { id: id.0 });
        }
        Ok(())
    }

    async fn list_errors_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<DetectedError>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM detected_errors WHERE first_seen >= $from AND first_seen < $to \
                 ORDER BY first_seen ASC",
            )
            .bind(("from", SurrealDatetime::from(from)))
            .bind(("to", SurrealDatetime::from(to)))
            .await
            .map_err(backend)?;

        let rows: Vec<ErrorRow> = res.take(0).map_err(backend)?;
        rows.into_iter().map(DetectedError::try_from).collect()
    }

    async fn put_diagnostic(&self, diagnostic: Diagnostic) -> StorageResult<()> {
        let row = DiagnosticRow::from(&diagnostic);
        self.db
            .query("DELETE diagnostics WHERE diagnostic_id = $did; CREATE diagnostics CONTENT $row;")
            .bind(("did", diagnostic.id.0))
            .bind(("row", row))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    async fn put_patch(&self, patch: Patch) -> StorageResult<()> {
        debug!(patch_id = %patch.id, "upserting patch");
        let row = PatchRow::from(&patch);
        self.db
            .query("DELETE patches WHERE patch_id = $pid; CREATE patches CONTENT $row;")
            .bind(("pid", patch.id.0))
            .bind(("row", row))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    async fn get_patch(&self, id: PatchId) -> StorageResult<Patch> {
        self.fetch_patch_row(id).await?.try_into()
    }

    async fn update_patch(&self, patch: &Patch) -> StorageResult<()> {
        let mut existing = self.fetch_patch_row(patch.id).await?;
        let mut row = PatchRow::from(patch);
        row.id = existing.id.take();

        self.db
            .query("UPDATE patches CONTENT $row WHERE patch_id = $pid")
            .bind(("row", row))
            .bind(("pid", patch.id.0))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    async fn update_patch_if(&self, patch: &Patch, expected: PatchState) -> StorageResult<bool> {
        let mut existing = self.fetch_patch_row(patch.id).await?;
        let mut row = PatchRow::from(patch);
        row.id = existing.id.take();

        let mut res = self
            .db
            .query(
                "UPDATE patches CONTENT $row WHERE patch_id = $pid \
                 AND validation_status = $validation AND deployment_status = $deployment \
                 RETURN AFTER",
            )
            .bind(("row", row))
            .bind(("pid", patch.id.0))
            .bind(("validation", expected.validation.as_str().to_string()))
            .bind(("deployment", expected.deployment.as_str().to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<PatchRow> = res.take(0).map_err(backend)?;
        Ok(!rows.is_empty())
    }

    async fn list_patches_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Patch>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM patches WHERE created_at >= $from AND created_at < $to \
                 ORDER BY created_at ASC",
            )
            .bind(("from", SurrealDatetime::from(from)))
            .bind(("to", SurrealDatetime::from(to)))
            .await
            .map_err(backend)?;

        let rows: Vec<PatchRow> = res.take(0).map_err(backend)?;
        rows.into_iter().map(Patch::try_from).collect()
    }

    async fn record_health_check(&self, result: &HealthCheckResult) -> StorageResult<()> {
        let _created: Option<HealthRow> = self
            .db
            .create("health_checks")
            .content(HealthRow::from(result))
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn latest_health_check(&self) -> StorageResult<Option<HealthCheckResult>> {
        let mut res = self
            .db
            .query("SELECT * FROM health_checks ORDER BY checked_at DESC LIMIT 1")
            .await
            .map_err(backend)?;

        let rows: Vec<HealthRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next().map(HealthCheckResult::from))
    }

    async fn ping(&self) -> StorageResult<()> {
        self.db
            .health()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl DiagnosticReader for SurrealRemediationStore {
    async fn diagnostic_for_error(&self, error_id: ErrorId) -> StorageResult<Option<Diagnostic>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM diagnostics WHERE error_id = $eid ORDER BY diagnostic_id DESC LIMIT 1",
            )
            .bind(("eid", error_id.0))
            .await
            .map_err(backend)?;

        let rows: Vec<DiagnosticRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().next().map(Diagnostic::from))
    }
}

/// Counters live in `safety_counters`, one record per key. Each increment is
/// a single `UPSERT`, so concurrent writers (including other processes on the
/// same database) serialize on the record; an expired record restarts at 1
/// with a fresh deadline.
#[async_trait]
impl CounterStore for SurrealRemediationStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StorageResult<CounterSnapshot> {
        let now = Utc::now();
        let window = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::Backend(format!("invalid counter ttl: {e}")))?;

        let mut res = self
            .db
            .query(
                "UPSERT type::thing('safety_counters', $key) SET \
                 count = IF !expires_at OR expires_at <= $now THEN 1 ELSE count + 1 END, \
                 expires_at = IF !expires_at OR expires_at <= $now THEN $deadline ELSE expires_at END \
                 RETURN AFTER",
            )
            .bind(("key", key.to_string()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind(("deadline", SurrealDatetime::from(now + window)))
            .await
            .map_err(backend)?;

        let rows: Vec<CounterRow> = res.take(0).map_err(backend)?;
        let row = rows.into_iter().next().ok_or_else(|| {
            StorageError::Backend(format!("counter upsert for {key} returned no record"))
        })?;
        debug!(key, count = row.count, "counter incremented");
        Ok(row.snapshot_at(now).unwrap_or(CounterSnapshot {
            value: row.count,
            ttl: Some(Duration::ZERO),
        }))
    }

    async fn peek(&self, key: &str) -> StorageResult<Option<CounterSnapshot>> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('safety_counters', $key)")
            .bind(("key", key.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<CounterRow> = res.take(0).map_err(backend)?;
        let now = Utc::now();
        Ok(rows.into_iter().next().and_then(|row| row.snapshot_at(now)))
    }

    async fn clear(&self, key: &str) -> StorageResult<()> {
        self.db
            .query("DELETE type::thing('safety_counters', $key)")
            .bind(("key", key.to_string()))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }
}
