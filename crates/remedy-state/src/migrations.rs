//! SurrealDB schema migrations and initialization
//!
//! Sets up the remediation tables with their unique keys and the indexes
//! the report windows query on.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Remedy tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Remedy SurrealDB schema");

    init_errors_table(db).await?;
    init_diagnostics_table(db).await?;
    init_patches_table(db).await?;
    init_health_checks_table(db).await?;
    init_safety_counters_table(db).await?;

    info!("Remedy schema initialization complete");
    Ok(())
}

/// Initialize `detected_errors`
///
/// ```text
/// TABLE detected_errors {
///   error_id:    INT (unique)
///   category:    STRING
///   severity:    STRING (low | medium | high | critical)
///   message:     STRING
///   file:        STRING
///   line:        INT?
///   first_seen:  DATETIME (indexed)
///   last_seen:   DATETIME
///   occurrences: INT
///   status:      STRING (detected | resolved)
/// }
/// ```
async fn init_errors_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing detected_errors table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS detected_errors SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_error_id ON TABLE detected_errors COLUMNS error_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_error_first_seen ON TABLE detected_errors COLUMNS first_seen;
    "#;

    db.query(sql).await?.check()?;
    Ok(())
}

/// Initialize `diagnostics` (written by the diagnoser, read here)
async fn init_diagnostics_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing diagnostics table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS diagnostics SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_diagnostic_id ON TABLE diagnostics COLUMNS diagnostic_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_diagnostic_error ON TABLE diagnostics COLUMNS error_id;
    "#;

    db.query(sql).await?.check()?;
    Ok(())
}

/// Initialize `patches`
///
/// Status transitions are enforced by the orchestrator through
/// compare-and-set updates, not by the schema.
async fn init_patches_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing patches table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS patches SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_patch_id ON TABLE patches COLUMNS patch_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_patch_error ON TABLE patches COLUMNS error_id;
        DEFINE INDEX IF NOT EXISTS idx_patch_created_at ON TABLE patches COLUMNS created_at;
    "#;

    db.query(sql).await?.check()?;
    Ok(())
}

/// Initialize `health_checks` (append-only)
async fn init_health_checks_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing health_checks table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS health_checks SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_health_checked_at ON TABLE health_checks COLUMNS checked_at;
    "#;

    db.query(sql).await?.check()?;
    Ok(())
}

/// Initialize `safety_counters`
///
/// One record per counter key, addressed as `safety_counters:⟨key⟩`.
/// Expired records are treated as absent and replaced on the next increment.
///
/// ```text
/// TABLE safety_counters {
///   count:      INT
///   expires_at: DATETIME
/// }
/// ```
async fn init_safety_counters_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing safety_counters table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS safety_counters SCHEMALESS;
    "#;

    db.query(sql).await?.check()?;
    Ok(())
}
