//! Remedy-State: persistence layer for the remediation pipeline
//!
//! This crate owns every record the pipeline reads or writes, and the
//! shared counter the safety lock relies on.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: record integrity, compare-and-set status transitions, and atomic
//! counters that survive restarts and span workers.
//!
//! ## Key Components
//!
//! - `RemediationStore`: detected errors, patches, health snapshots
//! - `DiagnosticReader`: read-only diagnosis lookups
//! - `CounterStore`: atomic increment-with-expiry
//! - `SurrealRemediationStore` / `RedisCounterStore`: production backends
//! - `fakes`: in-memory implementations for tests

mod error;
pub mod fakes;
mod migrations;
mod redis_counter;
mod schema;
pub mod storage_traits;
mod surreal_store;

pub use error::{StateError, StorageError};
pub use redis_counter::RedisCounterStore;
pub use storage_traits::{
    counter_key, CounterSnapshot, CounterStore, DeploymentStatus, DetectedError, Diagnostic,
    DiagnosticId, DiagnosticReader, ErrorId, ErrorSeverity, ErrorStatus, HealthCheckResult, Patch,
    PatchId, PatchState, RemediationStore, SourceLocation, StorageResult, ValidationStatus,
};
pub use surreal_store::SurrealRemediationStore;

/// Result type for remedy-state backend setup
pub type Result<T> = std::result::Result<T, StateError>;
