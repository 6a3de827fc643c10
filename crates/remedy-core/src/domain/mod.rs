//! Domain models for Remedy.
//!
//! Entity records (errors, patches, diagnostics, health snapshots) live in
//! `remedy-state`; this module holds the pipeline-level vocabulary:
//! - `Impact`: diagnosis impact classification
//! - `RemedyError` / `NotifyError`: error taxonomy

pub mod error;
pub mod impact;

pub use error::{NotifyError, RemedyError, Result};
pub use impact::Impact;
