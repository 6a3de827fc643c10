//! Remedy CI - validation suites for candidate patches
//!
//! Implements the core `TestRunner` trait by running the platform's own
//! tooling as subprocesses:
//! - unit tests, type-check and lint concurrently, then integration tests
//! - a timeout per suite; a hung suite is killed and counted as failed
//! - targeted unit runs for the tests that belong to modified files

pub mod runner;
pub mod stage;
pub mod suite;
pub mod verdict;

// Re-export key types
pub use runner::{CiRunner, SuiteExecution, MAX_OUTPUT_BYTES};
pub use stage::{builtin_command, SuiteConfig};
pub use suite::{test_candidates, SuiteRunner};
pub use verdict::suite_passed;
