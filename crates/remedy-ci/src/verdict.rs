//! Pass/fail decision per suite kind.
//!
//! Tests pass only on exit 0. Type-check and lint tolerate a non-zero exit
//! that only reports warnings.

use std::sync::OnceLock;

use regex::Regex;
use remedy_core::SuiteKind;

use crate::runner::SuiteExecution;

/// `error` as a whole word, any case.
fn type_error_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\berror\b").expect("valid regex"))
}

pub fn suite_passed(kind: SuiteKind, execution: &SuiteExecution) -> bool {
    if execution.timed_out {
        return false;
    }
    match execution.exit_code {
        Some(0) => true,
        None => false,
        Some(_) => match kind {
            SuiteKind::Unit | SuiteKind::Integration => false,
            SuiteKind::TypeCheck => !type_check_reported_error(&execution.output),
            SuiteKind::Lint => !lint_reported_error(&execution.output),
        },
    }
}

fn type_check_reported_error(output: &str) -> bool {
    type_error_re().is_match(output)
}

/// `error` without any `warning` in the output.
fn lint_reported_error(output: &str) -> bool {
    let lower = output.to_ascii_lowercase();
    lower.contains("error") && !lower.contains("warning")
}
