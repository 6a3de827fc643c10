//! Suite definitions and configuration.

use remedy_core::{SuiteKind, SuiteSettings};
use serde::{Deserialize, Serialize};

/// Builtin command for each suite of a Node/TypeScript platform.
pub fn builtin_command(kind: SuiteKind) -> Vec<String> {
    let parts: &[&str] = match kind {
        SuiteKind::Unit => &["npm", "test"],
        SuiteKind::Integration => &["npm", "run", "test:integration"],
        SuiteKind::TypeCheck => &["npx", "tsc", "--noEmit"],
        SuiteKind::Lint => &["npx", "eslint", "."],
    };
    parts.iter().map(|p| p.to_string()).collect()
}

/// Configuration for one suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteConfig {
    pub kind: SuiteKind,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Timeout in seconds. `0` disables the timeout.
    pub timeout_secs: u64,

    pub enabled: bool,
}

impl SuiteConfig {
    pub fn from_builtin(kind: SuiteKind, timeout_secs: u64) -> Self {
        Self::custom(kind, builtin_command(kind), timeout_secs)
    }

    /// Builtin command unless `settings` overrides it.
    pub fn from_settings(kind: SuiteKind, settings: &SuiteSettings) -> Self {
        Self {
            kind,
            command: settings
                .command
                .clone()
                .unwrap_or_else(|| builtin_command(kind)),
            timeout_secs: settings.timeout_secs,
            enabled: settings.enabled,
        }
    }

    pub fn custom(kind: SuiteKind, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            kind,
            command,
            timeout_secs,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The same suite with `args` appended to the command.
    pub fn with_args(&self, args: &[String]) -> Self {
        let mut config = self.clone();
        config.command.extend(args.iter().cloned());
        config
    }
}
