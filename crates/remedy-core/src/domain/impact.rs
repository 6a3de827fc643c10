//! Impact classification attached to a diagnosis.

use serde::{Deserialize, Serialize};

/// How much of the platform an error (and therefore its fix) touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
    Critical,
    /// Missing or unrecognised classification.
    Unknown,
}

impl Impact {
    /// Parse a diagnosis label. Case-insensitive; anything unrecognised is
    /// `Unknown`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Impact::Low,
            "medium" => Impact::Medium,
            "high" => Impact::High,
            "critical" => Impact::Critical,
            _ => Impact::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Impact::Low => "low",
            Impact::Medium => "medium",
            Impact::High => "high",
            Impact::Critical => "critical",
            Impact::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
