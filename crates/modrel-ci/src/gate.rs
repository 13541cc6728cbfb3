//! Aggregate gate over a dynamically sized set of units.
//!
//! The host can only require checks by fixed name, so a fan-out of unknown
//! width is collapsed into one pass/fail verdict here.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pipeline::ModuleReport;

/// Terminal status of one unit of work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Success,
    Failure,
    Cancelled,
    Skipped,
    TimedOut,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Success => "success",
            UnitStatus::Failure => "failure",
            UnitStatus::Cancelled => "cancelled",
            UnitStatus::Skipped => "skipped",
            UnitStatus::TimedOut => "timed_out",
        }
    }

    /// `Success` and `Skipped` let the gate pass; everything else blocks it.
    pub fn is_passing(&self) -> bool {
        matches!(self, UnitStatus::Success | UnitStatus::Skipped)
    }

    /// Parse a host job result. Unknown values count as failure.
    pub fn from_result(value: &str) -> Self {
        value.parse().unwrap_or(UnitStatus::Failure)
    }
}

impl FromStr for UnitStatus {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(UnitStatus::Success),
            "failure" => Ok(UnitStatus::Failure),
            "cancelled" => Ok(UnitStatus::Cancelled),
            "skipped" => Ok(UnitStatus::Skipped),
            "timed_out" => Ok(UnitStatus::TimedOut),
            other => Err(GateError::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors reading gate input.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("unknown unit status: {0}")]
    UnknownStatus(String),

    #[error("invalid gate input: {0}")]
    InvalidInput(#[from] serde_json::Error),
}

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateVerdict {
    /// Whether the gate passed.
    pub passed: bool,

    /// Violations that caused failure (empty if passed).
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct NeedsEntry {
    result: String,
}

/// Aggregate gate rules.
pub struct ReleaseGate;

impl ReleaseGate {
    /// Pass iff every unit succeeded or was skipped. An empty set passes.
    pub fn evaluate<S: AsRef<str>>(units: &[(S, UnitStatus)]) -> GateVerdict {
        let violations: Vec<String> = units
            .iter()
            .filter(|(_, status)| !status.is_passing())
            .map(|(name, status)| format!("Unit '{}' finished with status {}", name.as_ref(), status))
            .collect();

        let passed = violations.is_empty();
        let message = if passed {
            format!("All {} unit(s) succeeded or were skipped", units.len())
        } else {
            format!(
                "Gate failed: {} of {} unit(s) did not succeed",
                violations.len(),
                units.len()
            )
        };

        GateVerdict {
            passed,
            violations,
            message,
        }
    }

    /// Evaluate the per-module reports of one run.
    pub fn evaluate_reports(reports: &[ModuleReport]) -> GateVerdict {
        let units: Vec<(&str, UnitStatus)> = reports
            .iter()
            .map(|r| (r.directory.as_str(), r.status))
            .collect();
        Self::evaluate(&units)
    }

    /// Evaluate the host's `needs` context, e.g.
    /// `{"release": {"result": "success", "outputs": {}}}`.
    pub fn evaluate_needs(raw: &str) -> Result<GateVerdict, GateError> {
        let needs: BTreeMap<String, NeedsEntry> = serde_json::from_str(raw)?;
        let units: Vec<(String, UnitStatus)> = needs
            .into_iter()
            .map(|(name, entry)| {
                let status = UnitStatus::from_result(&entry.result);
                (name, status)
            })
            .collect();
        Ok(Self::evaluate(&units))
    }
}
