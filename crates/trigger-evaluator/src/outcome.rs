//! Evaluation outcomes returned to callers

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::evaluators::{format_certainty, CertaintyReport};

/// How an evaluation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Not enough history yet
    Pending,
    /// Certainty too low, or no samples in the window
    BelowThreshold,
    /// Satisfied, but fired too recently
    Suppressed,
    /// Satisfied and written to reported state
    Fired,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Pending => "pending",
            OutcomeKind::BelowThreshold => "below_threshold",
            OutcomeKind::Suppressed => "suppressed",
            OutcomeKind::Fired => "fired",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub message: String,
    /// `None` when the window held no samples
    pub certainty: Option<f64>,
    pub events_tested: u32,
    pub events_satisfied: u32,
}

impl Outcome {
    /// Build an outcome with the standard message for `kind`
    pub fn new(kind: OutcomeKind, trigger_name: &str, report: &CertaintyReport) -> Self {
        let certainty = report.certainty();
        let label = format_certainty(certainty);
        let summary = report.summary();

        let message = match kind {
            OutcomeKind::Pending => format!(
                "Waiting for more events until trigger_period is reached for trigger {}. {}",
                trigger_name, summary
            ),
            OutcomeKind::BelowThreshold => format!(
                "Certainty {} is not sufficient to start trigger {}. {}",
                label, trigger_name, summary
            ),
            OutcomeKind::Suppressed => format!(
                "Trigger {} was already triggered recently. Try again later. {}",
                trigger_name, summary
            ),
            OutcomeKind::Fired => format!(
                "Triggered {} with certainty {}. {}",
                trigger_name, label, summary
            ),
        };

        Self {
            kind,
            message,
            certainty,
            events_tested: report.events_tested,
            events_satisfied: report.events_satisfied,
        }
    }
}
