//! Review units: what one pipeline pass covers and how it ended.

use serde::Serialize;
use std::fmt;

/// The scope one diff-fetch/analyze/notify cycle runs over.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewUnit {
    Commit { sha: String },
    PullRequest { number: u64 },
}

impl fmt::Display for ReviewUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewUnit::Commit { sha } => {
                let short = sha.get(..7).unwrap_or(sha);
                write!(f, "commit {short}")
            }
            ReviewUnit::PullRequest { number } => write!(f, "PR #{number}"),
        }
    }
}

/// How a unit ended
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Reviewed,
    SkippedDiffUnavailable,
    SkippedEmptyDiff,
    SkippedAnalysisFailed,
}

/// Outcome of processing a single unit. Only used for logging and tests;
/// nothing here reaches the webhook caller.
#[derive(Debug, Clone, Serialize)]
pub struct UnitReport {
    pub unit: ReviewUnit,
    pub status: UnitStatus,
    pub review_submitted: bool,
    pub notifications_sent: usize,
}

impl UnitReport {
    pub fn skipped(unit: ReviewUnit, status: UnitStatus) -> Self {
        Self {
            unit,
            status,
            review_submitted: false,
            notifications_sent: 0,
        }
    }

    pub fn reviewed(unit: ReviewUnit, review_submitted: bool, notifications_sent: usize) -> Self {
        Self {
            unit,
            status: UnitStatus::Reviewed,
            review_submitted,
            notifications_sent,
        }
    }
}
