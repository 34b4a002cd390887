//! Workflow-level models: step names, per-step status, and the read
//! projections returned by `inspect` and `list`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named stage of the analysis pipeline.
///
/// The order of a workflow's steps is fixed at creation time; `DataRoom` is
/// present only when source documents were supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepName {
    #[serde(rename = "research")]
    Research,
    #[serde(rename = "data-room")]
    DataRoom,
    #[serde(rename = "risk-scan")]
    RiskScan,
    #[serde(rename = "memo")]
    Memo,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::Research => "research",
            StepName::DataRoom => "data-room",
            StepName::RiskScan => "risk-scan",
            StepName::Memo => "memo",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "research" => Some(StepName::Research),
            "data-room" => Some(StepName::DataRoom),
            "risk-scan" => Some(StepName::RiskScan),
            "memo" => Some(StepName::Memo),
            _ => None,
        }
    }

    /// Human-readable label used in status messages.
    pub fn label(&self) -> &'static str {
        match self {
            StepName::Research => "Deep Research",
            StepName::DataRoom => "Data Room Analysis",
            StepName::RiskScan => "Risk Scan",
            StepName::Memo => "IC Memo Draft",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-step execution status.
///
/// Every step in a workflow's sequence has exactly one status at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    NotStarted,
    Running,
    AwaitingReview,
    Refining,
    Skipped,
    Completed,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::NotStarted => "not-started",
            StepStatus::Running => "running",
            StepStatus::AwaitingReview => "awaiting-review",
            StepStatus::Refining => "refining",
            StepStatus::Skipped => "skipped",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Cancelled => "cancelled",
        }
    }

    /// True while a generation attempt is in flight for this step.
    pub fn is_active(&self) -> bool {
        matches!(self, StepStatus::Running | StepStatus::Refining)
    }

    /// True once the step can never run again (short of a refine from review).
    pub fn is_settled(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read projection of one step for `inspect` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSnapshot {
    pub name: StepName,
    pub status: StepStatus,
    /// Number of generation attempts so far (0 before the first completes).
    pub attempt: u32,
    pub has_artifact: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Read projection of a whole workflow for `inspect` output.
///
/// This is the only UI-visible status surface — a snapshot of the single
/// server-held state machine, never an independently mutated copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSnapshot {
    pub workflow_id: String,
    pub company_name: String,
    pub step_sequence: Vec<StepName>,
    pub cursor: usize,
    pub steps: Vec<StepSnapshot>,
    pub terminal: bool,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact row for `list` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSummary {
    pub workflow_id: String,
    pub company_name: String,
    pub terminal: bool,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
}
