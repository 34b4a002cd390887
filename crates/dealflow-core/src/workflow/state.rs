//! Per-workflow state machine.
//!
//! `WorkflowState` is the single authority for what a workflow's steps are,
//! which step runs next, and which transitions are legal. All mutation goes
//! through the transition methods below, each of which validates before
//! touching any state — an invalid call leaves the workflow exactly as it
//! found it.
//!
//! Transition rules per cursor step:
//!   not-started --start--> running
//!   running     --succeed--> awaiting-review | --fail--> failed
//!   awaiting-review --continue--> completed (cursor advances)
//!   awaiting-review --refine--> refining --succeed--> awaiting-review
//!   awaiting-review --skip--> skipped (cursor advances, slot stays empty)
//!   failed          --refine--> refining (re-attempt with feedback)
//!   any non-terminal --cancel--> cancelled (workflow-wide)
//!
//! Steps execute strictly in sequence order; a step never starts until every
//! earlier step is completed or skipped.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::ServerError;
use crate::models::artifact::{ArtifactVersions, StepArtifact};
use crate::models::company::{CompanyProfile, SourceDocument};
use crate::models::workflow::{
    StepName, StepSnapshot, StepStatus, WorkflowSnapshot, WorkflowSummary,
};

/// Mutable state of one analysis workflow. Lives in memory for the process
/// lifetime only; evicted after a retention window once terminal.
#[derive(Debug)]
pub struct WorkflowState {
    id: String,
    company: CompanyProfile,
    documents: Vec<SourceDocument>,
    step_sequence: Vec<StepName>,
    cursor: usize,
    statuses: HashMap<StepName, StepStatus>,
    /// Generation attempts per step, failed ones included. Incremented when
    /// an attempt starts, so a fail-then-refine sequence counts both.
    attempts: HashMap<StepName, u32>,
    artifacts: HashMap<StepName, ArtifactVersions>,
    /// Last failure message per step, cleared on a later success.
    errors: HashMap<StepName, String>,
    cancelled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Create a workflow with its step sequence derived from the inputs:
    /// the data-room step is present only when source documents were
    /// supplied — otherwise it never appears in the sequence at all.
    pub fn new(id: String, company: CompanyProfile, documents: Vec<SourceDocument>) -> Self {
        let mut step_sequence = vec![StepName::Research];
        if !documents.is_empty() {
            step_sequence.push(StepName::DataRoom);
        }
        step_sequence.push(StepName::RiskScan);
        step_sequence.push(StepName::Memo);

        let statuses = step_sequence
            .iter()
            .map(|s| (*s, StepStatus::NotStarted))
            .collect();

        let now = Utc::now();
        Self {
            id,
            company,
            documents,
            step_sequence,
            cursor: 0,
            statuses,
            attempts: HashMap::new(),
            artifacts: HashMap::new(),
            errors: HashMap::new(),
            cancelled: false,
            created_at: now,
            updated_at: now,
        }
    }

    // ── Read accessors ───────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn company(&self) -> &CompanyProfile {
        &self.company
    }

    pub fn documents(&self) -> &[SourceDocument] {
        &self.documents
    }

    pub fn step_sequence(&self) -> &[StepName] {
        &self.step_sequence
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The step at the cursor, or `None` once the cursor has passed the end.
    pub fn current_step(&self) -> Option<StepName> {
        self.step_sequence.get(self.cursor).copied()
    }

    pub fn status(&self, step: StepName) -> Option<StepStatus> {
        self.statuses.get(&step).copied()
    }

    /// Generation attempts recorded for a step so far (failed ones included).
    pub fn attempt(&self, step: StepName) -> u32 {
        self.attempts.get(&step).copied().unwrap_or(0)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Terminal iff every step is completed/skipped with the cursor past the
    /// last index, or the workflow was explicitly cancelled.
    pub fn is_terminal(&self) -> bool {
        self.cancelled || self.cursor >= self.step_sequence.len()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Artifact versions for a step. `NotFound` if the step is not part of
    /// this workflow's sequence; `None` if the slot is empty (not yet
    /// produced, or the step was skipped).
    pub fn artifact(&self, step: StepName) -> Result<Option<&ArtifactVersions>, ServerError> {
        if !self.step_sequence.contains(&step) {
            return Err(ServerError::NotFound(format!(
                "Step {} is not part of workflow {}",
                step, self.id
            )));
        }
        Ok(self.artifacts.get(&step))
    }

    /// Current artifacts of all completed steps, keyed by step name.
    /// Skipped steps contribute no entry — downstream steps treat a missing
    /// upstream artifact as "not available".
    pub fn completed_artifacts(&self) -> HashMap<StepName, StepArtifact> {
        self.step_sequence
            .iter()
            .filter(|s| self.statuses.get(s) == Some(&StepStatus::Completed))
            .filter_map(|s| {
                self.artifacts
                    .get(s)
                    .map(|v| (*s, v.current.payload.clone()))
            })
            .collect()
    }

    // ── Transitions ──────────────────────────────────────────────────────

    /// Mark the cursor step as running for its first attempt.
    pub fn begin_current(&mut self) -> Result<StepName, ServerError> {
        let step = self.require_current()?;
        match self.statuses[&step] {
            StepStatus::NotStarted => {
                self.statuses.insert(step, StepStatus::Running);
                *self.attempts.entry(step).or_insert(0) += 1;
                self.touch();
                Ok(step)
            }
            other => Err(ServerError::InvalidState(format!(
                "Step {} cannot start from status {}",
                step, other
            ))),
        }
    }

    /// Mark the cursor step as refining. Allowed from awaiting-review (the
    /// reviewer wants changes) and from failed (re-attempt with guidance).
    pub fn begin_refine(&mut self) -> Result<StepName, ServerError> {
        let step = self.require_current()?;
        match self.statuses[&step] {
            StepStatus::AwaitingReview | StepStatus::Failed => {
                self.statuses.insert(step, StepStatus::Refining);
                *self.attempts.entry(step).or_insert(0) += 1;
                self.touch();
                Ok(step)
            }
            other => Err(ServerError::InvalidState(format!(
                "Step {} cannot be refined from status {}",
                step, other
            ))),
        }
    }

    /// Record a successful generation attempt for the cursor step: store the
    /// artifact and move the step to awaiting-review. The runner is the only
    /// caller, and only while the step is running/refining — a completion
    /// arriving after cancellation is rejected and the artifact discarded.
    pub fn complete_current(&mut self, payload: StepArtifact) -> Result<u32, ServerError> {
        if self.cancelled {
            return Err(ServerError::Cancelled);
        }
        let step = self.require_current()?;
        if !self.statuses[&step].is_active() {
            return Err(ServerError::InvalidState(format!(
                "Step {} is not running",
                step
            )));
        }

        let attempt = self.attempts.get(&step).copied().unwrap_or(1);
        match self.artifacts.entry(step) {
            Entry::Occupied(mut slot) => slot.get_mut().supersede(payload, attempt),
            Entry::Vacant(slot) => {
                slot.insert(ArtifactVersions::new(payload, attempt));
            }
        }
        self.errors.remove(&step);
        self.statuses.insert(step, StepStatus::AwaitingReview);
        self.touch();
        Ok(attempt)
    }

    /// Record a failed generation attempt. No artifact is stored — the slot
    /// is all-or-nothing per attempt.
    pub fn fail_current(&mut self, message: String) -> Result<(), ServerError> {
        if self.cancelled {
            return Err(ServerError::Cancelled);
        }
        let step = self.require_current()?;
        if !self.statuses[&step].is_active() {
            return Err(ServerError::InvalidState(format!(
                "Step {} is not running",
                step
            )));
        }
        self.statuses.insert(step, StepStatus::Failed);
        self.errors.insert(step, message);
        self.touch();
        Ok(())
    }

    /// Approve the cursor step's artifact and advance. Returns the next step
    /// to start, or `None` when the workflow just became terminal.
    pub fn approve(&mut self) -> Result<Option<StepName>, ServerError> {
        let step = self.require_awaiting_review()?;
        self.statuses.insert(step, StepStatus::Completed);
        self.cursor += 1;
        self.touch();
        Ok(self.current_step())
    }

    /// Skip the cursor step and advance. The artifact produced for review is
    /// discarded — a skipped step's slot is empty, and downstream steps see
    /// its output as "not available".
    pub fn skip(&mut self) -> Result<Option<StepName>, ServerError> {
        let step = self.require_awaiting_review()?;
        self.statuses.insert(step, StepStatus::Skipped);
        self.artifacts.remove(&step);
        self.cursor += 1;
        self.touch();
        Ok(self.current_step())
    }

    /// Cancel the workflow. Workflow-wide and terminal; the step currently
    /// in flight (or under review) is marked cancelled.
    pub fn cancel(&mut self) -> Result<(), ServerError> {
        if self.is_terminal() {
            return Err(ServerError::InvalidState(format!(
                "Workflow {} is already terminal",
                self.id
            )));
        }
        if let Some(step) = self.current_step() {
            if !self.statuses[&step].is_settled() {
                self.statuses.insert(step, StepStatus::Cancelled);
            }
        }
        self.cancelled = true;
        self.touch();
        Ok(())
    }

    // ── Projections ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> WorkflowSnapshot {
        let steps = self
            .step_sequence
            .iter()
            .map(|s| StepSnapshot {
                name: *s,
                status: self.statuses[s],
                attempt: self.attempts.get(s).copied().unwrap_or(0),
                has_artifact: self.artifacts.contains_key(s),
                error: self.errors.get(s).cloned(),
            })
            .collect();

        WorkflowSnapshot {
            workflow_id: self.id.clone(),
            company_name: self.company.company_name.clone(),
            step_sequence: self.step_sequence.clone(),
            cursor: self.cursor,
            steps,
            terminal: self.is_terminal(),
            cancelled: self.cancelled,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            workflow_id: self.id.clone(),
            company_name: self.company.company_name.clone(),
            terminal: self.is_terminal(),
            cancelled: self.cancelled,
            created_at: self.created_at,
        }
    }

    // ── Private helpers ──────────────────────────────────────────────────

    fn require_current(&self) -> Result<StepName, ServerError> {
        self.current_step().ok_or_else(|| {
            ServerError::InvalidState(format!("Workflow {} has no remaining steps", self.id))
        })
    }

    fn require_awaiting_review(&self) -> Result<StepName, ServerError> {
        if self.cancelled {
            return Err(ServerError::InvalidState(format!(
                "Workflow {} is cancelled",
                self.id
            )));
        }
        let step = self.require_current()?;
        match self.statuses[&step] {
            StepStatus::AwaitingReview => Ok(step),
            other => Err(ServerError::InvalidState(format!(
                "Step {} is {} — expected awaiting-review",
                step, other
            ))),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::artifact::{MemoDraft, ReportSection, ResearchReport};

    fn company() -> CompanyProfile {
        CompanyProfile {
            company_name: "Bizzi".to_string(),
            website: "https://bizzi.vn/en/".to_string(),
            sector: "SaaS".to_string(),
            region: "Vietnam".to_string(),
            hq_location: None,
        }
    }

    fn document() -> SourceDocument {
        SourceDocument {
            filename: "financials.xlsx".to_string(),
            kind: crate::models::company::DocumentKind::Excel,
            text: "ARR $4.2M".to_string(),
        }
    }

    fn research_artifact() -> StepArtifact {
        StepArtifact::Research(ResearchReport {
            sections: vec![ReportSection {
                title: "Company Overview".to_string(),
                content: "…".to_string(),
                sources: vec![],
            }],
            generated_at: Utc::now(),
        })
    }

    fn memo_artifact() -> StepArtifact {
        StepArtifact::Memo(MemoDraft {
            memo_content: "…".to_string(),
            sources_used: vec![],
            generated_at: Utc::now(),
        })
    }

    #[test]
    fn test_sequence_omits_data_room_without_documents() {
        let wf = WorkflowState::new("wf".into(), company(), vec![]);
        assert_eq!(
            wf.step_sequence(),
            &[StepName::Research, StepName::RiskScan, StepName::Memo]
        );
        // inspect never reports a status for the absent step
        assert!(wf.status(StepName::DataRoom).is_none());
        assert!(!wf
            .snapshot()
            .steps
            .iter()
            .any(|s| s.name == StepName::DataRoom));
    }

    #[test]
    fn test_sequence_includes_data_room_with_documents() {
        let wf = WorkflowState::new("wf".into(), company(), vec![document()]);
        assert_eq!(
            wf.step_sequence(),
            &[
                StepName::Research,
                StepName::DataRoom,
                StepName::RiskScan,
                StepName::Memo
            ]
        );
    }

    #[test]
    fn test_happy_path_advances_cursor() {
        let mut wf = WorkflowState::new("wf".into(), company(), vec![]);
        assert_eq!(wf.begin_current().unwrap(), StepName::Research);
        wf.complete_current(research_artifact()).unwrap();
        assert_eq!(wf.status(StepName::Research), Some(StepStatus::AwaitingReview));

        let next = wf.approve().unwrap();
        assert_eq!(next, Some(StepName::RiskScan));
        assert_eq!(wf.cursor(), 1);
        assert_eq!(wf.status(StepName::Research), Some(StepStatus::Completed));
    }

    #[test]
    fn test_approve_rejected_while_running() {
        let mut wf = WorkflowState::new("wf".into(), company(), vec![]);
        wf.begin_current().unwrap();

        let err = wf.approve().unwrap_err();
        assert!(matches!(err, ServerError::InvalidState(_)));
        // idempotent rejection: nothing moved
        assert_eq!(wf.cursor(), 0);
        assert_eq!(wf.status(StepName::Research), Some(StepStatus::Running));
    }

    #[test]
    fn test_skip_leaves_artifact_slot_empty() {
        let mut wf = WorkflowState::new("wf".into(), company(), vec![]);
        wf.begin_current().unwrap();
        wf.complete_current(research_artifact()).unwrap();

        let next = wf.skip().unwrap();
        assert_eq!(next, Some(StepName::RiskScan));
        assert_eq!(wf.status(StepName::Research), Some(StepStatus::Skipped));
        // the reviewed artifact is discarded and nothing is offered downstream
        assert!(wf.artifact(StepName::Research).unwrap().is_none());
        assert!(wf.completed_artifacts().is_empty());
    }

    #[test]
    fn test_refine_increments_attempt_and_keeps_history() {
        let mut wf = WorkflowState::new("wf".into(), company(), vec![]);
        wf.begin_current().unwrap();
        wf.complete_current(research_artifact()).unwrap();

        wf.begin_refine().unwrap();
        assert_eq!(wf.status(StepName::Research), Some(StepStatus::Refining));
        assert_eq!(wf.cursor(), 0);

        let attempt = wf.complete_current(research_artifact()).unwrap();
        assert_eq!(attempt, 2);
        let versions = wf.artifact(StepName::Research).unwrap().unwrap();
        assert_eq!(versions.attempt(), 2);
        assert_eq!(versions.history.len(), 1);
        assert_eq!(versions.history[0].attempt, 1);
    }

    #[test]
    fn test_failed_step_refines_to_attempt_two() {
        let mut wf = WorkflowState::new("wf".into(), company(), vec![]);
        wf.begin_current().unwrap();
        wf.fail_current("provider error".into()).unwrap();
        assert_eq!(wf.status(StepName::Research), Some(StepStatus::Failed));
        assert!(wf.artifact(StepName::Research).unwrap().is_none());

        wf.begin_refine().unwrap();
        let attempt = wf.complete_current(research_artifact()).unwrap();
        assert_eq!(attempt, 2);
        assert_eq!(wf.status(StepName::Research), Some(StepStatus::AwaitingReview));
        // failure detail cleared by the successful attempt
        assert!(wf.snapshot().steps[0].error.is_none());
    }

    #[test]
    fn test_workflow_terminal_after_last_approve() {
        let mut wf = WorkflowState::new("wf".into(), company(), vec![]);
        for _ in 0..3 {
            wf.begin_current().unwrap();
            wf.complete_current(memo_artifact()).unwrap();
            wf.approve().unwrap();
        }
        assert!(wf.is_terminal());
        assert!(!wf.is_cancelled());
        assert!(wf.current_step().is_none());
    }

    #[test]
    fn test_cancel_is_terminal_and_rejects_further_ops() {
        let mut wf = WorkflowState::new("wf".into(), company(), vec![]);
        wf.begin_current().unwrap();
        wf.cancel().unwrap();

        assert!(wf.is_terminal());
        assert_eq!(wf.status(StepName::Research), Some(StepStatus::Cancelled));
        // a runner completing after cancellation must not store an artifact
        assert!(matches!(
            wf.complete_current(research_artifact()),
            Err(ServerError::Cancelled)
        ));
        assert!(wf.artifact(StepName::Research).unwrap().is_none());
        // cancel twice is rejected
        assert!(matches!(wf.cancel(), Err(ServerError::InvalidState(_))));
    }

    #[test]
    fn test_artifact_for_foreign_step_is_not_found() {
        let wf = WorkflowState::new("wf".into(), company(), vec![]);
        assert!(matches!(
            wf.artifact(StepName::DataRoom),
            Err(ServerError::NotFound(_))
        ));
    }
}
