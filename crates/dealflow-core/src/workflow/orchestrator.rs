//! Orchestrator facade — the public operations over live workflows.
//!
//! The orchestrator owns a registry of workflow handles and drives the step
//! runner on behalf of the caller:
//!   1. `start`   — derive the step sequence, create the workflow, launch
//!                  the first step, return immediately
//!   2. `approve` — the review gate's "continue": commit the reviewed
//!                  artifact and launch the next step
//!   3. `refine`  — re-run the current step with reviewer feedback
//!   4. `skip`    — advance without an artifact
//!   5. `cancel`  — stop the in-flight runner and terminate the workflow
//!   6. `inspect` / `list` / `artifact` — read-only projections
//!
//! Operations that trigger generation return as soon as the runner task is
//! scheduled; observers follow progress through the `ProgressBus`. All
//! mutation of one workflow's state is serialized behind its own mutex;
//! across workflows nothing is shared but the registry map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::agents::{AgentRegistry, StepContext};
use crate::error::ServerError;
use crate::events::{ProgressBus, WorkflowEvent};
use crate::models::artifact::ArtifactVersions;
use crate::models::company::{CompanyProfile, SourceDocument};
use crate::models::workflow::{StepName, WorkflowSnapshot, WorkflowSummary};

use super::runner;
use super::state::WorkflowState;

/// One live workflow: its state machine plus the flag an in-flight runner
/// checks for cooperative cancellation. The progress channel itself lives in
/// the `ProgressBus`, so tearing the workflow down ends subscriber streams.
pub struct WorkflowHandle {
    id: String,
    state: Mutex<WorkflowState>,
    cancelled: Arc<AtomicBool>,
}

impl WorkflowHandle {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn state(&self) -> &Mutex<WorkflowState> {
        &self.state
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }
}

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How long an inactive workflow is kept before eviction.
    pub retention: Duration,
    /// How often the sweeper looks for evictable workflows.
    pub sweep_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Result of `start`: the new id plus the derived step sequence, so callers
/// can render correct progress expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedWorkflow {
    pub workflow_id: String,
    pub step_sequence: Vec<StepName>,
}

/// The orchestration engine serving many workflows, each with at most one
/// active step task.
pub struct Orchestrator {
    workflows: RwLock<HashMap<String, Arc<WorkflowHandle>>>,
    agents: AgentRegistry,
    bus: ProgressBus,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(agents: AgentRegistry, config: OrchestratorConfig) -> Self {
        Self {
            workflows: RwLock::new(HashMap::new()),
            agents,
            bus: ProgressBus::new(),
            config,
        }
    }

    // ── Control surface ──────────────────────────────────────────────────

    /// Create a workflow and asynchronously begin its first step.
    ///
    /// The step sequence is derived here: the data-room step exists only
    /// when source documents were supplied.
    pub async fn start(
        &self,
        company: CompanyProfile,
        documents: Vec<SourceDocument>,
    ) -> Result<StartedWorkflow, ServerError> {
        if company.company_name.trim().is_empty() {
            return Err(ServerError::BadRequest("Company name is required".to_string()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let state = WorkflowState::new(id.clone(), company, documents);
        let step_sequence = state.step_sequence().to_vec();

        self.bus.open(&id).await;
        let handle = Arc::new(WorkflowHandle {
            id: id.clone(),
            state: Mutex::new(state),
            cancelled: Arc::new(AtomicBool::new(false)),
        });

        {
            let mut workflows = self.workflows.write().await;
            workflows.insert(id.clone(), handle.clone());
        }

        {
            let mut state = handle.state.lock().await;
            self.launch_current(&handle, &mut state)?;
        }

        tracing::info!(
            "[Orchestrator] Started workflow {} ({} steps)",
            id,
            step_sequence.len()
        );

        Ok(StartedWorkflow {
            workflow_id: id,
            step_sequence,
        })
    }

    /// Approve the current step's artifact and advance — the review gate's
    /// "continue". Returns the step now running, or `None` when the
    /// workflow just completed.
    pub async fn approve(&self, workflow_id: &str) -> Result<Option<StepName>, ServerError> {
        let handle = self.get(workflow_id).await?;
        let mut state = handle.state.lock().await;

        let approved = state.current_step().ok_or_else(|| {
            ServerError::InvalidState(format!("Workflow {} has no remaining steps", workflow_id))
        })?;
        let next = state.approve()?;

        self.bus
            .emit(
                workflow_id,
                WorkflowEvent::Status {
                    message: format!("{} approved", approved.label()),
                },
            )
            .await;

        match next {
            Some(_) => {
                let launched = self.launch_current(&handle, &mut state)?;
                Ok(Some(launched))
            }
            None => {
                drop(state);
                self.finish(&handle).await;
                Ok(None)
            }
        }
    }

    /// Re-run the current step with reviewer feedback. Allowed while the
    /// step is awaiting review, or after a failed attempt.
    pub async fn refine(&self, workflow_id: &str, feedback: &str) -> Result<StepName, ServerError> {
        let feedback = feedback.trim();
        if feedback.is_empty() {
            return Err(ServerError::BadRequest(
                "Refine requires feedback — use continue to accept the artifact as-is".to_string(),
            ));
        }

        let handle = self.get(workflow_id).await?;
        let mut state = handle.state.lock().await;
        let step = state.begin_refine()?;

        self.bus
            .emit(
                workflow_id,
                WorkflowEvent::Status {
                    message: format!("Refining {} with reviewer feedback", step.label()),
                },
            )
            .await;

        let agent = self.agents.get(step)?;
        let ctx = StepContext {
            company: state.company().clone(),
            documents: state.documents().to_vec(),
            prior: state.completed_artifacts(),
            feedback: Some(feedback.to_string()),
            attempt: state.attempt(step),
        };
        runner::spawn_step(handle.clone(), self.bus.clone(), agent, step, ctx);
        Ok(step)
    }

    /// Skip the current step and advance. No artifact attempt is stored.
    pub async fn skip(&self, workflow_id: &str) -> Result<Option<StepName>, ServerError> {
        let handle = self.get(workflow_id).await?;
        let mut state = handle.state.lock().await;

        let skipped = state.current_step().ok_or_else(|| {
            ServerError::InvalidState(format!("Workflow {} has no remaining steps", workflow_id))
        })?;
        let next = state.skip()?;

        self.bus
            .emit(
                workflow_id,
                WorkflowEvent::Status {
                    message: format!("{} skipped", skipped.label()),
                },
            )
            .await;

        match next {
            Some(_) => {
                let launched = self.launch_current(&handle, &mut state)?;
                Ok(Some(launched))
            }
            None => {
                drop(state);
                self.finish(&handle).await;
                Ok(None)
            }
        }
    }

    /// Cancel the workflow. The in-flight runner (if any) observes the flag
    /// and stops forwarding chunks; subscribers see a final `cancelled`
    /// event before their stream ends.
    pub async fn cancel(&self, workflow_id: &str) -> Result<(), ServerError> {
        let handle = self.get(workflow_id).await?;
        {
            let mut state = handle.state.lock().await;
            state.cancel()?;
            handle.cancelled.store(true, Ordering::SeqCst);
        }

        self.bus.emit(workflow_id, WorkflowEvent::Cancelled).await;
        self.bus.close(workflow_id).await;

        tracing::info!("[Orchestrator] Cancelled workflow {}", workflow_id);
        Ok(())
    }

    // ── Read surface ─────────────────────────────────────────────────────

    /// Read-only snapshot of cursor, per-step status, and artifact
    /// references. This is also the polling surface for callers that cannot
    /// hold a progress subscription.
    pub async fn inspect(&self, workflow_id: &str) -> Result<WorkflowSnapshot, ServerError> {
        let handle = self.get(workflow_id).await?;
        let state = handle.state.lock().await;
        Ok(state.snapshot())
    }

    /// Summaries of every live workflow.
    pub async fn list(&self) -> Vec<WorkflowSummary> {
        let workflows = self.workflows.read().await;
        let mut summaries = Vec::with_capacity(workflows.len());
        for handle in workflows.values() {
            let state = handle.state.lock().await;
            summaries.push(state.summary());
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    /// Current artifact (plus attempt history) for a step.
    pub async fn artifact(
        &self,
        workflow_id: &str,
        step: StepName,
    ) -> Result<ArtifactVersions, ServerError> {
        let handle = self.get(workflow_id).await?;
        let state = handle.state.lock().await;
        state
            .artifact(step)?
            .cloned()
            .ok_or_else(|| ServerError::NotFound(format!("No artifact for step {}", step)))
    }

    /// Subscribe to a workflow's progress stream. A subscription to a
    /// workflow that is already terminal yields an immediately-ended stream.
    pub async fn subscribe(
        &self,
        workflow_id: &str,
    ) -> Result<broadcast::Receiver<WorkflowEvent>, ServerError> {
        // Ensure the workflow exists before consulting the bus
        let _ = self.get(workflow_id).await?;
        match self.bus.subscribe(workflow_id).await {
            Some(rx) => Ok(rx),
            None => {
                let (tx, rx) = broadcast::channel(1);
                drop(tx);
                Ok(rx)
            }
        }
    }

    // ── Eviction ─────────────────────────────────────────────────────────

    /// Run the retention sweeper until the orchestrator is dropped. Evicts
    /// workflows with no activity inside the retention window; a non-terminal
    /// workflow is cancelled first so no generation task is orphaned.
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let orchestrator = Arc::downgrade(self);
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let Some(orchestrator) = orchestrator.upgrade() else {
                    break;
                };
                orchestrator.sweep().await;
            }
        })
    }

    /// One sweep pass; public so tests can drive eviction deterministically.
    pub async fn sweep(&self) {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(self.config.retention)
                .unwrap_or_else(|_| chrono::Duration::minutes(30));

        let stale: Vec<Arc<WorkflowHandle>> = {
            let workflows = self.workflows.read().await;
            let mut stale = Vec::new();
            for handle in workflows.values() {
                let state = handle.state.lock().await;
                if state.updated_at() < cutoff {
                    stale.push(handle.clone());
                }
            }
            stale
        };

        for handle in stale {
            {
                let mut state = handle.state.lock().await;
                if !state.is_terminal() {
                    // Abandoned mid-run: request cancellation before
                    // removing state, so the runner doesn't run orphaned.
                    if state.cancel().is_ok() {
                        handle.cancelled.store(true, Ordering::SeqCst);
                        self.bus.emit(&handle.id, WorkflowEvent::Cancelled).await;
                    }
                }
            }
            self.bus.close(&handle.id).await;
            let mut workflows = self.workflows.write().await;
            workflows.remove(&handle.id);
            tracing::info!("[Orchestrator] Evicted workflow {}", handle.id);
        }
    }

    // ── Private helpers ──────────────────────────────────────────────────

    async fn get(&self, workflow_id: &str) -> Result<Arc<WorkflowHandle>, ServerError> {
        let workflows = self.workflows.read().await;
        workflows
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| ServerError::NotFound(format!("Workflow {} not found", workflow_id)))
    }

    /// Start the cursor step's first attempt. Caller holds the state lock.
    fn launch_current(
        &self,
        handle: &Arc<WorkflowHandle>,
        state: &mut WorkflowState,
    ) -> Result<StepName, ServerError> {
        let step = state
            .current_step()
            .ok_or_else(|| ServerError::Internal("No step to launch".to_string()))?;
        let agent = self.agents.get(step)?;
        state.begin_current()?;

        let ctx = StepContext {
            company: state.company().clone(),
            documents: state.documents().to_vec(),
            prior: state.completed_artifacts(),
            feedback: None,
            attempt: state.attempt(step),
        };
        runner::spawn_step(handle.clone(), self.bus.clone(), agent, step, ctx);
        Ok(step)
    }

    /// Close out a workflow that just completed its last step.
    async fn finish(&self, handle: &Arc<WorkflowHandle>) {
        self.bus
            .emit(
                &handle.id,
                WorkflowEvent::Status {
                    message: "Workflow complete".to_string(),
                },
            )
            .await;
        self.bus.close(&handle.id).await;
        tracing::info!("[Orchestrator] Workflow {} complete", handle.id);
    }
}
