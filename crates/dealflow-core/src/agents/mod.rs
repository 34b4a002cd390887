//! Step agent capability.
//!
//! Each pipeline stage implements `StepAgent`: given the company profile,
//! the artifacts of already-completed upstream steps, and optional reviewer
//! feedback, produce this step's artifact or fail. The orchestrator is
//! agnostic to how an agent produces its artifact — agents are pluggable per
//! step name through the `AgentRegistry`.
//!
//! Agents report incremental output through a `ProgressSink`, which forwards
//! to the workflow's progress stream and doubles as the cooperative
//! cancellation check: every emit fails with `Cancelled` once the run has
//! been cancelled, so a well-behaved agent stops between chunks.

mod data_room;
mod memo;
mod research;
mod risk;
mod scripted;

pub use data_room::DataRoomAgent;
pub use memo::MemoDrafterAgent;
pub use research::DeepResearchAgent;
pub use risk::RiskScannerAgent;
pub use scripted::ScriptedAgent;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServerError;
use crate::events::{ProgressBus, WorkflowEvent};
use crate::llm::ChatClient;
use crate::models::artifact::StepArtifact;
use crate::models::company::{CompanyProfile, SourceDocument};
use crate::models::workflow::StepName;

/// Everything an agent gets to see for one generation attempt.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub company: CompanyProfile,
    /// Source documents supplied at workflow start. Empty unless the
    /// workflow was started with a data room.
    pub documents: Vec<SourceDocument>,
    /// Current artifacts of completed upstream steps. Skipped steps have no
    /// entry — agents treat a missing upstream artifact as "not available".
    pub prior: HashMap<StepName, StepArtifact>,
    /// Reviewer feedback; present only on a refine attempt, appended to the
    /// generation request as an override instruction.
    pub feedback: Option<String>,
    /// 1-based attempt number for this step, failed attempts included.
    pub attempt: u32,
}

/// Forwards an agent's incremental output to the workflow's progress stream.
///
/// Every emit first checks the workflow's cancellation flag and fails with
/// `Cancelled` once it is set — agents propagate that with `?`, which is the
/// cooperative cancellation point between chunks.
#[derive(Clone)]
pub struct ProgressSink {
    workflow_id: String,
    step: StepName,
    bus: ProgressBus,
    cancel: Arc<AtomicBool>,
}

impl ProgressSink {
    pub fn new(
        workflow_id: String,
        step: StepName,
        bus: ProgressBus,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            workflow_id,
            step,
            bus,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Emit a human-readable progress message.
    pub async fn status(&self, message: impl Into<String>) -> Result<(), ServerError> {
        self.guard()?;
        self.bus
            .emit(
                &self.workflow_id,
                WorkflowEvent::Status {
                    message: message.into(),
                },
            )
            .await;
        Ok(())
    }

    /// Emit a fragment of the step's in-progress output. Observers
    /// concatenate chunks in emission order.
    pub async fn chunk(&self, text: impl Into<String>) -> Result<(), ServerError> {
        self.guard()?;
        self.bus
            .emit(
                &self.workflow_id,
                WorkflowEvent::Chunk {
                    step: self.step,
                    text: text.into(),
                },
            )
            .await;
        Ok(())
    }

    fn guard(&self) -> Result<(), ServerError> {
        if self.is_cancelled() {
            Err(ServerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A pipeline stage: produce this step's artifact from prior artifacts and
/// optional reviewer feedback, or fail with `ServerError::Generation`.
#[async_trait]
pub trait StepAgent: Send + Sync {
    async fn execute(
        &self,
        ctx: &StepContext,
        sink: &ProgressSink,
    ) -> Result<StepArtifact, ServerError>;
}

/// Per-step-name agent lookup.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<StepName, Arc<dyn StepAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The production registry: one LLM-backed agent per step, sharing a
    /// single chat client.
    pub fn llm(client: Arc<ChatClient>) -> Self {
        let mut registry = Self::new();
        registry.register(StepName::Research, Arc::new(DeepResearchAgent::new(client.clone())));
        registry.register(StepName::DataRoom, Arc::new(DataRoomAgent::new(client.clone())));
        registry.register(StepName::RiskScan, Arc::new(RiskScannerAgent::new(client.clone())));
        registry.register(StepName::Memo, Arc::new(MemoDrafterAgent::new(client)));
        registry
    }

    pub fn register(&mut self, step: StepName, agent: Arc<dyn StepAgent>) {
        self.agents.insert(step, agent);
    }

    pub fn get(&self, step: StepName) -> Result<Arc<dyn StepAgent>, ServerError> {
        self.agents.get(&step).cloned().ok_or_else(|| {
            ServerError::Internal(format!("No agent registered for step {}", step))
        })
    }
}

/// Shared helper: render the reviewer feedback block appended to a refine
/// attempt's prompt.
pub(crate) fn feedback_instruction(feedback: Option<&str>) -> String {
    match feedback {
        Some(text) => format!(
            "\n\nREVIEWER FEEDBACK (override instruction — this supersedes the defaults above):\n{}",
            text
        ),
        None => String::new(),
    }
}
