//! Progress event bus — per-workflow broadcast of generation progress.
//!
//! Every workflow owns one broadcast channel carrying `WorkflowEvent`s:
//!   - `status`        human-readable progress message
//!   - `chunk`         ordered fragment of the running step's output
//!   - `step_complete` a step finished and its artifact was stored
//!   - `error`         a generation attempt failed
//!   - `cancelled`     the workflow was cancelled
//!
//! Any number of observers may subscribe to the same workflow; a late
//! subscriber misses chunks emitted before it attached but receives every
//! subsequent event. Channels are workflow-scoped — events for workflow A
//! are never visible to an observer of workflow B. Dropping the sender when
//! the workflow terminates ends all subscriber streams.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::models::workflow::StepName;

/// Capacity of each workflow's broadcast channel. A slow observer that lags
/// more than this many events behind starts losing the oldest ones.
const CHANNEL_CAPACITY: usize = 256;

/// An event on a workflow's progress stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkflowEvent {
    /// Human-readable progress message.
    Status { message: String },
    /// Ordered fragment of the running step's textual output. Observers
    /// concatenate chunks in emission order.
    Chunk { step: StepName, text: String },
    /// A step completed successfully; its artifact is retrievable.
    StepComplete { step: StepName, attempt: u32 },
    /// A generation attempt failed. The step can be refined or the workflow
    /// cancelled; it is never auto-retried.
    Error { step: StepName, message: String },
    /// The workflow was cancelled. Terminal — the stream ends after this.
    Cancelled,
}

/// Thread-safe registry of per-workflow broadcast channels.
#[derive(Clone)]
pub struct ProgressBus {
    inner: Arc<RwLock<HashMap<String, broadcast::Sender<WorkflowEvent>>>>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create the channel for a new workflow.
    pub async fn open(&self, workflow_id: &str) {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let mut inner = self.inner.write().await;
        inner.insert(workflow_id.to_string(), tx);
    }

    /// Subscribe to a workflow's stream. Returns `None` for unknown or
    /// already-terminated workflows.
    pub async fn subscribe(&self, workflow_id: &str) -> Option<broadcast::Receiver<WorkflowEvent>> {
        let inner = self.inner.read().await;
        inner.get(workflow_id).map(|tx| tx.subscribe())
    }

    /// Emit an event on a workflow's stream. Events emitted while nobody is
    /// subscribed are dropped — the snapshot remains the source of truth.
    pub async fn emit(&self, workflow_id: &str, event: WorkflowEvent) {
        let inner = self.inner.read().await;
        if let Some(tx) = inner.get(workflow_id) {
            let _ = tx.send(event);
        }
    }

    /// Tear down a workflow's channel. Every subscriber's stream ends once
    /// the buffered events are drained.
    pub async fn close(&self, workflow_id: &str) {
        let mut inner = self.inner.write().await;
        inner.remove(workflow_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_streams_are_workflow_scoped() {
        let bus = ProgressBus::new();
        bus.open("wf-a").await;
        bus.open("wf-b").await;

        let mut rx_a = bus.subscribe("wf-a").await.unwrap();
        let mut rx_b = bus.subscribe("wf-b").await.unwrap();

        bus.emit(
            "wf-a",
            WorkflowEvent::Status {
                message: "only for a".into(),
            },
        )
        .await;

        assert!(matches!(
            rx_a.recv().await.unwrap(),
            WorkflowEvent::Status { .. }
        ));
        assert!(matches!(
            rx_b.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_prior_chunks() {
        let bus = ProgressBus::new();
        bus.open("wf").await;

        bus.emit(
            "wf",
            WorkflowEvent::Chunk {
                step: StepName::Research,
                text: "early".into(),
            },
        )
        .await;

        let mut rx = bus.subscribe("wf").await.unwrap();
        bus.emit(
            "wf",
            WorkflowEvent::StepComplete {
                step: StepName::Research,
                attempt: 1,
            },
        )
        .await;

        // The chunk emitted before attach is not delivered; the completion is.
        assert!(matches!(
            rx.recv().await.unwrap(),
            WorkflowEvent::StepComplete { .. }
        ));
    }

    #[tokio::test]
    async fn test_close_ends_subscriber_streams() {
        let bus = ProgressBus::new();
        bus.open("wf").await;
        let mut rx = bus.subscribe("wf").await.unwrap();

        bus.emit("wf", WorkflowEvent::Cancelled).await;
        bus.close("wf").await;

        assert!(matches!(rx.recv().await.unwrap(), WorkflowEvent::Cancelled));
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert!(bus.subscribe("wf").await.is_none());
    }
}
