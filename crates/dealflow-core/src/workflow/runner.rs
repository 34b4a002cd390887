//! Step runner — executes one generation attempt as a cancellable task.
//!
//! The runner owns the attempt from scheduling to resolution:
//!   1. invoke the step agent with the prepared context
//!   2. the agent streams progress through its `ProgressSink`, whose every
//!      emit checks the workflow's cancellation flag
//!   3. on success, store the artifact and move the step to awaiting-review
//!   4. on failure, mark the step failed and publish an `error` event
//!   5. on cancellation, stop silently — no artifact is ever written after
//!      a cancel, and no `step_complete` event is emitted
//!
//! While the attempt is in flight the step's status is running/refining and
//! the runner is the only writer of that status. The workflow state lock is
//! held only for the brief bookkeeping at resolution, never across the
//! agent call.

use std::sync::Arc;

use crate::agents::{ProgressSink, StepAgent, StepContext};
use crate::error::ServerError;
use crate::events::{ProgressBus, WorkflowEvent};
use crate::models::workflow::StepName;

use super::orchestrator::WorkflowHandle;

/// Spawn the runner task for one generation attempt.
pub(crate) fn spawn_step(
    handle: Arc<WorkflowHandle>,
    bus: ProgressBus,
    agent: Arc<dyn StepAgent>,
    step: StepName,
    ctx: StepContext,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let workflow_id = handle.id().to_string();
        let sink = ProgressSink::new(workflow_id.clone(), step, bus.clone(), handle.cancel_flag());

        tracing::info!(
            "[StepRunner] {} attempt {} started (workflow {})",
            step,
            ctx.attempt,
            workflow_id
        );

        let result = agent.execute(&ctx, &sink).await;

        // A cancel that raced the agent's return still wins: the attempt
        // resolves as cancelled, not as whatever the agent produced.
        if sink.is_cancelled() {
            tracing::info!(
                "[StepRunner] {} attempt {} cancelled, discarding result (workflow {})",
                step,
                ctx.attempt,
                workflow_id
            );
            return;
        }

        match result {
            Ok(artifact) => {
                let mut state = handle.state().lock().await;
                match state.complete_current(artifact) {
                    Ok(attempt) => {
                        drop(state);
                        bus.emit(&workflow_id, WorkflowEvent::StepComplete { step, attempt })
                            .await;
                        bus.emit(
                            &workflow_id,
                            WorkflowEvent::Status {
                                message: format!("{} ready for review", step.label()),
                            },
                        )
                        .await;
                        tracing::info!(
                            "[StepRunner] {} attempt {} awaiting review (workflow {})",
                            step,
                            attempt,
                            workflow_id
                        );
                    }
                    Err(e) => {
                        // The workflow moved on (cancelled under us) — the
                        // artifact is dropped, per the all-or-nothing rule.
                        tracing::warn!(
                            "[StepRunner] Discarding {} result for workflow {}: {}",
                            step,
                            workflow_id,
                            e
                        );
                    }
                }
            }
            Err(ServerError::Cancelled) => {
                tracing::info!(
                    "[StepRunner] {} attempt {} observed cancellation (workflow {})",
                    step,
                    ctx.attempt,
                    workflow_id
                );
            }
            Err(e) => {
                let message = e.to_string();
                let mut state = handle.state().lock().await;
                match state.fail_current(message.clone()) {
                    Ok(()) => {
                        drop(state);
                        bus.emit(&workflow_id, WorkflowEvent::Error { step, message })
                            .await;
                        tracing::warn!(
                            "[StepRunner] {} attempt {} failed (workflow {}): {}",
                            step,
                            ctx.attempt,
                            workflow_id,
                            e
                        );
                    }
                    Err(state_err) => {
                        tracing::warn!(
                            "[StepRunner] Could not record {} failure for workflow {}: {}",
                            step,
                            workflow_id,
                            state_err
                        );
                    }
                }
            }
        }
    })
}
