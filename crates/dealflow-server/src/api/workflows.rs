//! Workflow control surface.
//!
//! Validation errors (`InvalidState`, `NotFound`, `BadRequest`) come back
//! synchronously from these routes; generation failures arrive through the
//! SSE stream (`/events`) and through the snapshot returned by `GET /{id}`,
//! which doubles as the polling surface for clients that cannot hold a
//! long-lived connection.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use dealflow_core::error::ServerError;
use dealflow_core::models::company::{CompanyProfile, SourceDocument};
use dealflow_core::models::workflow::{StepName, WorkflowSnapshot};
use dealflow_core::workflow::StartedWorkflow;

use crate::state::AppState;

use super::events;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_workflows).post(create_workflow))
        .route("/{id}", get(inspect_workflow))
        .route("/{id}/continue", post(continue_workflow))
        .route("/{id}/refine", post(refine_workflow))
        .route("/{id}/skip", post(skip_workflow))
        .route("/{id}/cancel", post(cancel_workflow))
        .route("/{id}/artifacts/{step}", get(get_artifact))
        .route("/{id}/events", get(events::workflow_events))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWorkflowRequest {
    company: CompanyProfile,
    /// Pre-extracted data-room documents. When absent, the workflow's step
    /// sequence contains no data-room step at all.
    #[serde(default)]
    source_documents: Vec<SourceDocument>,
}

async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<CreateWorkflowRequest>,
) -> Result<Json<StartedWorkflow>, ServerError> {
    let started = state
        .orchestrator
        .start(body.company, body.source_documents)
        .await?;
    Ok(Json(started))
}

async fn list_workflows(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let workflows = state.orchestrator.list().await;
    Ok(Json(serde_json::json!({ "workflows": workflows })))
}

async fn inspect_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowSnapshot>, ServerError> {
    Ok(Json(state.orchestrator.inspect(&id).await?))
}

async fn continue_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let next = state.orchestrator.approve(&id).await?;
    Ok(Json(serde_json::json!({
        "nextStep": next,
        "terminal": next.is_none(),
    })))
}

#[derive(Debug, Deserialize)]
struct RefineRequest {
    feedback: String,
}

async fn refine_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RefineRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let step = state.orchestrator.refine(&id, &body.feedback).await?;
    Ok(Json(serde_json::json!({ "refining": step })))
}

async fn skip_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let next = state.orchestrator.skip(&id).await?;
    Ok(Json(serde_json::json!({
        "nextStep": next,
        "terminal": next.is_none(),
    })))
}

async fn cancel_workflow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    state.orchestrator.cancel(&id).await?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}

async fn get_artifact(
    State(state): State<AppState>,
    Path((id, step)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let step = StepName::from_str(&step)
        .ok_or_else(|| ServerError::BadRequest(format!("Unknown step: {}", step)))?;
    let versions = state.orchestrator.artifact(&id, step).await?;
    Ok(Json(serde_json::json!({ "artifact": versions })))
}
