//! Core error type for the Dealflow platform.
//!
//! `ServerError` is used throughout the core domain (orchestrator, agents,
//! event bus). When the `axum` feature is enabled, it also implements
//! `IntoResponse` so it can be used directly as an axum handler error type.
//!
//! Validation errors (`InvalidState`, `NotFound`, `BadRequest`) are returned
//! synchronously from facade calls before any state mutation. `Generation`
//! errors are asynchronous — they surface as `error` progress events and in
//! workflow snapshots, never as a facade-call failure.

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Operation requested against a workflow in an incompatible status
    /// (e.g. `continue` while the current step is still running).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The step agent could not produce an artifact (provider error,
    /// malformed output). Recoverable by re-issuing `refine` with feedback.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// The workflow (or the observed subscription) was cancelled.
    #[error("Cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, message) = match &self {
            ServerError::InvalidState(msg) => (StatusCode::CONFLICT, msg.clone()),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ServerError::Generation(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ServerError::Cancelled => (StatusCode::GONE, "Cancelled".to_string()),
            ServerError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
