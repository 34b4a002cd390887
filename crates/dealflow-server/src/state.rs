//! Shared application state for the axum server.

use std::sync::Arc;

use dealflow_core::Orchestrator;

/// Shared state accessible by all API handlers.
pub struct AppStateInner {
    pub orchestrator: Arc<Orchestrator>,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}
