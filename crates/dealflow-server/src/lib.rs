//! Dealflow Server — HTTP backend for the Dealflow copilot.
//!
//! A standalone axum adapter over `dealflow-core`, providing:
//! - RESTful workflow control surface (start / continue / refine / skip /
//!   cancel / inspect)
//! - Per-workflow SSE progress streams
//!
//! This crate can be used standalone or embedded in other applications
//! (e.g. the CLI's `server` subcommand).

pub mod api;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use dealflow_core::agents::AgentRegistry;
use dealflow_core::llm::ChatClient;
use dealflow_core::{Orchestrator, OrchestratorConfig};

use self::state::{AppState, AppStateInner};

/// Configuration for the Dealflow backend server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3410,
        }
    }
}

/// Create a shared `AppState` with the production (LLM-backed) agents.
///
/// This is useful when the state should be shared between the HTTP server
/// and other consumers (e.g. an embedding application driving the
/// orchestrator directly).
pub fn create_app_state() -> AppState {
    let client = Arc::new(ChatClient::from_env());
    let orchestrator = Arc::new(Orchestrator::new(
        AgentRegistry::llm(client),
        OrchestratorConfig::default(),
    ));
    Arc::new(AppStateInner::new(orchestrator))
}

/// Start the embedded backend server with default state.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: ServerConfig) -> Result<SocketAddr, String> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dealflow_server=info,tower_http=info".into()),
        )
        .init();

    tracing::info!(
        "Starting Dealflow backend server on {}:{}",
        config.host,
        config.port
    );

    start_server_with_state(config, create_app_state()).await
}

/// Start the HTTP server with a pre-built `AppState`.
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<SocketAddr, String> {
    // The sweeper keeps abandoned workflows from accumulating
    state.orchestrator.start_sweeper();

    // Build router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(api::api_router())
        .route("/api/health", axum::routing::get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("Dealflow backend server listening on {}", local_addr);

    // Spawn the server in a background task
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "dealflow-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
