//! Dealflow Core — Transport-agnostic domain logic for the Dealflow platform.
//!
//! This crate contains the staged workflow orchestrator at the heart of
//! Dealflow: an ordered pipeline of LLM-backed analysis steps (deep research,
//! data-room digest, risk scan, IC memo draft) where every step's artifact is
//! gated behind a human continue/refine/skip decision, with live progress
//! broadcast to any number of observers.
//!
//! It has **no HTTP framework dependency** by default, making it suitable
//! for use in:
//!
//! - HTTP servers (via `dealflow-server`)
//! - CLI tools (via `dealflow-cli`)
//! - Embedding in other applications
//!
//! # Feature Flags
//!
//! - `axum` — Enables `IntoResponse` impl on `ServerError` for use in axum handlers.

pub mod agents;
pub mod error;
pub mod events;
pub mod llm;
pub mod models;
pub mod workflow;

// Convenience re-exports
pub use error::ServerError;
pub use events::{ProgressBus, WorkflowEvent};
pub use workflow::orchestrator::{Orchestrator, OrchestratorConfig};
