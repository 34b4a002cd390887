//! GET /api/workflows/{id}/events — SSE stream of workflow progress.
//!
//! Subscribes to the workflow's broadcast channel so clients receive
//! real-time `status` / `chunk` / `stepComplete` / `error` events. A
//! reconnecting client misses chunks emitted while it was away (the
//! snapshot route is the catch-up surface) but receives everything from
//! attach onward. The stream ends when the workflow reaches a terminal
//! state or is cancelled.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use tokio::sync::broadcast;

use dealflow_core::error::ServerError;

use crate::state::AppState;

type SseStream =
    std::pin::Pin<Box<dyn tokio_stream::Stream<Item = Result<Event, Infallible>> + Send>>;

pub async fn workflow_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<SseStream>, ServerError> {
    let mut rx = state.orchestrator.subscribe(&id).await?;

    let stream: SseStream = Box::pin(async_stream::stream! {
        // Initial event so clients know the subscription is live
        yield Ok::<_, Infallible>(
            Event::default().data(
                serde_json::json!({ "type": "status", "message": "Subscribed to workflow progress" })
                    .to_string(),
            ),
        );

        // Heartbeat keeps proxies from closing an idle connection
        let mut heartbeat = tokio::time::interval(Duration::from_secs(15));
        heartbeat.tick().await;

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => {
                        let data = serde_json::to_string(&event).unwrap_or_default();
                        yield Ok(Event::default().data(data));
                    }
                    // Channel torn down — the workflow is terminal
                    Err(broadcast::error::RecvError::Closed) => break,
                    // Slow consumer skipped some events; keep following
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                },
                _ = heartbeat.tick() => {
                    yield Ok(Event::default().comment("heartbeat"));
                }
            }
        }
    });

    Ok(Sse::new(stream))
}
