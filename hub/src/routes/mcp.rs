use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;

use crate::mcp;
use crate::state::AppState;

const MESSAGES_PATH: &str = "/mcp/messages";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/mcp", post(api_mcp))
        .route("/mcp/sse", get(api_mcp_sse))
        .route(MESSAGES_PATH, post(api_mcp_message))
}

async fn dispatch(state: &Arc<AppState>, body: &[u8]) -> Option<Value> {
    match serde_json::from_slice::<Value>(body) {
        Ok(message) => mcp::handle_message(state, message).await,
        Err(e) => Some(mcp::parse_error(&e.to_string())),
    }
}

/// One JSON-RPC message per POST; notifications are acknowledged with 202.
async fn api_mcp(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match dispatch(&state, &body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Removes the session when its SSE stream is dropped.
struct SessionGuard {
    state: Arc<AppState>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.sse_sessions.close(&self.session_id);
    }
}

/// SSE transport: the first event names the POST endpoint for this session,
/// then every response arrives as a `message` event.
async fn api_mcp_sse(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (session_id, rx) = state.sse_sessions.open();
    tracing::info!(%session_id, "MCP SSE session opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{MESSAGES_PATH}?session_id={session_id}"));
    let guard = SessionGuard {
        state: Arc::clone(&state),
        session_id,
    };
    let messages = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let message = rx.recv().await?;
        let event = Event::default().event("message").data(message.to_string());
        Some((Ok::<_, Infallible>(event), (rx, guard)))
    });

    Sse::new(stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(messages))
        .keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: String,
}

async fn api_mcp_message(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Response {
    if !state.sse_sessions.contains(&query.session_id) {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    }
    if let Some(response) = dispatch(&state, &body).await {
        if !state.sse_sessions.send(&query.session_id, response) {
            return (StatusCode::NOT_FOUND, "session closed").into_response();
        }
    }
    StatusCode::ACCEPTED.into_response()
}
