use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sb_core::SbError;
use sb_session::{Interaction, QueryRequest};
use std::sync::Arc;
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio_stream::StreamExt;

pub const CONVERSATION_HEADER: &str = "x-conversation-id";

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(hello))
        .route("/health", get(health))
}

pub fn agent_routes() -> Router<AppState> {
    Router::new().route("/agent", post(agent))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/sessions", get(list_sessions))
        .route("/api/v1/sessions/{cid}", get(get_session).delete(delete_session))
        .route("/api/v1/sessions/{cid}/stop", post(stop_session))
}

async fn hello() -> Json<&'static str> {
    Json("Agent is working")
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "sessions": state.manager.count(),
    }))
}

/// Streams `RUNNING` then one terminal event, one JSON object per line.
async fn agent(State(state): State<AppState>, Json(request): Json<QueryRequest>) -> Response {
    let (cid, events) = state.responder.respond(request);
    let lines = events.map(|event| Ok::<_, Infallible>(event.to_ndjson()));

    let mut res = Response::new(Body::from_stream(lines));
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-ndjson; charset=utf-8"),
    );
    if let Ok(value) = HeaderValue::from_str(&cid) {
        res.headers_mut().insert(CONVERSATION_HEADER, value);
    }
    res
}

async fn list_sessions(State(state): State<AppState>) -> Json<Value> {
    let sessions = state.manager.list();
    Json(json!({ "count": sessions.len(), "sessions": sessions }))
}

fn live_session(state: &AppState, cid: &str) -> Result<Arc<Interaction>, SbError> {
    state.manager.get(cid).ok_or_else(|| SbError::SessionNotFound { id: cid.to_string() })
}

/// Snapshot of one session; `409 busy` while a cycle holds it.
async fn get_session(State(state): State<AppState>, Path(cid): Path<String>) -> Result<Json<Value>, ApiError> {
    let interaction = live_session(&state, &cid)?;
    if interaction.is_busy() {
        return Err(SbError::Busy { id: cid }.into());
    }
    Ok(Json(json!(interaction.snapshot().await)))
}

async fn stop_session(State(state): State<AppState>, Path(cid): Path<String>) -> Result<Json<Value>, ApiError> {
    let interaction = live_session(&state, &cid)?;
    Ok(Json(json!({ "cid": cid, "stopped": interaction.stop() })))
}

async fn delete_session(State(state): State<AppState>, Path(cid): Path<String>) -> Result<impl IntoResponse, ApiError> {
    if state.manager.remove(&cid).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(SbError::SessionNotFound { id: cid }.into())
    }
}
