use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_calls: usize,
    pub websocket_connections: usize,
}

/// `GET /` liveness check
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        active_calls: state.sessions.session_count(),
        websocket_connections: state.ws_connection_count(),
    })
}
