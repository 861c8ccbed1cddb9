pub mod api;
pub mod twilio;

use axum::{Router, middleware};
use std::sync::Arc;

use crate::middleware::connection_limit_middleware;
use crate::state::AppState;

/// All application routes with state applied.
///
/// Cross-cutting layers (CORS, rate limiting, security headers) are added
/// by the binary.
pub fn create_app(state: Arc<AppState>) -> Router {
    let stream_routes = twilio::create_stream_router().layer(middleware::from_fn_with_state(
        state.clone(),
        connection_limit_middleware,
    ));

    api::create_api_router()
        .merge(twilio::create_voice_router())
        .merge(stream_routes)
        .with_state(state)
}
