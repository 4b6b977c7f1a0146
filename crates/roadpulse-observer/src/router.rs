//! Axum router construction for the Observer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the Observer server.
///
/// The router includes:
/// - `GET /ws` -- `WebSocket` topic subscriptions
/// - `GET /api/health` -- liveness and counters
/// - `GET /api/traffic/segments` -- road network
/// - `GET /api/traffic/realtime` -- latest sample per segment
/// - `GET /api/traffic/incidents` -- known incidents
/// - `GET /api/traffic/summary` -- network summary
/// - `GET /api/traffic/historical` -- hourly aggregates
///
/// CORS allows any origin so a dashboard can be served from elsewhere.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let traffic = Router::new()
        .route("/segments", get(handlers::list_segments))
        .route("/realtime", get(handlers::realtime))
        .route("/incidents", get(handlers::list_incidents))
        .route("/summary", get(handlers::summary))
        .route("/historical", get(handlers::historical));

    Router::new()
        .route("/ws", get(ws::ws_connect))
        .route("/api/health", get(handlers::health))
        .nest("/api/traffic", traffic)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
