//! Ops HTTP endpoints: health probes and metrics scraping.

mod health;
mod metrics;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the ops router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(metrics::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
