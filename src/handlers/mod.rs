mod events;
mod filters;
mod health;
mod metrics;

pub use events::event_handler;
pub use filters::filter_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use crate::state::AppState;

// router with all routes, shared by main and the integration tests
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/events", post(event_handler))
        .route("/api/filters", post(filter_handler))
        .with_state(state)
}
