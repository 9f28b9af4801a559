//! API route modules.
//!
//! Organizes routes by resource type.

pub mod config;
pub mod health;
pub mod jobs;
pub mod mounts;
pub mod stats;
pub mod templates;

#[cfg(test)]
pub(crate) mod test_support;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/extraction/jobs", jobs::router())
        .nest("/extraction/templates", templates::router())
        .nest("/extraction/config", config::router())
        .nest("/extraction/mounts", mounts::router())
        .merge(stats::router())
        .nest("/health", health::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
