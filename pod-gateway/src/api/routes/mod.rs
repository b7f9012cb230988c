//! API route modules.

pub mod chat;
pub mod health;
pub mod images;
pub mod logging;
pub mod metrics;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/images", images::router())
        .nest("/api/v1/chat", chat::router())
        .nest("/api/logging", logging::router())
        .nest("/health", health::router())
        .merge(metrics::router())
        .with_state(state)
}
