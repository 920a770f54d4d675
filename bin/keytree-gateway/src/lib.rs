//! keytree Gateway - HTTP browsing API
//!
//! Serves the `/v3` JSON API the directory-style browsing UI talks to, and
//! the UI's static assets for every other path.

pub mod error;
pub mod handlers;
pub mod service;
pub mod types;

use axum::Router;
use axum::routing::{get, post};
use service::AppState;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Build the gateway router.
///
/// Requests that match no API route are served from `assets_dir`.
pub fn router(state: Arc<AppState>, assets_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/v3/separator", get(handlers::separator))
        .route("/v3/connect", post(handlers::connect))
        .route("/v3/getpath", get(handlers::get_path))
        .route("/v3/get", get(handlers::get))
        .route("/v3/put", post(handlers::put))
        .route("/v3/delete", post(handlers::delete))
        .fallback_service(ServeDir::new(assets_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
