//! atelier HTTP server.
//!
//! Serves the chat API consumed by the browser UI:
//!
//! - `POST /api/chat`: runs the chat pipeline and streams UI events over SSE
//! - `GET /api/models`: lists the selectable models
//!
//! The built UI bundle, when configured, is served from `/`.

pub mod bot;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod tools;
pub mod transport;

use axum::Router;
use axum::routing::{get, post};
use state::AppState;
use std::path::Path;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Builds the application router.
pub fn router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/api/chat", post(routes::chat))
        .route("/api/models", get(routes::list_models))
        .with_state(state);

    let app = match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    };
    app.layer(TraceLayer::new_for_http())
}
