//! Favicon and static assets served from the configured directory

use axum::Router;
use std::path::Path;
use tower_http::services::{ServeDir, ServeFile};

use crate::api::middleware::AppState;

/// `GET /favicon.ico` and `/static/*`
pub fn router(static_dir: &Path) -> Router<AppState> {
    Router::new()
        .route_service("/favicon.ico", ServeFile::new(static_dir.join("favicon.ico")))
        .nest_service("/static", ServeDir::new(static_dir))
}
