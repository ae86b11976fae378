//! HTTP layer - request pipeline and shared handlers
//!
//! Layers, outermost first:
//! 1. request tracing
//! 2. cross-origin headers for responses the session layer answers itself
//! 3. sessions
//! 4. response finalizer (anti-forgery cookie, cross-origin headers)
//! 5. handler panics, turned into a 500
//! 6. CSRF protection
//! 7. CORS preflight
//!
//! then the registered route groups, favicon and static files.

pub mod finalizer;
pub mod middleware;
pub mod static_files;

use axum::{middleware as axum_middleware, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;
use crate::session;

pub use finalizer::{ResponseFinalizer, SecurityHeadersFinalizer};
pub use middleware::{ApiError, AppState};

/// Wrap `routes` in the full middleware stack
pub fn build_router(state: AppState, routes: Router<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors);
    let sessions = session::session_layer(&state.config, state.sessions.clone());

    let routes = routes
        .merge(static_files::router(&state.config.assets.static_dir))
        .fallback(not_found)
        .layer(cors)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::csrf_protect_middleware,
        ))
        .layer(CatchPanicLayer::custom(middleware::handle_panic))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::finalize_response_middleware,
        ));

    let routes = match state.session_key.clone() {
        Some(key) => routes.layer(sessions.with_signed(key)),
        None => routes.layer(sessions),
    };

    routes
        .layer(axum_middleware::map_response(middleware::ensure_cors_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Preflight handling; the finalizer later replaces the allow headers with
/// their fixed values
fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    if config.supports_credentials {
        cors.allow_credentials(true)
    } else {
        cors
    }
}

async fn not_found() -> ApiError {
    ApiError::not_found("Resource not found")
}
