//! Request pipeline middleware
//!
//! Contains middleware for:
//! - Cross-origin headers on responses the session layer answers itself
//! - Response finalization (anti-forgery cookie, cross-origin headers)
//! - Handler panics, turned into a 500 the finalizer still sees
//! - CSRF protection of state-changing requests

use axum::{
    body::{self, Body},
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tower_sessions::cookie::Key;

use crate::api::finalizer::{apply_cors_headers, DynResponseFinalizer};
use crate::config::{Config, CsrfConfig};
use crate::db::DynDatabasePool;
use crate::services::csrf::{CsrfError, CsrfProtect};
use crate::session::{DynSessionStore, Session};
use crate::templates::TemplateEngine;

/// Application state shared by every request
///
/// Built once by the application factory; cloning only bumps reference counts.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: DynDatabasePool,
    pub sessions: DynSessionStore,
    /// Session cookie signing key; `None` leaves the id unsigned
    pub session_key: Option<Key>,
    pub csrf: Arc<CsrfProtect>,
    pub templates: Arc<TemplateEngine>,
    pub finalizer: DynResponseFinalizer,
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn csrf_error(message: impl Into<String>) -> Self {
        Self::new("CSRF_ERROR", message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new("PAYLOAD_TOO_LARGE", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CSRF_ERROR" => StatusCode::BAD_REQUEST,
            "PAYLOAD_TOO_LARGE" => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<CsrfError> for ApiError {
    fn from(err: CsrfError) -> Self {
        match err {
            CsrfError::NoSession | CsrfError::Session(_) => {
                ApiError::internal_error(err.to_string())
            }
            _ => ApiError::csrf_error(err.to_string()),
        }
    }
}

/// Stamp the cross-origin headers on every response
///
/// Outside the session layer, which answers a failed session save with a
/// bare 500 of its own.
pub async fn ensure_cors_headers(mut response: Response) -> Response {
    apply_cors_headers(response.headers_mut());
    response
}

/// Response finalization middleware
///
/// Runs the configured [`ResponseFinalizer`](crate::api::finalizer::ResponseFinalizer)
/// on whatever the inner layers returned, including error responses.
pub async fn finalize_response_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let session = request.extensions().get::<Session>().cloned();
    let response = next.run(request).await;
    state.finalizer.finalize(response, session.as_ref()).await
}

/// Response for a panicking handler
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        *s
    } else {
        "unknown panic payload"
    };
    tracing::error!("Handler panicked: {}", detail);
    ApiError::internal_error("Internal server error").into_response()
}

/// Methods that must carry a valid anti-forgery token
pub fn requires_csrf(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// CSRF protection middleware
///
/// Validates the token of state-changing requests before the handler runs.
pub async fn csrf_protect_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.config.csrf.enabled || !requires_csrf(request.method()) {
        return Ok(next.run(request).await);
    }

    let session = request
        .extensions()
        .get::<Session>()
        .cloned()
        .ok_or(CsrfError::NoSession)?;
    let (token, request) = extract_csrf_token(request, &state.config.csrf).await?;

    if let Err(e) = state.csrf.validate(&session, token.as_deref()).await {
        tracing::info!(
            "CSRF check failed for {} {}: {}",
            request.method(),
            request.uri().path(),
            e
        );
        return Err(e.into());
    }

    Ok(next.run(request).await)
}

/// Token from the configured headers, else from the urlencoded form body
///
/// The body is buffered to read the form field and handed back unchanged.
async fn extract_csrf_token(
    request: Request,
    config: &CsrfConfig,
) -> Result<(Option<String>, Request), ApiError> {
    if let Some(token) = token_from_headers(request.headers(), &config.header_names) {
        return Ok((Some(token), request));
    }
    if !is_form_urlencoded(request.headers()) {
        return Ok((None, request));
    }

    let (parts, body) = request.into_parts();
    let bytes = body::to_bytes(body, config.max_body_bytes)
        .await
        .map_err(|e| ApiError::payload_too_large(format!("Failed to read request body: {}", e)))?;
    let token = token_from_form(&bytes, &config.field_name);

    Ok((token, Request::from_parts(parts, Body::from(bytes))))
}

fn token_from_headers(headers: &HeaderMap, names: &[String]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| headers.get(name.as_str()))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn is_form_urlencoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

fn token_from_form(body: &[u8], field: &str) -> Option<String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body).ok()?;
    pairs
        .into_iter()
        .find(|(name, _)| name == field)
        .map(|(_, value)| value)
}
