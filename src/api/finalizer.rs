//! Response finalization
//!
//! Every response leaving the application passes through a
//! [`ResponseFinalizer`] after its handler ran, whether the handler succeeded,
//! returned an error, or no route matched.

use async_trait::async_trait;
use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};
use cookie::Cookie;
use std::sync::Arc;

use crate::api::middleware::ApiError;
use crate::services::csrf::{CsrfError, CsrfProtect};
use crate::session::Session;

/// Name of the anti-forgery cookie
pub const CSRF_COOKIE: &str = "csrf_token";

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET,POST";
pub const ALLOW_HEADERS: &str = "x-requested-with,content-type";

/// Last step of the request pipeline, run once per response
#[async_trait]
pub trait ResponseFinalizer: Send + Sync {
    /// Decorate (or replace) the response built for the current request
    ///
    /// `session` is `None` when the request carries no session context.
    async fn finalize(&self, response: Response, session: Option<&Session>) -> Response;
}

pub type DynResponseFinalizer = Arc<dyn ResponseFinalizer>;

/// Attaches a fresh anti-forgery cookie and fixed cross-origin headers
///
/// Without a session there is nothing to bind a token to, so the request
/// fails with 500; the cross-origin headers are still applied to that error.
pub struct SecurityHeadersFinalizer {
    csrf: Arc<CsrfProtect>,
}

impl SecurityHeadersFinalizer {
    pub fn new(csrf: Arc<CsrfProtect>) -> Self {
        Self { csrf }
    }

    async fn issue_token(&self, session: Option<&Session>) -> Result<String, CsrfError> {
        let session = session.ok_or(CsrfError::NoSession)?;
        self.csrf.generate(session).await
    }
}

#[async_trait]
impl ResponseFinalizer for SecurityHeadersFinalizer {
    async fn finalize(&self, mut response: Response, session: Option<&Session>) -> Response {
        match self.issue_token(session).await {
            Ok(token) => {
                if let Err(e) = set_csrf_cookie(response.headers_mut(), &token) {
                    tracing::error!("Failed to set CSRF cookie: {}", e);
                    response =
                        ApiError::internal_error("Failed to set CSRF cookie").into_response();
                }
            }
            Err(e) => {
                tracing::error!("Failed to generate CSRF token: {}", e);
                response = ApiError::from(e).into_response();
            }
        }

        apply_cors_headers(response.headers_mut());
        response
    }
}

/// Replace any `csrf_token` cookie already on the response with `token`
pub fn set_csrf_cookie(
    headers: &mut HeaderMap,
    token: &str,
) -> Result<(), header::InvalidHeaderValue> {
    let cookie = Cookie::build((CSRF_COOKIE, token)).path("/").build();
    let value = HeaderValue::from_str(&cookie.to_string())?;

    let others: Vec<HeaderValue> = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter(|existing| set_cookie_name(existing).as_deref() != Some(CSRF_COOKIE))
        .cloned()
        .collect();
    headers.remove(header::SET_COOKIE);
    for existing in others {
        headers.append(header::SET_COOKIE, existing);
    }
    headers.append(header::SET_COOKIE, value);
    Ok(())
}

fn set_cookie_name(value: &HeaderValue) -> Option<String> {
    let raw = value.to_str().ok()?;
    Cookie::parse(raw).ok().map(|c| c.name().to_string())
}

/// Overwrite the three cross-origin headers with their fixed values
pub fn apply_cors_headers(headers: &mut HeaderMap) {
    let fixed: [(HeaderName, &'static str); 3] = [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN),
        (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
    ];
    for (name, value) in fixed {
        headers.insert(name, HeaderValue::from_static(value));
    }
}
