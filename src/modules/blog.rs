//! Blog front pages

use axum::{extract::State, response::Html, routing::get, Router};
use tera::Context as TeraContext;

use super::Blueprint;
use crate::api::{ApiError, AppState};

pub fn blueprint() -> Blueprint {
    Blueprint::new("blog", "/", router())
}

fn router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

/// Home page
async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let mut context = TeraContext::new();
    context.insert("title", "Blog");
    context.insert("items", &Vec::<String>::new());

    let html = state.templates.render("index.html", &context).map_err(|e| {
        tracing::error!("Failed to render index: {}", e);
        ApiError::internal_error("Failed to render page")
    })?;
    Ok(Html(html))
}
