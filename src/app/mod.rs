//! Application factory
//!
//! [`create_app`] builds every shared collaborator once (database pool,
//! session store, CSRF protector, templates, response finalizer), registers
//! the route groups and returns an [`App`] ready to be served or tested.


use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_sessions::session_store::ExpiredDeletion;

use crate::api::{self, AppState, SecurityHeadersFinalizer};
use crate::config::Config;
use crate::db::{self, migrations};
use crate::modules::Blueprint;
use crate::services::CsrfProtect;
use crate::session::{self, SqlSessionStore};
use crate::templates::TemplateEngine;

/// Route registration errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("A blueprint named '{0}' is already registered")]
    DuplicateBlueprint(String),
}

/// A configured application
pub struct App {
    state: AppState,
    routes: Router<AppState>,
    blueprints: Vec<String>,
    sweeper: Option<SqlSessionStore>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("environment", &self.state.config.environment)
            .field("blueprints", &self.blueprints)
            .finish_non_exhaustive()
    }
}

/// Build an application from `config` with the given route groups
///
/// # Errors
///
/// Fails when the database, session store or templates cannot be set up, or
/// when two route groups share a name.
pub async fn create_app(config: Config, blueprints: Vec<Blueprint>) -> Result<App> {
    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    migrations::run_migrations(&pool).await?;

    let backend = session::create_store(&config, &pool)
        .await
        .context("Failed to create session store")?;
    let session_key = session::signing_key(&config).context("Failed to derive session key")?;
    tracing::info!("Session store ready: {:?}", config.session.driver);

    let templates = TemplateEngine::new(&config.assets.templates_dir)
        .context("Failed to load templates")?;

    let csrf = Arc::new(CsrfProtect::new(&config.secret_key, &config.csrf));
    let state = AppState {
        sessions: backend.store,
        session_key,
        finalizer: Arc::new(SecurityHeadersFinalizer::new(csrf.clone())),
        csrf,
        templates: Arc::new(templates),
        pool,
        config: Arc::new(config),
    };

    let mut app = App {
        state,
        routes: Router::new(),
        blueprints: Vec::new(),
        sweeper: backend.sweeper,
    };
    for blueprint in blueprints {
        app.register_blueprint(blueprint)?;
    }

    tracing::info!(
        "Application created ({}), blueprints: {}",
        app.state.config.environment,
        app.blueprints.join(", ")
    );
    Ok(app)
}

impl App {
    /// Mount a route group under its prefix
    pub fn register_blueprint(&mut self, blueprint: Blueprint) -> Result<(), AppError> {
        if self.blueprints.contains(&blueprint.name) {
            return Err(AppError::DuplicateBlueprint(blueprint.name));
        }

        let path = blueprint.mount_path();
        let routes = std::mem::take(&mut self.routes);
        self.routes = if path.is_empty() {
            routes.merge(blueprint.router)
        } else {
            routes.nest(&path, blueprint.router)
        };

        tracing::debug!("Registered blueprint '{}' at '{}/'", blueprint.name, path);
        self.blueprints.push(blueprint.name);
        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// Names of the registered route groups, in registration order
    pub fn blueprint_names(&self) -> &[String] {
        &self.blueprints
    }

    /// The complete router with the middleware stack applied
    pub fn router(&self) -> Router {
        api::build_router(self.state.clone(), self.routes.clone())
    }

    /// Bind the configured address and serve until Ctrl-C
    pub async fn serve(self) -> Result<()> {
        let every = Duration::from_secs(self.state.config.session.cleanup_interval_seconds);
        let cleanup = self
            .sweeper
            .clone()
            .map(|store| spawn_session_cleanup(store, every));

        let addr = format!(
            "{}:{}",
            self.state.config.server.host, self.state.config.server.port
        );
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!("Server listening on http://{}", addr);

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(cleanup) = cleanup {
            cleanup.abort();
        }
        self.state.pool.close().await;
        tracing::info!("Server stopped");
        result.context("Server error")
    }
}

/// Periodically purge expired sessions from `store`
pub fn spawn_session_cleanup<S>(store: S, every: Duration) -> JoinHandle<()>
where
    S: ExpiredDeletion,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = store.delete_expired().await {
                tracing::warn!("Session cleanup failed: {}", e);
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
