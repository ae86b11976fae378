//! Blog server

use anyhow::Result;
use std::path::Path;

use blog::{
    config::{Config, Environment},
    create_app, logging,
    modules::default_blueprints,
};

#[tokio::main]
async fn main() -> Result<()> {
    let environment: Environment = std::env::var("BLOG_ENV")
        .unwrap_or_else(|_| "development".to_string())
        .parse()?;

    let config = Config::load_with_env(Path::new("config.yml"), environment)?;
    config.validate()?;

    logging::init_logging(&config)?;
    tracing::info!(
        "Starting blog ({} profile, debug: {})...",
        config.environment,
        config.is_debug()
    );

    let app = create_app(config, default_blueprints()).await?;
    app.serve().await
}
