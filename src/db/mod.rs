//! Database layer
//!
//! Supports SQLite (default, single-binary deployment) and MySQL, selected by
//! configuration. The pool is created once during application startup and
//! handed to the request pipeline through `AppState`.
//!
//! ```ignore
//! use blog::config::DatabaseConfig;
//! use blog::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
