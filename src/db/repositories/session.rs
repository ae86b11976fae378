//! Session repository
//!
//! Database operations for server-side sessions.
//!
//! This module provides:
//! - `SessionRepository` trait defining the interface for session data access
//! - `SqlxSessionRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::SessionRecord;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a session or replace the data and expiry of an existing one
    async fn upsert(&self, session: &SessionRecord) -> Result<()>;

    /// Get a session by id, expired or not
    async fn get_by_id(&self, id: &str) -> Result<Option<SessionRecord>>;

    /// Delete a session
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based session repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn upsert(&self, session: &SessionRecord) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => upsert_session_sqlite(self.pool.sqlite()?, session).await,
            DatabaseDriver::Mysql => upsert_session_mysql(self.pool.mysql()?, session).await,
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<SessionRecord>> {
        const SQL: &str = "SELECT id, data, expires_at FROM sessions WHERE id = ?";

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(SQL)
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get session by ID")?;
                row.map(|row| {
                    record_from_parts(row.get("id"), row.get("data"), row.get("expires_at"))
                })
                .transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(SQL)
                    .bind(id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get session by ID")?;
                row.map(|row| {
                    record_from_parts(row.get("id"), row.get("data"), row.get("expires_at"))
                })
                .transpose()
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        const SQL: &str = "DELETE FROM sessions WHERE id = ?";

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(SQL)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete session")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(SQL)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete session")?;
            }
        }
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        const SQL: &str = "DELETE FROM sessions WHERE expires_at <= ?";
        let now = Utc::now().timestamp();

        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SQL)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(SQL)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
        };
        Ok(affected)
    }
}

fn record_from_parts(id: String, data: String, expires_at: i64) -> Result<SessionRecord> {
    let expires_at: DateTime<Utc> = Utc
        .timestamp_opt(expires_at, 0)
        .single()
        .ok_or_else(|| anyhow!("Invalid session expiry timestamp: {}", expires_at))?;
    Ok(SessionRecord { id, data, expires_at })
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn upsert_session_sqlite(pool: &SqlitePool, session: &SessionRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, data, expires_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            data = excluded.data,
            expires_at = excluded.expires_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&session.id)
    .bind(&session.data)
    .bind(session.expires_at.timestamp())
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to save session")?;

    Ok(())
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn upsert_session_mysql(pool: &MySqlPool, session: &SessionRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, data, expires_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            data = VALUES(data),
            expires_at = VALUES(expires_at),
            updated_at = VALUES(updated_at)
        "#,
    )
    .bind(&session.id)
    .bind(&session.data)
    .bind(session.expires_at.timestamp())
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(pool)
    .await
    .context("Failed to save session")?;

    Ok(())
}
