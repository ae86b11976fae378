//! Database-backed session store
//!
//! Sessions are rows in the `sessions` table, data serialized as JSON.
//! Expired rows are ignored on load and purged through [`ExpiredDeletion`].

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use time::OffsetDateTime;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store::{self, ExpiredDeletion, SessionStore};

use crate::db::repositories::{SessionRepository, SqlxSessionRepository};
use crate::db::DynDatabasePool;
use crate::models::SessionRecord;

#[derive(Clone)]
pub struct SqlSessionStore {
    repo: Arc<dyn SessionRepository>,
}

impl std::fmt::Debug for SqlSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSessionStore").finish_non_exhaustive()
    }
}

impl SqlSessionStore {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self {
            repo: SqlxSessionRepository::boxed(pool),
        }
    }
}

fn backend(err: anyhow::Error) -> session_store::Error {
    session_store::Error::Backend(format!("{:#}", err))
}

fn to_row(record: &Record) -> session_store::Result<SessionRecord> {
    let data = serde_json::to_string(&record.data)
        .map_err(|e| session_store::Error::Encode(e.to_string()))?;
    let expires_at = Utc
        .timestamp_opt(record.expiry_date.unix_timestamp(), 0)
        .single()
        .ok_or_else(|| session_store::Error::Encode("Session expiry out of range".to_string()))?;

    Ok(SessionRecord {
        id: record.id.to_string(),
        data,
        expires_at,
    })
}

fn from_row(id: Id, row: SessionRecord) -> session_store::Result<Record> {
    let data =
        serde_json::from_str(&row.data).map_err(|e| session_store::Error::Decode(e.to_string()))?;
    let expiry_date = OffsetDateTime::from_unix_timestamp(row.expires_at.timestamp())
        .map_err(|e| session_store::Error::Decode(e.to_string()))?;

    Ok(Record {
        id,
        data,
        expiry_date,
    })
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        while self
            .repo
            .get_by_id(&record.id.to_string())
            .await
            .map_err(backend)?
            .is_some()
        {
            record.id = Id::default();
        }
        self.save(record).await
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.repo.upsert(&to_row(record)?).await.map_err(backend)
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let row = self
            .repo
            .get_by_id(&session_id.to_string())
            .await
            .map_err(backend)?;
        match row {
            Some(row) if !row.is_expired() => Ok(Some(from_row(*session_id, row)?)),
            _ => Ok(None),
        }
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.repo
            .delete(&session_id.to_string())
            .await
            .map_err(backend)
    }
}

#[async_trait]
impl ExpiredDeletion for SqlSessionStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        let removed = self.repo.delete_expired().await.map_err(backend)?;
        if removed > 0 {
            tracing::debug!("Removed {} expired sessions", removed);
        }
        Ok(())
    }
}
