//! In-memory session store using moka
//!
//! Each entry expires at its record's own expiry date, so moka evicts
//! sessions without a sweep.

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store::{self, SessionStore};

/// Default maximum number of live sessions
const DEFAULT_MAX_CAPACITY: u64 = 100_000;

/// Expires each entry at its record's expiry date
struct RecordExpiry;

impl RecordExpiry {
    fn remaining(record: &Record) -> Option<Duration> {
        let left = record.expiry_date - OffsetDateTime::now_utc();
        Some(Duration::try_from(left).unwrap_or(Duration::ZERO))
    }
}

impl Expiry<Id, Record> for RecordExpiry {
    fn expire_after_create(
        &self,
        _key: &Id,
        value: &Record,
        _created_at: Instant,
    ) -> Option<Duration> {
        Self::remaining(value)
    }

    fn expire_after_update(
        &self,
        _key: &Id,
        value: &Record,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Self::remaining(value)
    }
}

#[derive(Clone)]
pub struct MokaSessionStore {
    cache: Cache<Id, Record>,
}

impl std::fmt::Debug for MokaSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaSessionStore")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl MokaSessionStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CAPACITY)
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(RecordExpiry)
            .build();
        Self { cache }
    }
}

impl Default for MokaSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MokaSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        while self.cache.contains_key(&record.id) {
            record.id = Id::default();
        }
        self.save(record).await
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.cache.insert(record.id, record.clone()).await;
        Ok(())
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        Ok(self
            .cache
            .get(session_id)
            .await
            .filter(|record| record.expiry_date > OffsetDateTime::now_utc()))
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.cache.invalidate(session_id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(key: &str, value: &str, ttl: time::Duration) -> Record {
        let mut data = HashMap::new();
        data.insert(key.to_string(), serde_json::json!(value));
        Record {
            id: Id::default(),
            data,
            expiry_date: OffsetDateTime::now_utc() + ttl,
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MokaSessionStore::new();
        let record = record("user", "alice", time::Duration::minutes(1));
        store.save(&record).await.unwrap();

        let loaded = store.load(&record.id).await.unwrap().expect("session stored");
        assert_eq!(loaded.data["user"], serde_json::json!("alice"));
        assert!(store.load(&Id::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_data() {
        let store = MokaSessionStore::new();
        let mut record = record("k", "one", time::Duration::minutes(1));
        store.save(&record).await.unwrap();
        record.data.insert("k".to_string(), serde_json::json!("two"));
        store.save(&record).await.unwrap();

        let loaded = store.load(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.data["k"], serde_json::json!("two"));
    }

    #[tokio::test]
    async fn test_create_avoids_id_collisions() {
        let store = MokaSessionStore::new();
        let existing = record("k", "v", time::Duration::minutes(1));
        store.save(&existing).await.unwrap();

        let mut fresh = record("k", "w", time::Duration::minutes(1));
        fresh.id = existing.id;
        store.create(&mut fresh).await.unwrap();

        assert_ne!(fresh.id, existing.id);
        let kept = store.load(&existing.id).await.unwrap().unwrap();
        assert_eq!(kept.data["k"], serde_json::json!("v"));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MokaSessionStore::new();
        let record = record("k", "v", time::Duration::minutes(1));
        store.save(&record).await.unwrap();
        store.delete(&record.id).await.unwrap();
        store.delete(&Id::default()).await.unwrap();

        assert!(store.load(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_expire_at_their_expiry_date() {
        let store = MokaSessionStore::new();
        let short = record("k", "v", time::Duration::milliseconds(50));
        let long = record("k", "v", time::Duration::minutes(1));
        store.save(&short).await.unwrap();
        store.save(&long).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(store.load(&short.id).await.unwrap().is_none());
        assert!(store.load(&long.id).await.unwrap().is_some());
    }
}
