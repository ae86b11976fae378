//! Server-side sessions
//!
//! Built on `tower-sessions`: the client only holds the (optionally signed)
//! session id cookie, the data lives in a store. Backends:
//! - In-memory store (moka) - default, single-instance deployment
//! - Database store - the `sessions` table
//! - Redis store - optional, multi-instance deployment
//!
//! Handlers and middleware reach the current [`Session`] through request
//! extensions or the `tower-sessions` extractor.

pub mod memory;
#[cfg(feature = "redis-session")]
pub mod redis;
pub mod sql;

use async_trait::async_trait;
use sha2::{Digest, Sha512};
use std::sync::Arc;
use thiserror::Error;
use time::Duration;
use tower_sessions::cookie::{Key, SameSite};
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

use crate::config::{Config, SessionDriver};
use crate::db::DynDatabasePool;

pub use memory::MokaSessionStore;
pub use sql::SqlSessionStore;
pub use tower_sessions::Session;

/// Browsers cap cookie lifetimes at 400 days
const MAX_LIFETIME_SECONDS: u64 = 400 * 24 * 60 * 60;

/// Session setup errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session backend '{0}' is not available in this build")]
    Unsupported(&'static str),

    #[error("Invalid session signing key: {0}")]
    InvalidKey(String),

    #[cfg(feature = "redis-session")]
    #[error("Redis error: {0}")]
    Redis(#[from] tower_sessions_redis_store::fred::prelude::Error),
}

/// Type-erased store so the driver can be picked at runtime
#[derive(Debug, Clone)]
pub struct DynSessionStore(Arc<dyn SessionStore>);

impl DynSessionStore {
    pub fn new(store: impl SessionStore) -> Self {
        Self(Arc::new(store))
    }
}

#[async_trait]
impl SessionStore for DynSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        self.0.create(record).await
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.0.save(record).await
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        self.0.load(session_id).await
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.0.delete(session_id).await
    }
}

/// The store selected by `session.driver`
pub struct SessionBackend {
    pub store: DynSessionStore,
    /// Set for stores that do not expire records on their own
    pub sweeper: Option<SqlSessionStore>,
}

impl SessionBackend {
    fn self_expiring(store: impl SessionStore) -> Self {
        Self {
            store: DynSessionStore::new(store),
            sweeper: None,
        }
    }
}

/// Build the store selected by `session.driver`
///
/// # Errors
///
/// Returns [`SessionError::Unsupported`] for Redis when the crate was built
/// without the `redis-session` feature, or a connection error when Redis
/// cannot be reached.
pub async fn create_store(
    config: &Config,
    pool: &DynDatabasePool,
) -> Result<SessionBackend, SessionError> {
    match config.session.driver {
        SessionDriver::Memory => Ok(SessionBackend::self_expiring(MokaSessionStore::new())),
        SessionDriver::Database => {
            let store = SqlSessionStore::new(pool.clone());
            Ok(SessionBackend {
                store: DynSessionStore::new(store.clone()),
                sweeper: Some(store),
            })
        }
        #[cfg(feature = "redis-session")]
        SessionDriver::Redis => Ok(SessionBackend::self_expiring(
            self::redis::connect(&config.redis.url()).await?,
        )),
        #[cfg(not(feature = "redis-session"))]
        SessionDriver::Redis => Err(SessionError::Unsupported("redis")),
    }
}

/// Cookie signing key derived from the application secret
///
/// `None` when `session.use_signer` is off.
pub fn signing_key(config: &Config) -> Result<Option<Key>, SessionError> {
    if !config.session.use_signer {
        return Ok(None);
    }
    let digest = Sha512::digest(config.secret_key.as_bytes());
    Key::try_from(digest.as_slice())
        .map(Some)
        .map_err(|e| SessionError::InvalidKey(e.to_string()))
}

/// Session layer for `store`, without cookie signing
///
/// Sessions are saved on every request, so their lifetime counts from the
/// last request.
pub fn session_layer(
    config: &Config,
    store: DynSessionStore,
) -> SessionManagerLayer<DynSessionStore> {
    let lifetime = config.session.lifetime_seconds.min(MAX_LIFETIME_SECONDS) as i64;

    SessionManagerLayer::new(store)
        .with_name(config.session.cookie_name.clone())
        .with_path("/")
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(!config.is_debug())
        .with_always_save(true)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(lifetime)))
}

#[cfg(test)]
pub(crate) fn test_session() -> Session {
    Session::new(None, Arc::new(MokaSessionStore::new()), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_key_follows_config() {
        let mut config = Config::default();
        assert!(signing_key(&config).unwrap().is_some());

        config.session.use_signer = false;
        assert!(signing_key(&config).unwrap().is_none());
    }

    #[test]
    fn test_signing_key_depends_on_secret() {
        let mut config = Config::default();
        let first = signing_key(&config).unwrap().unwrap();
        config.secret_key = "another-secret".to_string();
        let second = signing_key(&config).unwrap().unwrap();

        assert_ne!(first.master(), second.master());
    }

    #[tokio::test]
    async fn test_dyn_store_delegates() {
        let store = DynSessionStore::new(MokaSessionStore::new());
        let session = Session::new(None, Arc::new(store.clone()), None);
        session.insert("user_id", 7).await.unwrap();
        session.save().await.unwrap();

        let id = session.id().expect("saved session has an id");
        let record = store.load(&id).await.unwrap().expect("record stored");
        assert_eq!(record.data["user_id"], serde_json::json!(7));

        store.delete(&id).await.unwrap();
        assert!(store.load(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_driver_needs_no_sweeper() {
        let pool = crate::db::create_test_pool().await.unwrap();
        let backend = create_store(&Config::default(), &pool).await.unwrap();
        assert!(backend.sweeper.is_none());

        let mut config = Config::default();
        config.session.driver = SessionDriver::Database;
        let backend = create_store(&config, &pool).await.unwrap();
        assert!(backend.sweeper.is_some());
    }

    #[cfg(not(feature = "redis-session"))]
    #[tokio::test]
    async fn test_redis_driver_requires_feature() {
        let pool = crate::db::create_test_pool().await.unwrap();
        let mut config = Config::default();
        config.session.driver = SessionDriver::Redis;

        let result = create_store(&config, &pool).await;
        assert!(matches!(result, Err(SessionError::Unsupported("redis"))));
    }
}
