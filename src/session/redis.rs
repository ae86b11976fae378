//! Redis session store
//!
//! Records are written with an expiry, so Redis drops stale sessions itself.

use tower_sessions_redis_store::fred::prelude::Pool;
use tower_sessions_redis_store::RedisStore;

use super::SessionError;

/// Connections kept open to Redis
const POOL_SIZE: usize = 6;

pub type RedisSessionStore = RedisStore<Pool>;

/// Connect to `redis_url` (e.g. `redis://127.0.0.1:6379`)
pub async fn connect(redis_url: &str) -> Result<RedisSessionStore, SessionError> {
    use tower_sessions_redis_store::fred::prelude::*;

    let config = Config::from_url(redis_url)?;
    let pool = Pool::new(config, None, None, None, POOL_SIZE)?;
    pool.connect();
    pool.wait_for_connect().await?;

    tracing::info!("Session store connected to Redis at {}", redis_url);
    Ok(RedisStore::new(pool))
}
