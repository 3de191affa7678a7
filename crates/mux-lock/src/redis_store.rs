//! Redis lock store
//!
//! SET NX EX carries the acquisition, the store's own TTL handles crashed
//! holders, and the holder-checked release runs as a Lua script so the
//! read and the delete cannot be split by another client.

use crate::{LockError, LockStore, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::debug;

const RELEASE_IF_HOLDER: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

/// Lock store backed by a Redis server
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
}

impl RedisLockStore {
    /// Connect to the store at `url` (e.g. `redis://:pass@localhost:6379/0`).
    ///
    /// The connection manager reconnects on its own after outages.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| LockError::Store(format!("invalid redis url: {}", e)))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| LockError::Store(format!("cannot reach lock store: {}", e)))?;
        Ok(Self { conn })
    }
}

fn store_err(e: redis::RedisError) -> LockError {
    LockError::Store(e.to_string())
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn acquire(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(holder)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        let acquired = reply.is_some();
        debug!("lock acquire {} by {}: {}", key, holder, acquired);
        Ok(acquired)
    }

    async fn holder(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn ttl_seconds(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        redis::cmd("TTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn release_if(&self, key: &str, holder: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = redis::Script::new(RELEASE_IF_HOLDER)
            .key(key)
            .arg(holder)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(deleted > 0)
    }

    async fn force_release(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(deleted > 0)
    }
}
