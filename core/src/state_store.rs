//! Thin async wrapper around the Redis-compatible coordination store.
//!
//! Every pipeline component (watcher, extractor workers, thumbnail workers,
//! the query API, and the maintenance CLIs) shares one [`StateStore`] built
//! from a single [`redis::aio::ConnectionManager`], which pools and
//! auto-reconnects under the hood. Callers never see a raw `RedisError`;
//! everything here returns the crate's [`Result`] so a transport hiccup and a
//! malformed response look the same to upstream code.

use std::fmt;
use std::time::Duration;

use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::{debug, warn};

use crate::error::{Error, Result};

#[derive(Clone)]
pub struct StateStore {
    conn: ConnectionManager,
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl StateStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Atomic `SET key value NX EX ttl`. `true` if the lock was acquired,
    /// `false` if it's already held by someone else.
    pub async fn try_acquire_lock(&self, key: &str, ttl: Duration) -> Result<bool> {
        let acquired: bool = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<Option<String>>(&mut self.conn.clone())
            .await
            .map(|reply| reply.is_some())?;
        debug!(key, acquired, "lock acquisition attempt");
        Ok(acquired)
    }

    /// Idempotent lock release. Deleting a key that no longer exists (e.g.
    /// because it already expired) is not an error.
    pub async fn release_lock(&self, key: &str) -> Result<()> {
        self.conn.clone().del::<_, ()>(key).await?;
        Ok(())
    }

    pub async fn enqueue(&self, queue: &str, payload: &str) -> Result<()> {
        self.conn.clone().lpush::<_, _, ()>(queue, payload).await?;
        Ok(())
    }

    /// Blocking right-pop with the given timeout. `None` on timeout (no
    /// error), matching the worker loops' "wake up, check shutdown, block
    /// again" pattern.
    pub async fn dequeue_blocking(&self, queue: &str, timeout: Duration) -> Result<Option<String>> {
        let reply: Option<(String, String)> = self
            .conn
            .clone()
            .brpop(queue, timeout.as_secs_f64())
            .await?;
        Ok(reply.map(|(_, payload)| payload))
    }

    pub async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.conn.clone().sadd::<_, _, ()>(key, member).await?;
        Ok(())
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<()> {
        self.conn.clone().srem::<_, _, ()>(key, member).await?;
        Ok(())
    }

    pub async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.conn.clone().sismember(key, member).await?)
    }

    pub async fn scard(&self, key: &str) -> Result<u64> {
        Ok(self.conn.clone().scard(key).await?)
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.conn.clone().smembers(key).await?)
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.conn.clone().get(key).await?)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.clone().set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    pub async fn setex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.conn
            .clone()
            .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        self.conn
            .clone()
            .expire::<_, ()>(key, ttl.as_secs() as i64)
            .await?;
        Ok(())
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.conn.clone().hset::<_, _, _, ()>(key, field, value).await?;
        Ok(())
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.conn.clone().hget(key, field).await?)
    }

    pub async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        Ok(self.conn.clone().hgetall(key).await?)
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        self.conn.clone().del::<_, ()>(key).await?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.conn.clone().exists(key).await?)
    }

    /// Cursor-driven `SCAN` over a key pattern, collected to completion. Used
    /// only by the maintenance CLIs and health checks, never on the hot
    /// path, so paying for a full collect is acceptable.
    pub async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(keys)
    }

    /// `PING`, used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        match redis::cmd("PING").query_async::<String>(&mut self.conn.clone()).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "state store ping failed");
                Err(Error::StateStore(e))
            }
        }
    }
}
