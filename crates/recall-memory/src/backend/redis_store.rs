//! Redis-backed turn store
//!
//! Each conversation is one list at `{prefix}{cid}:turns`. New turns are
//! pushed at the head, so reading from index 0 yields newest-first order.
//! Every push is followed by an `LTRIM` in the same (non-transactional)
//! pipeline, which bounds the list to `max_turns` entries.

use super::{InMemoryBackend, TurnStore};
use crate::error::{Error, Result};
use crate::settings::RedisSettings;
use crate::types::{BackendKind, Turn};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Redis-backed turn store with in-memory fallback
///
/// # Security Considerations
///
/// - Keys are prefixed to isolate conversations from other Redis data
/// - Consider enabling Redis AUTH and TLS in production
pub struct RedisMemoryBackend {
    conn: Option<MultiplexedConnection>,
    /// Key prefix for conversation keys
    key_prefix: String,
    /// Newest entries kept per conversation
    max_turns: usize,
    using_fallback: AtomicBool,
    fallback: Arc<InMemoryBackend>,
}

impl RedisMemoryBackend {
    /// Connect and ping the server.
    ///
    /// Never fails: if the client cannot be built or the ping fails, the
    /// instance starts in fallback mode and serves every call from
    /// `fallback`.
    pub async fn connect(settings: &RedisSettings, fallback: Arc<InMemoryBackend>) -> Self {
        let conn = match Self::open(settings).await {
            Ok(conn) => {
                debug!(prefix = %settings.key_prefix, "Redis memory backend connected");
                Some(conn)
            }
            Err(e) => {
                warn!(error = %e, "Redis unavailable, falling back to in-memory turns");
                None
            }
        };

        Self {
            using_fallback: AtomicBool::new(conn.is_none()),
            conn,
            key_prefix: settings.key_prefix.clone(),
            max_turns: retention(settings.max_turns),
            fallback,
        }
    }

    /// Build a client and verify the server answers `PING`.
    async fn open(settings: &RedisSettings) -> Result<MultiplexedConnection> {
        let client = redis::Client::open(settings.connection_info()?)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(conn)
    }

    /// The injected fallback store.
    pub fn fallback(&self) -> &Arc<InMemoryBackend> {
        &self.fallback
    }

    /// Build the full Redis key for a conversation
    fn build_key(&self, cid: &str) -> String {
        format!("{}{}:turns", self.key_prefix, cid)
    }

    /// Live connection, or an error if the instance never connected.
    fn connection(&self) -> Result<MultiplexedConnection> {
        self.conn
            .clone()
            .ok_or_else(|| Error::Internal("Redis connection not established".to_string()))
    }

    fn degrade(&self, operation: &str, err: &Error) {
        self.using_fallback.store(true, Ordering::SeqCst);
        error!(operation, error = %err, "Redis operation failed, switching to in-memory fallback");
    }

    async fn try_add_turn(&self, role: &str, content: &str, cid: &str) -> Result<()> {
        let mut conn = self.connection()?;
        let key = self.build_key(cid);
        let payload = serde_json::to_string(&Turn::new(role, content))?;
        let last = last_index(self.max_turns);

        redis::pipe()
            .cmd("LPUSH")
            .arg(&key)
            .arg(&payload)
            .ignore()
            .cmd("LTRIM")
            .arg(&key)
            .arg(0)
            .arg(last)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(cid, "Turn pushed to Redis");
        Ok(())
    }

    async fn try_get_recent(&self, limit: usize, cid: &str) -> Result<Vec<Turn>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection()?;

        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(self.build_key(cid))
            .arg(0)
            .arg(last_index(limit))
            .query_async(&mut conn)
            .await?;

        raw.iter()
            .map(|entry| serde_json::from_str(entry).map_err(Error::from))
            .collect()
    }

    async fn try_flush(&self, cid: &str) -> Result<()> {
        let mut conn = self.connection()?;
        let deleted: i64 = redis::cmd("DEL")
            .arg(self.build_key(cid))
            .query_async(&mut conn)
            .await?;

        debug!(cid, deleted = deleted > 0, "Conversation flushed from Redis");
        Ok(())
    }
}

/// Inclusive end index covering the first `count` (>= 1) list entries.
/// `-1` (the whole list) when `count` does not fit in an index.
fn last_index(count: usize) -> isize {
    isize::try_from(count).map_or(-1, |c| c - 1)
}

/// Capacity of at least one entry; zero would drop every write.
fn retention(max_turns: usize) -> usize {
    if max_turns == 0 {
        warn!("memory.redis.max_turns is 0, keeping 1 turn per conversation");
    }
    max_turns.max(1)
}

#[async_trait]
impl TurnStore for RedisMemoryBackend {
    async fn add_turn(&self, role: &str, content: &str, cid: &str) {
        if self.using_fallback() {
            return self.fallback.add_turn(role, content, cid).await;
        }
        if let Err(e) = self.try_add_turn(role, content, cid).await {
            self.degrade("add_turn", &e);
            self.fallback.add_turn(role, content, cid).await;
        }
    }

    async fn get_recent(&self, limit: usize, cid: &str) -> Vec<Turn> {
        if self.using_fallback() {
            return self.fallback.get_recent(limit, cid).await;
        }
        match self.try_get_recent(limit, cid).await {
            Ok(turns) => turns,
            Err(e) => {
                self.degrade("get_recent", &e);
                self.fallback.get_recent(limit, cid).await
            }
        }
    }

    async fn flush(&self, cid: &str) {
        if self.using_fallback() {
            return self.fallback.flush(cid).await;
        }
        if let Err(e) = self.try_flush(cid).await {
            self.degrade("flush", &e);
            self.fallback.flush(cid).await;
        }
    }

    fn using_fallback(&self) -> bool {
        self.using_fallback.load(Ordering::SeqCst)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }
}
