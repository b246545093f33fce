//! Turn storage backends
//!
//! Every backend implements [`TurnStore`]:
//! - [`InMemoryBackend`]: process-local lists (development and universal fallback)
//! - [`RedisMemoryBackend`]: one Redis list per conversation
//! - [`SqliteMemoryBackend`]: a single `turns` table in an SQLite file
//!
//! ## Degradation
//!
//! Redis and SQLite backends own an injected [`InMemoryBackend`]. When their
//! store cannot be reached at construction, or any later operation fails,
//! they latch into fallback mode and serve the current and every later call
//! from RAM. The latch is never reset; build a new instance to retry the
//! primary store.

mod in_memory;
mod redis_store;
mod sqlite_store;

pub use in_memory::InMemoryBackend;
pub use redis_store::RedisMemoryBackend;
pub use sqlite_store::{Clock, MonotonicClock, SqliteMemoryBackend, IN_MEMORY_PATH};

use crate::types::{BackendKind, Turn};
use async_trait::async_trait;

/// Storage contract shared by all backends.
///
/// Operations never fail from the caller's point of view.
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Append one turn to conversation `cid`.
    async fn add_turn(&self, role: &str, content: &str, cid: &str);

    /// Up to `limit` most recently added turns, newest first.
    async fn get_recent(&self, limit: usize, cid: &str) -> Vec<Turn>;

    /// Delete every turn of `cid`. Idempotent.
    async fn flush(&self, cid: &str);

    /// Whether this instance is serving from its in-memory fallback.
    fn using_fallback(&self) -> bool;

    /// Storage engine this instance represents.
    fn kind(&self) -> BackendKind;
}
