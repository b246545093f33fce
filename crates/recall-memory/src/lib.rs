//! Recall Memory - pluggable conversation memory
//!
//! Persists and retrieves chat turns through one interface over three
//! storage engines, degrading to RAM instead of failing.
//!
//! # Architecture
//!
//! ```text
//! caller ──► Memory::save / load / clear
//!                 │
//!          Resolution (none | in_memory | store)
//!                 │
//!      ┌──────────┴───────────┐
//!  RedisMemoryBackend   SqliteMemoryBackend
//!      └──────┬───────────────┘
//!        on failure
//!             │
//!      InMemoryBackend (fallback)
//! ```
//!
//! `persistent` picks the first live store in Redis → SQLite order and
//! settles on in-memory if neither is reachable.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod memory;
pub mod migrate;
pub mod settings;
pub mod snapshot;
pub mod types;

pub use backend::{
    Clock, InMemoryBackend, MonotonicClock, RedisMemoryBackend, SqliteMemoryBackend, TurnStore,
};
pub use error::{Error, Result};
pub use memory::{
    resolve, try_candidate, BackendFactory, CandidateError, Memory, Resolution, StoreFactory,
    PERSISTENT_CHAIN,
};
pub use settings::{
    load_settings, AppSettings, LoggingSettings, MemoryConfig, RedisSettings, SqliteSettings,
};
pub use types::{BackendKind, BackendRequest, Turn, DEFAULT_RECENT_LIMIT, DEFAULT_SESSION};
