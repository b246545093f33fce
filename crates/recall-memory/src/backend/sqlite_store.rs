//! SQLite turn storage backend
//!
//! Persists turns in a single table:
//!
//! ```text
//! turns(session TEXT, ts INTEGER, role TEXT, content TEXT,
//!       PRIMARY KEY(session, ts))
//! ```
//!
//! `ts` is a nanosecond timestamp and doubles as insertion order and trim
//! key. This layout is the on-disk format shared with external tooling.
//!
//! # Usage
//!
//! ```no_run
//! use recall_memory::{InMemoryBackend, SqliteMemoryBackend, SqliteSettings, TurnStore};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let store = SqliteMemoryBackend::open(
//!     &SqliteSettings::at("data/memory.sqlite"),
//!     Arc::new(InMemoryBackend::new()),
//! )
//! .await;
//! store.add_turn("user", "hello", "default").await;
//! # }
//! ```

use super::{InMemoryBackend, TurnStore};
use crate::error::{Error, Result};
use crate::settings::SqliteSettings;
use crate::types::{BackendKind, Turn};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

#[cfg(test)]
mod tests;

/// Path value selecting a private in-memory database
pub const IN_MEMORY_PATH: &str = ":memory:";

const CREATE_TURNS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS turns (
        session  TEXT    NOT NULL,
        ts       INTEGER NOT NULL,
        role     TEXT    NOT NULL,
        content  TEXT    NOT NULL,
        PRIMARY KEY (session, ts)
    )
"#;

/// Deletes every row of a session outside its newest `?` timestamps.
const TRIM_SESSION: &str = r#"
    DELETE FROM turns
    WHERE session = ?
      AND ts NOT IN (
          SELECT ts FROM turns
          WHERE session = ?
          ORDER BY ts DESC
          LIMIT ?
      )
"#;

/// Source of row timestamps.
pub trait Clock: Send + Sync {
    /// Current time in nanoseconds.
    fn now_nanos(&self) -> i64;
}

/// Wall-clock nanoseconds that never repeat within one instance.
///
/// If the system clock has not advanced since the previous reading, the
/// previous value plus one is returned instead.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl Clock for MonotonicClock {
    fn now_nanos(&self) -> i64 {
        let wall = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| Utc::now().timestamp_micros() * 1_000);
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let next = wall.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Capacity of at least one row; zero would delete every insert.
fn retention(max_rows: usize) -> i64 {
    if max_rows == 0 {
        warn!("memory.sqlite.max_rows_per_session is 0, keeping 1 turn per session");
    }
    i64::try_from(max_rows.max(1)).unwrap_or(i64::MAX)
}

/// SQLite turn store with in-memory fallback
pub struct SqliteMemoryBackend {
    pool: Option<SqlitePool>,
    path: PathBuf,
    /// Newest rows kept per session
    max_rows: i64,
    /// When false, reads and writes go to the fallback even though the schema exists
    persist: bool,
    using_fallback: AtomicBool,
    fallback: Arc<InMemoryBackend>,
    clock: Arc<dyn Clock>,
}

impl SqliteMemoryBackend {
    /// Open (or create) the database described by `settings`.
    ///
    /// Never fails: directory creation, connection or schema errors leave
    /// the instance in fallback mode.
    pub async fn open(settings: &SqliteSettings, fallback: Arc<InMemoryBackend>) -> Self {
        Self::open_with_clock(settings, fallback, Arc::new(MonotonicClock::default())).await
    }

    /// Like [`open`](Self::open) with a custom timestamp source.
    pub async fn open_with_clock(
        settings: &SqliteSettings,
        fallback: Arc<InMemoryBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let pool = match Self::connect(&settings.path).await {
            Ok(pool) => {
                debug!(path = %settings.path.display(), persist = settings.persist, "SQLite memory backend connected");
                Some(pool)
            }
            Err(e) => {
                warn!(path = %settings.path.display(), error = %e, "SQLite unavailable, falling back to in-memory turns");
                None
            }
        };

        Self {
            using_fallback: AtomicBool::new(pool.is_none()),
            pool,
            path: settings.path.clone(),
            max_rows: retention(settings.max_rows_per_session),
            persist: settings.persist,
            fallback,
            clock,
        }
    }

    /// Create the parent directory, connect with WAL journaling and create the schema.
    async fn connect(path: &Path) -> Result<SqlitePool> {
        let pool = if path == Path::new(IN_MEMORY_PATH) {
            // One connection that is never recycled, or the database vanishes
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect("sqlite::memory:")
                .await?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        sqlx::query(CREATE_TURNS_TABLE).execute(&pool).await?;
        Ok(pool)
    }

    /// The injected fallback store.
    pub fn fallback(&self) -> &Arc<InMemoryBackend> {
        &self.fallback
    }

    /// Database file this instance was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether reads and writes currently bypass the database.
    fn routes_to_fallback(&self) -> bool {
        !self.persist || self.using_fallback()
    }

    fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .as_ref()
            .ok_or_else(|| Error::Internal("SQLite connection not established".to_string()))
    }

    fn degrade(&self, operation: &str, err: &Error) {
        self.using_fallback.store(true, Ordering::SeqCst);
        error!(operation, error = %err, "SQLite operation failed, switching to in-memory fallback");
    }

    /// Insert and trim in one transaction.
    async fn try_add_turn(&self, role: &str, content: &str, cid: &str) -> Result<()> {
        let pool = self.pool()?;
        let ts = self.clock.now_nanos();

        let mut tx = pool.begin().await?;
        sqlx::query("INSERT INTO turns (session, ts, role, content) VALUES (?, ?, ?, ?)")
            .bind(cid)
            .bind(ts)
            .bind(role)
            .bind(content)
            .execute(&mut *tx)
            .await?;

        let trimmed = sqlx::query(TRIM_SESSION)
            .bind(cid)
            .bind(cid)
            .bind(self.max_rows)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        debug!(cid, ts, trimmed, "Turn stored in SQLite");
        Ok(())
    }

    async fn try_get_recent(&self, limit: usize, cid: &str) -> Result<Vec<Turn>> {
        let pool = self.pool()?;
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT role, content FROM turns
            WHERE session = ?
            ORDER BY ts DESC
            LIMIT ?
            "#,
        )
        .bind(cid)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(role, content)| Turn { role, content })
            .collect())
    }

    async fn try_flush(&self, cid: &str) -> Result<()> {
        let pool = self.pool()?;
        // Schema first, so flushing a never-written database cannot miss the table
        sqlx::query(CREATE_TURNS_TABLE).execute(pool).await?;
        let deleted = sqlx::query("DELETE FROM turns WHERE session = ?")
            .bind(cid)
            .execute(pool)
            .await?
            .rows_affected();

        debug!(cid, deleted, "Conversation flushed from SQLite");
        Ok(())
    }
}

#[async_trait]
impl TurnStore for SqliteMemoryBackend {
    async fn add_turn(&self, role: &str, content: &str, cid: &str) {
        if self.routes_to_fallback() {
            return self.fallback.add_turn(role, content, cid).await;
        }
        if let Err(e) = self.try_add_turn(role, content, cid).await {
            self.degrade("add_turn", &e);
            self.fallback.add_turn(role, content, cid).await;
        }
    }

    async fn get_recent(&self, limit: usize, cid: &str) -> Vec<Turn> {
        if self.routes_to_fallback() {
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
        if self.routes_to_fallback() {
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
        BackendKind::Sqlite
    }
}
