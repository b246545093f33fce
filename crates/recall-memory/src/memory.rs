//! Memory service - backend resolution and the load/save/clear façade
//!
//! [`Memory`] is built once by the application and shared (usually behind
//! an `Arc`). It resolves a requested backend name into one of three active
//! modes:
//!
//! - `none`: loads are empty, saves and clears are dropped
//! - `in_memory`: the service's own process-local store
//! - `redis` / `sqlite`: a [`TurnStore`] implementation
//!
//! ## Persistent Resolution
//!
//! `persistent` walks [`PERSISTENT_CHAIN`] (Redis, then SQLite). A candidate
//! is accepted only if it was built and is not already in fallback mode;
//! otherwise the next one is tried. When every candidate is rejected the
//! service settles on `in_memory`.
//!
//! ## Ordering
//!
//! Stores return newest-first; `load` always returns oldest-first.

use crate::backend::{InMemoryBackend, RedisMemoryBackend, SqliteMemoryBackend, TurnStore};
use crate::error::{Error, Result};
use crate::settings::{MemoryConfig, RedisSettings, SqliteSettings};
use crate::snapshot::write_snapshot;
use crate::types::{BackendKind, BackendRequest, Turn};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};


/// Order in which `persistent` tries durable backends
pub const PERSISTENT_CHAIN: [BackendKind; 2] = [BackendKind::Redis, BackendKind::Sqlite];

/// Builds store implementations for resolution.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Build a store of the given kind.
    ///
    /// A store that could not reach its medium is still returned, in
    /// fallback mode. `Err` means the store could not be built at all.
    async fn build(&self, kind: BackendKind) -> Result<Arc<dyn TurnStore>>;
}

/// Factory producing real Redis and SQLite backends, each with its own
/// in-memory fallback.
#[derive(Debug, Clone)]
pub struct StoreFactory {
    redis: RedisSettings,
    sqlite: SqliteSettings,
}

impl StoreFactory {
    /// Factory using the backend sections of `config`.
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            redis: config.redis.clone(),
            sqlite: config.sqlite.clone(),
        }
    }
}

#[async_trait]
impl BackendFactory for StoreFactory {
    async fn build(&self, kind: BackendKind) -> Result<Arc<dyn TurnStore>> {
        let fallback = Arc::new(InMemoryBackend::new());
        match kind {
            BackendKind::Redis => {
                if self.redis.max_turns == 0 {
                    return Err(Error::Configuration(
                        "memory.redis.max_turns must be at least 1".to_string(),
                    ));
                }
                Ok(Arc::new(RedisMemoryBackend::connect(&self.redis, fallback).await))
            }
            BackendKind::Sqlite => {
                if self.sqlite.max_rows_per_session == 0 {
                    return Err(Error::Configuration(
                        "memory.sqlite.max_rows_per_session must be at least 1".to_string(),
                    ));
                }
                Ok(Arc::new(SqliteMemoryBackend::open(&self.sqlite, fallback).await))
            }
            other => Err(Error::Configuration(format!(
                "backend '{other}' has no store implementation"
            ))),
        }
    }
}

/// Why a resolution candidate was rejected.
#[derive(Debug, thiserror::Error)]
pub enum CandidateError {
    /// Built, but already serving from its in-memory fallback
    #[error("{0} backend is running in fallback mode")]
    Degraded(BackendKind),

    /// Could not be built
    #[error("{kind} backend could not be built: {source}")]
    Unavailable {
        /// Candidate kind
        kind: BackendKind,
        /// Construction error
        #[source]
        source: Error,
    },
}

/// Outcome of resolving a backend request.
#[derive(Clone)]
pub enum Resolution {
    /// Memory disabled
    Disabled,
    /// Process-local store owned by the service
    InMemory,
    /// External store
    Store(Arc<dyn TurnStore>),
}

impl Resolution {
    /// Backend kind this resolution represents.
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Disabled => BackendKind::None,
            Self::InMemory => BackendKind::InMemory,
            Self::Store(store) => store.kind(),
        }
    }
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Resolution").field(&self.kind()).finish()
    }
}

/// Build `kind` and accept it only if it is live.
pub async fn try_candidate(
    factory: &dyn BackendFactory,
    kind: BackendKind,
) -> std::result::Result<Arc<dyn TurnStore>, CandidateError> {
    let store = factory
        .build(kind)
        .await
        .map_err(|source| CandidateError::Unavailable { kind, source })?;
    if store.using_fallback() {
        return Err(CandidateError::Degraded(kind));
    }
    Ok(store)
}

/// Resolve a backend request. Never fails; every dead end ends in `InMemory`.
pub async fn resolve(factory: &dyn BackendFactory, request: &BackendRequest) -> Resolution {
    match request {
        BackendRequest::Persistent => {
            for kind in PERSISTENT_CHAIN {
                match try_candidate(factory, kind).await {
                    Ok(store) => {
                        info!(backend = %kind, "Persistent memory resolved");
                        return Resolution::Store(store);
                    }
                    Err(reason) => {
                        warn!(backend = %kind, reason = %reason, "Persistent memory candidate rejected");
                    }
                }
            }
            warn!("No persistent backend available, using in-memory turns");
            Resolution::InMemory
        }
        BackendRequest::Direct(BackendKind::None) => Resolution::Disabled,
        BackendRequest::Direct(BackendKind::InMemory) => Resolution::InMemory,
        BackendRequest::Direct(kind) => match factory.build(*kind).await {
            // A degraded store is still accepted when asked for by name
            Ok(store) => Resolution::Store(store),
            Err(e) => {
                error!(backend = %kind, error = %e, "Memory backend could not be built, using in-memory turns");
                Resolution::InMemory
            }
        },
        BackendRequest::Unknown(name) => {
            error!(backend = %name, "Unknown memory backend, using in-memory turns");
            Resolution::InMemory
        }
    }
}

/// Request and resolution currently in effect.
struct ActiveBackend {
    request: BackendRequest,
    resolution: Resolution,
}

/// Backend-agnostic conversation memory.
pub struct Memory {
    factory: Arc<dyn BackendFactory>,
    active: RwLock<ActiveBackend>,
    /// Process-local turns; kept across reconfiguration
    local: InMemoryBackend,
    snapshot_path: Option<PathBuf>,
    /// Orders snapshot writes so the last file written is the newest state
    snapshot_lock: Mutex<()>,
    load_limit: usize,
    enabled: bool,
}

impl Memory {
    /// Build a service with real backends from `config`.
    pub async fn from_config(config: &MemoryConfig) -> Self {
        Self::with_factory(Arc::new(StoreFactory::new(config)), config).await
    }

    /// Build a service resolving through `factory`.
    pub async fn with_factory(factory: Arc<dyn BackendFactory>, config: &MemoryConfig) -> Self {
        let request = config.request();
        let resolution = resolve(factory.as_ref(), &request).await;
        debug!(requested = %request, backend = %resolution.kind(), "Memory initialised");

        Self {
            factory,
            active: RwLock::new(ActiveBackend {
                request,
                resolution,
            }),
            local: InMemoryBackend::new(),
            snapshot_path: config.snapshot_path.clone(),
            snapshot_lock: Mutex::new(()),
            load_limit: config.load_limit,
            enabled: config.enabled,
        }
    }

    /// Switch to another backend.
    ///
    /// Resolution runs again only when the normalized request differs from
    /// the one in effect. Returns the active kind.
    pub async fn reconfigure(&self, backend: &str) -> BackendKind {
        let request = BackendRequest::parse(backend);
        let mut active = self.active.write().await;
        if active.request == request {
            return active.resolution.kind();
        }

        let resolution = resolve(self.factory.as_ref(), &request).await;
        info!(
            from = %active.resolution.kind(),
            to = %resolution.kind(),
            requested = %request,
            "Memory backend reconfigured"
        );
        *active = ActiveBackend {
            request,
            resolution,
        };
        active.resolution.kind()
    }

    /// Active backend kind.
    pub async fn backend(&self) -> BackendKind {
        self.active.read().await.resolution.kind()
    }

    /// Whether callers should consult memory (`memory.enabled`).
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The service's process-local store.
    pub fn local_store(&self) -> &InMemoryBackend {
        &self.local
    }

    async fn resolution(&self) -> Resolution {
        self.active.read().await.resolution.clone()
    }

    /// Turns of `session_id`, oldest first.
    pub async fn load(&self, session_id: &str) -> Vec<Turn> {
        match self.resolution().await {
            Resolution::Disabled => Vec::new(),
            Resolution::InMemory => self.local.history(session_id).await,
            Resolution::Store(store) => {
                let mut turns = store.get_recent(self.load_limit, session_id).await;
                turns.reverse();
                turns
            }
        }
    }

    /// Append one turn to `session_id`.
    pub async fn save(&self, turn: Turn, session_id: &str) {
        match self.resolution().await {
            Resolution::Disabled => {}
            Resolution::InMemory => {
                self.local.push(turn, session_id).await;
                self.mirror_snapshot().await;
            }
            Resolution::Store(store) => {
                store.add_turn(&turn.role, &turn.content, session_id).await;
            }
        }
    }

    /// Remove every turn of `session_id`. Idempotent.
    pub async fn clear(&self, session_id: &str) {
        match self.resolution().await {
            Resolution::Disabled => {}
            Resolution::InMemory => {
                self.local.flush(session_id).await;
                self.mirror_snapshot().await;
            }
            Resolution::Store(store) => store.flush(session_id).await,
        }
    }

    /// Stored turns followed by `live`, or just `live` when memory is disabled.
    pub async fn with_history(&self, session_id: &str, live: &[Turn]) -> Vec<Turn> {
        if !self.enabled {
            return live.to_vec();
        }
        let mut turns = self.load(session_id).await;
        turns.extend_from_slice(live);
        turns
    }

    /// Write the process-local store to the snapshot file, if configured.
    async fn mirror_snapshot(&self) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let _guard = self.snapshot_lock.lock().await;
        let snapshot = self.local.snapshot().await;
        if let Err(e) = write_snapshot(path, &snapshot).await {
            warn!(path = %path.display(), error = %e, "Failed to write memory snapshot");
        }
    }
}
