//! Volatile, process-local turn store.

use super::TurnStore;
use crate::types::{BackendKind, Turn};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory turn store
///
/// Data is lost when the process exits. This is both the `in_memory`
/// backend and the fallback target of the persistent backends.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    sessions: Arc<RwLock<HashMap<String, Vec<Turn>>>>,
}

impl InMemoryBackend {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every turn of `cid`, oldest first.
    pub async fn history(&self, cid: &str) -> Vec<Turn> {
        let sessions = self.sessions.read().await;
        sessions.get(cid).cloned().unwrap_or_default()
    }

    /// Append an already-built turn.
    pub async fn push(&self, turn: Turn, cid: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.entry(cid.to_string()).or_default().push(turn);
    }

    /// Copy of the whole store, sessions sorted by id.
    pub async fn snapshot(&self) -> BTreeMap<String, Vec<Turn>> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .map(|(cid, turns)| (cid.clone(), turns.clone()))
            .collect()
    }

    /// Number of conversations currently held.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl TurnStore for InMemoryBackend {
    async fn add_turn(&self, role: &str, content: &str, cid: &str) {
        self.push(Turn::new(role, content), cid).await;
    }

    async fn get_recent(&self, limit: usize, cid: &str) -> Vec<Turn> {
        let sessions = self.sessions.read().await;
        match sessions.get(cid) {
            Some(turns) => turns.iter().rev().take(limit).cloned().collect(),
            None => Vec::new(),
        }
    }

    async fn flush(&self, cid: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(cid);
    }

    fn using_fallback(&self) -> bool {
        false
    }

    fn kind(&self) -> BackendKind {
        BackendKind::InMemory
    }
}
