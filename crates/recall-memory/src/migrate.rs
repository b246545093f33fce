//! One-shot export of a session into an SQLite database.

use crate::backend::{InMemoryBackend, SqliteMemoryBackend, TurnStore};
use crate::error::{Error, Result};
use crate::settings::SqliteSettings;
use crate::types::Turn;
use std::sync::Arc;
use tracing::info;

/// Replace `session` in the database described by `settings` with `turns`.
///
/// `turns` are oldest first and are written in that order, so the exported
/// session reads back in the same chronology. Returns the number written.
pub async fn export_session(
    turns: &[Turn],
    session: &str,
    settings: &SqliteSettings,
) -> Result<usize> {
    let target = SqliteMemoryBackend::open(settings, Arc::new(InMemoryBackend::new())).await;
    if target.using_fallback() {
        return Err(Error::Internal(format!(
            "cannot open SQLite database at {}",
            settings.path.display()
        )));
    }

    target.flush(session).await;
    for turn in turns {
        target.add_turn(&turn.role, &turn.content, session).await;
    }

    // A write that failed midway landed in RAM only
    if target.using_fallback() {
        return Err(Error::Internal(format!(
            "export to {} degraded before completion",
            settings.path.display()
        )));
    }

    info!(session, count = turns.len(), path = %settings.path.display(), "Session exported to SQLite");
    Ok(turns.len())
}
