//! `recall migrate` — one-shot export of a snapshot session into SQLite

use anyhow::{Context, Result};
use recall_memory::{migrate::export_session, snapshot::read_snapshot, AppSettings, SqliteSettings};
use std::path::PathBuf;

/// Export `session` from the snapshot file into `db_path`, or the
/// configured SQLite file when no path is given.
pub async fn run(
    settings: &AppSettings,
    session: &str,
    db_path: Option<PathBuf>,
    snapshot: Option<PathBuf>,
) -> Result<()> {
    let snapshot_path = snapshot
        .or_else(|| settings.memory.snapshot_path.clone())
        .context("No snapshot file: pass --snapshot or set memory.snapshot_path")?;

    let mut sessions = read_snapshot(&snapshot_path)
        .await
        .with_context(|| format!("Failed to read snapshot {}", snapshot_path.display()))?;
    let turns = sessions.remove(session).unwrap_or_default();
    if turns.is_empty() {
        println!("Nothing to migrate: session \"{session}\" is empty.");
        return Ok(());
    }

    let target = SqliteSettings {
        path: db_path.unwrap_or_else(|| settings.memory.sqlite.path.clone()),
        persist: true,
        ..settings.memory.sqlite.clone()
    };
    let count = export_session(&turns, session, &target)
        .await
        .context("Failed to export session")?;

    println!(
        "Migrated {} turns → {} (session \"{}\").",
        count,
        target.path.display(),
        session
    );
    Ok(())
}
