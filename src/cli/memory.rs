//! Memory CLI commands
//!
//! `recall show`  — print the stored turns of a session
//! `recall save`  — append one turn
//! `recall clear` — delete a session

use anyhow::{Context, Result};
use recall_memory::{AppSettings, Memory, Turn};

async fn open(settings: &AppSettings) -> Memory {
    let memory = Memory::from_config(&settings.memory).await;
    if !memory.is_enabled() {
        tracing::debug!("memory.enabled is false; running the command anyway");
    }
    memory
}

/// Print the session's turns, oldest first.
pub async fn show(settings: &AppSettings, session: &str, json: bool) -> Result<()> {
    let memory = open(settings).await;
    let turns = memory.load(session).await;

    if json {
        let out = serde_json::to_string_pretty(&turns).context("Failed to encode turns")?;
        println!("{out}");
        return Ok(());
    }

    println!(
        "Session \"{}\" ({} backend, {} turns)",
        session,
        memory.backend().await,
        turns.len()
    );
    for turn in &turns {
        println!("  [{}] {}", turn.role, turn.content);
    }
    Ok(())
}

/// Append one turn.
pub async fn save(settings: &AppSettings, session: &str, role: String, content: String) -> Result<()> {
    let memory = open(settings).await;
    memory.save(Turn::new(role, content), session).await;
    println!("Saved to \"{}\" ({} backend)", session, memory.backend().await);
    Ok(())
}

/// Delete every turn of the session.
pub async fn clear(settings: &AppSettings, session: &str) -> Result<()> {
    let memory = open(settings).await;
    memory.clear(session).await;
    println!("Cleared \"{}\" ({} backend)", session, memory.backend().await);
    Ok(())
}
