//! In-memory store snapshots
//!
//! When a snapshot path is configured, the memory service writes its whole
//! process-local store to that file after every in-memory save or clear.
//! A separately started process (the `migrate` command) reads it back to
//! export a session without a shared database.
//!
//! Format: `{"<session>": [{"role": "...", "content": "..."}, ...]}`.

use crate::error::Result;
use crate::types::Turn;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Session id → turns, oldest first.
pub type Snapshot = BTreeMap<String, Vec<Turn>>;

/// Distinguishes temp files of concurrent writers in one process
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Write `snapshot` to `path` through a sibling temp file and a rename.
pub async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_vec(snapshot)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(
        ".{}.{}.tmp",
        std::process::id(),
        TMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));

    tokio::fs::write(&tmp, &json).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    debug!(path = %path.display(), sessions = snapshot.len(), "Memory snapshot written");
    Ok(())
}

/// Read a snapshot; a missing file is an empty snapshot.
pub async fn read_snapshot(path: &Path) -> Result<Snapshot> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::new()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("memory.json");

        let mut snapshot = Snapshot::new();
        snapshot.insert(
            "default".to_string(),
            vec![Turn::user("hi"), Turn::assistant("yo")],
        );
        write_snapshot(&path, &snapshot).await.unwrap();

        assert_eq!(read_snapshot(&path).await.unwrap(), snapshot);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            raw,
            r#"{"default":[{"role":"user","content":"hi"},{"role":"assistant","content":"yo"}]}"#
        );
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("memory.json");

        for i in 0..3 {
            let mut snapshot = Snapshot::new();
            snapshot.insert(format!("s{i}"), vec![Turn::user("hi")]);
            write_snapshot(&path, &snapshot).await.unwrap();
        }

        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("memory.json")]);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let snapshot = read_snapshot(&temp.path().join("absent.json")).await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(read_snapshot(&path).await.is_err());
    }
}
