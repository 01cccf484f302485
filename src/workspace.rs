//! Per-request scratch directories.
//!
//! Each pipeline run owns exactly one [`Workspace`]. The directory and everything in it is
//! removed when the guard is dropped, so every exit path (errors, timeouts, panics) cleans up.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

/// Name prefix of every workspace directory. Used by the startup sweep to recognise leftovers.
pub const WORKSPACE_PREFIX: &str = "thumb";

#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a uniquely named directory under `root` on the blocking pool.
    pub async fn create(root: &Path) -> io::Result<Self> {
        let root = root.to_path_buf();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(WORKSPACE_PREFIX)
                .tempdir_in(&root)
        })
        .await
        .map_err(io::Error::other)??;
        log::trace!(
            target: "thumby::workspace",
            "created workspace {}",
            dir.path().display()
        );
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the directory now and report failures. Dropping does the same silently.
    pub async fn close(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        let dir = self.dir;
        let result = tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(io::Error::other)
            .and_then(|closed| closed);
        if let Err(ref e) = result {
            log::warn!(
                target: "thumby::workspace",
                "failed to remove workspace {}: {}",
                path.display(),
                e
            );
        }
        result
    }
}

/// Remove workspaces under `root` older than `max_age`. These are left behind only when the
/// process died mid-request. Returns the number of directories removed.
pub fn cleanup_stale_workspaces(root: &Path, max_age: Duration) -> usize {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!(
                target: "thumby::workspace",
                "cannot scan workspace root {}: {}",
                root.display(),
                e
            );
            return 0;
        }
    };
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(WORKSPACE_PREFIX) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_dir() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }
        match fs::remove_dir_all(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => log::debug!(
                target: "thumby::workspace",
                "could not remove stale workspace {}: {}",
                entry.path().display(),
                e
            ),
        }
    }
    if removed > 0 {
        log::info!(
            target: "thumby::workspace",
            "removed {} stale workspaces from {}",
            removed,
            root.display()
        );
    }
    removed
}
