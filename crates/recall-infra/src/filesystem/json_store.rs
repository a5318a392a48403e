//! JSON file persistence for the memory store.
//!
//! The whole store is one JSON object keyed by user id. Saves are atomic: the
//! snapshot is written to a temp file in the same directory and renamed over
//! the target. A file that cannot be read or parsed is moved aside to
//! `<file>.corrupt-<unix-ts>` so the next save cannot overwrite it. If it
//! cannot be moved either, saving is refused for the rest of the run.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use recall_core::memory::persistence::MemoryPersistence;
use recall_types::error::PersistenceError;
use recall_types::memory::StoreSnapshot;

/// `MemoryPersistence` backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    /// Set when an unreadable file is still in place.
    saves_blocked: Arc<AtomicBool>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            saves_blocked: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Store located at `{data_dir}/{file_name}`.
    pub fn in_dir(data_dir: &Path, file_name: &str) -> Self {
        Self::new(data_dir.join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename an unreadable file out of the way, or block saves if that
    /// fails too.
    async fn set_aside(&self, reason: &str) {
        let mut target = self.path.clone().into_os_string();
        target.push(format!(".corrupt-{}", Utc::now().timestamp()));
        let target = PathBuf::from(target);

        match tokio::fs::rename(&self.path, &target).await {
            Ok(()) => warn!(
                path = %self.path.display(),
                moved_to = %target.display(),
                reason,
                "Unreadable memory file moved aside"
            ),
            Err(e) => {
                self.saves_blocked.store(true, Ordering::Release);
                error!(
                    path = %self.path.display(),
                    error = %e,
                    reason,
                    "Failed to move unreadable memory file aside; saving is disabled"
                );
            }
        }
    }
}

impl MemoryPersistence for JsonFileStore {
    async fn load(&self) -> Result<Option<StoreSnapshot>, PersistenceError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No memory file found");
                return Ok(None);
            }
            Err(e) => {
                self.set_aside(&e.to_string()).await;
                return Err(e.into());
            }
        };

        match serde_json::from_slice::<StoreSnapshot>(&bytes) {
            Ok(snapshot) => {
                debug!(path = %self.path.display(), users = snapshot.len(), "Loaded memory file");
                Ok(Some(snapshot))
            }
            Err(e) => {
                let reason = e.to_string();
                self.set_aside(&reason).await;
                Err(PersistenceError::Corrupt {
                    path: self.path.display().to_string(),
                    reason,
                })
            }
        }
    }

    async fn save(&self, snapshot: &StoreSnapshot) -> Result<(), PersistenceError> {
        if self.saves_blocked.load(Ordering::Acquire) {
            return Err(PersistenceError::Io(std::io::Error::other(format!(
                "refusing to overwrite unreadable memory file {}",
                self.path.display()
            ))));
        }
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| PersistenceError::Io(std::io::Error::other(e)))?
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    // Atomic write: temp file in the same directory, then rename.
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
