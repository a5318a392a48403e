//! Filesystem adapters for Recall.
//!
//! Resolves the data directory and provides [`json_store::JsonFileStore`],
//! the JSON file implementation of the `MemoryPersistence` trait from
//! `recall-core`.

pub mod json_store;

use std::path::PathBuf;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "RECALL_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `RECALL_DATA_DIR` environment variable
/// 2. `~/.recall` under the user's home directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".recall");
    }

    // Last resort: current directory
    PathBuf::from(".recall")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_data_dir_ends_with_recall_or_env() {
        let dir = resolve_data_dir();
        match std::env::var(DATA_DIR_ENV) {
            Ok(env_dir) => assert_eq!(dir, PathBuf::from(env_dir)),
            Err(_) => assert!(dir.ends_with(".recall")),
        }
    }
}
