//! Configuration types for Recall.
//!
//! `MemoryConfig` represents the `config.toml` in the data directory that
//! controls retention, persistence cadence, extraction and admin access.

use serde::{Deserialize, Serialize};

use crate::memory::{DEFAULT_HISTORY_LIMIT, DEFAULT_NOTE_TTL_DAYS, UserId};

/// Top-level configuration for the memory subsystem.
///
/// Loaded from `~/.recall/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Number of exchange pairs kept per user.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Age in days after which long-term notes are pruned.
    #[serde(default = "default_note_ttl_days")]
    pub note_ttl_days: i64,

    /// File name of the store inside the data directory.
    #[serde(default = "default_memory_file")]
    pub memory_file: String,

    /// Quiet window used to coalesce bursts of mutations into one save.
    #[serde(default = "default_flush_debounce_ms")]
    pub flush_debounce_ms: u64,

    /// How long shutdown waits for in-flight extractions before the final flush.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Upper bound on a single extraction call.
    #[serde(default = "default_extraction_timeout_secs")]
    pub extraction_timeout_secs: u64,

    /// Model used for fact extraction.
    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,

    /// Base URL of the OpenAI-compatible completion endpoint.
    #[serde(default = "default_extraction_base_url")]
    pub extraction_base_url: String,

    /// Users allowed to run whole-store export and import.
    #[serde(default)]
    pub admin_user_ids: Vec<UserId>,
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

fn default_note_ttl_days() -> i64 {
    DEFAULT_NOTE_TTL_DAYS
}

fn default_memory_file() -> String {
    "user_memories.json".to_string()
}

fn default_flush_debounce_ms() -> u64 {
    500
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_extraction_timeout_secs() -> u64 {
    20
}

fn default_extraction_model() -> String {
    "gpt-4.1-nano".to_string()
}

fn default_extraction_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            note_ttl_days: default_note_ttl_days(),
            memory_file: default_memory_file(),
            flush_debounce_ms: default_flush_debounce_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            extraction_timeout_secs: default_extraction_timeout_secs(),
            extraction_model: default_extraction_model(),
            extraction_base_url: default_extraction_base_url(),
            admin_user_ids: Vec::new(),
        }
    }
}

impl MemoryConfig {
    pub fn is_admin(&self, user_id: &UserId) -> bool {
        self.admin_user_ids.contains(user_id)
    }
}
