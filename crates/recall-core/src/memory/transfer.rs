//! Export documents and validated import.
//!
//! Import is a two-step affair: the JSON text is deserialized into a raw,
//! loosely-typed document, then checked for bounds (history length, note
//! timestamps, empty notes). Only a document that passes every check is
//! turned into a `UserRecord`; nothing touches the store before that, so a
//! rejected document never leaves a partial change behind.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use recall_types::error::MemoryError;
use recall_types::memory::{
    Exchange, Note, StoreExport, StoreSnapshot, UserExport, UserId, UserRecord,
};

/// A single-user document as it arrives from outside, before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUserDocument {
    #[serde(default)]
    user_id: Option<UserId>,
    #[serde(default)]
    username: Option<String>,
    rolling_history: Vec<Exchange>,
    long_term_notes: Vec<Note>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// A whole-store document as it arrives from outside, before validation.
///
/// Users are kept as raw JSON so each one can be validated (and reported)
/// individually.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStoreDocument {
    users: BTreeMap<UserId, serde_json::Value>,
}

/// Build the export document for one user.
pub fn export_user(user_id: &UserId, record: &UserRecord, now: DateTime<Utc>) -> UserExport {
    UserExport {
        user_id: user_id.clone(),
        username: record.username.clone(),
        rolling_history: record.rolling_history.iter().cloned().collect(),
        long_term_notes: record.long_term_notes.clone(),
        created_at: record.created_at,
        updated_at: Some(record.updated_at),
        exported_at: now,
    }
}

/// Build the admin export document. Empty records are left out.
pub fn export_store(snapshot: &StoreSnapshot, now: DateTime<Utc>) -> StoreExport {
    let users = snapshot
        .iter()
        .filter(|(_, record)| !record.is_empty())
        .map(|(user_id, record)| (user_id.clone(), export_user(user_id, record, now)))
        .collect();
    StoreExport {
        exported_at: now,
        users,
    }
}

/// Parse and validate a single-user document.
pub fn parse_user_document(
    json: &str,
    history_limit: usize,
    now: DateTime<Utc>,
) -> Result<UserRecord, MemoryError> {
    let raw: RawUserDocument =
        serde_json::from_str(json).map_err(|e| MemoryError::InvalidFormat(e.to_string()))?;
    validate(raw, history_limit, now).map_err(MemoryError::InvalidFormat)
}

/// Parse and validate a whole-store document.
///
/// Every user is validated before anything is returned; the first failure
/// rejects the whole document.
pub fn parse_store_document(
    json: &str,
    history_limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<(UserId, UserRecord)>, MemoryError> {
    let raw: RawStoreDocument =
        serde_json::from_str(json).map_err(|e| MemoryError::InvalidFormat(e.to_string()))?;

    let mut records = Vec::with_capacity(raw.users.len());
    for (user_id, value) in raw.users {
        let doc: RawUserDocument = serde_json::from_value(value)
            .map_err(|e| MemoryError::InvalidFormat(format!("user {user_id}: {e}")))?;
        if let Some(inner_id) = doc.user_id.as_ref().filter(|inner| **inner != user_id) {
            debug!(%user_id, %inner_id, "Document userId differs from its key; using the key");
        }
        let record = validate(doc, history_limit, now)
            .map_err(|reason| MemoryError::InvalidFormat(format!("user {user_id}: {reason}")))?;
        records.push((user_id, record));
    }
    Ok(records)
}

fn validate(
    raw: RawUserDocument,
    history_limit: usize,
    now: DateTime<Utc>,
) -> Result<UserRecord, String> {
    if raw.rolling_history.len() > history_limit {
        return Err(format!(
            "rollingHistory holds {} exchanges, the limit is {history_limit}",
            raw.rolling_history.len()
        ));
    }
    if raw.created_at > now {
        return Err(format!("createdAt {} is in the future", raw.created_at));
    }

    let mut notes: Vec<Note> = Vec::with_capacity(raw.long_term_notes.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (index, note) in raw.long_term_notes.into_iter().enumerate() {
        if note.text.trim().is_empty() {
            return Err(format!("longTermNotes[{index}] has empty text"));
        }
        if note.created_at > now {
            return Err(format!(
                "longTermNotes[{index}] createdAt {} is in the future",
                note.created_at
            ));
        }
        // Duplicate texts collapse to the earliest entry.
        match positions.get(&note.text) {
            Some(&pos) => {
                if note.created_at < notes[pos].created_at {
                    notes[pos].created_at = note.created_at;
                }
            }
            None => {
                positions.insert(note.text.clone(), notes.len());
                notes.push(note);
            }
        }
    }

    Ok(UserRecord {
        username: raw.username,
        rolling_history: raw.rolling_history.into_iter().collect(),
        long_term_notes: notes,
        created_at: raw.created_at,
        updated_at: raw.updated_at.unwrap_or(now),
    })
}
