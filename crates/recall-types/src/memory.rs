//! Memory types for Recall.
//!
//! These types model what the bot remembers about each user: a short rolling
//! window of recent exchanges and a set of long-term notes (extracted facts)
//! that survive across sessions until they age out.

use std::collections::{BTreeMap, VecDeque};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::Message;

/// Default number of exchange pairs kept in a user's rolling history.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Default age, in days, after which a long-term note is pruned.
pub const DEFAULT_NOTE_TTL_DAYS: i64 = 30;

/// Opaque, stable identifier of a chat user.
///
/// Chat transports hand out numeric ids, others use strings; both are kept
/// as text so the persisted file can use them directly as object keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// One prompt/response pair from a conversation.
///
/// Serialized as a two-element array `[prompt, response]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Exchange {
    pub prompt: String,
    pub response: String,
}

impl Exchange {
    pub fn new(prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response: response.into(),
        }
    }
}

impl From<(String, String)> for Exchange {
    fn from((prompt, response): (String, String)) -> Self {
        Self { prompt, response }
    }
}

impl From<Exchange> for (String, String) {
    fn from(exchange: Exchange) -> Self {
        (exchange.prompt, exchange.response)
    }
}

/// A long-term fact remembered about a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Note {
    pub fn new(text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            created_at,
        }
    }
}

/// Everything remembered about a single user.
///
/// The user id is not part of the record itself: it is the key under which
/// the record is stored (and persisted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Last display name the transport reported for this user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Most recent exchanges, oldest first.
    pub rolling_history: VecDeque<Exchange>,
    pub long_term_notes: Vec<Note>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// A fresh record with no history and no notes.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            username: None,
            rolling_history: VecDeque::new(),
            long_term_notes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the record holds neither history nor notes (an "empty shell").
    pub fn is_empty(&self) -> bool {
        self.rolling_history.is_empty() && self.long_term_notes.is_empty()
    }

    pub fn has_note(&self, text: &str) -> bool {
        self.long_term_notes.iter().any(|n| n.text == text)
    }
}

/// The whole store as it is written to disk: user id -> record.
pub type StoreSnapshot = BTreeMap<UserId, UserRecord>;

/// Read-only projection of a record for user-facing display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySummary {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub history_count: usize,
    pub notes: Vec<Note>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a chat transport injects into its next completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    /// `[Memory about this user]` block, or an empty string when there are no notes.
    pub memory_block: String,
    /// Rolling history flattened into alternating user/assistant messages.
    pub recent: Vec<Message>,
}

/// Transportable document for a single user's memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserExport {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub rolling_history: Vec<Exchange>,
    pub long_term_notes: Vec<Note>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub exported_at: DateTime<Utc>,
}

/// Transportable document for the whole store (admin export).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreExport {
    pub exported_at: DateTime<Utc>,
    pub users: BTreeMap<UserId, UserExport>,
}
