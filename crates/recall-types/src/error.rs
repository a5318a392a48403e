use thiserror::Error;

use crate::memory::UserId;

/// Errors surfaced by memory operations.
///
/// Only `NotFound`, `InvalidFormat` and `Forbidden` ever reach a
/// conversational caller. Persistence and extraction failures are logged and
/// absorbed by the service; the variants exist so lower layers can report them.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("no memory stored for user {0}")]
    NotFound(UserId),

    #[error("invalid memory document: {0}")]
    InvalidFormat(String),

    #[error("user {0} is not allowed to run bulk memory operations")]
    Forbidden(UserId),

    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] PersistenceError),

    #[error("extraction failure: {0}")]
    ExtractionFailure(String),
}

/// Errors from the durable store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt memory file '{path}': {reason}")]
    Corrupt { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = MemoryError::NotFound(UserId::from("42"));
        assert_eq!(err.to_string(), "no memory stored for user 42");
    }

    #[test]
    fn test_persistence_error_wraps_into_memory_error() {
        let err: MemoryError = PersistenceError::Corrupt {
            path: "user_memories.json".to_string(),
            reason: "expected value at line 1".to_string(),
        }
        .into();
        assert!(matches!(err, MemoryError::PersistenceFailure(_)));
        assert!(err.to_string().contains("user_memories.json"));
    }

    #[test]
    fn test_invalid_format_display() {
        let err = MemoryError::InvalidFormat("missing field `rollingHistory`".to_string());
        assert_eq!(
            err.to_string(),
            "invalid memory document: missing field `rollingHistory`"
        );
    }
}
