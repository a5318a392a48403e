//! MemoryPersistence trait definition.
//!
//! The durable side of the store: one call to read the whole snapshot at
//! startup, one call to write it back. Implementations live in recall-infra
//! (e.g., `JsonFileStore`).

use recall_types::error::PersistenceError;
use recall_types::memory::StoreSnapshot;

/// Whole-store load/save.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait MemoryPersistence: Send + Sync + 'static {
    /// Read the stored snapshot. `Ok(None)` means nothing has been saved yet.
    fn load(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<StoreSnapshot>, PersistenceError>> + Send;

    /// Replace the stored snapshot. Must never leave a half-written store
    /// behind if it fails part way.
    fn save(
        &self,
        snapshot: &StoreSnapshot,
    ) -> impl std::future::Future<Output = Result<(), PersistenceError>> + Send;
}
