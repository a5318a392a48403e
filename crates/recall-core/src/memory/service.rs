//! Memory service: the explicitly constructed entry point of the subsystem.
//!
//! `MemoryService` owns the record store, the persistence backend and the
//! extraction bridge. `open` loads and prunes the stored snapshot and starts
//! the debounced flusher; `shutdown` drains in-flight extraction jobs and
//! performs a final flush.
//!
//! Per-user operations take the store gate shared and then work inside one
//! `DashMap` entry guard. Whole-store operations (`import_all`, snapshots
//! for saving) take the gate exclusively or shared so a bulk replace is
//! never observed half-applied.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use recall_types::config::MemoryConfig;
use recall_types::error::{MemoryError, PersistenceError};
use recall_types::memory::{
    ConversationContext, DEFAULT_NOTE_TTL_DAYS, Exchange, MemorySummary, StoreExport,
    StoreSnapshot, UserExport, UserId, UserRecord,
};

use super::extractor::{ExtractionBridge, FactExtractor};
use super::persistence::MemoryPersistence;
use super::prune::RetentionPolicy;
use super::store::RecordStore;
use super::transfer;

struct Inner<P: MemoryPersistence, E: FactExtractor> {
    store: RecordStore,
    gate: RwLock<()>,
    persistence: P,
    bridge: ExtractionBridge<E>,
    config: MemoryConfig,
    dirty: AtomicBool,
    notify: Notify,
    save_lock: Mutex<()>,
}

/// Per-user conversational memory with background extraction and
/// debounced persistence.
///
/// Generic over `MemoryPersistence` and `FactExtractor` so recall-core never
/// depends on recall-infra.
pub struct MemoryService<P: MemoryPersistence, E: FactExtractor> {
    inner: Arc<Inner<P, E>>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl<P: MemoryPersistence, E: FactExtractor> MemoryService<P, E> {
    /// Load the stored snapshot, prune it and start the flusher.
    ///
    /// Never fails: a missing store starts empty, and a store that cannot be
    /// read is logged and replaced by an empty one.
    pub async fn open(persistence: P, extractor: E, mut config: MemoryConfig) -> Self {
        let retention = match RetentionPolicy::try_days(config.note_ttl_days) {
            Some(retention) => retention,
            None => {
                warn!(
                    note_ttl_days = config.note_ttl_days,
                    default = DEFAULT_NOTE_TTL_DAYS,
                    "Unusable note_ttl_days in config; using the default"
                );
                config.note_ttl_days = DEFAULT_NOTE_TTL_DAYS;
                RetentionPolicy::default()
            }
        };

        let now = Utc::now();
        let snapshot = match persistence.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!("No stored memories yet; starting with an empty store");
                StoreSnapshot::new()
            }
            Err(e) => {
                error!(operation = "load", error = %e, "Failed to load memory store; starting with an empty store");
                StoreSnapshot::new()
            }
        };

        let (store, pruned) = RecordStore::from_snapshot(
            snapshot,
            config.history_limit,
            retention,
            now,
        );
        info!(users = store.len(), pruned, "Memory store loaded");

        let bridge = ExtractionBridge::new(
            extractor,
            Duration::from_secs(config.extraction_timeout_secs),
        );
        if !bridge.is_enabled() {
            info!("Fact extraction disabled: no completion backend configured");
        }

        let inner = Arc::new(Inner {
            store,
            gate: RwLock::new(()),
            persistence,
            bridge,
            config,
            dirty: AtomicBool::new(false),
            notify: Notify::new(),
            save_lock: Mutex::new(()),
        });
        if pruned > 0 {
            inner.mark_dirty();
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_flusher(Arc::clone(&inner), cancel.clone()));

        Self {
            inner,
            tracker: TaskTracker::new(),
            cancel,
            flusher: Mutex::new(Some(handle)),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.inner.config
    }

    /// Number of users with a live record.
    pub fn user_count(&self) -> usize {
        self.inner.store.len()
    }

    // --- Per-user operations ---

    /// Record a finished exchange and schedule background fact extraction.
    ///
    /// Returns as soon as the exchange is in the rolling history; extraction
    /// never delays the caller.
    pub async fn record_exchange(
        &self,
        user_id: &UserId,
        exchange: Exchange,
        username: Option<&str>,
    ) {
        let outcome = {
            let _gate = self.inner.gate.read().await;
            self.inner
                .store
                .append_exchange(user_id, exchange.clone(), username, Utc::now())
        };
        self.inner.mark_dirty();
        debug!(%user_id, created = outcome.created, "Recorded exchange");

        if !self.inner.bridge.is_enabled() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let user_id = user_id.clone();
        self.tracker.spawn(async move {
            inner
                .apply_extraction(user_id, outcome.generation, exchange, outcome.existing_notes)
                .await;
        });
    }

    /// Merge facts into the user's notes. Returns how many were added.
    pub async fn merge_facts(&self, user_id: &UserId, facts: &[String]) -> usize {
        let added = {
            let _gate = self.inner.gate.read().await;
            self.inner.store.merge_facts(user_id, facts, Utc::now())
        };
        if added > 0 {
            self.inner.mark_dirty();
        }
        added
    }

    /// The user's record, creating an empty one on first contact.
    pub async fn get_or_create(&self, user_id: &UserId) -> UserRecord {
        let _gate = self.inner.gate.read().await;
        let existed = self.inner.store.contains(user_id);
        let record = self.inner.store.get_or_create(user_id, Utc::now());
        if !existed {
            self.inner.mark_dirty();
        }
        record
    }

    /// Delete everything stored about the user. Idempotent.
    ///
    /// Extraction jobs still running for the deleted record are discarded
    /// when they finish.
    pub async fn forget(&self, user_id: &UserId) -> bool {
        let removed = {
            let _gate = self.inner.gate.read().await;
            self.inner.store.forget(user_id)
        };
        if removed {
            self.inner.mark_dirty();
            info!(%user_id, "Forgot user memory");
        } else {
            debug!(%user_id, "Forget on unknown user; nothing to do");
        }
        removed
    }

    pub async fn summary(&self, user_id: &UserId) -> Result<MemorySummary, MemoryError> {
        let _gate = self.inner.gate.read().await;
        self.inner
            .store
            .summarize(user_id, Utc::now())
            .ok_or_else(|| MemoryError::NotFound(user_id.clone()))
    }

    /// Memory block and recent messages for the user's next prompt.
    pub async fn context(&self, user_id: &UserId) -> ConversationContext {
        let _gate = self.inner.gate.read().await;
        self.inner.store.context(user_id, Utc::now())
    }

    // --- Import / export ---

    pub async fn export_user(&self, user_id: &UserId) -> Result<UserExport, MemoryError> {
        let now = Utc::now();
        let _gate = self.inner.gate.read().await;
        let record = self
            .inner
            .store
            .record(user_id, now)
            .ok_or_else(|| MemoryError::NotFound(user_id.clone()))?;
        Ok(transfer::export_user(user_id, &record, now))
    }

    /// Replace the user's record with the given JSON document.
    ///
    /// The document is fully validated first; an invalid one leaves the
    /// existing record untouched.
    pub async fn import_user(&self, user_id: &UserId, json: &str) -> Result<(), MemoryError> {
        let now = Utc::now();
        let record = transfer::parse_user_document(json, self.inner.store.history_limit(), now)
            .inspect_err(|e| {
                warn!(%user_id, operation = "import", error = %e, "Rejected memory import");
            })?;

        {
            let _gate = self.inner.gate.read().await;
            self.inner.store.replace(user_id, record, now);
        }
        self.inner.mark_dirty();
        info!(%user_id, "Imported user memory");
        Ok(())
    }

    /// Export every non-empty record. Admin only.
    pub async fn export_all(&self, caller: &UserId) -> Result<StoreExport, MemoryError> {
        self.require_admin(caller, "export_all")?;
        let now = Utc::now();
        let snapshot = {
            let _gate = self.inner.gate.read().await;
            self.inner.store.snapshot(now)
        };
        let export = transfer::export_store(&snapshot, now);
        info!(caller = %caller, users = export.users.len(), "Exported all memories");
        Ok(export)
    }

    /// Replace the records of every user in the document. Admin only.
    ///
    /// All users are validated before anything changes; the replacement
    /// itself happens under the exclusive gate. Users not named in the
    /// document are left alone. Returns how many users were imported.
    pub async fn import_all(&self, caller: &UserId, json: &str) -> Result<usize, MemoryError> {
        self.require_admin(caller, "import_all")?;
        let now = Utc::now();
        let records = transfer::parse_store_document(json, self.inner.store.history_limit(), now)
            .inspect_err(|e| {
                warn!(caller = %caller, operation = "import_all", error = %e, "Rejected bulk memory import");
            })?;

        let count = records.len();
        {
            let _gate = self.inner.gate.write().await;
            for (user_id, record) in records {
                self.inner.store.replace(&user_id, record, now);
            }
        }
        if count > 0 {
            self.inner.mark_dirty();
        }
        info!(caller = %caller, users = count, "Imported memories in bulk");
        Ok(count)
    }

    // --- Maintenance ---

    /// Prune every record now. Returns how many notes were removed.
    pub async fn prune_all(&self) -> usize {
        let removed = {
            let _gate = self.inner.gate.read().await;
            self.inner.store.prune_all(Utc::now())
        };
        if removed > 0 {
            self.inner.mark_dirty();
            info!(removed, "Pruned expired notes");
        }
        removed
    }

    /// Save immediately, bypassing the debounce window.
    pub async fn flush_now(&self) -> Result<(), MemoryError> {
        self.inner.dirty.store(false, Ordering::Release);
        self.inner.flush().await.map_err(|e| {
            self.inner.dirty.store(true, Ordering::Release);
            MemoryError::from(e)
        })
    }

    /// Wait for in-flight extractions, up to the configured grace period.
    ///
    /// Returns `false` if some jobs were still running when the grace period
    /// ran out. New exchanges can still be recorded afterwards.
    pub async fn drain_extractions(&self) -> bool {
        let drained = self.wait_for_extractions().await;
        self.tracker.reopen();
        drained
    }

    /// Wait for in-flight extractions (up to the configured grace period),
    /// stop the flusher and save any pending changes.
    pub async fn shutdown(&self) -> Result<(), MemoryError> {
        if !self.wait_for_extractions().await {
            warn!(
                pending = self.tracker.len(),
                "Extraction jobs still running at shutdown; their facts will not be saved"
            );
        }

        self.cancel.cancel();
        let handle = self.flusher.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Memory flusher task ended abnormally");
            }
        }

        if !self.inner.dirty.swap(false, Ordering::AcqRel) {
            debug!("No pending memory changes at shutdown");
            return Ok(());
        }
        match self.inner.flush().await {
            Ok(()) => {
                info!("Memory store flushed on shutdown");
                Ok(())
            }
            Err(e) => {
                error!(operation = "shutdown", error = %e, "Final memory flush failed");
                Err(e.into())
            }
        }
    }

    async fn wait_for_extractions(&self) -> bool {
        self.tracker.close();
        let grace = Duration::from_millis(self.inner.config.shutdown_grace_ms);
        tokio::time::timeout(grace, self.tracker.wait()).await.is_ok()
    }

    fn require_admin(&self, caller: &UserId, operation: &str) -> Result<(), MemoryError> {
        if self.inner.config.is_admin(caller) {
            Ok(())
        } else {
            warn!(caller = %caller, operation, "Rejected bulk operation from non-admin caller");
            Err(MemoryError::Forbidden(caller.clone()))
        }
    }
}

impl<P: MemoryPersistence, E: FactExtractor> Drop for MemoryService<P, E> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<P: MemoryPersistence, E: FactExtractor> Inner<P, E> {
    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    async fn flush(&self) -> Result<(), PersistenceError> {
        let _save = self.save_lock.lock().await;
        let snapshot = {
            let _gate = self.gate.read().await;
            self.store.snapshot(Utc::now())
        };
        self.persistence.save(&snapshot).await?;
        debug!(users = snapshot.len(), "Memory store saved");
        Ok(())
    }

    async fn flush_if_dirty(&self) {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.flush().await {
            // Retried on the next wake-up.
            self.dirty.store(true, Ordering::Release);
            warn!(operation = "save", error = %e, "Failed to save memory store; keeping in-memory state");
        }
    }

    async fn apply_extraction(
        &self,
        user_id: UserId,
        generation: u64,
        exchange: Exchange,
        existing_notes: Vec<String>,
    ) {
        let facts = self
            .bridge
            .extract(&user_id, &exchange, &existing_notes)
            .await;
        if facts.is_empty() {
            return;
        }

        let merged = {
            let _gate = self.gate.read().await;
            self.store
                .merge_facts_if_current(&user_id, generation, &facts, Utc::now())
        };
        match merged {
            Some(0) => {}
            Some(added) => {
                info!(%user_id, added, "Merged extracted facts into memory");
                self.mark_dirty();
            }
            None => {
                debug!(%user_id, generation, "Record forgotten or replaced during extraction; discarding facts");
            }
        }
    }
}

async fn run_flusher<P: MemoryPersistence, E: FactExtractor>(
    inner: Arc<Inner<P, E>>,
    cancel: CancellationToken,
) {
    let debounce = Duration::from_millis(inner.config.flush_debounce_ms);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = inner.notify.notified() => {}
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(debounce) => {}
        }
        inner.flush_if_dirty().await;
    }
    debug!("Memory flusher stopped");
}
