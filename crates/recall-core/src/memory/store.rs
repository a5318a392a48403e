//! In-memory record store keyed by user id.
//!
//! `RecordStore` owns every mutation and query on user records. Records live
//! in a `DashMap`; each per-user operation runs inside a single entry guard,
//! so concurrent appends and merges for one user are applied one after the
//! other while different users proceed independently. No guard is ever held
//! across an `.await` (this type has no async methods at all).
//!
//! Every live record carries a runtime generation number. It changes whenever
//! the record is created, re-created after `forget`, or replaced by an import,
//! and is how late extraction results for a stale record get discarded.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::warn;

use recall_types::llm::Message;
use recall_types::memory::{
    ConversationContext, DEFAULT_HISTORY_LIMIT, Exchange, MemorySummary, Note, StoreSnapshot,
    UserId, UserRecord,
};

use super::prune::RetentionPolicy;

/// Header of the memory block injected into a chat prompt.
const MEMORY_BLOCK_HEADER: &str = "[Memory about this user]";

struct Slot {
    generation: u64,
    record: UserRecord,
}

/// Result of appending an exchange, used to schedule extraction.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    /// Generation of the record the exchange was appended to.
    pub generation: u64,
    /// Note texts known before this exchange (after pruning).
    pub existing_notes: Vec<String>,
    /// Whether the record was created by this append.
    pub created: bool,
}

/// Concurrent map from user id to memory record.
pub struct RecordStore {
    records: DashMap<UserId, Slot>,
    next_generation: AtomicU64,
    history_limit: usize,
    retention: RetentionPolicy,
}

impl RecordStore {
    pub fn new(history_limit: usize, retention: RetentionPolicy) -> Self {
        Self {
            records: DashMap::new(),
            next_generation: AtomicU64::new(1),
            history_limit: history_limit.max(1),
            retention,
        }
    }

    /// Build a store from a loaded snapshot.
    ///
    /// Every record is pruned once and its history trimmed to the current
    /// limit. Timestamps later than `now` are clamped to `now`. Returns the
    /// store and the number of notes pruned.
    pub fn from_snapshot(
        snapshot: StoreSnapshot,
        history_limit: usize,
        retention: RetentionPolicy,
        now: DateTime<Utc>,
    ) -> (Self, usize) {
        let store = Self::new(history_limit, retention);
        let mut pruned = 0;
        for (user_id, mut record) in snapshot {
            let clamped = clamp_future_timestamps(&mut record, now);
            if clamped > 0 {
                warn!(%user_id, clamped, "Stored memory had timestamps in the future; clamped to now");
            }
            pruned += store.retention.prune(&mut record, now);
            trim_history(&mut record, store.history_limit);
            let generation = store.bump_generation();
            store.records.insert(user_id, Slot { generation, record });
        }
        (store, pruned)
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        self.records.contains_key(user_id)
    }

    /// Current generation of a user's record, if it exists.
    pub fn generation(&self, user_id: &UserId) -> Option<u64> {
        self.records.get(user_id).map(|slot| slot.generation)
    }

    fn bump_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    fn fresh_slot(&self, now: DateTime<Utc>) -> Slot {
        Slot {
            generation: self.bump_generation(),
            record: UserRecord::empty(now),
        }
    }

    /// Return the user's record, creating an empty one if needed.
    pub fn get_or_create(&self, user_id: &UserId, now: DateTime<Utc>) -> UserRecord {
        let mut slot = self
            .records
            .entry(user_id.clone())
            .or_insert_with(|| self.fresh_slot(now));
        self.retention.prune(&mut slot.record, now);
        slot.record.clone()
    }

    /// Append an exchange to the user's rolling history, evicting the oldest
    /// pairs past the limit.
    pub fn append_exchange(
        &self,
        user_id: &UserId,
        exchange: Exchange,
        username: Option<&str>,
        now: DateTime<Utc>,
    ) -> AppendOutcome {
        let mut created = false;
        let mut slot = self.records.entry(user_id.clone()).or_insert_with(|| {
            created = true;
            self.fresh_slot(now)
        });

        let record = &mut slot.record;
        self.retention.prune(record, now);
        if let Some(name) = username.filter(|n| !n.is_empty()) {
            record.username = Some(name.to_string());
        }
        record.rolling_history.push_back(exchange);
        trim_history(record, self.history_limit);
        record.updated_at = now;

        AppendOutcome {
            generation: slot.generation,
            existing_notes: note_texts(&slot.record),
            created,
        }
    }

    /// Merge facts into the user's long-term notes, creating the record if
    /// needed. Returns how many facts were actually added.
    pub fn merge_facts(&self, user_id: &UserId, facts: &[String], now: DateTime<Utc>) -> usize {
        let mut slot = self
            .records
            .entry(user_id.clone())
            .or_insert_with(|| self.fresh_slot(now));
        self.merge_into(&mut slot.record, facts, now)
    }

    /// Merge facts only if the user's record still has `generation`.
    ///
    /// Returns `None` (and changes nothing) when the record was forgotten or
    /// replaced since the generation was observed.
    pub fn merge_facts_if_current(
        &self,
        user_id: &UserId,
        generation: u64,
        facts: &[String],
        now: DateTime<Utc>,
    ) -> Option<usize> {
        let mut slot = self.records.get_mut(user_id)?;
        if slot.generation != generation {
            return None;
        }
        Some(self.merge_into(&mut slot.record, facts, now))
    }

    fn merge_into(&self, record: &mut UserRecord, facts: &[String], now: DateTime<Utc>) -> usize {
        self.retention.prune(record, now);
        let mut added = 0;
        for fact in facts {
            if fact.is_empty() || record.has_note(fact) {
                continue;
            }
            record.long_term_notes.push(Note::new(fact.clone(), now));
            added += 1;
        }
        if added > 0 {
            record.updated_at = now;
        }
        added
    }

    /// Delete the user's record. Returns whether one existed.
    pub fn forget(&self, user_id: &UserId) -> bool {
        self.records.remove(user_id).is_some()
    }

    /// Pruned copy of the user's record, if it exists.
    pub fn record(&self, user_id: &UserId, now: DateTime<Utc>) -> Option<UserRecord> {
        let mut slot = self.records.get_mut(user_id)?;
        self.retention.prune(&mut slot.record, now);
        Some(slot.record.clone())
    }

    /// Read-only projection for user-facing display.
    pub fn summarize(&self, user_id: &UserId, now: DateTime<Utc>) -> Option<MemorySummary> {
        let record = self.record(user_id, now)?;
        Some(MemorySummary {
            user_id: user_id.clone(),
            username: record.username,
            history_count: record.rolling_history.len(),
            notes: record.long_term_notes,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Prompt context for the user's next completion request.
    ///
    /// Unknown users get an empty context; no record is created.
    pub fn context(&self, user_id: &UserId, now: DateTime<Utc>) -> ConversationContext {
        let Some(record) = self.record(user_id, now) else {
            return ConversationContext {
                memory_block: String::new(),
                recent: Vec::new(),
            };
        };

        let memory_block = if record.long_term_notes.is_empty() {
            String::new()
        } else {
            let mut block = MEMORY_BLOCK_HEADER.to_string();
            for note in &record.long_term_notes {
                block.push_str("\n- ");
                block.push_str(&note.text);
            }
            block
        };

        let recent = record
            .rolling_history
            .into_iter()
            .flat_map(|ex| [Message::user(ex.prompt), Message::assistant(ex.response)])
            .collect();

        ConversationContext {
            memory_block,
            recent,
        }
    }

    /// Fully replace the user's record (import). The record gets a new
    /// generation, is pruned, and its history is trimmed to the limit.
    pub fn replace(&self, user_id: &UserId, mut record: UserRecord, now: DateTime<Utc>) {
        self.retention.prune(&mut record, now);
        trim_history(&mut record, self.history_limit);
        let generation = self.bump_generation();
        self.records
            .insert(user_id.clone(), Slot { generation, record });
    }

    /// Prune every record. Returns the total number of notes removed.
    pub fn prune_all(&self, now: DateTime<Utc>) -> usize {
        self.records
            .iter_mut()
            .map(|mut slot| self.retention.prune(&mut slot.record, now))
            .sum()
    }

    /// Pruned copy of every record, ordered by user id.
    pub fn snapshot(&self, now: DateTime<Utc>) -> StoreSnapshot {
        self.records
            .iter_mut()
            .map(|mut entry| {
                self.retention.prune(&mut entry.record, now);
                (entry.key().clone(), entry.record.clone())
            })
            .collect()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT, RetentionPolicy::default())
    }
}

fn trim_history(record: &mut UserRecord, limit: usize) {
    while record.rolling_history.len() > limit {
        record.rolling_history.pop_front();
    }
}

fn clamp_future_timestamps(record: &mut UserRecord, now: DateTime<Utc>) -> usize {
    let mut clamped = 0;
    let stamps = record
        .long_term_notes
        .iter_mut()
        .map(|note| &mut note.created_at)
        .chain([&mut record.created_at, &mut record.updated_at]);
    for stamp in stamps {
        if *stamp > now {
            *stamp = now;
            clamped += 1;
        }
    }
    clamped
}

fn note_texts(record: &UserRecord) -> Vec<String> {
    record
        .long_term_notes
        .iter()
        .map(|n| n.text.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 8, 30, 0).unwrap()
    }

    fn user(id: &str) -> UserId {
        UserId::from(id)
    }

    fn facts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_get_or_create_creates_empty_record() {
        let store = RecordStore::default();
        let record = store.get_or_create(&user("a"), now());
        assert!(record.is_empty());
        assert_eq!(record.created_at, now());
        assert_eq!(store.len(), 1);

        // Second call returns the same record rather than a new one.
        let again = store.get_or_create(&user("a"), now() + Duration::hours(1));
        assert_eq!(again.created_at, now());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_twelve_exchanges_keep_last_ten() {
        let store = RecordStore::default();
        let id = user("A");
        for i in 1..=12 {
            store.append_exchange(
                &id,
                Exchange::new(format!("prompt {i}"), format!("response {i}")),
                None,
                now(),
            );
        }

        let summary = store.summarize(&id, now()).unwrap();
        assert_eq!(summary.history_count, 10);

        let record = store.record(&id, now()).unwrap();
        let prompts: Vec<_> = record.rolling_history.iter().map(|e| e.prompt.clone()).collect();
        let expected: Vec<_> = (3..=12).map(|i| format!("prompt {i}")).collect();
        assert_eq!(prompts, expected);
    }

    #[test]
    fn test_history_never_exceeds_limit() {
        let store = RecordStore::new(3, RetentionPolicy::default());
        let id = user("small");
        for i in 0..50 {
            store.append_exchange(&id, Exchange::new(i.to_string(), "ok"), None, now());
            assert!(store.record(&id, now()).unwrap().rolling_history.len() <= 3);
        }
    }

    #[test]
    fn test_append_updates_timestamps_and_username() {
        let store = RecordStore::default();
        let id = user("u");
        let first = store.append_exchange(&id, Exchange::new("hi", "meow"), Some("mochi"), now());
        assert!(first.created);

        let later = now() + Duration::minutes(5);
        let second = store.append_exchange(&id, Exchange::new("again", "purr"), None, later);
        assert!(!second.created);
        assert_eq!(first.generation, second.generation);

        let record = store.record(&id, later).unwrap();
        assert_eq!(record.created_at, now());
        assert_eq!(record.updated_at, later);
        assert_eq!(record.username.as_deref(), Some("mochi"));
    }

    #[test]
    fn test_merge_facts_is_idempotent() {
        let store = RecordStore::default();
        let id = user("m");
        assert_eq!(store.merge_facts(&id, &facts(&["Owns two cats"]), now()), 1);
        assert_eq!(store.merge_facts(&id, &facts(&["Owns two cats"]), now()), 0);

        let record = store.record(&id, now()).unwrap();
        assert_eq!(record.long_term_notes.len(), 1);
    }

    #[test]
    fn test_merge_facts_is_case_sensitive_and_skips_empty() {
        let store = RecordStore::default();
        let id = user("m");
        let added = store.merge_facts(
            &id,
            &facts(&["likes tuna", "Likes tuna", "", "likes tuna"]),
            now(),
        );
        assert_eq!(added, 2);
    }

    #[test]
    fn test_thirty_one_day_old_fact_is_pruned_on_read() {
        let store = RecordStore::default();
        let id = user("B");
        let old = now() - Duration::days(31);
        let yesterday = now() - Duration::days(1);
        store.merge_facts(&id, &facts(&["Was moving house"]), old);
        store.merge_facts(&id, &facts(&["Started a new job"]), yesterday);

        let summary = store.summarize(&id, now()).unwrap();
        let texts: Vec<_> = summary.notes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["Started a new job"]);
    }

    #[test]
    fn test_forget_is_idempotent() {
        let store = RecordStore::default();
        assert!(!store.forget(&user("C")));
        assert!(store.is_empty());

        store.get_or_create(&user("C"), now());
        assert!(store.forget(&user("C")));
        assert!(!store.forget(&user("C")));
        assert!(store.summarize(&user("C"), now()).is_none());
    }

    #[test]
    fn test_merge_if_current_discards_after_forget() {
        let store = RecordStore::default();
        let id = user("late");
        let outcome = store.append_exchange(&id, Exchange::new("hi", "hello"), None, now());
        store.forget(&id);

        let applied =
            store.merge_facts_if_current(&id, outcome.generation, &facts(&["Name is Ana"]), now());
        assert!(applied.is_none());
        assert!(!store.contains(&id));

        // A re-created record has a new generation, so the stale job still loses.
        store.append_exchange(&id, Exchange::new("back", "welcome"), None, now());
        let applied =
            store.merge_facts_if_current(&id, outcome.generation, &facts(&["Name is Ana"]), now());
        assert!(applied.is_none());
        assert!(store.record(&id, now()).unwrap().long_term_notes.is_empty());
    }

    #[test]
    fn test_merge_if_current_applies_for_live_record() {
        let store = RecordStore::default();
        let id = user("live");
        let outcome = store.append_exchange(&id, Exchange::new("hi", "hello"), None, now());
        let applied =
            store.merge_facts_if_current(&id, outcome.generation, &facts(&["Name is Ana"]), now());
        assert_eq!(applied, Some(1));
    }

    #[test]
    fn test_replace_bumps_generation() {
        let store = RecordStore::default();
        let id = user("r");
        store.get_or_create(&id, now());
        let before = store.generation(&id).unwrap();
        store.replace(&id, UserRecord::empty(now()), now());
        assert_ne!(store.generation(&id).unwrap(), before);
    }

    #[test]
    fn test_context_formats_notes_and_history() {
        let store = RecordStore::default();
        let id = user("ctx");
        store.append_exchange(&id, Exchange::new("what's up", "napping"), None, now());
        store.merge_facts(&id, &facts(&["Prefers short answers"]), now());

        let context = store.context(&id, now());
        assert_eq!(
            context.memory_block,
            "[Memory about this user]\n- Prefers short answers"
        );
        assert_eq!(context.recent.len(), 2);
        assert_eq!(context.recent[0], Message::user("what's up"));
        assert_eq!(context.recent[1], Message::assistant("napping"));
    }

    #[test]
    fn test_context_for_unknown_user_is_empty_and_creates_nothing() {
        let store = RecordStore::default();
        let context = store.context(&user("nobody"), now());
        assert!(context.memory_block.is_empty());
        assert!(context.recent.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_from_snapshot_prunes_and_trims() {
        let mut record = UserRecord::empty(now() - Duration::days(90));
        record
            .long_term_notes
            .push(Note::new("stale", now() - Duration::days(40)));
        record.long_term_notes.push(Note::new("fresh", now()));
        for i in 0..15 {
            record
                .rolling_history
                .push_back(Exchange::new(i.to_string(), "r"));
        }
        let mut snapshot = StoreSnapshot::new();
        snapshot.insert(user("s"), record);

        let (store, pruned) =
            RecordStore::from_snapshot(snapshot, 10, RetentionPolicy::default(), now());
        assert_eq!(pruned, 1);
        let loaded = store.record(&user("s"), now()).unwrap();
        assert_eq!(loaded.long_term_notes.len(), 1);
        assert_eq!(loaded.rolling_history.len(), 10);
        assert_eq!(loaded.rolling_history.front().unwrap().prompt, "5");
    }

    #[test]
    fn test_from_snapshot_clamps_future_timestamps() {
        let later = now() + Duration::days(3);
        let mut record = UserRecord::empty(later);
        record.long_term_notes.push(Note::new("from the future", later));
        record.long_term_notes.push(Note::new("from today", now()));
        let mut snapshot = StoreSnapshot::new();
        snapshot.insert(user("t"), record);

        let (store, pruned) =
            RecordStore::from_snapshot(snapshot, 10, RetentionPolicy::default(), now());
        assert_eq!(pruned, 0);
        let loaded = store.record(&user("t"), now()).unwrap();
        assert_eq!(loaded.created_at, now());
        assert_eq!(loaded.updated_at, now());
        assert!(loaded.long_term_notes.iter().all(|n| n.created_at == now()));
        assert_eq!(loaded.long_term_notes.len(), 2);
    }

    #[test]
    fn test_snapshot_is_pruned_and_sorted() {
        let store = RecordStore::default();
        store.merge_facts(&user("b"), &facts(&["old"]), now() - Duration::days(35));
        store.get_or_create(&user("a"), now());

        let snapshot = store.snapshot(now());
        let keys: Vec<_> = snapshot.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(snapshot[&user("b")].long_term_notes.is_empty());
    }

    #[test]
    fn test_prune_all_counts_removed_notes() {
        let store = RecordStore::default();
        store.merge_facts(&user("x"), &facts(&["one", "two"]), now() - Duration::days(31));
        store.merge_facts(&user("y"), &facts(&["four"]), now());
        store.merge_facts(&user("y"), &facts(&["three"]), now() - Duration::days(31));

        assert_eq!(store.prune_all(now()), 3);
        assert_eq!(store.prune_all(now()), 0);
        // Empty shells are retained.
        assert!(store.contains(&user("x")));
    }
}
