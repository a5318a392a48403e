//! Age-based eviction of long-term notes.
//!
//! Pruning is a cheap, deterministic recomputation run right before a record
//! is read, mutated, or persisted, and once per record on load. There is no
//! background sweep. Rolling history is bounded by count elsewhere and is
//! never touched here.

use chrono::{DateTime, Duration, Utc};

use recall_types::memory::{DEFAULT_NOTE_TTL_DAYS, UserRecord};

/// How long a long-term note is kept after it was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    ttl: Duration,
}

impl RetentionPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Policy keeping notes for `days` days, or `None` when `days` is not
    /// positive or too large to represent.
    pub fn try_days(days: i64) -> Option<Self> {
        if days <= 0 {
            return None;
        }
        Duration::try_days(days).map(Self::new)
    }

    /// Like [`try_days`](Self::try_days), falling back to the default policy.
    pub fn days(days: i64) -> Self {
        Self::try_days(days).unwrap_or_default()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// A note is expired once strictly more than `ttl` has elapsed.
    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - created_at > self.ttl
    }

    /// Remove every expired note from `record`. Returns how many were removed.
    pub fn prune(&self, record: &mut UserRecord, now: DateTime<Utc>) -> usize {
        let before = record.long_term_notes.len();
        record
            .long_term_notes
            .retain(|note| !self.is_expired(note.created_at, now));
        before - record.long_term_notes.len()
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(Duration::days(DEFAULT_NOTE_TTL_DAYS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use recall_types::memory::{Exchange, Note};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_prune_drops_only_expired_notes() {
        let policy = RetentionPolicy::default();
        let mut record = UserRecord::empty(now() - Duration::days(60));
        record
            .long_term_notes
            .push(Note::new("Adopted a tabby", now() - Duration::days(31)));
        record
            .long_term_notes
            .push(Note::new("Lives in Lisbon", now() - Duration::days(1)));

        let removed = policy.prune(&mut record, now());

        assert_eq!(removed, 1);
        assert_eq!(record.long_term_notes.len(), 1);
        assert_eq!(record.long_term_notes[0].text, "Lives in Lisbon");
    }

    #[test]
    fn test_note_exactly_at_ttl_is_kept() {
        let policy = RetentionPolicy::days(30);
        assert!(!policy.is_expired(now() - Duration::days(30), now()));
        assert!(policy.is_expired(now() - Duration::days(30) - Duration::seconds(1), now()));
    }

    #[test]
    fn test_prune_never_touches_history() {
        let policy = RetentionPolicy::days(1);
        let mut record = UserRecord::empty(now() - Duration::days(400));
        record
            .rolling_history
            .push_back(Exchange::new("hello from last year", "meow"));

        assert_eq!(policy.prune(&mut record, now()), 0);
        assert_eq!(record.rolling_history.len(), 1);
    }

    #[test]
    fn test_prune_is_idempotent() {
        let policy = RetentionPolicy::default();
        let mut record = UserRecord::empty(now());
        record
            .long_term_notes
            .push(Note::new("old", now() - Duration::days(45)));

        assert_eq!(policy.prune(&mut record, now()), 1);
        assert_eq!(policy.prune(&mut record, now()), 0);
    }

    #[test]
    fn test_try_days_rejects_unusable_values() {
        assert!(RetentionPolicy::try_days(0).is_none());
        assert!(RetentionPolicy::try_days(-3).is_none());
        assert!(RetentionPolicy::try_days(i64::MAX).is_none());
        assert_eq!(
            RetentionPolicy::try_days(7).unwrap().ttl(),
            Duration::days(7)
        );
    }

    #[test]
    fn test_days_falls_back_to_default() {
        assert_eq!(RetentionPolicy::days(i64::MAX), RetentionPolicy::default());
        assert_eq!(RetentionPolicy::days(-1), RetentionPolicy::default());
        assert_eq!(
            RetentionPolicy::default().ttl(),
            Duration::days(DEFAULT_NOTE_TTL_DAYS)
        );
    }
}
