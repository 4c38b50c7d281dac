//! Per-run event sequencing
//!
//! A [`RunSequence`] hands out `1, 2, 3, …` and clamps timestamps so they
//! never go backwards, even if the clock does. Callers serialize access per
//! run; the type itself holds no lock.

use axm_types::RunEvent;
use chrono::{DateTime, Utc};

/// Sequence cursor for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSequence {
    last_sequence: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl RunSequence {
    /// Fresh cursor; the first event gets sequence 1
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume after the last persisted event
    #[must_use]
    pub fn resume(last: Option<&RunEvent>) -> Self {
        last.map_or_else(Self::new, |event| Self {
            last_sequence: event.sequence,
            last_timestamp: Some(event.timestamp),
        })
    }

    /// Sequence of the last issued event (0 when none)
    #[inline]
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Issue the next `(sequence, timestamp)` pair
    pub fn advance(&mut self, now: DateTime<Utc>) -> (u64, DateTime<Utc>) {
        let timestamp = match self.last_timestamp {
            Some(last) if now < last => last,
            _ => now,
        };
        self.last_sequence += 1;
        self.last_timestamp = Some(timestamp);
        (self.last_sequence, timestamp)
    }

    /// Undo the last `advance` (the append it was issued for failed)
    pub fn rollback(&mut self, previous: RunSequence) {
        *self = previous;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn sequence_starts_at_one() {
        let mut seq = RunSequence::new();
        let now = Utc::now();
        assert_eq!(seq.advance(now).0, 1);
        assert_eq!(seq.advance(now).0, 2);
        assert_eq!(seq.last_sequence(), 2);
    }

    #[test]
    fn timestamps_are_clamped() {
        let mut seq = RunSequence::new();
        let now = Utc::now();
        let (_, first) = seq.advance(now);
        let (_, second) = seq.advance(now - Duration::seconds(5));
        assert_eq!(second, first);
    }

    #[test]
    fn rollback_restores_cursor() {
        let mut seq = RunSequence::new();
        let now = Utc::now();
        seq.advance(now);
        let saved = seq;
        seq.advance(now);
        seq.rollback(saved);
        assert_eq!(seq.advance(now).0, 2);
    }
}
