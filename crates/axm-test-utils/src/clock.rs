//! Deterministic time and identifiers

use axm_core::{Clock, IdSource};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;
use uuid::Uuid;

/// Wall clock following tokio time
///
/// Under `start_paused` tests wall timestamps advance exactly as far as
/// virtual time does.
#[derive(Debug, Clone)]
pub struct PausedClock {
    base: DateTime<Utc>,
    origin: Instant,
}

impl PausedClock {
    /// Starts at 2025-01-01T00:00:00Z
    pub fn new() -> Self {
        Self {
            base: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            origin: Instant::now(),
        }
    }
}

impl Default for PausedClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for PausedClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.base + elapsed
    }
}

/// Identifiers 1, 2, 3, ... as UUIDs
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers handed out so far
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl IdSource for SequentialIds {
    fn new_id(&self) -> Uuid {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Uuid::from_u128(u128::from(n))
    }
}
