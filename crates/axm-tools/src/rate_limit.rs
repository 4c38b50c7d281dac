//! Per-tool call quotas backed by `governor`

use axm_types::CapacityExceeded;
use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as Gcra};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

struct Bucket {
    per_minute: NonZeroU32,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl Bucket {
    fn new(per_minute: NonZeroU32) -> Self {
        Self {
            per_minute,
            limiter: Arc::new(Gcra::direct(Quota::per_minute(per_minute))),
        }
    }
}

/// One quota per `scenario/tool` key
#[derive(Default)]
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("keys", &self.buckets.len())
            .finish()
    }
}

impl RateLimiter {
    /// Create empty limiter
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit one call under `limit` per minute; zero means unlimited
    ///
    /// A changed limit for a key starts a fresh quota.
    pub fn try_acquire(&self, key: &str, limit: u32) -> Result<(), CapacityExceeded> {
        let Some(per_minute) = NonZeroU32::new(limit) else {
            return Ok(());
        };
        let limiter = {
            let mut bucket = self
                .buckets
                .entry(key.to_string())
                .or_insert_with(|| Bucket::new(per_minute));
            if bucket.per_minute != per_minute {
                *bucket = Bucket::new(per_minute);
            }
            Arc::clone(&bucket.limiter)
        };
        limiter.check().map_err(|_| CapacityExceeded {
            resource: format!("tool {key} calls per minute"),
            current: u64::from(limit),
            maximum: u64::from(limit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_is_enforced_per_key() {
        let limiter = RateLimiter::new();
        assert!(limiter.try_acquire("notes/search", 2).is_ok());
        assert!(limiter.try_acquire("notes/search", 2).is_ok());

        let err = limiter.try_acquire("notes/search", 2).unwrap_err();
        assert_eq!(err.current, 2);
        assert_eq!(err.maximum, 2);
        assert!(err.resource.contains("notes/search"));

        assert!(limiter.try_acquire("notes/list", 2).is_ok());
    }

    #[test]
    fn zero_is_unlimited() {
        let limiter = RateLimiter::new();
        for _ in 0..1_000 {
            assert!(limiter.try_acquire("notes/search", 0).is_ok());
        }
    }

    #[test]
    fn changed_limit_starts_fresh_quota() {
        let limiter = RateLimiter::new();
        assert!(limiter.try_acquire("notes/search", 1).is_ok());
        assert!(limiter.try_acquire("notes/search", 1).is_err());
        assert!(limiter.try_acquire("notes/search", 3).is_ok());
    }
}
