//! Manager configuration

use axm_policy::{TagAllowlist, TagRule};
use axm_types::ValidationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of the run orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Expected maximum gap between runner events
    pub heartbeat_interval_ms: u64,
    /// Silence of `interval * factor` fails the run
    pub heartbeat_grace_factor: u32,
    /// Bounded wait for a runner to acknowledge cancellation
    pub cancel_ack_timeout_ms: u64,
    /// Capacity of the inbound runner event channel
    pub event_channel_capacity: usize,
    /// Page size used when replaying events from the repository
    pub replay_page_size: usize,
    /// Bound for queued scope acquisition
    pub scope_queue_timeout_ms: u64,
    /// Investigation-tag rules; empty uses the default rule
    pub investigation_tags: Vec<TagRule>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            heartbeat_grace_factor: 3,
            cancel_ack_timeout_ms: 10_000,
            event_channel_capacity: 256,
            replay_page_size: 200,
            scope_queue_timeout_ms: 60_000,
            investigation_tags: Vec::new(),
        }
    }
}

impl ManagerConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(raw: &str) -> Result<Self, ValidationError> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| ValidationError::new("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and compile the allowlist
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.heartbeat_interval_ms == 0 {
            return Err(ValidationError::new("heartbeat_interval_ms", "must be positive"));
        }
        if self.heartbeat_grace_factor == 0 {
            return Err(ValidationError::new("heartbeat_grace_factor", "must be at least 1"));
        }
        if self.event_channel_capacity == 0 {
            return Err(ValidationError::new(
                "event_channel_capacity",
                "must be positive",
            )
            .with_hint("the runner channel is bounded; zero would never accept an event"));
        }
        if self.replay_page_size == 0 {
            return Err(ValidationError::new("replay_page_size", "must be positive"));
        }
        self.allowlist().map(|_| ())
    }

    /// Compiled investigation-tag allowlist
    pub fn allowlist(&self) -> Result<TagAllowlist, ValidationError> {
        TagAllowlist::new(&self.investigation_tags)
    }

    /// Silence after which a run fails
    #[must_use]
    pub fn heartbeat_limit(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
            .saturating_mul(self.heartbeat_grace_factor)
    }

    /// Cancel acknowledgement bound
    #[inline]
    #[must_use]
    pub fn cancel_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_ack_timeout_ms)
    }

    /// Queued scope acquisition bound
    #[inline]
    #[must_use]
    pub fn scope_queue_timeout(&self) -> Duration {
        Duration::from_millis(self.scope_queue_timeout_ms)
    }

    /// With heartbeat interval and grace factor
    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self, interval: Duration, grace_factor: u32) -> Self {
        self.heartbeat_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.heartbeat_grace_factor = grace_factor;
        self
    }

    /// With cancel acknowledgement timeout
    #[inline]
    #[must_use]
    pub fn with_cancel_ack_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_ack_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With event channel capacity
    #[inline]
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// With replay page size
    #[inline]
    #[must_use]
    pub fn with_replay_page_size(mut self, size: usize) -> Self {
        self.replay_page_size = size;
        self
    }

    /// With scope queue timeout
    #[inline]
    #[must_use]
    pub fn with_scope_queue_timeout(mut self, timeout: Duration) -> Self {
        self.scope_queue_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With investigation-tag rules
    #[inline]
    #[must_use]
    pub fn with_investigation_tags(mut self, rules: Vec<TagRule>) -> Self {
        self.investigation_tags = rules;
        self
    }
}
