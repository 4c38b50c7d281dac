//! Error taxonomy for the agent execution manager
//!
//! Each failure kind is its own type so callers can match on structure:
//! - `NotFound` for missing entities
//! - `Validation` for inputs that fail a rule
//! - `State` for operations that are illegal in the current state
//! - `ScopeConflict` for denied scope locks
//! - `PolicyViolation` and `CapacityExceeded` for rule and quota breaches
//! - `Runner` and `Sandbox` for external capability failures, with the cause kept
//!
//! [`AxmError`] wraps them all at the component boundary.

use crate::ids::RunId;
use crate::profile::RunnerType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Boxed cause carried by runner and sandbox errors
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Canonical error message for a runner that went silent
pub const HEARTBEAT_TIMEOUT_MSG: &str = "runner heartbeat timeout";

/// Canonical error message for a run that exceeded its wall time
pub const WALL_TIMEOUT_MSG: &str = "timeout";

/// Result alias used across the workspace
pub type AxmResult<T> = Result<T, AxmError>;

/// Boundary error type
#[derive(Debug, thiserror::Error)]
pub enum AxmError {
    /// Entity does not exist
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// Input failed a rule
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Operation not legal for current state
    #[error(transparent)]
    State(#[from] StateError),

    /// Scope lock denied
    #[error(transparent)]
    ScopeConflict(#[from] ScopeConflictError),

    /// Allowlist or policy rule rejected the request
    #[error(transparent)]
    PolicyViolation(#[from] PolicyViolation),

    /// Quota or limit breach
    #[error(transparent)]
    CapacityExceeded(#[from] CapacityExceeded),

    /// Runner transport or subprocess failure
    #[error(transparent)]
    Runner(#[from] RunnerError),

    /// Sandbox provisioning or destruction failure
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// Repository failure
    #[error("storage error during {operation}: {message}")]
    Storage { operation: String, message: String },
}

impl AxmError {
    /// Create a storage error
    #[inline]
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Discriminant of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::State(_) => ErrorKind::State,
            Self::ScopeConflict(_) => ErrorKind::ScopeConflict,
            Self::PolicyViolation(_) => ErrorKind::PolicyViolation,
            Self::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            Self::Runner(_) => ErrorKind::Runner,
            Self::Sandbox(_) => ErrorKind::Sandbox,
            Self::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// Check if the failure may succeed when attempted again
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Runner(_)
                | Self::Sandbox(_)
                | Self::Storage { .. }
                | Self::CapacityExceeded(_)
                | Self::ScopeConflict(_)
        )
    }
}

/// Error kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    State,
    ScopeConflict,
    PolicyViolation,
    CapacityExceeded,
    Runner,
    Sandbox,
    Storage,
}

impl ErrorKind {
    /// Stable string form
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::State => "state",
            Self::ScopeConflict => "scope_conflict",
            Self::PolicyViolation => "policy_violation",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::Runner => "runner",
            Self::Sandbox => "sandbox",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity does not exist
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity_type} not found: {id}")]
pub struct NotFoundError {
    pub entity_type: String,
    pub id: String,
}

impl NotFoundError {
    /// Create not-found error
    #[inline]
    pub fn new(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }
}

/// Input fails a validation rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub hint: Option<String>,
}

impl ValidationError {
    /// Create validation error
    #[inline]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            hint: None,
        }
    }

    /// Attach a hint for the caller
    #[inline]
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Operation not legal for the current state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("cannot {operation} {entity} in state {current_state}: {reason}")]
pub struct StateError {
    pub entity: String,
    pub current_state: String,
    pub operation: String,
    pub reason: String,
}

impl StateError {
    /// Create state error
    #[inline]
    pub fn new(
        entity: impl Into<String>,
        current_state: impl fmt::Display,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            current_state: current_state.to_string(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// A run currently holding a scope lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeHolder {
    pub run_id: RunId,
    pub scope_path: String,
}

/// Scope lock denied because active locks overlap the requested path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("scope {requested_path} conflicts with {} active run(s)", .conflicts_with.len())]
pub struct ScopeConflictError {
    pub requested_path: String,
    pub conflicts_with: Vec<ScopeHolder>,
}

/// An allowlist or policy rule rejected the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("policy {policy} rule {rule}: {message}")]
pub struct PolicyViolation {
    pub policy: String,
    pub rule: String,
    pub message: String,
}

impl PolicyViolation {
    /// Create policy violation
    #[inline]
    pub fn new(
        policy: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            policy: policy.into(),
            rule: rule.into(),
            message: message.into(),
        }
    }
}

/// Quota or limit breach
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{resource} capacity exceeded ({current}/{maximum})")]
pub struct CapacityExceeded {
    pub resource: String,
    pub current: u64,
    pub maximum: u64,
}

/// Runner transport or subprocess failure
#[derive(Debug, thiserror::Error)]
#[error("runner {runner_type} failed during {operation}: {cause}")]
pub struct RunnerError {
    pub runner_type: RunnerType,
    pub operation: String,
    #[source]
    pub cause: BoxError,
}

impl RunnerError {
    /// Create runner error wrapping a cause
    #[inline]
    pub fn new(
        runner_type: RunnerType,
        operation: impl Into<String>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self {
            runner_type,
            operation: operation.into(),
            cause: cause.into(),
        }
    }
}

/// Sandbox provisioning or destruction failure
#[derive(Debug, thiserror::Error)]
#[error("sandbox {} failed during {operation}: {cause}", .sandbox_id.as_deref().unwrap_or("<unprovisioned>"))]
pub struct SandboxError {
    pub sandbox_id: Option<String>,
    pub operation: String,
    #[source]
    pub cause: BoxError,
}

impl SandboxError {
    /// Create sandbox error wrapping a cause
    #[inline]
    pub fn new(
        sandbox_id: Option<String>,
        operation: impl Into<String>,
        cause: impl Into<BoxError>,
    ) -> Self {
        Self {
            sandbox_id,
            operation: operation.into(),
            cause: cause.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn axm_error_kind_and_display() {
        let err: AxmError = ValidationError::new("name", "must not be empty").into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "invalid name: must not be empty");
        assert!(!err.is_retryable());
    }

    #[test]
    fn runner_error_preserves_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = RunnerError::new(RunnerType::Codex, "start", io);
        assert!(err.source().unwrap().to_string().contains("pipe closed"));

        let boundary: AxmError = err.into();
        assert_eq!(boundary.kind(), ErrorKind::Runner);
        assert!(boundary.is_retryable());
    }

    #[test]
    fn sandbox_error_without_id() {
        let err = SandboxError::new(None, "provision", "no capacity");
        assert!(err.to_string().contains("<unprovisioned>"));
    }

    #[test]
    fn scope_conflict_serializes_camel_case() {
        let err = ScopeConflictError {
            requested_path: "/repo/pkg".into(),
            conflicts_with: vec![ScopeHolder {
                run_id: RunId::new_v4(),
                scope_path: "/repo".into(),
            }],
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["requestedPath"], "/repo/pkg");
        assert_eq!(json["conflictsWith"][0]["scopePath"], "/repo");
    }
}
