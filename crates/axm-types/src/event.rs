//! Run events and their tagged payloads
//!
//! Every runner observation is one [`EventPayload`] variant. The event type
//! is derived from the payload so the two can never disagree.

use crate::ids::{EventId, RunId};
use crate::run::RunStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Coarse event classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Log,
    Message,
    ToolCall,
    ToolResult,
    Status,
    Metric,
    Artifact,
    Error,
}

impl EventType {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Message => "message",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Status => "status",
            Self::Metric => "metric",
            Self::Artifact => "artifact",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of file-level artifact reported by a runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    FileCreated,
    FileModified,
    FileDeleted,
    Diff,
    Log,
    #[serde(other)]
    Other,
}

/// Event payload, tagged by `type`
///
/// `Cost` and `Metric` both classify as [`EventType::Metric`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventPayload {
    Log {
        level: String,
        message: String,
    },
    Message {
        role: String,
        content: String,
    },
    ToolCall {
        tool_name: String,
        #[serde(default)]
        input: Map<String, Value>,
    },
    ToolResult {
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        success: bool,
    },
    Status {
        #[serde(default)]
        from: String,
        to: String,
        #[serde(default)]
        reason: String,
    },
    Cost {
        input_tokens: u64,
        output_tokens: u64,
        #[serde(default)]
        model: String,
        #[serde(default)]
        cost_estimate: f64,
    },
    Metric {
        name: String,
        value: f64,
        #[serde(default)]
        unit: String,
    },
    Artifact {
        path: String,
        kind: ArtifactKind,
        #[serde(default)]
        size_bytes: u64,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
}

impl EventPayload {
    /// Coarse type of this payload
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::Log { .. } => EventType::Log,
            Self::Message { .. } => EventType::Message,
            Self::ToolCall { .. } => EventType::ToolCall,
            Self::ToolResult { .. } => EventType::ToolResult,
            Self::Status { .. } => EventType::Status,
            Self::Cost { .. } | Self::Metric { .. } => EventType::Metric,
            Self::Artifact { .. } => EventType::Artifact,
            Self::Error { .. } => EventType::Error,
        }
    }

    /// Log line
    #[must_use]
    pub fn log(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Log {
            level: level.into(),
            message: message.into(),
        }
    }

    /// Chat message
    #[must_use]
    pub fn message(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Message {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Status change between two run statuses
    #[must_use]
    pub fn status(from: RunStatus, to: RunStatus, reason: impl Into<String>) -> Self {
        Self::Status {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
            reason: reason.into(),
        }
    }

    /// Error with optional detailed cause
    #[must_use]
    pub fn error(message: impl Into<String>, cause: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            cause,
        }
    }

    /// File artifact
    #[must_use]
    pub fn artifact(path: impl Into<String>, kind: ArtifactKind, size_bytes: u64) -> Self {
        Self::Artifact {
            path: path.into(),
            kind,
            size_bytes,
        }
    }

    /// Target status named by a `status` payload, when it is a known status
    #[must_use]
    pub fn target_status(&self) -> Option<RunStatus> {
        match self {
            Self::Status { to, .. } => RunStatus::parse(to),
            _ => None,
        }
    }
}

/// Append-only run log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub id: EventId,
    pub run_id: RunId,
    /// Monotonic per run, starting at 1
    pub sequence: u64,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventPayload,
}

impl RunEvent {
    /// Create event; the type is taken from the payload
    #[must_use]
    pub fn new(
        id: EventId,
        run_id: RunId,
        sequence: u64,
        timestamp: DateTime<Utc>,
        data: EventPayload,
    ) -> Self {
        Self {
            id,
            run_id,
            sequence,
            event_type: data.event_type(),
            timestamp,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_wire_shape() {
        let payload = EventPayload::ToolCall {
            tool_name: "read_file".into(),
            input: json!({"path": "a.rs"}).as_object().cloned().unwrap(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "tool_call");
        assert_eq!(value["toolName"], "read_file");
    }

    #[test]
    fn cost_is_a_metric() {
        let cost: EventPayload = serde_json::from_value(json!({
            "type": "cost", "inputTokens": 10, "outputTokens": 5
        }))
        .unwrap();
        assert_eq!(cost.event_type(), EventType::Metric);
    }

    #[test]
    fn unknown_artifact_kind_is_other() {
        let payload: EventPayload = serde_json::from_value(json!({
            "type": "artifact", "path": "x.bin", "kind": "binary_blob", "sizeBytes": 3
        }))
        .unwrap();
        assert_eq!(
            payload,
            EventPayload::artifact("x.bin", ArtifactKind::Other, 3)
        );
    }

    #[test]
    fn status_target() {
        let payload = EventPayload::status(RunStatus::Running, RunStatus::Failed, "crash");
        assert_eq!(payload.target_status(), Some(RunStatus::Failed));

        let custom = EventPayload::Status {
            from: String::new(),
            to: "thinking".into(),
            reason: String::new(),
        };
        assert_eq!(custom.target_status(), None);
    }
}
