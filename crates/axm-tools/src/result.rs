//! Tool result envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable error codes produced by the local invoker
pub mod codes {
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const REJECTED: &str = "REJECTED";
    pub const EXECUTION_FAILED: &str = "EXECUTION_FAILED";
}

/// Error half of the envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Suggested next call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpAction {
    pub tool_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Execution metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub execution_time_ms: u64,
    /// Correlation id for asynchronous completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_actions: Vec<FollowUpAction>,
}

/// `{success, data?, error?, metadata?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
}

impl ToolResult {
    /// Successful result
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: None,
        }
    }

    /// Failed result
    #[must_use]
    pub fn err(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ToolError {
                code: code.into(),
                message: message.into(),
                retryable,
                details: None,
            }),
            metadata: None,
        }
    }

    /// Record execution time, keeping any metadata the provider set
    #[must_use]
    pub fn with_execution_time(mut self, millis: u64) -> Self {
        self.metadata.get_or_insert_with(ResultMetadata::default).execution_time_ms = millis;
        self
    }

    /// Error code, if failed
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}
