//! Event validation and batch statistics
//!
//! Validation never rejects or mutates an event; it reports what looks like
//! an incomplete runner capture so batches can be diagnosed.

use axm_types::{EventPayload, EventType, RunEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tool name some runners emit when they failed to parse a tool call
pub const UNKNOWN_TOOL_NAME: &str = "unknown_tool";

/// Warning category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    EmptyToolName,
    EmptyInput,
    EmptyToolResult,
    EmptyMessage,
    ZeroTokenCost,
}

/// Structured validation warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl EventWarning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for EventWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Check a payload for signs of a broken capture
#[must_use]
pub fn validate_payload(payload: &EventPayload) -> Vec<EventWarning> {
    let mut warnings = Vec::new();
    match payload {
        EventPayload::ToolCall { tool_name, input } => {
            if tool_name.is_empty() || tool_name == UNKNOWN_TOOL_NAME {
                warnings.push(EventWarning::new(
                    WarningKind::EmptyToolName,
                    format!("tool_call has tool name '{tool_name}', parsing likely failed"),
                ));
            }
            if input.is_empty() {
                warnings.push(EventWarning::new(
                    WarningKind::EmptyInput,
                    "tool_call has an empty input map",
                ));
            }
        }
        EventPayload::ToolResult {
            tool_name,
            output,
            error,
            success: false,
        } => {
            let has_output = output
                .as_ref()
                .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
            let has_error = error.as_deref().is_some_and(|e| !e.is_empty());
            if !has_output && !has_error {
                warnings.push(EventWarning::new(
                    WarningKind::EmptyToolResult,
                    format!("failed tool_result for '{tool_name}' carries no output or error"),
                ));
            }
        }
        EventPayload::Message { role, content } => {
            if role.is_empty() || content.is_empty() {
                warnings.push(EventWarning::new(
                    WarningKind::EmptyMessage,
                    "message has an empty role or content",
                ));
            }
        }
        EventPayload::Cost {
            input_tokens: 0,
            output_tokens: 0,
            ..
        } => {
            warnings.push(EventWarning::new(
                WarningKind::ZeroTokenCost,
                "cost metric reports zero input and output tokens",
            ));
        }
        _ => {}
    }
    warnings
}

/// Check a stored event
#[inline]
#[must_use]
pub fn validate(event: &RunEvent) -> Vec<EventWarning> {
    validate_payload(&event.data)
}

/// Counts over a batch of events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBatchStats {
    pub total_events: u64,
    pub by_type: BTreeMap<EventType, u64>,
    pub empty_tool_names: u64,
    pub empty_inputs: u64,
    pub empty_tool_results: u64,
    pub empty_messages: u64,
    pub zero_token_costs: u64,
    pub warning_count: u64,
}

impl EventBatchStats {
    /// Fold one payload into the counts
    pub fn record(&mut self, payload: &EventPayload) {
        self.total_events += 1;
        *self.by_type.entry(payload.event_type()).or_default() += 1;
        for warning in validate_payload(payload) {
            self.warning_count += 1;
            let counter = match warning.kind {
                WarningKind::EmptyToolName => &mut self.empty_tool_names,
                WarningKind::EmptyInput => &mut self.empty_inputs,
                WarningKind::EmptyToolResult => &mut self.empty_tool_results,
                WarningKind::EmptyMessage => &mut self.empty_messages,
                WarningKind::ZeroTokenCost => &mut self.zero_token_costs,
            };
            *counter += 1;
        }
    }
}

/// Counts by type and by warning category
#[must_use]
pub fn summarize<'a, I>(payloads: I) -> EventBatchStats
where
    I: IntoIterator<Item = &'a EventPayload>,
{
    let mut stats = EventBatchStats::default();
    for payload in payloads {
        stats.record(payload);
    }
    stats
}
