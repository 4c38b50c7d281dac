//! AXM Tool Discovery Protocol
//!
//! Scenarios advertise callable capabilities as a manifest; calls return a
//! uniform result envelope.
//!
//! # Core Concepts
//!
//! - [`ToolManifest`]: protocol version, scenario identity, tools and categories
//! - [`ToolResult`]: `{success, data?, error?, metadata?}` envelope
//! - [`ToolConfigStore`]: per-chat, then global, then declared-default configuration
//! - [`ToolInvoker`]: enforces enablement, arguments, approval, rate limit and timeout

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod invoker;
pub mod manifest;
pub mod rate_limit;
pub mod result;

pub use config::{ConfigSource, EffectiveToolConfig, ToolConfigStore, ToolConfiguration};
pub use invoker::{PendingToolCall, ToolCallOutcome, ToolCallRequest, ToolInvoker, ToolProvider};
pub use manifest::{
    is_valid_tool_name, CostEstimate, ScenarioInfo, ToolCategory, ToolDefinition, ToolExample,
    ToolManifest, ToolMetadata, ToolParameters, PROTOCOL_VERSION,
};
pub use rate_limit::RateLimiter;
pub use result::{codes, FollowUpAction, ResultMetadata, ToolError, ToolResult};
