//! Tool configuration and its precedence
//!
//! Configurations live in one table keyed by `(chat_id?, scenario, tool_name)`;
//! a missing chat id is the global entry. Lookups go per-chat, then global,
//! then the tool's declared defaults.

use crate::manifest::ToolDefinition;
use async_trait::async_trait;
use axm_types::AxmResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored override for one tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfiguration {
    /// `None` is the global entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub scenario: String,
    pub tool_name: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_approval: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

impl ToolConfiguration {
    /// Unique key of this entry
    #[must_use]
    pub fn key(&self) -> (Option<&str>, &str, &str) {
        (self.chat_id.as_deref(), &self.scenario, &self.tool_name)
    }
}

/// Which layer decided the effective configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Chat,
    Global,
    Default,
}

/// Resolved configuration for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveToolConfig {
    pub enabled: bool,
    pub requires_approval: bool,
    pub source: ConfigSource,
}

impl EffectiveToolConfig {
    /// Apply precedence: per-chat, then global, then declared default
    #[must_use]
    pub fn resolve(
        chat: Option<&ToolConfiguration>,
        global: Option<&ToolConfiguration>,
        tool: &ToolDefinition,
    ) -> Self {
        let declared_approval = tool.metadata.requires_approval;
        match (chat, global) {
            (Some(cfg), _) => Self {
                enabled: cfg.enabled,
                requires_approval: cfg.requires_approval.unwrap_or(declared_approval),
                source: ConfigSource::Chat,
            },
            (None, Some(cfg)) => Self {
                enabled: cfg.enabled,
                requires_approval: cfg.requires_approval.unwrap_or(declared_approval),
                source: ConfigSource::Global,
            },
            (None, None) => Self {
                enabled: tool.metadata.enabled_by_default,
                requires_approval: declared_approval,
                source: ConfigSource::Default,
            },
        }
    }
}

/// Storage of tool configurations
#[async_trait]
pub trait ToolConfigStore: Send + Sync {
    /// Exact-key lookup
    async fn get_tool_configuration(
        &self,
        chat_id: Option<&str>,
        scenario: &str,
        tool_name: &str,
    ) -> AxmResult<Option<ToolConfiguration>>;

    /// Insert or replace by key
    async fn upsert_tool_configuration(&self, config: ToolConfiguration) -> AxmResult<()>;

    /// Canonical precedence lookup
    async fn resolve_tool_configuration(
        &self,
        chat_id: Option<&str>,
        tool_scenario: &str,
        tool: &ToolDefinition,
    ) -> AxmResult<EffectiveToolConfig> {
        let chat = match chat_id {
            Some(id) => {
                self.get_tool_configuration(Some(id), tool_scenario, &tool.name)
                    .await?
            }
            None => None,
        };
        let global = if chat.is_none() {
            self.get_tool_configuration(None, tool_scenario, &tool.name)
                .await?
        } else {
            None
        };
        Ok(EffectiveToolConfig::resolve(
            chat.as_ref(),
            global.as_ref(),
            tool,
        ))
    }
}
