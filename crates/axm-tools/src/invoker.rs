//! Gated tool invocation
//!
//! [`ToolInvoker`] is the client side of the discovery protocol. Before a call
//! reaches its [`ToolProvider`] it resolves the effective configuration,
//! checks the arguments, and parks calls that need approval. The declared
//! rate limit and timeout are enforced locally.

use crate::config::{EffectiveToolConfig, ToolConfigStore};
use crate::manifest::{ScenarioInfo, ToolCategory, ToolDefinition, ToolManifest};
use crate::rate_limit::RateLimiter;
use crate::result::{codes, ToolResult};
use async_trait::async_trait;
use axm_types::{
    ApprovalState, AxmResult, NotFoundError, PolicyViolation, StateError,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A scenario exposing callable tools
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Scenario identity
    fn scenario(&self) -> ScenarioInfo;

    /// Declared tools
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Declared categories
    fn categories(&self) -> Vec<ToolCategory> {
        Vec::new()
    }

    /// Execute a tool; failures are reported inside the envelope
    async fn call(&self, tool_name: &str, arguments: Map<String, Value>) -> ToolResult;
}

/// Request to call one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    pub scenario: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

impl ToolCallRequest {
    /// Global-scope request
    #[must_use]
    pub fn new(scenario: impl Into<String>, tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            scenario: scenario.into(),
            tool_name: tool_name.into(),
            arguments,
            chat_id: None,
        }
    }

    /// With chat scope
    #[inline]
    #[must_use]
    pub fn in_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }
}

/// A call parked until someone decides on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingToolCall {
    pub id: Uuid,
    pub request: ToolCallRequest,
    pub approval_state: ApprovalState,
    pub requested_at: DateTime<Utc>,
}

/// What happened to a call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallOutcome {
    /// The provider ran (or the local timeout fired)
    Completed(ToolResult),
    /// Parked; decide with [`ToolInvoker::approve_call`] or [`ToolInvoker::reject_call`]
    PendingApproval { call_id: Uuid },
}

/// Client-side tool caller
pub struct ToolInvoker {
    providers: DashMap<String, Arc<dyn ToolProvider>>,
    config: Arc<dyn ToolConfigStore>,
    limiter: RateLimiter,
    pending: DashMap<Uuid, PendingToolCall>,
}

impl std::fmt::Debug for ToolInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolInvoker")
            .field("providers", &self.providers.len())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl ToolInvoker {
    /// Invoker resolving configuration from `config`
    #[must_use]
    pub fn new(config: Arc<dyn ToolConfigStore>) -> Self {
        Self {
            providers: DashMap::new(),
            config,
            limiter: RateLimiter::new(),
            pending: DashMap::new(),
        }
    }

    /// Register a provider under its scenario name, replacing any previous one
    pub fn register(&self, provider: Arc<dyn ToolProvider>) {
        let name = provider.scenario().name;
        info!(scenario = %name, tools = provider.tools().len(), "tool provider registered");
        self.providers.insert(name, provider);
    }

    /// Registered scenario names, sorted
    #[must_use]
    pub fn scenarios(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn provider(&self, scenario: &str) -> Result<Arc<dyn ToolProvider>, NotFoundError> {
        self.providers
            .get(scenario)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| NotFoundError::new("scenario", scenario))
    }

    /// Discovery payload of a scenario
    pub fn get_manifest(&self, scenario: &str, now: DateTime<Utc>) -> AxmResult<ToolManifest> {
        let provider = self.provider(scenario)?;
        let manifest = ToolManifest::new(
            provider.scenario(),
            provider.tools(),
            provider.categories(),
            now,
        );
        manifest.validate()?;
        Ok(manifest)
    }

    fn resolve_tool(&self, request: &ToolCallRequest) -> AxmResult<(Arc<dyn ToolProvider>, ToolDefinition)> {
        let provider = self.provider(&request.scenario)?;
        let tool = provider
            .tools()
            .into_iter()
            .find(|t| t.name == request.tool_name)
            .ok_or_else(|| {
                NotFoundError::new("tool", format!("{}/{}", request.scenario, request.tool_name))
            })?;
        Ok((provider, tool))
    }

    /// Call a tool, or park it when approval is required
    pub async fn call_tool(
        &self,
        request: ToolCallRequest,
        now: DateTime<Utc>,
    ) -> AxmResult<ToolCallOutcome> {
        let (provider, tool) = self.resolve_tool(&request)?;
        let effective: EffectiveToolConfig = self
            .config
            .resolve_tool_configuration(request.chat_id.as_deref(), &request.scenario, &tool)
            .await?;

        if !effective.enabled {
            return Err(PolicyViolation::new(
                "tool_configuration",
                format!("{}/{}", request.scenario, tool.name),
                format!("tool is disabled ({:?} configuration)", effective.source),
            )
            .into());
        }
        tool.validate_arguments(&request.arguments)?;

        if effective.requires_approval {
            let call_id = Uuid::new_v4();
            info!(
                %call_id,
                scenario = %request.scenario,
                tool = %tool.name,
                "tool call awaiting approval"
            );
            self.pending.insert(
                call_id,
                PendingToolCall {
                    id: call_id,
                    request,
                    approval_state: ApprovalState::Pending,
                    requested_at: now,
                },
            );
            return Ok(ToolCallOutcome::PendingApproval { call_id });
        }

        let result = self
            .execute(&provider, &tool, &request.scenario, request.arguments)
            .await?;
        Ok(ToolCallOutcome::Completed(result))
    }

    /// Calls awaiting a decision, oldest first
    #[must_use]
    pub fn pending_calls(&self) -> Vec<PendingToolCall> {
        let mut calls: Vec<PendingToolCall> = self.pending.iter().map(|e| e.value().clone()).collect();
        calls.sort_by_key(|c| c.requested_at);
        calls
    }

    fn take_pending(&self, call_id: Uuid, operation: &str) -> AxmResult<PendingToolCall> {
        let (_, call) = self
            .pending
            .remove(&call_id)
            .ok_or_else(|| NotFoundError::new("tool_call", call_id))?;
        if !call.approval_state.is_open() {
            return Err(StateError::new("tool_call", call.approval_state, operation, "call already decided").into());
        }
        Ok(call)
    }

    /// Approve a parked call and execute it
    pub async fn approve_call(&self, call_id: Uuid) -> AxmResult<ToolResult> {
        let call = self.take_pending(call_id, "approve")?;
        info!(%call_id, tool = %call.request.tool_name, "tool call approved");
        let (provider, tool) = self.resolve_tool(&call.request)?;
        self.execute(&provider, &tool, &call.request.scenario, call.request.arguments)
            .await
    }

    /// Reject a parked call; it never reaches the provider
    pub fn reject_call(&self, call_id: Uuid) -> AxmResult<ToolResult> {
        let call = self.take_pending(call_id, "reject")?;
        info!(%call_id, tool = %call.request.tool_name, "tool call rejected");
        Ok(ToolResult::err(
            codes::REJECTED,
            format!("call to '{}' was rejected", call.request.tool_name),
            false,
        ))
    }

    async fn execute(
        &self,
        provider: &Arc<dyn ToolProvider>,
        tool: &ToolDefinition,
        scenario: &str,
        arguments: Map<String, Value>,
    ) -> AxmResult<ToolResult> {
        let key = format!("{scenario}/{}", tool.name);
        let started = Instant::now();
        self.limiter
            .try_acquire(&key, tool.metadata.rate_limit_per_minute)?;

        debug!(tool = %key, "invoking tool");
        let call = provider.call(&tool.name, arguments);
        let result = if tool.metadata.timeout_seconds == 0 {
            call.await
        } else {
            let limit = Duration::from_secs(tool.metadata.timeout_seconds);
            match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(tool = %key, timeout_secs = tool.metadata.timeout_seconds, "tool call timed out");
                    ToolResult::err(
                        codes::TIMEOUT,
                        format!("tool did not finish within {}s", tool.metadata.timeout_seconds),
                        true,
                    )
                }
            }
        };
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(result.with_execution_time(elapsed))
    }
}
