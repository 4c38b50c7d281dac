//! Tool invocation tests over a scripted provider

use async_trait::async_trait;
use axm_tools::{
    codes, ScenarioInfo, ToolCallOutcome, ToolCallRequest, ToolConfigStore, ToolConfiguration,
    ToolDefinition, ToolInvoker, ToolMetadata, ToolParameters, ToolProvider, ToolResult,
};
use axm_types::{AxmResult, ErrorKind};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Duration;

#[derive(Default)]
struct MemoryConfigs {
    entries: Mutex<Vec<ToolConfiguration>>,
}

#[async_trait]
impl ToolConfigStore for MemoryConfigs {
    async fn get_tool_configuration(
        &self,
        chat_id: Option<&str>,
        scenario: &str,
        tool_name: &str,
    ) -> AxmResult<Option<ToolConfiguration>> {
        Ok(self
            .entries
            .lock()
            .iter()
            .find(|c| c.key() == (chat_id, scenario, tool_name))
            .cloned())
    }

    async fn upsert_tool_configuration(&self, config: ToolConfiguration) -> AxmResult<()> {
        let mut entries = self.entries.lock();
        entries.retain(|c| c.key() != config.key());
        entries.push(config);
        Ok(())
    }
}

#[derive(Default)]
struct NotesProvider {
    calls: AtomicUsize,
}

fn metadata(f: impl FnOnce(&mut ToolMetadata)) -> ToolMetadata {
    let mut meta = ToolMetadata::default();
    f(&mut meta);
    meta
}

#[async_trait]
impl ToolProvider for NotesProvider {
    fn scenario(&self) -> ScenarioInfo {
        ScenarioInfo {
            name: "notes".into(),
            version: "0.3.0".into(),
            description: "Note taking".into(),
        }
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new("echo", "Echo text back").with_parameters(
                ToolParameters::default().with_property("text", json!({"type": "string"}), true),
            ),
            ToolDefinition::new("slow", "Never finishes in time")
                .with_metadata(metadata(|m| m.timeout_seconds = 1)),
            ToolDefinition::new("limited", "Two calls a minute")
                .with_metadata(metadata(|m| m.rate_limit_per_minute = 2)),
            ToolDefinition::new("purge", "Delete everything")
                .with_metadata(metadata(|m| m.requires_approval = true)),
            ToolDefinition::new("beta", "Off unless configured")
                .with_metadata(metadata(|m| m.enabled_by_default = false)),
        ]
    }

    async fn call(&self, tool_name: &str, arguments: Map<String, Value>) -> ToolResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if tool_name == "slow" {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        ToolResult::ok(json!({"tool": tool_name, "args": arguments}))
    }
}

fn setup() -> (ToolInvoker, Arc<NotesProvider>, Arc<MemoryConfigs>) {
    let configs = Arc::new(MemoryConfigs::default());
    let invoker = ToolInvoker::new(configs.clone());
    let provider = Arc::new(NotesProvider::default());
    invoker.register(provider.clone());
    (invoker, provider, configs)
}

fn request(tool: &str, args: Value) -> ToolCallRequest {
    ToolCallRequest::new("notes", tool, args.as_object().cloned().unwrap_or_default())
}

fn completed(outcome: ToolCallOutcome) -> ToolResult {
    match outcome {
        ToolCallOutcome::Completed(result) => result,
        other => panic!("expected completed call, got {other:?}"),
    }
}

#[tokio::test]
async fn test_manifest_lists_declared_tools() {
    let (invoker, _, _) = setup();
    let manifest = invoker.get_manifest("notes", Utc::now()).unwrap();
    assert_eq!(manifest.protocol_version, "1.0");
    assert_eq!(manifest.tools.len(), 5);
    assert!(manifest.tool("purge").unwrap().metadata.requires_approval);

    let err = invoker.get_manifest("bookmarks", Utc::now()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_successful_call_reports_execution_time() {
    let (invoker, provider, _) = setup();
    let result = completed(
        invoker
            .call_tool(request("echo", json!({"text": "hi"})), Utc::now())
            .await
            .unwrap(),
    );
    assert!(result.success);
    assert_eq!(result.data.unwrap()["args"]["text"], "hi");
    assert!(result.metadata.is_some());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_argument_never_reaches_provider() {
    let (invoker, provider, _) = setup();
    let err = invoker
        .call_tool(request("echo", json!({})), Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_tool_is_not_found() {
    let (invoker, _, _) = setup();
    let err = invoker
        .call_tool(request("missing", json!({})), Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_yields_retryable_error() {
    let (invoker, _, _) = setup();
    let result = completed(
        invoker
            .call_tool(request("slow", json!({})), Utc::now())
            .await
            .unwrap(),
    );
    assert!(!result.success);
    assert_eq!(result.error_code(), Some(codes::TIMEOUT));
    assert!(result.error.unwrap().retryable);
}

#[tokio::test]
async fn test_rate_limit_applies_per_minute() {
    let (invoker, _, _) = setup();
    for _ in 0..2 {
        invoker
            .call_tool(request("limited", json!({})), Utc::now())
            .await
            .unwrap();
    }
    let err = invoker
        .call_tool(request("limited", json!({})), Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);

    // other tools keep their own quota
    assert!(invoker
        .call_tool(request("echo", json!({"text": "hi"})), Utc::now())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_approval_gate_parks_then_executes() {
    let (invoker, provider, _) = setup();
    let outcome = invoker
        .call_tool(request("purge", json!({})), Utc::now())
        .await
        .unwrap();
    let ToolCallOutcome::PendingApproval { call_id } = outcome else {
        panic!("expected pending approval");
    };
    assert_eq!(invoker.pending_calls().len(), 1);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

    let result = invoker.approve_call(call_id).await.unwrap();
    assert!(result.success);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert!(invoker.pending_calls().is_empty());

    let err = invoker.approve_call(call_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_rejected_call_never_runs() {
    let (invoker, provider, _) = setup();
    let ToolCallOutcome::PendingApproval { call_id } = invoker
        .call_tool(request("purge", json!({})), Utc::now())
        .await
        .unwrap()
    else {
        panic!("expected pending approval");
    };
    let result = invoker.reject_call(call_id).unwrap();
    assert_eq!(result.error_code(), Some(codes::REJECTED));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_configuration_precedence_controls_enablement() {
    let (invoker, _, configs) = setup();
    let err = invoker
        .call_tool(request("beta", json!({})), Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PolicyViolation);

    configs
        .upsert_tool_configuration(ToolConfiguration {
            chat_id: Some("chat-1".into()),
            scenario: "notes".into(),
            tool_name: "beta".into(),
            enabled: true,
            requires_approval: None,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    assert!(invoker
        .call_tool(request("beta", json!({})).in_chat("chat-1"), Utc::now())
        .await
        .is_ok());
    assert!(invoker
        .call_tool(request("beta", json!({})).in_chat("chat-2"), Utc::now())
        .await
        .is_err());

    configs
        .upsert_tool_configuration(ToolConfiguration {
            chat_id: None,
            scenario: "notes".into(),
            tool_name: "echo".into(),
            enabled: false,
            requires_approval: None,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
    let err = invoker
        .call_tool(request("echo", json!({"text": "x"})), Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PolicyViolation);
}
