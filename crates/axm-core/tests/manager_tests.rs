use async_trait::async_trait;
use axm_test_utils::{Harness, Script};
use axm_tools::{
    codes, ScenarioInfo, ToolCallOutcome, ToolCallRequest, ToolConfiguration, ToolDefinition,
    ToolMetadata, ToolParameters, ToolProvider, ToolResult,
};
use axm_types::{
    AxmError, CreateProfileRequest, RunStatus, RunnerType, TaskStatus, UpdateProfileRequest,
    UpdateTaskRequest,
};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_profile_crud_validates() {
    let h = Harness::new(Script::new());
    let err = h
        .manager
        .create_profile(CreateProfileRequest::new("", RunnerType::Codex, 60))
        .await
        .unwrap_err();
    assert!(matches!(err, AxmError::Validation(_)));

    let profile = h.direct_profile(60).await;
    assert_eq!(h.manager.list_profiles().await.unwrap().len(), 1);

    let updated = h
        .manager
        .update_profile(
            profile.id,
            UpdateProfileRequest {
                model: Some("sonnet".into()),
                ..UpdateProfileRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.model, "sonnet");
    assert_eq!(updated.name, profile.name);

    let err = h
        .manager
        .update_profile(
            profile.id,
            UpdateProfileRequest {
                timeout_secs: Some(0),
                ..UpdateProfileRequest::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AxmError::Validation(_)));
    assert_eq!(h.manager.get_profile(profile.id).await.unwrap().model, "sonnet");

    h.manager.delete_profile(profile.id).await.unwrap();
    let err = h.manager.get_profile(profile.id).await.unwrap_err();
    assert!(matches!(err, AxmError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_task_crud_and_status_tracking() {
    let h = Harness::new(Script::new());
    let task = h.task("Write docs", "/repo/docs").await;
    assert_eq!(task.status, TaskStatus::Queued);

    let err = h
        .manager
        .update_task(
            task.id,
            UpdateTaskRequest {
                title: Some(String::new()),
                ..UpdateTaskRequest::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AxmError::Validation(_)));

    let updated = h
        .manager
        .update_task(
            task.id,
            UpdateTaskRequest {
                tag: Some("docs".into()),
                ..UpdateTaskRequest::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.tag, "docs");
    assert_eq!(h.manager.list_tasks().await.unwrap().len(), 1);

    h.manager.delete_task(task.id).await.unwrap();
    assert!(h.manager.list_tasks().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deletes_denied_while_run_active() {
    let h = Harness::new(Script::new().stall());
    let profile = h.direct_profile(600).await;
    let task = h.task("Busy", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();

    let err = h.manager.delete_profile(profile.id).await.unwrap_err();
    assert!(matches!(err, AxmError::State(_)));
    let err = h.manager.delete_task(task.id).await.unwrap_err();
    assert!(matches!(err, AxmError::State(_)));

    h.manager
        .wait_for_status(run.id, |s| s == RunStatus::Running, Duration::from_secs(10))
        .await
        .unwrap();
    h.manager.cancel_run(run.id).await.unwrap();
    h.manager.delete_task(task.id).await.unwrap();
    h.manager.delete_profile(profile.id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_run_rejects_unknown_entities() {
    let h = Harness::new(Script::new());
    let profile = h.direct_profile(60).await;
    let err = h
        .manager
        .start_run(axm_types::TaskId::new_v4(), profile.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AxmError::NotFound(_)));
    assert!(h.repo.runs().is_empty());
    assert!(h.manager.active_scopes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_status_times_out() {
    let h = Harness::new(Script::new().stall());
    let profile = h.direct_profile(600).await;
    let task = h.task("Waiting", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();

    let err = h
        .manager
        .wait_for_status(run.id, |s| s == RunStatus::Complete, Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(err, AxmError::State(_)));

    let rx = h.manager.watch_run(run.id).await.unwrap();
    assert_eq!(*rx.borrow(), RunStatus::Running);
}

struct Notes;

#[async_trait]
impl ToolProvider for Notes {
    fn scenario(&self) -> ScenarioInfo {
        ScenarioInfo {
            name: "notes".into(),
            version: "1.0.0".into(),
            description: "Notes".into(),
        }
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        let gated = ToolMetadata {
            requires_approval: true,
            ..ToolMetadata::default()
        };
        vec![
            ToolDefinition::new("search", "Search notes").with_parameters(
                ToolParameters::default().with_property("query", json!({"type": "string"}), true),
            ),
            ToolDefinition::new("purge", "Delete every note").with_metadata(gated),
        ]
    }

    async fn call(&self, tool_name: &str, arguments: Map<String, Value>) -> ToolResult {
        ToolResult::ok(json!({ "tool": tool_name, "args": arguments }))
    }
}

#[tokio::test(start_paused = true)]
async fn test_tool_calls_through_manager() {
    let h = Harness::new(Script::new());
    h.manager.register_tool_provider(Arc::new(Notes));
    assert_eq!(h.manager.get_manifest("notes").unwrap().tools.len(), 2);

    let mut args = Map::new();
    args.insert("query".into(), json!("rust"));
    let outcome = h
        .manager
        .call_tool(ToolCallRequest::new("notes", "search", args.clone()))
        .await
        .unwrap();
    match outcome {
        ToolCallOutcome::Completed(result) => assert!(result.success),
        other => panic!("unexpected {other:?}"),
    }

    let outcome = h
        .manager
        .call_tool(ToolCallRequest::new("notes", "purge", Map::new()))
        .await
        .unwrap();
    let ToolCallOutcome::PendingApproval { call_id } = outcome else {
        panic!("purge should wait for approval");
    };
    assert_eq!(h.manager.pending_tool_calls().len(), 1);
    let rejected = h.manager.reject_tool_call(call_id).unwrap();
    assert_eq!(rejected.error_code(), Some(codes::REJECTED));
    assert!(h.manager.pending_tool_calls().is_empty());

    h.manager
        .configure_tool(ToolConfiguration {
            chat_id: Some("chat-1".into()),
            scenario: "notes".into(),
            tool_name: "search".into(),
            enabled: false,
            requires_approval: None,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
    let err = h
        .manager
        .call_tool(ToolCallRequest::new("notes", "search", args.clone()).in_chat("chat-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AxmError::PolicyViolation(_)));
    // other chats still see the declared default
    assert!(h
        .manager
        .call_tool(ToolCallRequest::new("notes", "search", args).in_chat("chat-2"))
        .await
        .is_ok());
}
