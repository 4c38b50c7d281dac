use axm_core::{RunnerOutcome, CANCELLED_MSG};
use axm_test_utils::{editing_events, fast_config, FakeSandboxProvider, Harness, Script};
use axm_types::{
    ApprovalState, AxmError, CreateProfileRequest, EventPayload, Run, RunEvent, RunPhase,
    RunStatus, RunnerType, TaskStatus, HEARTBEAT_TIMEOUT_MSG, WALL_TIMEOUT_MSG,
};
use pretty_assertions::assert_eq;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(60);

fn reviewed_outcome() -> RunnerOutcome {
    RunnerOutcome {
        exit_code: Some(0),
        diff_path: "/tmp/run.diff".into(),
        changed_files: 2,
        total_size_bytes: 184,
        ..RunnerOutcome::default()
    }
}

fn editing_script() -> Script {
    editing_events()
        .into_iter()
        .fold(Script::new(), |script, event| {
            script.emit(event).sleep(Duration::from_millis(100))
        })
        .finish(reviewed_outcome())
}

fn transitions(events: &[RunEvent]) -> Vec<(String, String)> {
    events
        .iter()
        .filter_map(|e| match &e.data {
            EventPayload::Status { from, to, .. } => Some((from.clone(), to.clone())),
            _ => None,
        })
        .collect()
}

fn pair(from: &str, to: &str) -> (String, String) {
    (from.to_string(), to.to_string())
}

async fn wait_terminal(h: &Harness, run: &Run) -> Run {
    h.manager
        .wait_for_status(run.id, RunStatus::is_terminal, WAIT)
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_reviewed_run_parks_then_completes_on_approval() {
    let h = Harness::new(editing_script());
    let profile = h.reviewed_profile().await;
    let task = h.task("Fix build", "/repo/pkg").await;

    let run = h.manager.start_run(task.id, profile.id).await.unwrap();
    assert_eq!(run.status, RunStatus::Pending);

    let run = h
        .manager
        .wait_for_status(run.id, |s| s == RunStatus::NeedsReview, WAIT)
        .await
        .unwrap();
    assert_eq!(run.approval_state, ApprovalState::Pending);
    assert_eq!(run.phase, RunPhase::Review);
    assert_eq!(run.sandbox_id.as_deref(), Some("sbx-1"));
    assert_eq!(run.session_id, "session-1");
    assert_eq!(run.changed_files, 2);
    let summary = run.summary.clone().unwrap();
    assert_eq!(summary.files_modified, 1);
    assert_eq!(summary.files_created, 1);
    assert_eq!(summary.tool_calls, 1);

    assert_eq!(
        transitions(&h.repo.events_of(run.id)),
        vec![
            pair("pending", "starting"),
            pair("starting", "running"),
            pair("running", "needs_review"),
        ]
    );
    // the review keeps the scope and the sandbox
    assert_eq!(h.manager.active_scopes().len(), 1);
    assert!(h.sandboxes.destroyed().is_empty());
    assert_eq!(h.manager.get_task(task.id).await.unwrap().status, TaskStatus::NeedsReview);

    let approved = h.manager.approve_run(run.id, "alice").await.unwrap();
    assert_eq!(approved.status, RunStatus::Complete);
    assert_eq!(approved.approval_state, ApprovalState::Approved);
    assert_eq!(approved.approved_by, "alice");
    assert_eq!(approved.phase, RunPhase::Finalize);
    assert!(approved.ended_at.is_some());
    assert!(h.manager.active_scopes().is_empty());
    assert!(h.sandboxes.destroyed().is_empty());
    assert_eq!(h.manager.get_task(task.id).await.unwrap().status, TaskStatus::Approved);

    let again = h.manager.approve_run(run.id, "bob").await.unwrap();
    assert_eq!(again.approved_at, approved.approved_at);
    assert_eq!(again.approved_by, "alice");
}

#[tokio::test(start_paused = true)]
async fn test_silent_runner_fails_with_heartbeat_timeout() {
    let script = Script::new()
        .emit(EventPayload::log("info", "one"))
        .sleep(Duration::from_secs(1))
        .emit(EventPayload::log("info", "two"))
        .sleep(Duration::from_secs(1))
        .emit(EventPayload::log("info", "three"))
        .stall();
    let h = Harness::new(script);
    let profile = h.direct_profile(600).await;
    let task = h.task("Silent", "/repo").await;

    let run = h.manager.start_run(task.id, profile.id).await.unwrap();
    let run = wait_terminal(&h, &run).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error_msg, HEARTBEAT_TIMEOUT_MSG);
    let elapsed = run.ended_at.unwrap() - run.started_at.unwrap();
    assert!(elapsed >= chrono::Duration::seconds(5), "{elapsed}");
    assert!(elapsed < chrono::Duration::seconds(6), "{elapsed}");
    assert_eq!(h.runner.cancelled(), vec![run.id]);
    assert!(h.manager.active_scopes().is_empty());
    assert!(run.summary.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_running_run() {
    let h = Harness::new(Script::new().emit(EventPayload::log("info", "working")).stall());
    let profile = h.direct_profile(600).await;
    let task = h.task("Long", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();
    h.manager
        .wait_for_status(run.id, |s| s == RunStatus::Running, WAIT)
        .await
        .unwrap();

    let cancelled = h.manager.cancel_run(run.id).await.unwrap();
    assert_eq!(cancelled.status, RunStatus::Cancelled);
    assert_eq!(cancelled.error_msg, CANCELLED_MSG);
    assert_eq!(h.runner.cancelled(), vec![run.id]);
    assert!(h.manager.active_scopes().is_empty());
    assert_eq!(h.manager.get_task(task.id).await.unwrap().status, TaskStatus::Cancelled);

    let before = h.manager.get_run(run.id).await.unwrap();
    let err = h.manager.cancel_run(run.id).await.unwrap_err();
    assert!(matches!(err, AxmError::State(_)));
    assert_eq!(h.manager.get_run(run.id).await.unwrap(), before);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_without_runner_ack_is_bounded() {
    let h = Harness::new(Script::new().stall());
    h.runner.ignore_cancel();
    let profile = h.direct_profile(600).await;
    let task = h.task("Stuck", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();
    h.manager
        .wait_for_status(run.id, |s| s == RunStatus::Running, WAIT)
        .await
        .unwrap();

    let cancelled = h.manager.cancel_run(run.id).await.unwrap();
    assert_eq!(cancelled.status, RunStatus::Cancelled);
    assert!(h.manager.active_scopes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wall_time_expiry_cancels_with_timeout() {
    let h = Harness::with(
        Script::new().stall(),
        fast_config().with_heartbeat(Duration::from_secs(60), 3),
        FakeSandboxProvider::new(),
    );
    let profile = h.direct_profile(5).await;
    let task = h.task("Slow", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();

    let run = wait_terminal(&h, &run).await;
    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.error_msg, WALL_TIMEOUT_MSG);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_runner_start_fails_with_heartbeat_timeout() {
    let h = Harness::new(Script::hanging_start());
    let profile = h.reviewed_profile().await;
    let task = h.task("Hung start", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();

    let run = wait_terminal(&h, &run).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error_msg, HEARTBEAT_TIMEOUT_MSG);
    assert_eq!(h.runner.started().len(), 1);
    assert_eq!(h.runner.cancelled(), vec![run.id]);
    assert_eq!(h.sandboxes.destroyed(), vec!["sbx-1".to_string()]);
    assert!(h.manager.active_scopes().is_empty());
    assert_eq!(
        transitions(&h.repo.events_of(run.id)),
        vec![pair("pending", "starting"), pair("starting", "failed")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_hanging_provision_is_bounded_by_wall_time() {
    let h = Harness::with(editing_script(), fast_config(), FakeSandboxProvider::hanging());
    let profile = h
        .manager
        .create_profile(CreateProfileRequest::new("boxed", RunnerType::ClaudeCode, 5).sandboxed())
        .await
        .unwrap();
    let task = h.task("Hung sandbox", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();

    let run = wait_terminal(&h, &run).await;
    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.error_msg, WALL_TIMEOUT_MSG);
    assert!(run.sandbox_id.is_none());
    assert!(h.runner.started().is_empty());
    assert!(h.sandboxes.provisioned().is_empty());
    assert!(h.manager.active_scopes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unreviewed_run_completes_directly() {
    let h = Harness::new(editing_script());
    let profile = h.direct_profile(600).await;
    let task = h.task("Direct", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();

    let run = wait_terminal(&h, &run).await;
    assert_eq!(run.status, RunStatus::Complete);
    assert_eq!(run.approval_state, ApprovalState::None);
    assert_eq!(run.phase, RunPhase::Finalize);
    assert_eq!(run.exit_code, Some(0));
    assert_eq!(run.diff_path, "/tmp/run.diff");
    assert!(run.sandbox_id.is_none());
    assert_eq!(h.manager.get_task(task.id).await.unwrap().status, TaskStatus::Approved);
}

#[tokio::test(start_paused = true)]
async fn test_runner_status_event_fails_run() {
    let script = Script::new()
        .emit(EventPayload::status(RunStatus::Running, RunStatus::Failed, "tool crashed"))
        .stall();
    let h = Harness::new(script);
    let profile = h.direct_profile(600).await;
    let task = h.task("Crash", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();

    let run = wait_terminal(&h, &run).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error_msg, "tool crashed");
}

#[tokio::test(start_paused = true)]
async fn test_nonzero_exit_fails_run() {
    let script = Script::new().finish(RunnerOutcome {
        exit_code: Some(1),
        ..RunnerOutcome::default()
    });
    let h = Harness::new(script);
    let profile = h.direct_profile(600).await;
    let task = h.task("Exit", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();

    let run = wait_terminal(&h, &run).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error_msg, "runner exited with code 1");
    assert_eq!(run.exit_code, Some(1));
    assert_eq!(h.manager.get_task(task.id).await.unwrap().status, TaskStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_runner_start_failure_destroys_sandbox() {
    let h = Harness::new(Script::failing_start("binary not found"));
    let profile = h.reviewed_profile().await;
    let task = h.task("Broken", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();

    let run = wait_terminal(&h, &run).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error_msg, "runner claude-code failed during start");
    assert_eq!(h.sandboxes.destroyed(), vec!["sbx-1".to_string()]);
    assert!(h.manager.active_scopes().is_empty());

    let logged = h.repo.events_of(run.id).into_iter().any(|e| {
        matches!(&e.data, EventPayload::Error { cause: Some(cause), .. } if cause.contains("binary not found"))
    });
    assert!(logged);
}

#[tokio::test(start_paused = true)]
async fn test_sandbox_failure_fails_run_and_releases_scope() {
    let h = Harness::with(editing_script(), fast_config(), FakeSandboxProvider::failing());
    let profile = h.reviewed_profile().await;
    let task = h.task("No sandbox", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();

    let run = wait_terminal(&h, &run).await;
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error_msg, "sandbox provision failed");
    assert!(run.started_at.is_none());
    assert!(h.runner.started().is_empty());
    assert!(h.manager.active_scopes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reject_destroys_sandbox() {
    let h = Harness::new(editing_script());
    let profile = h.reviewed_profile().await;
    let task = h.task("Rejected", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();
    h.manager
        .wait_for_status(run.id, |s| s == RunStatus::NeedsReview, WAIT)
        .await
        .unwrap();

    let rejected = h.manager.reject_run(run.id, "carol").await.unwrap();
    assert_eq!(rejected.status, RunStatus::Complete);
    assert_eq!(rejected.approval_state, ApprovalState::Rejected);
    assert_eq!(h.sandboxes.destroyed(), vec!["sbx-1".to_string()]);
    assert_eq!(h.manager.get_task(task.id).await.unwrap().status, TaskStatus::Rejected);

    let err = h.manager.approve_run(run.id, "carol").await.unwrap_err();
    assert!(matches!(err, AxmError::State(_)));
}

#[tokio::test(start_paused = true)]
async fn test_partial_approval_stays_in_review() {
    let h = Harness::new(editing_script());
    let profile = h.reviewed_profile().await;
    let task = h.task("Partial", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();
    h.manager
        .wait_for_status(run.id, |s| s == RunStatus::NeedsReview, WAIT)
        .await
        .unwrap();

    let partial = h.manager.partially_approve_run(run.id, "dan").await.unwrap();
    assert_eq!(partial.status, RunStatus::NeedsReview);
    assert_eq!(partial.approval_state, ApprovalState::PartiallyApproved);
    assert!(h.manager.get_run_actions(run.id).await.unwrap().can_approve.allowed);

    let approved = h.manager.approve_run(run.id, "dan").await.unwrap();
    assert_eq!(approved.status, RunStatus::Complete);
    assert_eq!(approved.approval_state, ApprovalState::Approved);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_in_review_keeps_pending_approval() {
    let h = Harness::new(editing_script());
    let profile = h.reviewed_profile().await;
    let task = h.task("Abandoned", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();
    h.manager
        .wait_for_status(run.id, |s| s == RunStatus::NeedsReview, WAIT)
        .await
        .unwrap();

    let cancelled = h.manager.cancel_run(run.id).await.unwrap();
    assert_eq!(cancelled.status, RunStatus::Cancelled);
    assert_eq!(cancelled.approval_state, ApprovalState::Pending);
    assert!(h.manager.active_scopes().is_empty());
    assert!(h.runner.cancelled().is_empty());

    let err = h.manager.approve_run(run.id, "erin").await.unwrap_err();
    assert!(matches!(err, AxmError::State(_)));
}

#[tokio::test(start_paused = true)]
async fn test_retry_starts_fresh_run() {
    let h = Harness::new(editing_script());
    h.runner.push(Script::new().finish(RunnerOutcome {
        exit_code: Some(2),
        ..RunnerOutcome::default()
    }));
    let profile = h.direct_profile(600).await;
    let task = h.task("Flaky", "/repo").await;
    let first = h.manager.start_run(task.id, profile.id).await.unwrap();
    let first = wait_terminal(&h, &first).await;
    assert_eq!(first.status, RunStatus::Failed);

    let second = h.manager.retry_run(first.id).await.unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(second.task_id, first.task_id);
    assert_eq!(second.agent_profile_id, first.agent_profile_id);

    let second = wait_terminal(&h, &second).await;
    assert_eq!(second.status, RunStatus::Complete);
    assert_eq!(h.repo.events_of(second.id)[0].sequence, 1);
    assert!(second.sandbox_id.is_none());
    assert_eq!(h.manager.get_task(task.id).await.unwrap().status, TaskStatus::Approved);
    // the older run no longer drives the task status
    assert_eq!(h.manager.get_run(first.id).await.unwrap().status, RunStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_retry_of_active_run_is_denied() {
    let h = Harness::new(Script::new().stall());
    let profile = h.direct_profile(600).await;
    let task = h.task("Busy", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();
    h.manager
        .wait_for_status(run.id, |s| s == RunStatus::Running, WAIT)
        .await
        .unwrap();

    let err = h.manager.retry_run(run.id).await.unwrap_err();
    assert!(matches!(err, AxmError::State(_)));
    assert_eq!(h.repo.runs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_continue_passes_prior_session() {
    let h = Harness::new(Script::new().with_session("sess-42"));
    let profile = h.direct_profile(600).await;
    let task = h.task("Resume", "/repo").await;
    let first = h.manager.start_run(task.id, profile.id).await.unwrap();
    let first = wait_terminal(&h, &first).await;
    assert_eq!(first.session_id, "sess-42");

    let next = h.manager.continue_run(first.id).await.unwrap();
    assert_eq!(next.session_id, "sess-42");
    wait_terminal(&h, &next).await;

    let specs = h.runner.started();
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].session_id, None);
    assert_eq!(specs[1].session_id.as_deref(), Some("sess-42"));
}

#[tokio::test(start_paused = true)]
async fn test_delete_requires_stopped_run() {
    let h = Harness::new(Script::new().stall());
    let profile = h.direct_profile(600).await;
    let task = h.task("Delete me", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();
    h.manager
        .wait_for_status(run.id, |s| s == RunStatus::Running, WAIT)
        .await
        .unwrap();

    let err = h.manager.delete_run(run.id).await.unwrap_err();
    assert!(matches!(err, AxmError::State(_)));

    h.manager.cancel_run(run.id).await.unwrap();
    h.manager.delete_run(run.id).await.unwrap();
    let err = h.manager.get_run(run.id).await.unwrap_err();
    assert!(matches!(err, AxmError::NotFound(_)));
    assert!(h.repo.events_of(run.id).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_events_are_gapless_and_ordered() {
    let h = Harness::new(editing_script());
    let profile = h.direct_profile(600).await;
    let task = h.task("Ordered", "/repo").await;
    let run = h.manager.start_run(task.id, profile.id).await.unwrap();
    let run = wait_terminal(&h, &run).await;

    let events = h.manager.list_events(run.id, 1, 1000).await.unwrap();
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (1..=events.len() as u64).collect::<Vec<_>>());
    assert!(axm_types::invariants::check_event_order(&events).is_ok());

    let metrics = h.manager.get_metrics(run.id).await.unwrap();
    assert_eq!(metrics.total_events, events.len() as u64);
    assert_eq!(metrics.files_changed(), 2);
}
