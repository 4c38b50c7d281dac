//! Fixtures wiring the fakes into an [`AgentManager`]

use crate::clock::{PausedClock, SequentialIds};
use crate::repo::InMemoryRepository;
use crate::runner::{Script, ScriptedRunner};
use crate::sandbox::FakeSandboxProvider;
use axm_core::{AgentManager, ManagerConfig};
use axm_types::{
    AgentProfile, ArtifactKind, CreateProfileRequest, CreateTaskRequest, EventPayload, RunnerType,
    Task,
};
use std::sync::Arc;
use std::time::Duration;

/// Short timers: 1s heartbeat interval with grace factor 3, 2s cancel ack
pub fn fast_config() -> ManagerConfig {
    ManagerConfig::default()
        .with_heartbeat(Duration::from_secs(1), 3)
        .with_cancel_ack_timeout(Duration::from_secs(2))
        .with_scope_queue_timeout(Duration::from_secs(30))
}

/// Events of a runner editing two files
pub fn editing_events() -> Vec<EventPayload> {
    vec![
        EventPayload::log("info", "reading workspace"),
        EventPayload::ToolCall {
            tool_name: "edit_file".into(),
            input: serde_map(&[("path", "src/lib.rs")]),
        },
        EventPayload::artifact("src/lib.rs", ArtifactKind::FileModified, 120),
        EventPayload::artifact("src/new.rs", ArtifactKind::FileCreated, 64),
        EventPayload::message("assistant", "done"),
    ]
}

fn serde_map(pairs: &[(&str, &str)]) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), serde_json::Value::String((*v).to_string())))
        .collect()
}

/// A manager over in-memory fakes
pub struct Harness {
    pub manager: AgentManager,
    pub repo: Arc<InMemoryRepository>,
    pub runner: Arc<ScriptedRunner>,
    pub sandboxes: Arc<FakeSandboxProvider>,
    pub ids: Arc<SequentialIds>,
}

impl Harness {
    /// Claude Code runner playing `fallback` for every start, fast timers
    pub fn new(fallback: Script) -> Self {
        Self::with(fallback, fast_config(), FakeSandboxProvider::new())
    }

    pub fn with(fallback: Script, config: ManagerConfig, sandboxes: FakeSandboxProvider) -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        let runner = Arc::new(ScriptedRunner::new(RunnerType::ClaudeCode, fallback));
        let sandboxes = Arc::new(sandboxes);
        let ids = Arc::new(SequentialIds::new());
        let manager = AgentManager::builder(Arc::clone(&repo))
            .with_runner(runner.clone())
            .with_sandbox_provider(sandboxes.clone())
            .with_clock(Arc::new(PausedClock::new()))
            .with_ids(ids.clone())
            .with_config(config)
            .build()
            .unwrap();
        Self {
            manager,
            repo,
            runner,
            sandboxes,
            ids,
        }
    }

    /// Sandboxed profile requiring approval
    pub async fn reviewed_profile(&self) -> AgentProfile {
        self.manager
            .create_profile(
                CreateProfileRequest::new("builder", RunnerType::ClaudeCode, 600)
                    .sandboxed()
                    .with_approval(),
            )
            .await
            .unwrap()
    }

    /// In-place profile without review
    pub async fn direct_profile(&self, timeout_secs: u64) -> AgentProfile {
        self.manager
            .create_profile(CreateProfileRequest::new("direct", RunnerType::ClaudeCode, timeout_secs))
            .await
            .unwrap()
    }

    pub async fn task(&self, title: &str, scope: &str) -> Task {
        self.manager
            .create_task(CreateTaskRequest::new(title, scope).with_description("Fix the failing build"))
            .await
            .unwrap()
    }
}
