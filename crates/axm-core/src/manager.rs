//! Agent manager facade
//!
//! [`AgentManager`] is the caller-facing API: profile and task CRUD, the run
//! operations delegated to the [`RunOrchestrator`], and gated tool calls.

use crate::capabilities::{
    Clock, IdSource, RandomIds, Repository, Runner, RunnerRegistry, SandboxProvider, SystemClock,
};
use crate::config::ManagerConfig;
use crate::orchestrator::{RunOrchestrator, StartRunOptions};
use axm_policy::RunActions;
use axm_tools::{
    PendingToolCall, ToolCallOutcome, ToolCallRequest, ToolConfigStore, ToolConfiguration,
    ToolInvoker, ToolManifest, ToolProvider, ToolResult,
};
use axm_types::validation::{validate_name, validate_profile, validate_profile_request, validate_task, validate_task_request};
use axm_types::{
    AgentProfile, AxmResult, CreateProfileRequest, CreateTaskRequest, ProfileId, Run, RunEvent,
    RunFilter, RunId, RunStatus, RunSummary, ScopeHolder, StateError, Task, TaskId,
    UpdateProfileRequest, UpdateTaskRequest,
};
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

/// Builder for [`AgentManager`]
pub struct AgentManagerBuilder {
    repo: Arc<dyn Repository>,
    tool_configs: Arc<dyn ToolConfigStore>,
    sandboxes: Option<Arc<dyn SandboxProvider>>,
    runners: RunnerRegistry,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    config: ManagerConfig,
}

impl AgentManagerBuilder {
    /// Sandbox provider for profiles requiring isolation
    #[inline]
    #[must_use]
    pub fn with_sandbox_provider(mut self, provider: Arc<dyn SandboxProvider>) -> Self {
        self.sandboxes = Some(provider);
        self
    }

    /// Register a runner under its type
    #[inline]
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runners.register(runner);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_ids(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build; fails on invalid configuration
    pub fn build(self) -> AxmResult<AgentManager> {
        let orchestrator = RunOrchestrator::new(
            Arc::clone(&self.repo),
            self.sandboxes,
            self.runners,
            Arc::clone(&self.clock),
            Arc::clone(&self.ids),
            self.config,
        )?;
        Ok(AgentManager {
            repo: self.repo,
            clock: self.clock,
            ids: self.ids,
            tools: ToolInvoker::new(self.tool_configs),
            orchestrator,
        })
    }
}

/// Caller-facing manager
pub struct AgentManager {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    tools: ToolInvoker,
    orchestrator: RunOrchestrator,
}

impl std::fmt::Debug for AgentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentManager")
            .field("orchestrator", &self.orchestrator)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

impl AgentManager {
    /// Start building a manager over `repo`
    ///
    /// The repository also serves as the tool-configuration store.
    pub fn builder<R>(repo: Arc<R>) -> AgentManagerBuilder
    where
        R: Repository + 'static,
    {
        let tool_configs: Arc<dyn ToolConfigStore> = repo.clone();
        AgentManagerBuilder {
            repo,
            tool_configs,
            sandboxes: None,
            runners: RunnerRegistry::new(),
            clock: Arc::new(SystemClock),
            ids: Arc::new(RandomIds),
            config: ManagerConfig::default(),
        }
    }

    /// Orchestrator behind the run operations
    #[must_use]
    pub fn orchestrator(&self) -> &RunOrchestrator {
        &self.orchestrator
    }

    // ---- profiles ----

    pub async fn create_profile(&self, request: CreateProfileRequest) -> AxmResult<AgentProfile> {
        validate_profile_request(&request)?;
        let profile = AgentProfile::from_request(
            ProfileId::from_uuid(self.ids.new_id()),
            request,
            self.clock.now(),
        );
        validate_profile(&profile)?;
        self.repo.create_profile(profile.clone()).await?;
        info!(profile_id = %profile.id, name = %profile.name, runner = %profile.runner_type, "profile created");
        Ok(profile)
    }

    pub async fn get_profile(&self, id: ProfileId) -> AxmResult<AgentProfile> {
        self.repo.get_profile(id).await
    }

    pub async fn list_profiles(&self) -> AxmResult<Vec<AgentProfile>> {
        self.repo.list_profiles().await
    }

    /// Partial update; the result is validated as a whole
    pub async fn update_profile(
        &self,
        id: ProfileId,
        update: UpdateProfileRequest,
    ) -> AxmResult<AgentProfile> {
        let mut profile = self.repo.get_profile(id).await?;
        profile.apply_update(update, self.clock.now());
        validate_profile(&profile)?;
        self.repo.update_profile(profile.clone()).await?;
        info!(profile_id = %id, "profile updated");
        Ok(profile)
    }

    /// Delete a profile no active run uses
    pub async fn delete_profile(&self, id: ProfileId) -> AxmResult<()> {
        self.repo.get_profile(id).await?;
        let filter = RunFilter {
            agent_profile_id: Some(id),
            ..RunFilter::active()
        };
        if !self.repo.list_runs(&filter).await?.is_empty() {
            return Err(StateError::new("profile", "in_use", "delete", "an active run uses this profile").into());
        }
        self.repo.delete_profile(id).await?;
        info!(profile_id = %id, "profile deleted");
        Ok(())
    }

    // ---- tasks ----

    pub async fn create_task(&self, request: CreateTaskRequest) -> AxmResult<Task> {
        validate_task_request(&request)?;
        let task = Task::from_request(TaskId::from_uuid(self.ids.new_id()), request, self.clock.now());
        validate_task(&task)?;
        self.repo.create_task(task.clone()).await?;
        info!(task_id = %task.id, scope = %task.scope_path, "task created");
        Ok(task)
    }

    pub async fn get_task(&self, id: TaskId) -> AxmResult<Task> {
        self.repo.get_task(id).await
    }

    pub async fn list_tasks(&self) -> AxmResult<Vec<Task>> {
        self.repo.list_tasks().await
    }

    /// Partial update; the result is validated as a whole
    pub async fn update_task(&self, id: TaskId, update: UpdateTaskRequest) -> AxmResult<Task> {
        if let Some(title) = &update.title {
            validate_name("title", title)?;
        }
        let mut task = self.repo.get_task(id).await?;
        task.apply_update(update, self.clock.now());
        validate_task(&task)?;
        self.repo.update_task(task.clone()).await?;
        info!(task_id = %id, "task updated");
        Ok(task)
    }

    /// Delete a task with no active run
    pub async fn delete_task(&self, id: TaskId) -> AxmResult<()> {
        self.repo.get_task(id).await?;
        let filter = RunFilter {
            task_id: Some(id),
            ..RunFilter::active()
        };
        if !self.repo.list_runs(&filter).await?.is_empty() {
            return Err(StateError::new("task", "in_use", "delete", "the task has an active run").into());
        }
        self.repo.delete_task(id).await?;
        info!(task_id = %id, "task deleted");
        Ok(())
    }

    // ---- runs ----

    pub async fn start_run(&self, task_id: TaskId, profile_id: ProfileId) -> AxmResult<Run> {
        self.orchestrator
            .start_run(task_id, profile_id, StartRunOptions::default())
            .await
    }

    /// Start, waiting for conflicting scope locks up to the configured bound
    pub async fn start_run_queued(&self, task_id: TaskId, profile_id: ProfileId) -> AxmResult<Run> {
        self.orchestrator
            .start_run(task_id, profile_id, StartRunOptions::queued())
            .await
    }

    pub async fn cancel_run(&self, run_id: RunId) -> AxmResult<Run> {
        self.orchestrator.cancel_run(run_id).await
    }

    pub async fn approve_run(&self, run_id: RunId, by: &str) -> AxmResult<Run> {
        self.orchestrator.approve_run(run_id, by).await
    }

    pub async fn reject_run(&self, run_id: RunId, by: &str) -> AxmResult<Run> {
        self.orchestrator.reject_run(run_id, by).await
    }

    pub async fn partially_approve_run(&self, run_id: RunId, by: &str) -> AxmResult<Run> {
        self.orchestrator.partially_approve_run(run_id, by).await
    }

    pub async fn retry_run(&self, run_id: RunId) -> AxmResult<Run> {
        self.orchestrator.retry_run(run_id).await
    }

    pub async fn continue_run(&self, run_id: RunId) -> AxmResult<Run> {
        self.orchestrator.continue_run(run_id).await
    }

    pub async fn delete_run(&self, run_id: RunId) -> AxmResult<()> {
        self.orchestrator.delete_run(run_id).await
    }

    pub async fn get_run(&self, run_id: RunId) -> AxmResult<Run> {
        self.orchestrator.get_run(run_id).await
    }

    pub async fn list_runs(&self, filter: &RunFilter) -> AxmResult<Vec<Run>> {
        self.orchestrator.list_runs(filter).await
    }

    pub async fn list_events(
        &self,
        run_id: RunId,
        from_sequence: u64,
        limit: usize,
    ) -> AxmResult<Vec<RunEvent>> {
        self.orchestrator.list_events(run_id, from_sequence, limit).await
    }

    #[must_use]
    pub fn replay_events(
        &self,
        run_id: RunId,
        from_sequence: u64,
    ) -> BoxStream<'static, AxmResult<RunEvent>> {
        self.orchestrator.replay_events(run_id, from_sequence)
    }

    pub async fn get_run_actions(&self, run_id: RunId) -> AxmResult<RunActions> {
        self.orchestrator.get_run_actions(run_id).await
    }

    pub async fn get_metrics(&self, run_id: RunId) -> AxmResult<RunSummary> {
        self.orchestrator.get_metrics(run_id).await
    }

    pub async fn watch_run(&self, run_id: RunId) -> AxmResult<watch::Receiver<RunStatus>> {
        self.orchestrator.watch_run(run_id).await
    }

    pub async fn wait_for_status<P>(
        &self,
        run_id: RunId,
        predicate: P,
        timeout: Duration,
    ) -> AxmResult<Run>
    where
        P: Fn(RunStatus) -> bool + Send,
    {
        self.orchestrator
            .wait_for_status(run_id, predicate, timeout)
            .await
    }

    #[must_use]
    pub fn active_scopes(&self) -> Vec<ScopeHolder> {
        self.orchestrator.active_scopes()
    }

    // ---- tools ----

    pub fn register_tool_provider(&self, provider: Arc<dyn ToolProvider>) {
        self.tools.register(provider);
    }

    pub fn get_manifest(&self, scenario: &str) -> AxmResult<ToolManifest> {
        self.tools.get_manifest(scenario, self.clock.now())
    }

    pub async fn call_tool(&self, request: ToolCallRequest) -> AxmResult<ToolCallOutcome> {
        self.tools.call_tool(request, self.clock.now()).await
    }

    #[must_use]
    pub fn pending_tool_calls(&self) -> Vec<PendingToolCall> {
        self.tools.pending_calls()
    }

    pub async fn approve_tool_call(&self, call_id: Uuid) -> AxmResult<ToolResult> {
        self.tools.approve_call(call_id).await
    }

    pub fn reject_tool_call(&self, call_id: Uuid) -> AxmResult<ToolResult> {
        self.tools.reject_call(call_id)
    }

    /// Upsert a per-chat or global tool configuration
    pub async fn configure_tool(&self, mut configuration: ToolConfiguration) -> AxmResult<()> {
        validate_name("toolName", &configuration.tool_name)?;
        configuration.updated_at = self.clock.now();
        info!(
            scenario = %configuration.scenario,
            tool = %configuration.tool_name,
            chat_id = ?configuration.chat_id,
            enabled = configuration.enabled,
            "tool configuration updated"
        );
        self.repo.upsert_tool_configuration(configuration).await
    }
}
