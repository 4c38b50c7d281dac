//! External capability interfaces
//!
//! The manager consumes these; it never implements storage, sandboxes or
//! runner processes itself.

use async_trait::async_trait;
use axm_tools::ToolConfigStore;
use axm_types::{
    AgentProfile, AxmResult, EventPayload, NotFoundError, ProfileId, Run, RunEvent, RunFilter,
    RunId, RunSummary, RunnerError, RunnerType, SandboxError, Task, TaskId,
};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

/// Persistent storage
///
/// Tool configurations live in the same store so every caller resolves them
/// with one precedence.
#[async_trait]
pub trait Repository: ToolConfigStore + Send + Sync {
    async fn create_profile(&self, profile: AgentProfile) -> AxmResult<()>;
    async fn get_profile(&self, id: ProfileId) -> AxmResult<AgentProfile>;
    async fn update_profile(&self, profile: AgentProfile) -> AxmResult<()>;
    async fn delete_profile(&self, id: ProfileId) -> AxmResult<()>;
    async fn list_profiles(&self) -> AxmResult<Vec<AgentProfile>>;

    async fn create_task(&self, task: Task) -> AxmResult<()>;
    async fn get_task(&self, id: TaskId) -> AxmResult<Task>;
    async fn update_task(&self, task: Task) -> AxmResult<()>;
    async fn delete_task(&self, id: TaskId) -> AxmResult<()>;
    async fn list_tasks(&self) -> AxmResult<Vec<Task>>;

    async fn create_run(&self, run: Run) -> AxmResult<()>;
    async fn get_run(&self, id: RunId) -> AxmResult<Run>;
    /// Linearizable single-row write
    async fn update_run(&self, run: Run) -> AxmResult<()>;
    async fn delete_run(&self, id: RunId) -> AxmResult<()>;
    /// Matching runs, oldest first
    async fn list_runs(&self, filter: &RunFilter) -> AxmResult<Vec<Run>>;

    async fn append_event(&self, event: RunEvent) -> AxmResult<()>;
    /// Up to `limit` events with `sequence >= from_sequence`, in order
    async fn list_events(
        &self,
        run_id: RunId,
        from_sequence: u64,
        limit: usize,
    ) -> AxmResult<Vec<RunEvent>>;
    async fn last_event(&self, run_id: RunId) -> AxmResult<Option<RunEvent>>;
    /// Summary statistics over the persisted events
    async fn get_metrics(&self, run_id: RunId) -> AxmResult<RunSummary>;
}

/// Sandbox request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSpec {
    pub run_id: RunId,
    pub scope_path: String,
    pub project_root: String,
}

/// Isolated workspace provisioner
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Returns the sandbox id
    async fn provision(&self, spec: &SandboxSpec) -> Result<String, SandboxError>;
    async fn destroy(&self, sandbox_id: &str) -> Result<(), SandboxError>;
}

/// Everything a runner needs to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub run_id: RunId,
    pub runner_type: RunnerType,
    pub prompt: String,
    pub model: String,
    pub allowed_tools: Vec<String>,
    pub denied_tools: Vec<String>,
    pub timeout: Duration,
    pub max_turns: u32,
    pub sandbox_id: Option<String>,
    pub working_dir: String,
    /// Prior session to resume
    pub session_id: Option<String>,
}

/// Final report of a runner
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerOutcome {
    pub exit_code: Option<i32>,
    /// Empty on success
    pub error_msg: String,
    pub session_id: String,
    pub diff_path: String,
    pub log_path: String,
    pub changed_files: u64,
    pub total_size_bytes: u64,
}

impl RunnerOutcome {
    /// Clean exit with code 0
    #[must_use]
    pub fn success() -> Self {
        Self {
            exit_code: Some(0),
            ..Self::default()
        }
    }

    /// Failure message, if the runner failed
    #[must_use]
    pub fn failure(&self) -> Option<String> {
        if !self.error_msg.is_empty() {
            Some(self.error_msg.clone())
        } else {
            match self.exit_code {
                Some(code) if code != 0 => Some(format!("runner exited with code {code}")),
                _ => None,
            }
        }
    }
}

/// A started runner
///
/// Events go to the sender handed to [`Runner::start`], all of them before
/// `termination` resolves.
pub struct RunnerSession {
    pub session_id: String,
    pub termination: BoxFuture<'static, RunnerOutcome>,
}

impl fmt::Debug for RunnerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerSession")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Agent runner transport
#[async_trait]
pub trait Runner: Send + Sync {
    fn runner_type(&self) -> RunnerType;

    /// Start a run; `events` is bounded, so sends apply backpressure
    async fn start(
        &self,
        spec: RunSpec,
        events: mpsc::Sender<EventPayload>,
    ) -> Result<RunnerSession, RunnerError>;

    /// Best-effort stop; `Ok` is the acknowledgement
    async fn cancel(&self, run_id: RunId) -> Result<(), RunnerError>;
}

impl fmt::Debug for dyn Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("runner_type", &self.runner_type())
            .finish_non_exhaustive()
    }
}

/// Runners by type
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    runners: HashMap<RunnerType, Arc<dyn Runner>>,
}

impl fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.runners.keys()).finish()
    }
}

impl RunnerRegistry {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the runner's own type
    pub fn register(&mut self, runner: Arc<dyn Runner>) {
        self.runners.insert(runner.runner_type(), runner);
    }

    /// Runner for `runner_type`
    pub fn get(&self, runner_type: RunnerType) -> Result<Arc<dyn Runner>, NotFoundError> {
        self.runners
            .get(&runner_type)
            .cloned()
            .ok_or_else(|| NotFoundError::new("runner", runner_type))
    }
}

/// Time source
///
/// Wall timestamps come from [`Clock::now`]; timers use the monotonic side so
/// tests can drive them with paused tokio time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn monotonic(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Identifier source
pub trait IdSource: Send + Sync {
    fn new_id(&self) -> Uuid;
}

/// Random v4 identifiers
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn new_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}
