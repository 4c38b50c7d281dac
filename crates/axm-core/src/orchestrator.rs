//! Run orchestrator
//!
//! One worker task per active run drives it through its phases: sandbox
//! provisioning, prompt assembly, runner invocation, review and finalize.
//! Every mutation of a run row goes through a per-run async mutex, so the
//! worker and API calls never race on the same run.
//!
//! The worker ingests runner events from a bounded channel while watching
//! the cancel token, the heartbeat deadline and the wall-time deadline.
//! Scope locks are released whenever a run leaves the active set.

use crate::capabilities::{
    Clock, IdSource, Repository, Runner, RunnerOutcome, RunnerRegistry, RunSpec, SandboxProvider,
    SandboxSpec,
};
use crate::config::ManagerConfig;
use crate::event_stream::EventStream;
use crate::scope_lock::ScopeLockManager;
use axm_context::format_context;
use axm_events::summarize_run;
use axm_policy::{
    approve, get_run_actions, partially_approve, reject, transition, Action, ActionContext,
    Decision, RunActions,
};
use axm_types::validation::{validate_compatibility, validate_profile, validate_task};
use axm_types::{
    invariants, AgentProfile, ApprovalState, AxmError, AxmResult, EventPayload, ProfileId, Run,
    RunEvent, RunFilter, RunId, RunPhase, RunStatus, RunSummary, SandboxError, ScopeHolder,
    ScopePath, StateError, Task, TaskId, TaskStatus, ValidationError, HEARTBEAT_TIMEOUT_MSG,
    WALL_TIMEOUT_MSG,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Error message of a run cancelled on request
pub const CANCELLED_MSG: &str = "cancelled";

/// Extra wait on top of the cancel acknowledgement bound before a cancel is forced
const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// Options for starting a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartRunOptions {
    /// Wait for conflicting scope locks instead of failing
    pub queue_on_conflict: bool,
}

impl StartRunOptions {
    /// Queue behind conflicting locks
    #[inline]
    #[must_use]
    pub fn queued() -> Self {
        Self {
            queue_on_conflict: true,
        }
    }
}

struct ActiveRun {
    cancel: CancellationToken,
    cancel_reason: Mutex<Option<String>>,
    status: watch::Sender<RunStatus>,
    worker_done: AtomicBool,
}

impl ActiveRun {
    fn new(status: RunStatus) -> Self {
        let (status, _) = watch::channel(status);
        Self {
            cancel: CancellationToken::new(),
            cancel_reason: Mutex::new(None),
            status,
            worker_done: AtomicBool::new(false),
        }
    }
}

enum Ingest {
    Finished(RunnerOutcome),
    Stopped,
}

/// Why a worker stopped waiting on the runner or the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Halt {
    Cancelled,
    WallTime,
    Silent,
}

enum Gate<T> {
    Done(T),
    Halted(Halt),
}

/// Owner of the run lifecycle
#[derive(Clone)]
pub struct RunOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RunOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOrchestrator")
            .field("active_runs", &self.inner.active.len())
            .field("runners", &self.inner.runners)
            .finish_non_exhaustive()
    }
}

struct Inner {
    repo: Arc<dyn Repository>,
    sandboxes: Option<Arc<dyn SandboxProvider>>,
    runners: RunnerRegistry,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    config: ManagerConfig,
    actions: ActionContext,
    locks: ScopeLockManager,
    events: EventStream,
    active: DashMap<RunId, Arc<ActiveRun>>,
    guards: DashMap<RunId, Arc<tokio::sync::Mutex<()>>>,
}

impl RunOrchestrator {
    /// Create orchestrator; fails on invalid configuration
    pub fn new(
        repo: Arc<dyn Repository>,
        sandboxes: Option<Arc<dyn SandboxProvider>>,
        runners: RunnerRegistry,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
        config: ManagerConfig,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        let actions = ActionContext::new(config.allowlist()?);
        let events = EventStream::new(
            Arc::clone(&repo),
            Arc::clone(&clock),
            Arc::clone(&ids),
            config.replay_page_size,
        );
        Ok(Self {
            inner: Arc::new(Inner {
                repo,
                sandboxes,
                runners,
                clock,
                ids,
                config,
                actions,
                locks: ScopeLockManager::new(),
                events,
                active: DashMap::new(),
                guards: DashMap::new(),
            }),
        })
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Action-policy context in use
    #[must_use]
    pub fn action_context(&self) -> &ActionContext {
        &self.inner.actions
    }

    /// Create a run of `task_id` under `profile_id` and start its worker
    ///
    /// Returns the pending run. Fails without creating a row on validation
    /// errors and scope conflicts.
    pub async fn start_run(
        &self,
        task_id: TaskId,
        profile_id: ProfileId,
        options: StartRunOptions,
    ) -> AxmResult<Run> {
        self.launch(task_id, profile_id, None, options).await
    }

    async fn launch(
        &self,
        task_id: TaskId,
        profile_id: ProfileId,
        session: Option<String>,
        options: StartRunOptions,
    ) -> AxmResult<Run> {
        let inner = &self.inner;
        let task = inner.repo.get_task(task_id).await?;
        let profile = inner.repo.get_profile(profile_id).await?;
        validate_task(&task)?;
        validate_profile(&profile)?;
        validate_compatibility(&task, &profile)?;
        inner.runners.get(profile.runner_type)?;
        let scope = ScopePath::parse(&task.scope_path)?;

        let run_id = RunId::from_uuid(inner.ids.new_id());
        let now = inner.clock.now();
        if options.queue_on_conflict {
            inner
                .locks
                .acquire_queued(
                    run_id,
                    &scope,
                    now,
                    inner.repo.as_ref(),
                    inner.config.scope_queue_timeout(),
                )
                .await?;
        } else {
            inner
                .locks
                .acquire(run_id, &scope, now, inner.repo.as_ref())
                .await?;
        }

        let mut run = Run::pending(run_id, &task, &profile, inner.clock.now());
        if let Some(session_id) = &session {
            run.session_id.clone_from(session_id);
        }
        if let Err(err) = inner.repo.create_run(run.clone()).await {
            inner.locks.release(run_id);
            return Err(err);
        }
        inner.locks.confirm(run_id);

        let active = Arc::new(ActiveRun::new(run.status));
        inner.active.insert(run_id, Arc::clone(&active));
        info!(
            run_id = %run_id,
            task_id = %task.id,
            profile = %profile.name,
            runner = %profile.runner_type,
            scope = %scope,
            "run created"
        );
        inner.sync_task(&run).await;

        let worker = Arc::clone(inner);
        tokio::spawn(async move {
            worker.drive(run_id, task, profile, session, active).await;
        });
        Ok(run)
    }

    /// Cancel a non-terminal run
    ///
    /// The worker forwards the cancel to the runner and waits a bounded time
    /// for its acknowledgement; past that the run is cancelled regardless.
    pub async fn cancel_run(&self, run_id: RunId) -> AxmResult<Run> {
        let inner = &self.inner;
        let run = inner.repo.get_run(run_id).await?;
        if run.status.is_terminal() {
            return Err(StateError::new("run", run.status, "cancel", "run already finished").into());
        }
        info!(run_id = %run_id, status = %run.status, "cancel requested");

        let active = inner.active.get(&run_id).map(|a| Arc::clone(a.value()));
        match active {
            Some(active) if !active.worker_done.load(Ordering::SeqCst) => {
                *active.cancel_reason.lock() = Some(CANCELLED_MSG.to_string());
                let mut status = active.status.subscribe();
                active.cancel.cancel();
                let bound = inner.config.cancel_ack_timeout() + CANCEL_GRACE;
                let stopped = tokio::time::timeout(bound, status.wait_for(|s| s.is_terminal()))
                    .await
                    .map(|r| r.is_ok())
                    .unwrap_or(false);
                if !stopped {
                    warn!(run_id = %run_id, "worker did not stop in time; forcing cancellation");
                    inner.force_cancel(run_id).await?;
                }
            }
            _ => inner.force_cancel(run_id).await?,
        }
        inner.repo.get_run(run_id).await
    }

    /// Approve a run awaiting review; repeating it is a no-op
    pub async fn approve_run(&self, run_id: RunId, by: &str) -> AxmResult<Run> {
        let by = by.to_string();
        let run = self
            .inner
            .apply(run_id, "approved", move |run, now| {
                if approve(run, &by, now)? == Decision::Applied {
                    finalize_phase(run)?;
                }
                Ok(())
            })
            .await?;
        if run.status.is_terminal() {
            self.inner.release(&run).await;
        }
        Ok(run)
    }

    /// Reject a run awaiting review; it completes with a rejected decision
    pub async fn reject_run(&self, run_id: RunId, by: &str) -> AxmResult<Run> {
        let by = by.to_string();
        let run = self
            .inner
            .apply(run_id, "rejected", move |run, now| {
                if reject(run, &by, now)? == Decision::Applied {
                    finalize_phase(run)?;
                }
                Ok(())
            })
            .await?;
        if run.status.is_terminal() {
            self.inner.release(&run).await;
        }
        Ok(run)
    }

    /// Record a partial approval; the run stays in review
    pub async fn partially_approve_run(&self, run_id: RunId, by: &str) -> AxmResult<Run> {
        let by = by.to_string();
        self.inner
            .apply(run_id, "partially approved", move |run, now| {
                partially_approve(run, &by, now)?;
                Ok(())
            })
            .await
    }

    /// Start a fresh run of the same task and profile
    pub async fn retry_run(&self, run_id: RunId) -> AxmResult<Run> {
        let run = self.require(run_id, Action::Retry).await?;
        info!(run_id = %run_id, "retrying run");
        self.launch(run.task_id, run.agent_profile_id, None, StartRunOptions::default())
            .await
    }

    /// Start a run resuming the runner session of `run_id`
    pub async fn continue_run(&self, run_id: RunId) -> AxmResult<Run> {
        let run = self.require(run_id, Action::Continue).await?;
        info!(run_id = %run_id, session_id = %run.session_id, "continuing run");
        self.launch(
            run.task_id,
            run.agent_profile_id,
            Some(run.session_id),
            StartRunOptions::default(),
        )
        .await
    }

    /// Delete a run that is not in progress
    pub async fn delete_run(&self, run_id: RunId) -> AxmResult<()> {
        let run = self.require(run_id, Action::Delete).await?;
        if retains_sandbox(&run) {
            if let Some(sandbox_id) = &run.sandbox_id {
                self.inner.destroy_sandbox(run_id, sandbox_id).await;
            }
        }
        self.inner.retire(run_id);
        self.inner.repo.delete_run(run_id).await?;
        info!(run_id = %run_id, "run deleted");
        Ok(())
    }

    async fn require(&self, run_id: RunId, action: Action) -> AxmResult<Run> {
        let run = self.inner.repo.get_run(run_id).await?;
        get_run_actions(&run, &self.inner.actions).require(&run, action)?;
        Ok(run)
    }

    /// Fetch a run
    pub async fn get_run(&self, run_id: RunId) -> AxmResult<Run> {
        self.inner.repo.get_run(run_id).await
    }

    /// Runs matching `filter`, oldest first
    pub async fn list_runs(&self, filter: &RunFilter) -> AxmResult<Vec<Run>> {
        self.inner.repo.list_runs(filter).await
    }

    /// One page of a run's events
    pub async fn list_events(
        &self,
        run_id: RunId,
        from_sequence: u64,
        limit: usize,
    ) -> AxmResult<Vec<RunEvent>> {
        self.inner.repo.get_run(run_id).await?;
        self.inner
            .repo
            .list_events(run_id, from_sequence.max(1), limit)
            .await
    }

    /// Lazy replay of a run's events
    #[must_use]
    pub fn replay_events(&self, run_id: RunId, from_sequence: u64) -> BoxStream<'static, AxmResult<RunEvent>> {
        self.inner.events.replay(run_id, from_sequence)
    }

    /// Permission vector of a run
    pub async fn get_run_actions(&self, run_id: RunId) -> AxmResult<RunActions> {
        let run = self.inner.repo.get_run(run_id).await?;
        Ok(get_run_actions(&run, &self.inner.actions))
    }

    /// Summary statistics over a run's persisted events
    pub async fn get_metrics(&self, run_id: RunId) -> AxmResult<RunSummary> {
        self.inner.repo.get_run(run_id).await?;
        self.inner.repo.get_metrics(run_id).await
    }

    /// Status subscription; finished runs yield a receiver fixed at their final status
    pub async fn watch_run(&self, run_id: RunId) -> AxmResult<watch::Receiver<RunStatus>> {
        if let Some(active) = self.inner.active.get(&run_id) {
            return Ok(active.status.subscribe());
        }
        let run = self.inner.repo.get_run(run_id).await?;
        Ok(watch::channel(run.status).1)
    }

    /// Wait until the run's status satisfies `predicate`
    pub async fn wait_for_status<P>(
        &self,
        run_id: RunId,
        predicate: P,
        timeout: Duration,
    ) -> AxmResult<Run>
    where
        P: Fn(RunStatus) -> bool + Send,
    {
        let mut status = self.watch_run(run_id).await?;
        let reached = tokio::time::timeout(timeout, status.wait_for(|s| predicate(*s)))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);
        let run = self.inner.repo.get_run(run_id).await?;
        if reached || predicate(run.status) {
            Ok(run)
        } else {
            Err(StateError::new(
                "run",
                run.status,
                "wait",
                format!("status not reached within {}ms", timeout.as_millis()),
            )
            .into())
        }
    }

    /// Current scope lock holders
    #[must_use]
    pub fn active_scopes(&self) -> Vec<ScopeHolder> {
        self.inner.locks.holders()
    }
}

/// Sandboxes are kept while a review is open and after a run is accepted
fn retains_sandbox(run: &Run) -> bool {
    match run.status {
        RunStatus::NeedsReview => true,
        RunStatus::Complete => run.approval_state != ApprovalState::Rejected,
        _ => false,
    }
}

fn finalize_phase(run: &mut Run) -> Result<(), StateError> {
    if run.status == RunStatus::Complete && run.phase == RunPhase::Review {
        invariants::check_phase_advance(run.phase, RunPhase::Finalize)?;
        run.phase = RunPhase::Finalize;
    }
    Ok(())
}

fn advance_phase(run: &mut Run, to: RunPhase) -> Result<(), StateError> {
    invariants::check_phase_advance(run.phase, to)?;
    run.phase = to;
    Ok(())
}

fn apply_outcome(run: &mut Run, outcome: &RunnerOutcome) {
    run.exit_code = outcome.exit_code;
    if !outcome.session_id.is_empty() {
        run.session_id.clone_from(&outcome.session_id);
    }
    run.diff_path.clone_from(&outcome.diff_path);
    run.log_path.clone_from(&outcome.log_path);
    run.changed_files = outcome.changed_files;
    run.total_size_bytes = outcome.total_size_bytes;
}

/// Short reason stored on the run; the event log keeps the full cause
fn failure_reason(err: &AxmError) -> String {
    match err {
        AxmError::Runner(e) => format!("runner {} failed during {}", e.runner_type, e.operation),
        AxmError::Sandbox(e) => format!("sandbox {} failed", e.operation),
        other => other.to_string(),
    }
}

fn cause_chain(err: &(dyn std::error::Error + 'static)) -> Option<String> {
    let mut causes = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    (!causes.is_empty()).then(|| causes.join(": "))
}

impl Inner {
    fn guard(&self, run_id: RunId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.guards.entry(run_id).or_default().value())
    }

    /// Serialized read-modify-write of one run row
    ///
    /// Changes are discarded unless the terminal-immutability and at-rest
    /// invariants hold afterwards.
    async fn mutate_run<T, F>(&self, run_id: RunId, f: F) -> AxmResult<(Run, T)>
    where
        F: FnOnce(&mut Run) -> AxmResult<T> + Send,
        T: Send,
    {
        let guard = self.guard(run_id);
        let held = guard.lock().await;
        let before = self.repo.get_run(run_id).await?;
        let mut run = before.clone();
        let value = f(&mut run)?;
        if run == before {
            return Ok((run, value));
        }
        invariants::check_terminal_mutation(&before, &run)?;
        if let Err(err) = invariants::check_run(&run) {
            debug!(run_id = %run_id, error = %err, "invariant violated; mutation discarded");
            return Err(err.into());
        }
        self.repo.update_run(run.clone()).await?;
        if let Some(active) = self.active.get(&run_id) {
            active.status.send_replace(run.status);
        }
        drop(held);
        self.sync_task(&run).await;
        Ok((run, value))
    }

    /// Mutate a run and log plus record any status change
    async fn apply<F>(&self, run_id: RunId, reason: &str, f: F) -> AxmResult<Run>
    where
        F: FnOnce(&mut Run, DateTime<Utc>) -> AxmResult<()> + Send,
    {
        let now = self.clock.now();
        let (run, from) = self
            .mutate_run(run_id, move |run| {
                let from = run.status;
                f(run, now)?;
                Ok(from)
            })
            .await?;
        if run.status != from {
            info!(run_id = %run_id, from = %from, to = %run.status, reason, "run status changed");
            if let Err(err) = self
                .events
                .append(run_id, EventPayload::status(from, run.status, reason))
                .await
            {
                warn!(run_id = %run_id, error = %err, "status event not recorded");
            }
        }
        Ok(run)
    }

    /// Mirror the latest run's status onto its task
    async fn sync_task(&self, run: &Run) {
        let result: AxmResult<()> = async {
            let runs = self.repo.list_runs(&RunFilter::for_task(run.task_id)).await?;
            if runs.last().map(|r| r.id) != Some(run.id) {
                return Ok(());
            }
            let mut task = self.repo.get_task(run.task_id).await?;
            let status = TaskStatus::from_run(run.status, run.approval_state);
            if task.status != status {
                task.status = status;
                task.updated_at = self.clock.now();
                self.repo.update_task(task).await?;
            }
            Ok(())
        }
        .await;
        if let Err(err) = result {
            warn!(run_id = %run.id, task_id = %run.task_id, error = %err, "task status not synced");
        }
    }

    async fn summary_of(&self, run_id: RunId) -> Option<RunSummary> {
        match self.events.collect(run_id).await {
            Ok(events) => Some(summarize_run(&events)),
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "run summary unavailable");
                None
            }
        }
    }

    /// Move a run to a terminal status with its summary
    async fn finish(
        &self,
        run_id: RunId,
        to: RunStatus,
        error_msg: &str,
        outcome: Option<RunnerOutcome>,
    ) -> AxmResult<Run> {
        let summary = self.summary_of(run_id).await;
        let message = error_msg.to_string();
        let reason = if error_msg.is_empty() { to.as_str() } else { error_msg };
        self.apply(run_id, reason, move |run, now| {
            if let Some(outcome) = &outcome {
                apply_outcome(run, outcome);
            }
            run.summary = summary;
            run.error_msg = message;
            transition(run, to, now)?;
            Ok(())
        })
        .await
    }

    async fn force_cancel(&self, run_id: RunId) -> AxmResult<()> {
        match self.finish(run_id, RunStatus::Cancelled, CANCELLED_MSG, None).await {
            Ok(run) => {
                self.release(&run).await;
                Ok(())
            }
            Err(AxmError::State(err)) => {
                if self.repo.get_run(run_id).await?.status.is_terminal() {
                    Ok(())
                } else {
                    Err(err.into())
                }
            }
            Err(err) => Err(err),
        }
    }

    async fn drive(
        self: Arc<Self>,
        run_id: RunId,
        task: Task,
        profile: AgentProfile,
        session: Option<String>,
        active: Arc<ActiveRun>,
    ) {
        if let Err(err) = self.execute(run_id, &task, &profile, session, &active).await {
            error!(run_id = %run_id, kind = %err.kind(), error = %err, "run execution failed");
            let payload = EventPayload::error(err.to_string(), cause_chain(&err));
            if let Err(append_err) = self.events.append(run_id, payload).await {
                warn!(run_id = %run_id, error = %append_err, "failure cause not recorded");
            }
            if let Err(finish_err) = self
                .finish(run_id, RunStatus::Failed, &failure_reason(&err), None)
                .await
            {
                warn!(run_id = %run_id, error = %finish_err, "run failure not recorded");
            }
        }
        active.worker_done.store(true, Ordering::SeqCst);
        self.settle(run_id).await;
    }

    /// Await `work` unless the run is cancelled, out of wall time or,
    /// when `heartbeat` is set, silent for that long
    async fn gated<T>(
        &self,
        active: &ActiveRun,
        wall_deadline: Instant,
        heartbeat: Option<Duration>,
        work: impl Future<Output = T>,
    ) -> Gate<T> {
        let wall_left = wall_deadline.saturating_duration_since(self.clock.monotonic());
        let silence = async {
            match heartbeat {
                Some(limit) => self.clock.sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            () = active.cancel.cancelled() => Gate::Halted(Halt::Cancelled),
            out = work => Gate::Done(out),
            () = self.clock.sleep(wall_left) => Gate::Halted(Halt::WallTime),
            () = silence => Gate::Halted(Halt::Silent),
        }
    }

    /// End a run the worker stopped waiting on
    async fn halt(
        &self,
        run_id: RunId,
        profile: &AgentProfile,
        active: &ActiveRun,
        halt: Halt,
        runner: Option<&Arc<dyn Runner>>,
    ) -> AxmResult<()> {
        match halt {
            Halt::Cancelled => self.cancel_path(run_id, active, runner).await,
            Halt::WallTime => {
                warn!(run_id = %run_id, timeout_secs = profile.timeout_secs, "run exceeded its wall time");
                if let Some(runner) = runner {
                    self.stop_runner(run_id, runner).await;
                }
                self.finish(run_id, RunStatus::Cancelled, WALL_TIMEOUT_MSG, None).await?;
                Ok(())
            }
            Halt::Silent => {
                warn!(run_id = %run_id, limit = ?self.config.heartbeat_limit(), "runner went silent");
                if let Some(runner) = runner {
                    self.stop_runner(run_id, runner).await;
                }
                self.finish(run_id, RunStatus::Failed, HEARTBEAT_TIMEOUT_MSG, None).await?;
                Ok(())
            }
        }
    }

    async fn execute(
        &self,
        run_id: RunId,
        task: &Task,
        profile: &AgentProfile,
        session: Option<String>,
        active: &ActiveRun,
    ) -> AxmResult<()> {
        let wall_deadline = self.clock.monotonic() + profile.timeout();

        // provision
        let sandbox_id = if profile.requires_sandbox {
            let provider = self.sandboxes.as_ref().ok_or_else(|| {
                SandboxError::new(None, "provision", "no sandbox provider configured")
            })?;
            let spec = SandboxSpec {
                run_id,
                scope_path: task.scope_path.clone(),
                project_root: task.project_root.clone(),
            };
            let sandbox_id = match self
                .gated(active, wall_deadline, None, provider.provision(&spec))
                .await
            {
                Gate::Done(provisioned) => provisioned?,
                Gate::Halted(halt) => return self.halt(run_id, profile, active, halt, None).await,
            };
            info!(run_id = %run_id, sandbox_id = %sandbox_id, "sandbox provisioned");
            Some(sandbox_id)
        } else {
            None
        };
        let attached = sandbox_id.clone();
        if let Err(err) = self
            .apply(run_id, "provisioned", move |run, now| {
                run.sandbox_id = attached;
                transition(run, RunStatus::Starting, now)?;
                Ok(())
            })
            .await
        {
            if let Some(id) = &sandbox_id {
                self.destroy_sandbox(run_id, id).await;
            }
            return Err(err);
        }
        if active.cancel.is_cancelled() {
            return self.cancel_path(run_id, active, None).await;
        }

        // prompt assembly
        self.apply(run_id, "prompt assembly", |run, _| {
            advance_phase(run, RunPhase::PromptAssembly)?;
            Ok(())
        })
        .await?;
        let prompt = format_context(&task.description, &task.context_attachments);
        self.events
            .append(
                run_id,
                EventPayload::log(
                    "info",
                    format!(
                        "prompt assembled with {} context attachment(s)",
                        task.context_attachments.len()
                    ),
                ),
            )
            .await?;

        // invocation
        self.apply(run_id, "invocation", |run, _| {
            advance_phase(run, RunPhase::Invocation)?;
            Ok(())
        })
        .await?;
        let runner = self.runners.get(profile.runner_type)?;
        let spec = RunSpec {
            run_id,
            runner_type: profile.runner_type,
            prompt,
            model: profile.model.clone(),
            allowed_tools: profile.allowed_tools.clone(),
            denied_tools: profile.denied_tools.clone(),
            timeout: profile.timeout(),
            max_turns: profile.max_turns,
            sandbox_id,
            working_dir: if task.project_root.is_empty() {
                task.scope_path.clone()
            } else {
                task.project_root.clone()
            },
            session_id: session,
        };
        let (sender, mut events) = mpsc::channel(self.config.event_channel_capacity);
        let heartbeat = Some(self.config.heartbeat_limit());
        let started = match self
            .gated(active, wall_deadline, heartbeat, runner.start(spec, sender))
            .await
        {
            Gate::Done(started) => started?,
            Gate::Halted(halt) => {
                return self.halt(run_id, profile, active, halt, Some(&runner)).await;
            }
        };
        let session_id = started.session_id.clone();
        self.apply(run_id, "runner started", move |run, now| {
            if !session_id.is_empty() {
                run.session_id = session_id;
            }
            transition(run, RunStatus::Running, now)?;
            Ok(())
        })
        .await?;

        let outcome = match self
            .ingest(
                run_id,
                profile,
                &runner,
                started.termination,
                &mut events,
                active,
                wall_deadline,
            )
            .await?
        {
            Ingest::Finished(outcome) => outcome,
            Ingest::Stopped => return Ok(()),
        };
        self.complete(run_id, profile, outcome).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn ingest(
        &self,
        run_id: RunId,
        profile: &AgentProfile,
        runner: &Arc<dyn Runner>,
        mut termination: BoxFuture<'static, RunnerOutcome>,
        events: &mut mpsc::Receiver<EventPayload>,
        active: &ActiveRun,
        wall_deadline: Instant,
    ) -> AxmResult<Ingest> {
        let heartbeat = self.config.heartbeat_limit();
        let mut last_seen = self.clock.monotonic();
        let mut channel_open = true;

        loop {
            let now = self.clock.monotonic();
            let silence_left = heartbeat.saturating_sub(now.saturating_duration_since(last_seen));
            let wall_left = wall_deadline.saturating_duration_since(now);

            let halt = tokio::select! {
                biased;
                () = active.cancel.cancelled() => Halt::Cancelled,
                received = events.recv(), if channel_open => {
                    match received {
                        Some(payload) => {
                            last_seen = self.clock.monotonic();
                            if self.ingest_event(run_id, payload, active).await? {
                                return Ok(Ingest::Stopped);
                            }
                        }
                        None => channel_open = false,
                    }
                    continue;
                }
                outcome = &mut termination => {
                    while let Ok(payload) = events.try_recv() {
                        if self.ingest_event(run_id, payload, active).await? {
                            return Ok(Ingest::Stopped);
                        }
                    }
                    return Ok(Ingest::Finished(outcome));
                }
                () = self.clock.sleep(silence_left) => Halt::Silent,
                () = self.clock.sleep(wall_left) => Halt::WallTime,
            };
            self.halt(run_id, profile, active, halt, Some(runner)).await?;
            return Ok(Ingest::Stopped);
        }
    }

    /// Record one runner event; `true` when the runner ended the run itself
    async fn ingest_event(
        &self,
        run_id: RunId,
        payload: EventPayload,
        active: &ActiveRun,
    ) -> AxmResult<bool> {
        let current = *active.status.borrow();
        if let Err(err) = invariants::check_heartbeat(current) {
            debug!(run_id = %run_id, error = %err, "runner event ignored");
            return Ok(false);
        }

        let target = payload.target_status();
        let event = self.events.append(run_id, payload).await?;
        match target {
            Some(to @ (RunStatus::Failed | RunStatus::Cancelled)) => {
                let reason = match &event.data {
                    EventPayload::Status { reason, .. } if !reason.is_empty() => reason.clone(),
                    _ => format!("runner reported {to}"),
                };
                info!(run_id = %run_id, to = %to, "runner ended the run");
                self.finish(run_id, to, &reason, None).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(
        &self,
        run_id: RunId,
        profile: &AgentProfile,
        outcome: RunnerOutcome,
    ) -> AxmResult<()> {
        if let Some(reason) = outcome.failure() {
            error!(run_id = %run_id, exit_code = ?outcome.exit_code, reason = %reason, "runner failed");
            self.events
                .append(run_id, EventPayload::error(reason.clone(), None))
                .await?;
            self.finish(run_id, RunStatus::Failed, &reason, Some(outcome)).await?;
            return Ok(());
        }

        let summary = self.summary_of(run_id).await;
        let requires_approval = profile.requires_approval;
        let run = self
            .apply(run_id, "runner finished", move |run, now| {
                apply_outcome(run, &outcome);
                run.summary = summary;
                advance_phase(run, RunPhase::Review)?;
                if requires_approval && run.has_changes() {
                    transition(run, RunStatus::NeedsReview, now)?;
                } else {
                    advance_phase(run, RunPhase::Finalize)?;
                    transition(run, RunStatus::Complete, now)?;
                }
                Ok(())
            })
            .await?;
        if run.status == RunStatus::NeedsReview {
            info!(run_id = %run_id, changed_files = run.changed_files, "run awaiting review");
        }
        Ok(())
    }

    async fn cancel_path(
        &self,
        run_id: RunId,
        active: &ActiveRun,
        runner: Option<&Arc<dyn Runner>>,
    ) -> AxmResult<()> {
        if let Some(runner) = runner {
            self.stop_runner(run_id, runner).await;
        }
        let reason = active
            .cancel_reason
            .lock()
            .clone()
            .unwrap_or_else(|| CANCELLED_MSG.to_string());
        match self.finish(run_id, RunStatus::Cancelled, &reason, None).await {
            Ok(_) => Ok(()),
            Err(AxmError::State(err)) => {
                debug!(run_id = %run_id, error = %err, "run already left the active set");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn stop_runner(&self, run_id: RunId, runner: &Arc<dyn Runner>) {
        match tokio::time::timeout(self.config.cancel_ack_timeout(), runner.cancel(run_id)).await {
            Ok(Ok(())) => debug!(run_id = %run_id, "runner acknowledged cancel"),
            Ok(Err(err)) => warn!(run_id = %run_id, error = %err, "runner cancel failed"),
            Err(_) => warn!(run_id = %run_id, "runner did not acknowledge cancel in time"),
        }
    }

    /// Worker exit: release resources unless the run is parked in review
    async fn settle(&self, run_id: RunId) {
        match self.repo.get_run(run_id).await {
            Ok(run) if run.status.is_terminal() => self.release(&run).await,
            Ok(run) => {
                debug!(run_id = %run_id, status = %run.status, "worker done; scope lock kept for review");
            }
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "run unreadable at worker exit; releasing");
                self.retire(run_id);
            }
        }
    }

    /// Release everything a finished run holds
    async fn release(&self, run: &Run) {
        let owned = self.active.contains_key(&run.id);
        self.retire(run.id);
        if owned && !retains_sandbox(run) {
            if let Some(sandbox_id) = &run.sandbox_id {
                self.destroy_sandbox(run.id, sandbox_id).await;
            }
        }
    }

    fn retire(&self, run_id: RunId) {
        self.locks.release(run_id);
        self.events.forget(run_id);
        self.active.remove(&run_id);
        self.guards.remove(&run_id);
    }

    async fn destroy_sandbox(&self, run_id: RunId, sandbox_id: &str) {
        let Some(provider) = &self.sandboxes else {
            return;
        };
        match provider.destroy(sandbox_id).await {
            Ok(()) => debug!(run_id = %run_id, sandbox_id, "sandbox destroyed"),
            Err(err) => warn!(run_id = %run_id, sandbox_id, error = %err, "sandbox cleanup failed"),
        }
    }
}
