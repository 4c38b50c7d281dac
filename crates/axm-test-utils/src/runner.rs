//! Scripted runner

use async_trait::async_trait;
use axm_core::{Runner, RunnerOutcome, RunnerSession, RunSpec};
use axm_types::{EventPayload, RunId, RunnerError, RunnerType};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One scripted runner action
#[derive(Debug, Clone)]
pub enum Step {
    Emit(EventPayload),
    Sleep(Duration),
    /// Go silent until cancelled
    Stall,
}

/// What one started run does
#[derive(Debug, Clone)]
pub struct Script {
    pub steps: Vec<Step>,
    pub outcome: RunnerOutcome,
    pub session_id: String,
    pub start_error: Option<String>,
    /// Start never returns
    pub hang_start: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            outcome: RunnerOutcome::success(),
            session_id: "session-1".into(),
            start_error: None,
            hang_start: false,
        }
    }
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script whose start call fails
    pub fn failing_start(message: &str) -> Self {
        Self {
            start_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Script whose start call never resolves
    pub fn hanging_start() -> Self {
        Self {
            hang_start: true,
            ..Self::default()
        }
    }

    pub fn emit(mut self, payload: EventPayload) -> Self {
        self.steps.push(Step::Emit(payload));
        self
    }

    pub fn sleep(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Sleep(duration));
        self
    }

    pub fn stall(mut self) -> Self {
        self.steps.push(Step::Stall);
        self
    }

    pub fn finish(mut self, outcome: RunnerOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = session_id.to_string();
        self
    }
}

/// Runner replaying queued scripts, one per start
#[derive(Debug)]
pub struct ScriptedRunner {
    runner_type: RunnerType,
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    ack_cancel: AtomicBool,
    started: Mutex<Vec<RunSpec>>,
    cancelled: Mutex<Vec<RunId>>,
    tokens: Mutex<HashMap<RunId, CancellationToken>>,
}

impl ScriptedRunner {
    /// Runner using `fallback` once queued scripts run out
    pub fn new(runner_type: RunnerType, fallback: Script) -> Self {
        Self {
            runner_type,
            scripts: Mutex::new(VecDeque::new()),
            fallback,
            ack_cancel: AtomicBool::new(true),
            started: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Queue a script for the next start
    pub fn push(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    /// Never acknowledge cancellation
    pub fn ignore_cancel(&self) {
        self.ack_cancel.store(false, Ordering::SeqCst);
    }

    /// Specs of every started run
    pub fn started(&self) -> Vec<RunSpec> {
        self.started.lock().clone()
    }

    /// Runs a cancel was requested for
    pub fn cancelled(&self) -> Vec<RunId> {
        self.cancelled.lock().clone()
    }

    fn next_script(&self) -> Script {
        self.scripts
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

async fn play(
    steps: Vec<Step>,
    outcome: RunnerOutcome,
    events: mpsc::Sender<EventPayload>,
    token: CancellationToken,
) -> RunnerOutcome {
    let interrupted = RunnerOutcome {
        exit_code: None,
        error_msg: "interrupted".into(),
        ..RunnerOutcome::default()
    };
    for step in steps {
        match step {
            Step::Emit(payload) => {
                if events.send(payload).await.is_err() {
                    return interrupted;
                }
            }
            Step::Sleep(duration) => {
                tokio::select! {
                    () = tokio::time::sleep(duration) => {}
                    () = token.cancelled() => return interrupted,
                }
            }
            Step::Stall => {
                token.cancelled().await;
                return interrupted;
            }
        }
    }
    outcome
}

#[async_trait]
impl Runner for ScriptedRunner {
    fn runner_type(&self) -> RunnerType {
        self.runner_type
    }

    async fn start(
        &self,
        spec: RunSpec,
        events: mpsc::Sender<EventPayload>,
    ) -> Result<RunnerSession, RunnerError> {
        let script = self.next_script();
        let run_id = spec.run_id;
        self.started.lock().push(spec);
        if let Some(message) = script.start_error {
            return Err(RunnerError::new(self.runner_type, "start", message));
        }
        if script.hang_start {
            std::future::pending::<()>().await;
        }

        let token = CancellationToken::new();
        self.tokens.lock().insert(run_id, token.clone());
        Ok(RunnerSession {
            session_id: script.session_id,
            termination: Box::pin(play(script.steps, script.outcome, events, token)),
        })
    }

    async fn cancel(&self, run_id: RunId) -> Result<(), RunnerError> {
        self.cancelled.lock().push(run_id);
        if !self.ack_cancel.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(token) = self.tokens.lock().remove(&run_id) {
            token.cancel();
        }
        Ok(())
    }
}

