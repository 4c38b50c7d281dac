//! In-memory repository

use async_trait::async_trait;
use axm_core::Repository;
use axm_events::summarize_run;
use axm_tools::{ToolConfigStore, ToolConfiguration};
use axm_types::{
    AgentProfile, AxmError, AxmResult, NotFoundError, ProfileId, Run, RunEvent, RunFilter, RunId,
    RunSummary, Task, TaskId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Repository keeping everything in process memory
///
/// Runs keep insertion order; events must arrive with strictly increasing
/// sequence numbers per run.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    profiles: Mutex<Vec<AgentProfile>>,
    tasks: Mutex<Vec<Task>>,
    runs: Mutex<Vec<Run>>,
    events: Mutex<HashMap<RunId, Vec<RunEvent>>>,
    tool_configs: Mutex<Vec<ToolConfiguration>>,
    fail_appends: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every event append fail with a storage error
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// All persisted events of a run
    pub fn events_of(&self, run_id: RunId) -> Vec<RunEvent> {
        self.events.lock().get(&run_id).cloned().unwrap_or_default()
    }

    /// Snapshot of every run
    pub fn runs(&self) -> Vec<Run> {
        self.runs.lock().clone()
    }
}

fn upsert<T, K: PartialEq>(rows: &mut Vec<T>, row: T, key: impl Fn(&T) -> K) -> bool {
    match rows.iter_mut().find(|r| key(r) == key(&row)) {
        Some(existing) => {
            *existing = row;
            true
        }
        None => false,
    }
}

#[async_trait]
impl ToolConfigStore for InMemoryRepository {
    async fn get_tool_configuration(
        &self,
        chat_id: Option<&str>,
        scenario: &str,
        tool_name: &str,
    ) -> AxmResult<Option<ToolConfiguration>> {
        Ok(self
            .tool_configs
            .lock()
            .iter()
            .find(|c| c.key() == (chat_id, scenario, tool_name))
            .cloned())
    }

    async fn upsert_tool_configuration(&self, config: ToolConfiguration) -> AxmResult<()> {
        let mut configs = self.tool_configs.lock();
        match configs.iter_mut().find(|c| c.key() == config.key()) {
            Some(existing) => *existing = config,
            None => configs.push(config),
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_profile(&self, profile: AgentProfile) -> AxmResult<()> {
        self.profiles.lock().push(profile);
        Ok(())
    }

    async fn get_profile(&self, id: ProfileId) -> AxmResult<AgentProfile> {
        self.profiles
            .lock()
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| NotFoundError::new("profile", id).into())
    }

    async fn update_profile(&self, profile: AgentProfile) -> AxmResult<()> {
        let id = profile.id;
        if upsert(&mut self.profiles.lock(), profile, |p| p.id) {
            Ok(())
        } else {
            Err(NotFoundError::new("profile", id).into())
        }
    }

    async fn delete_profile(&self, id: ProfileId) -> AxmResult<()> {
        let mut profiles = self.profiles.lock();
        let before = profiles.len();
        profiles.retain(|p| p.id != id);
        if profiles.len() == before {
            return Err(NotFoundError::new("profile", id).into());
        }
        Ok(())
    }

    async fn list_profiles(&self) -> AxmResult<Vec<AgentProfile>> {
        Ok(self.profiles.lock().clone())
    }

    async fn create_task(&self, task: Task) -> AxmResult<()> {
        self.tasks.lock().push(task);
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> AxmResult<Task> {
        self.tasks
            .lock()
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| NotFoundError::new("task", id).into())
    }

    async fn update_task(&self, task: Task) -> AxmResult<()> {
        let id = task.id;
        if upsert(&mut self.tasks.lock(), task, |t| t.id) {
            Ok(())
        } else {
            Err(NotFoundError::new("task", id).into())
        }
    }

    async fn delete_task(&self, id: TaskId) -> AxmResult<()> {
        let mut tasks = self.tasks.lock();
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        if tasks.len() == before {
            return Err(NotFoundError::new("task", id).into());
        }
        Ok(())
    }

    async fn list_tasks(&self) -> AxmResult<Vec<Task>> {
        Ok(self.tasks.lock().clone())
    }

    async fn create_run(&self, run: Run) -> AxmResult<()> {
        let mut runs = self.runs.lock();
        if runs.iter().any(|r| r.id == run.id) {
            return Err(AxmError::storage("create_run", format!("duplicate run {}", run.id)));
        }
        runs.push(run);
        Ok(())
    }

    async fn get_run(&self, id: RunId) -> AxmResult<Run> {
        self.runs
            .lock()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| NotFoundError::new("run", id).into())
    }

    async fn update_run(&self, run: Run) -> AxmResult<()> {
        let id = run.id;
        if upsert(&mut self.runs.lock(), run, |r| r.id) {
            Ok(())
        } else {
            Err(NotFoundError::new("run", id).into())
        }
    }

    async fn delete_run(&self, id: RunId) -> AxmResult<()> {
        let mut runs = self.runs.lock();
        let before = runs.len();
        runs.retain(|r| r.id != id);
        if runs.len() == before {
            return Err(NotFoundError::new("run", id).into());
        }
        self.events.lock().remove(&id);
        Ok(())
    }

    async fn list_runs(&self, filter: &RunFilter) -> AxmResult<Vec<Run>> {
        let mut runs: Vec<Run> = self
            .runs
            .lock()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.created_at);
        Ok(runs)
    }

    async fn append_event(&self, event: RunEvent) -> AxmResult<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(AxmError::storage("append_event", "injected failure"));
        }
        let mut events = self.events.lock();
        let log = events.entry(event.run_id).or_default();
        if log.last().is_some_and(|last| last.sequence >= event.sequence) {
            return Err(AxmError::storage(
                "append_event",
                format!("sequence {} is not after the last stored event", event.sequence),
            ));
        }
        log.push(event);
        Ok(())
    }

    async fn list_events(
        &self,
        run_id: RunId,
        from_sequence: u64,
        limit: usize,
    ) -> AxmResult<Vec<RunEvent>> {
        Ok(self
            .events
            .lock()
            .get(&run_id)
            .map(|log| {
                log.iter()
                    .filter(|e| e.sequence >= from_sequence)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn last_event(&self, run_id: RunId) -> AxmResult<Option<RunEvent>> {
        Ok(self
            .events
            .lock()
            .get(&run_id)
            .and_then(|log| log.last().cloned()))
    }

    async fn get_metrics(&self, run_id: RunId) -> AxmResult<RunSummary> {
        Ok(summarize_run(&self.events_of(run_id)))
    }
}
