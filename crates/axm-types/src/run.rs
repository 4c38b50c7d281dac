//! Runs: one execution attempt of a task under a profile

use crate::event::EventType;
use crate::ids::{ProfileId, RunId, TaskId};
use crate::profile::AgentProfile;
use crate::task::Task;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Starting,
    Running,
    NeedsReview,
    Complete,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Every status, in lifecycle order
    pub const ALL: [RunStatus; 7] = [
        Self::Pending,
        Self::Starting,
        Self::Running,
        Self::NeedsReview,
        Self::Complete,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Complete, failed or cancelled
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    /// Holds a scope lock: pending, starting, running or `needs_review`
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Still executing: pending, starting or running
    #[inline]
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        matches!(self, Self::Pending | Self::Starting | Self::Running)
    }

    /// Statuses for which runner liveness is tracked
    #[inline]
    #[must_use]
    pub const fn accepts_heartbeat(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    /// Parse a wire name
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::NeedsReview => "needs_review",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Sandboxed,
    #[default]
    InPlace,
}

/// Approval substate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    #[default]
    None,
    Pending,
    PartiallyApproved,
    Approved,
    Rejected,
}

impl ApprovalState {
    /// Awaiting a (further) decision
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::PartiallyApproved)
    }

    /// Final decision taken
    #[inline]
    #[must_use]
    pub const fn is_decided(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::PartiallyApproved => "partially_approved",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestration phase within a run
///
/// Phases only ever advance by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Provision,
    PromptAssembly,
    Invocation,
    Review,
    Finalize,
}

impl RunPhase {
    /// Zero-based index
    #[inline]
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// The following phase, if any
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Provision => Some(Self::PromptAssembly),
            Self::PromptAssembly => Some(Self::Invocation),
            Self::Invocation => Some(Self::Review),
            Self::Review => Some(Self::Finalize),
            Self::Finalize => None,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Provision => "provision",
            Self::PromptAssembly => "prompt_assembly",
            Self::Invocation => "invocation",
            Self::Review => "review",
            Self::Finalize => "finalize",
        };
        f.write_str(s)
    }
}

/// Statistics folded from a run's events
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_events: u64,
    pub events_by_type: BTreeMap<EventType, u64>,
    pub tool_calls: u64,
    pub tool_errors: u64,
    pub files_modified: u64,
    pub files_created: u64,
    pub files_deleted: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_estimate: f64,
    pub warning_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl RunSummary {
    /// Files touched in any way
    #[inline]
    #[must_use]
    pub fn files_changed(&self) -> u64 {
        self.files_modified + self.files_created + self.files_deleted
    }
}

/// One execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: RunId,
    pub task_id: TaskId,
    pub agent_profile_id: ProfileId,
    #[serde(default)]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_id: Option<String>,
    pub run_mode: RunMode,
    pub status: RunStatus,
    pub phase: RunPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
    #[serde(default)]
    pub error_msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub approval_state: ApprovalState,
    #[serde(default)]
    pub approved_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub diff_path: String,
    #[serde(default)]
    pub log_path: String,
    #[serde(default)]
    pub changed_files: u64,
    #[serde(default)]
    pub total_size_bytes: u64,
    /// Opaque runner session token for continuation
    #[serde(default)]
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// New pending run of `task` under `profile`
    #[must_use]
    pub fn pending(id: RunId, task: &Task, profile: &AgentProfile, now: DateTime<Utc>) -> Self {
        Self {
            id,
            task_id: task.id,
            agent_profile_id: profile.id,
            tag: task.tag.clone(),
            sandbox_id: None,
            run_mode: if profile.requires_sandbox {
                RunMode::Sandboxed
            } else {
                RunMode::InPlace
            },
            status: RunStatus::Pending,
            phase: RunPhase::Provision,
            started_at: None,
            ended_at: None,
            summary: None,
            error_msg: String::new(),
            exit_code: None,
            approval_state: ApprovalState::None,
            approved_by: String::new(),
            approved_at: None,
            diff_path: String::new(),
            log_path: String::new(),
            changed_files: 0,
            total_size_bytes: 0,
            session_id: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether an approval decision can be taken now; `Err` carries the reason
    pub fn approvable(&self) -> Result<(), String> {
        if self.status != RunStatus::NeedsReview {
            return Err(format!("run is not awaiting review (status {})", self.status));
        }
        if !self.approval_state.is_open() {
            return Err(format!(
                "run approval is {}, expected pending",
                self.approval_state
            ));
        }
        Ok(())
    }

    /// Same predicate as [`Run::approvable`]
    #[inline]
    pub fn rejectable(&self) -> Result<(), String> {
        self.approvable()
    }

    /// Shorthand for `approvable().is_ok()`
    #[inline]
    #[must_use]
    pub fn is_approvable(&self) -> bool {
        self.approvable().is_ok()
    }

    /// Whether the runner reported any change set
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.changed_files > 0
            || !self.diff_path.is_empty()
            || self.summary.as_ref().is_some_and(|s| s.files_changed() > 0)
    }
}

/// Filter for listing runs; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFilter {
    pub task_id: Option<TaskId>,
    pub agent_profile_id: Option<ProfileId>,
    pub status: Option<RunStatus>,
    /// Only runs holding a scope lock
    #[serde(default)]
    pub active_only: bool,
}

impl RunFilter {
    /// Runs of a task
    #[must_use]
    pub fn for_task(task_id: TaskId) -> Self {
        Self {
            task_id: Some(task_id),
            ..Self::default()
        }
    }

    /// Active runs only
    #[must_use]
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }

    /// Check a run against the filter
    #[must_use]
    pub fn matches(&self, run: &Run) -> bool {
        self.task_id.map_or(true, |id| run.task_id == id)
            && self.agent_profile_id.map_or(true, |id| run.agent_profile_id == id)
            && self.status.map_or(true, |s| run.status == s)
            && (!self.active_only || run.status.is_active())
    }
}
