//! Tasks: WHAT an agent should do

use crate::attachment::ContextAttachment;
use crate::ids::TaskId;
use crate::run::{ApprovalState, RunStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task status, mirrored from its latest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Queued,
    Running,
    NeedsReview,
    Approved,
    Rejected,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::NeedsReview => "needs_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Task status implied by a run's status and approval state
    #[must_use]
    pub const fn from_run(status: RunStatus, approval: ApprovalState) -> Self {
        match status {
            RunStatus::Pending | RunStatus::Starting | RunStatus::Running => Self::Running,
            RunStatus::NeedsReview => Self::NeedsReview,
            RunStatus::Complete => match approval {
                ApprovalState::Rejected => Self::Rejected,
                _ => Self::Approved,
            },
            RunStatus::Failed => Self::Failed,
            RunStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of work a run executes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    /// Base prompt handed to the context formatter
    #[serde(default)]
    pub description: String,
    pub scope_path: String,
    #[serde(default)]
    pub project_root: String,
    #[serde(default)]
    pub phase_prompt_ids: Vec<String>,
    #[serde(default)]
    pub context_attachments: Vec<ContextAttachment>,
    pub status: TaskStatus,
    /// Classification tag propagated onto runs (drives investigation actions)
    #[serde(default)]
    pub tag: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Build a task from a (validated) create request
    #[must_use]
    pub fn from_request(id: TaskId, request: CreateTaskRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: request.title,
            description: request.description,
            scope_path: request.scope_path,
            project_root: request.project_root,
            phase_prompt_ids: request.phase_prompt_ids,
            context_attachments: request.context_attachments,
            status: TaskStatus::Queued,
            tag: request.tag,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a partial update; fields left `None` are kept
    pub fn apply_update(&mut self, update: UpdateTaskRequest, now: DateTime<Utc>) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(scope_path) = update.scope_path {
            self.scope_path = scope_path;
        }
        if let Some(project_root) = update.project_root {
            self.project_root = project_root;
        }
        if let Some(ids) = update.phase_prompt_ids {
            self.phase_prompt_ids = ids;
        }
        if let Some(attachments) = update.context_attachments {
            self.context_attachments = attachments;
        }
        if let Some(tag) = update.tag {
            self.tag = tag;
        }
        self.updated_at = now;
    }
}

/// Request to create a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub scope_path: String,
    #[serde(default)]
    pub project_root: String,
    #[serde(default)]
    pub phase_prompt_ids: Vec<String>,
    #[serde(default)]
    pub context_attachments: Vec<ContextAttachment>,
    #[serde(default)]
    pub tag: String,
}

impl CreateTaskRequest {
    /// Minimal request
    #[must_use]
    pub fn new(title: impl Into<String>, scope_path: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            scope_path: scope_path.into(),
            project_root: String::new(),
            phase_prompt_ids: Vec::new(),
            context_attachments: Vec::new(),
            tag: String::new(),
        }
    }

    /// With base prompt
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With tag
    #[inline]
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// With an attachment appended
    #[inline]
    #[must_use]
    pub fn with_attachment(mut self, attachment: ContextAttachment) -> Self {
        self.context_attachments.push(attachment);
        self
    }
}

/// Partial task update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub scope_path: Option<String>,
    pub project_root: Option<String>,
    pub phase_prompt_ids: Option<Vec<String>>,
    pub context_attachments: Option<Vec<ContextAttachment>>,
    pub tag: Option<String>,
}
