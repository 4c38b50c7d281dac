//! Action policy: what a caller may do with a run right now
//!
//! [`get_run_actions`] is a pure function of the run and the context. Denial
//! reasons are user-visible and stable.

use crate::allowlist::TagAllowlist;
use axm_types::{ApprovalState, Run, RunStatus, StateError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason given when a run is not yet complete for investigation follow-ups
pub const REASON_INVESTIGATION_INCOMPLETE: &str =
    "investigation must be complete before acting on its findings";
/// Reason given when the run tag is outside the allowlist
pub const REASON_TAG_NOT_ELIGIBLE: &str = "tag not eligible";
/// Reason given when deleting an in-progress run
pub const REASON_STOP_BEFORE_DELETE: &str = "stop the run before deleting it";
/// Reason given when stopping a run that is not executing
pub const REASON_NOT_STOPPABLE: &str = "can only stop running or starting runs";
/// Reason given when retrying is not possible
pub const REASON_NOT_RETRYABLE: &str = "run cannot be retried in its current state";
/// Reason given when continuing without a runner session
pub const REASON_NO_SESSION: &str = "no session id";
/// Reason given when continuing an in-progress run
pub const REASON_IN_PROGRESS: &str = "still in progress";
/// Reason given when reviewing a run that is not in review
pub const REASON_NOT_IN_REVIEW: &str = "not awaiting review";
/// Reason given when reviewing a run without a sandbox
pub const REASON_NO_SANDBOX: &str = "no sandbox";

/// Every action the policy decides on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Investigate,
    ApplyInvestigation,
    Delete,
    Stop,
    Retry,
    Continue,
    Approve,
    Reject,
    Review,
    ExtractRecommendations,
    RegenerateRecommendations,
}

impl Action {
    /// Verb used in state errors
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Investigate => "investigate",
            Self::ApplyInvestigation => "apply investigation",
            Self::Delete => "delete",
            Self::Stop => "stop",
            Self::Retry => "retry",
            Self::Continue => "continue",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Review => "review",
            Self::ExtractRecommendations => "extract recommendations",
            Self::RegenerateRecommendations => "regenerate recommendations",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Permission for one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDecision {
    pub allowed: bool,
    /// Empty when allowed
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

impl ActionDecision {
    /// Allowed
    #[inline]
    #[must_use]
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    /// Denied with a reason
    #[inline]
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }

    fn from_result(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::allow(),
            Err(reason) => Self::deny(reason),
        }
    }
}

/// Permission vector for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunActions {
    pub can_investigate: ActionDecision,
    pub can_apply_investigation: ActionDecision,
    pub can_delete: ActionDecision,
    pub can_stop: ActionDecision,
    pub can_retry: ActionDecision,
    pub can_continue: ActionDecision,
    pub can_approve: ActionDecision,
    pub can_reject: ActionDecision,
    pub can_review: ActionDecision,
    pub can_extract_recommendations: ActionDecision,
    pub can_regenerate_recommendations: ActionDecision,
}

impl RunActions {
    /// Decision for one action
    #[must_use]
    pub fn get(&self, action: Action) -> &ActionDecision {
        match action {
            Action::Investigate => &self.can_investigate,
            Action::ApplyInvestigation => &self.can_apply_investigation,
            Action::Delete => &self.can_delete,
            Action::Stop => &self.can_stop,
            Action::Retry => &self.can_retry,
            Action::Continue => &self.can_continue,
            Action::Approve => &self.can_approve,
            Action::Reject => &self.can_reject,
            Action::Review => &self.can_review,
            Action::ExtractRecommendations => &self.can_extract_recommendations,
            Action::RegenerateRecommendations => &self.can_regenerate_recommendations,
        }
    }

    /// `Ok` when `action` is allowed on `run`, otherwise a [`StateError`] with the denial reason
    pub fn require(&self, run: &Run, action: Action) -> Result<(), StateError> {
        let decision = self.get(action);
        if decision.allowed {
            Ok(())
        } else {
            Err(StateError::new(
                "run",
                run.status,
                action.verb(),
                decision.reason.clone(),
            ))
        }
    }
}

/// Inputs besides the run
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    pub allowlist: TagAllowlist,
}

impl ActionContext {
    /// Context with an explicit allowlist
    #[inline]
    #[must_use]
    pub fn new(allowlist: TagAllowlist) -> Self {
        Self { allowlist }
    }
}

fn investigation_follow_up(run: &Run, ctx: &ActionContext) -> ActionDecision {
    if run.status != RunStatus::Complete {
        ActionDecision::deny(REASON_INVESTIGATION_INCOMPLETE)
    } else if !ctx.allowlist.matches(&run.tag) {
        ActionDecision::deny(REASON_TAG_NOT_ELIGIBLE)
    } else {
        ActionDecision::allow()
    }
}

/// Compute the permission vector for `run`
#[must_use]
pub fn get_run_actions(run: &Run, ctx: &ActionContext) -> RunActions {
    let status = run.status;
    let follow_up = investigation_follow_up(run, ctx);

    let can_delete = if status.is_in_progress() {
        ActionDecision::deny(REASON_STOP_BEFORE_DELETE)
    } else {
        ActionDecision::allow()
    };

    let can_stop = if matches!(status, RunStatus::Running | RunStatus::Starting) {
        ActionDecision::allow()
    } else {
        ActionDecision::deny(REASON_NOT_STOPPABLE)
    };

    let can_retry = if status.is_terminal()
        || matches!(
            run.approval_state,
            ApprovalState::Approved | ApprovalState::Rejected
        ) {
        ActionDecision::allow()
    } else {
        ActionDecision::deny(REASON_NOT_RETRYABLE)
    };

    let can_continue = if run.session_id.is_empty() {
        ActionDecision::deny(REASON_NO_SESSION)
    } else if status.is_in_progress() {
        ActionDecision::deny(REASON_IN_PROGRESS)
    } else {
        ActionDecision::allow()
    };

    let can_review = if status != RunStatus::NeedsReview {
        ActionDecision::deny(REASON_NOT_IN_REVIEW)
    } else if run.sandbox_id.as_deref().map_or(true, str::is_empty) {
        ActionDecision::deny(REASON_NO_SANDBOX)
    } else {
        ActionDecision::allow()
    };

    RunActions {
        can_investigate: ActionDecision::allow(),
        can_apply_investigation: follow_up.clone(),
        can_delete,
        can_stop,
        can_retry,
        can_continue,
        can_approve: ActionDecision::from_result(run.approvable()),
        can_reject: ActionDecision::from_result(run.rejectable()),
        can_review,
        can_extract_recommendations: follow_up.clone(),
        can_regenerate_recommendations: follow_up,
    }
}
