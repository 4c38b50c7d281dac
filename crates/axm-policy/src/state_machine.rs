//! Run lifecycle state machine and approval substate
//!
//! Only the transitions in [`allowed_transitions`] are legal. Terminal runs
//! accept a single kind of mutation afterwards: an open approval moving to a
//! decision.

use axm_types::{ApprovalState, Run, RunStatus, StateError};
use chrono::{DateTime, Utc};

/// Targets reachable from `from`
#[must_use]
pub fn allowed_transitions(from: RunStatus) -> &'static [RunStatus] {
    use RunStatus::*;
    match from {
        Pending => &[Starting, Cancelled, Failed],
        Starting => &[Running, Failed, Cancelled],
        Running => &[NeedsReview, Complete, Failed, Cancelled],
        NeedsReview => &[Complete, Failed, Cancelled],
        Complete | Failed | Cancelled => &[],
    }
}

/// Validate a status transition
pub fn validate_transition(from: RunStatus, to: RunStatus) -> Result<(), StateError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateError::new(
            "run",
            from,
            format!("transition to {to}"),
            format!("{from} -> {to} is not a legal transition"),
        ))
    }
}

/// Apply a transition to `run`, maintaining timestamps and approval substate
pub fn transition(run: &mut Run, to: RunStatus, now: DateTime<Utc>) -> Result<(), StateError> {
    validate_transition(run.status, to)?;

    if run.status == RunStatus::NeedsReview
        && to == RunStatus::Complete
        && !run.approval_state.is_decided()
    {
        return Err(StateError::new(
            "run",
            run.status,
            "complete",
            "leaving review requires an approval decision",
        ));
    }

    match to {
        RunStatus::Starting | RunStatus::Running if run.started_at.is_none() => {
            run.started_at = Some(now);
        }
        RunStatus::NeedsReview if run.approval_state == ApprovalState::None => {
            run.approval_state = ApprovalState::Pending;
        }
        _ => {}
    }
    if to.is_terminal() {
        run.ended_at = Some(now);
    }
    run.status = to;
    run.updated_at = now;
    Ok(())
}

/// Outcome of an approval operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The run was mutated
    Applied,
    /// The decision was already in place; nothing changed
    Unchanged,
}

fn decidable(run: &Run, operation: &str) -> Result<(), StateError> {
    match run.status {
        RunStatus::NeedsReview | RunStatus::Complete | RunStatus::Failed
            if run.approval_state.is_open() =>
        {
            Ok(())
        }
        RunStatus::Cancelled => Err(StateError::new(
            "run",
            run.status,
            operation,
            "cancelled runs cannot be decided",
        )),
        _ => Err(StateError::new(
            "run",
            run.status,
            operation,
            run.approvable().err().unwrap_or_else(|| {
                format!("approval is {}, expected pending", run.approval_state)
            }),
        )),
    }
}

fn decide(
    run: &mut Run,
    state: ApprovalState,
    by: &str,
    now: DateTime<Utc>,
) -> Result<(), StateError> {
    let in_review = run.status == RunStatus::NeedsReview;
    run.approval_state = state;
    run.approved_by = by.to_string();
    run.approved_at = Some(now);
    run.updated_at = now;
    if in_review {
        transition(run, RunStatus::Complete, now)?;
    }
    Ok(())
}

/// Approve a run
///
/// Approving an already approved run is a no-op that keeps `approved_at`.
pub fn approve(run: &mut Run, by: &str, now: DateTime<Utc>) -> Result<Decision, StateError> {
    if run.approval_state == ApprovalState::Approved {
        return Ok(Decision::Unchanged);
    }
    decidable(run, "approve")?;
    decide(run, ApprovalState::Approved, by, now)?;
    Ok(Decision::Applied)
}

/// Reject a run; a rejected review still completes the run
pub fn reject(run: &mut Run, by: &str, now: DateTime<Utc>) -> Result<Decision, StateError> {
    if run.approval_state == ApprovalState::Rejected {
        return Ok(Decision::Unchanged);
    }
    decidable(run, "reject")?;
    decide(run, ApprovalState::Rejected, by, now)?;
    Ok(Decision::Applied)
}

/// Record a partial approval; the run stays in review
pub fn partially_approve(
    run: &mut Run,
    by: &str,
    now: DateTime<Utc>,
) -> Result<Decision, StateError> {
    if run.status != RunStatus::NeedsReview {
        return Err(StateError::new(
            "run",
            run.status,
            "partially approve",
            "only runs awaiting review can be partially approved",
        ));
    }
    match run.approval_state {
        ApprovalState::PartiallyApproved => Ok(Decision::Unchanged),
        ApprovalState::Pending => {
            run.approval_state = ApprovalState::PartiallyApproved;
            run.approved_by = by.to_string();
            run.updated_at = now;
            Ok(Decision::Applied)
        }
        other => Err(StateError::new(
            "run",
            run.status,
            "partially approve",
            format!("approval is {other}, expected pending"),
        )),
    }
}
