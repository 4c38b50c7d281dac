//! Domain invariants, checkable at mutation time and at rest
//!
//! Each predicate returns a [`StateError`] describing the violated rule.

use crate::error::{ScopeHolder, StateError};
use crate::event::RunEvent;
use crate::run::{ApprovalState, Run, RunMode, RunPhase, RunStatus};
use crate::scope::ScopePath;

fn violation(entity: &str, state: impl std::fmt::Display, rule: &str, reason: String) -> StateError {
    StateError::new(entity, state, rule, reason)
}

/// No two active scope holders may overlap
pub fn check_active_scopes(holders: &[ScopeHolder]) -> Result<(), StateError> {
    let parsed: Vec<(&ScopeHolder, ScopePath)> = holders
        .iter()
        .map(|h| {
            ScopePath::parse(&h.scope_path)
                .map(|p| (h, p))
                .map_err(|e| violation("scope_lock", &h.run_id, "scope disjointness", e.message))
        })
        .collect::<Result<_, _>>()?;

    for (i, (a, pa)) in parsed.iter().enumerate() {
        for (b, pb) in parsed.iter().skip(i + 1) {
            if pa.conflicts_with(pb) {
                return Err(violation(
                    "scope_lock",
                    "active",
                    "scope disjointness",
                    format!(
                        "run {} on {} overlaps run {} on {}",
                        a.run_id, pa, b.run_id, pb
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Sandboxed runs past `starting` carry a sandbox id
pub fn check_sandbox(run: &Run) -> Result<(), StateError> {
    let provisioned_by_now = !matches!(run.status, RunStatus::Pending | RunStatus::Starting);
    // Runs that failed or were cancelled before provisioning finished never got one.
    let aborted_early = matches!(run.status, RunStatus::Failed | RunStatus::Cancelled)
        && run.started_at.is_none();
    if run.run_mode == RunMode::Sandboxed
        && provisioned_by_now
        && !aborted_early
        && run.sandbox_id.as_deref().map_or(true, str::is_empty)
    {
        return Err(violation(
            "run",
            run.status,
            "sandbox",
            format!("sandboxed run {} has no sandbox id", run.id),
        ));
    }
    Ok(())
}

/// Approval state is coupled to status
pub fn check_approval_state(run: &Run) -> Result<(), StateError> {
    let state = run.approval_state;
    if state != ApprovalState::None
        && matches!(
            run.status,
            RunStatus::Pending | RunStatus::Starting | RunStatus::Running
        )
    {
        return Err(violation(
            "run",
            run.status,
            "approval state",
            format!("approval {state} is set before review"),
        ));
    }
    if run.status == RunStatus::NeedsReview && !state.is_open() {
        return Err(violation(
            "run",
            run.status,
            "approval state",
            format!("run awaiting review has approval {state}"),
        ));
    }
    if state.is_decided() && run.status == RunStatus::Cancelled {
        return Err(violation(
            "run",
            run.status,
            "approval state",
            format!("cancelled run carries decision {state}"),
        ));
    }
    Ok(())
}

/// Terminal runs only change their approval decision, `pending → approved|rejected`
pub fn check_terminal_mutation(before: &Run, after: &Run) -> Result<(), StateError> {
    if !before.status.is_terminal() {
        return Ok(());
    }

    let mut normalized = after.clone();
    normalized.approval_state = before.approval_state;
    normalized.approved_by.clone_from(&before.approved_by);
    normalized.approved_at = before.approved_at;
    normalized.updated_at = before.updated_at;
    if normalized != *before {
        return Err(violation(
            "run",
            before.status,
            "terminal immutability",
            format!("run {} changed fields other than its approval", before.id),
        ));
    }

    if before.approval_state != after.approval_state
        && !(before.approval_state.is_open() && after.approval_state.is_decided())
    {
        return Err(violation(
            "run",
            before.status,
            "terminal immutability",
            format!(
                "approval may only move from pending to a decision, not {} -> {}",
                before.approval_state, after.approval_state
            ),
        ));
    }
    Ok(())
}

/// Phases advance by exactly one step
pub fn check_phase_advance(from: RunPhase, to: RunPhase) -> Result<(), StateError> {
    if from.next() == Some(to) {
        Ok(())
    } else {
        Err(violation(
            "run",
            from,
            "phase advance",
            format!("cannot move from phase {from} to {to}"),
        ))
    }
}

/// Heartbeats are accepted only while starting or running
pub fn check_heartbeat(status: RunStatus) -> Result<(), StateError> {
    if status.accepts_heartbeat() {
        Ok(())
    } else {
        Err(violation(
            "run",
            status,
            "heartbeat",
            "heartbeats are only tracked for starting or running runs".to_string(),
        ))
    }
}

/// Sequences run `1, 2, 3, …` without gaps; timestamps never decrease
pub fn check_event_order(events: &[RunEvent]) -> Result<(), StateError> {
    for (i, event) in events.iter().enumerate() {
        let expected = i as u64 + 1;
        if event.sequence != expected {
            return Err(violation(
                "run_event",
                event.run_id,
                "event order",
                format!("expected sequence {expected}, found {}", event.sequence),
            ));
        }
        if let Some(prev) = i.checked_sub(1).map(|p| &events[p]) {
            if event.timestamp < prev.timestamp {
                return Err(violation(
                    "run_event",
                    event.run_id,
                    "event order",
                    format!("timestamp of sequence {} goes backwards", event.sequence),
                ));
            }
        }
    }
    Ok(())
}

/// Every at-rest invariant of a single run
pub fn check_run(run: &Run) -> Result<(), StateError> {
    check_sandbox(run)?;
    check_approval_state(run)?;
    if run.status.is_terminal() && run.ended_at.is_none() {
        return Err(violation(
            "run",
            run.status,
            "terminal",
            format!("terminal run {} has no end time", run.id),
        ));
    }
    Ok(())
}
