//! AXM Policy
//!
//! The run lifecycle state machine and the action policy derived from it.
//!
//! # Core Concepts
//!
//! - [`state_machine`]: legal transitions, approval substate, idempotent decisions
//! - [`get_run_actions`]: the permission vector clients query before acting
//! - [`TagAllowlist`]: which run tags are eligible for investigation follow-ups
//!
//! Every function here is pure; callers own persistence and locking.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod actions;
pub mod allowlist;
pub mod state_machine;

pub use actions::{get_run_actions, Action, ActionContext, ActionDecision, RunActions};
pub use allowlist::{TagAllowlist, TagRule};
pub use state_machine::{
    allowed_transitions, approve, partially_approve, reject, transition, validate_transition,
    Decision,
};
