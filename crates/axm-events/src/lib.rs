//! AXM Event Stream primitives
//!
//! Storage-independent pieces of the run event stream:
//!
//! - [`validate`] / [`validate_payload`]: structured warnings for suspect events
//! - [`summarize`]: counts by type and by warning category for a batch
//! - [`RunSequence`]: gap-free per-run sequencing with clamped timestamps
//! - [`summarize_run`]: the [`RunSummary`](axm_types::RunSummary) written when a run ends

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod sequence;
pub mod summary;
pub mod validate;

pub use sequence::RunSequence;
pub use summary::summarize_run;
pub use validate::{
    summarize, validate, validate_payload, EventBatchStats, EventWarning, WarningKind,
    UNKNOWN_TOOL_NAME,
};
