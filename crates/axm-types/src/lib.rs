//! AXM Domain Types
//!
//! Pure value types for the agent execution manager: profiles, tasks, runs,
//! run events, context attachments and scope paths, plus the validation and
//! invariant predicates every mutation is funneled through.
//!
//! # Core Concepts
//!
//! - [`AgentProfile`]: HOW an agent runs (runner, model, limits)
//! - [`Task`]: WHAT to do (scope, prompt, attachments)
//! - [`Run`]: one execution attempt, driven through [`RunStatus`]
//! - [`RunEvent`]: append-only record carrying a tagged [`EventPayload`]
//! - [`ScopePath`]: normalized workspace prefix used for exclusive locking
//!
//! No I/O happens in this crate.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod attachment;
pub mod error;
pub mod event;
pub mod ids;
pub mod invariants;
pub mod profile;
pub mod run;
pub mod scope;
pub mod task;
pub mod validation;

pub use attachment::{AttachmentType, ContentFormat, ContextAttachment, Priority};
pub use error::{
    AxmError, AxmResult, BoxError, CapacityExceeded, ErrorKind, NotFoundError, PolicyViolation,
    RunnerError, SandboxError, ScopeConflictError, ScopeHolder, StateError, ValidationError,
    HEARTBEAT_TIMEOUT_MSG, WALL_TIMEOUT_MSG,
};
pub use event::{ArtifactKind, EventPayload, EventType, RunEvent};
pub use ids::{EventId, ProfileId, RunId, TaskId};
pub use profile::{AgentProfile, CreateProfileRequest, RunnerType, UpdateProfileRequest};
pub use run::{ApprovalState, Run, RunFilter, RunMode, RunPhase, RunStatus, RunSummary};
pub use scope::ScopePath;
pub use task::{CreateTaskRequest, Task, TaskStatus, UpdateTaskRequest};

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        AgentProfile, ApprovalState, AxmError, AxmResult, ContextAttachment, EventPayload,
        EventType, ProfileId, Run, RunEvent, RunId, RunStatus, ScopePath, Task, TaskId,
        ValidationError,
    };
}
