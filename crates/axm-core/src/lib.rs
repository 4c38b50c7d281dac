//! AXM Core - Agent Execution Manager
//!
//! Drives agent runs end to end:
//! - Exclusive scope locks per active run, with stale-lock reaping
//! - One worker per run ingesting runner events into an ordered log
//! - Heartbeat and wall-time supervision with bounded cancellation
//! - Review, approval and retry/continue flows gated by the action policy
//!
//! # Core Concepts
//!
//! - [`AgentManager`]: caller-facing facade (profiles, tasks, runs, tools)
//! - [`RunOrchestrator`]: owns the run lifecycle
//! - [`ScopeLockManager`]: grant-or-fail locks over scope paths
//! - [`EventStream`]: per-run sequenced append and lazy replay
//! - [`Repository`], [`Runner`], [`SandboxProvider`]: external capabilities
//!
//! # Example
//!
//! ```rust,ignore
//! use axm_core::{AgentManager, ManagerConfig};
//! use axm_types::{CreateProfileRequest, CreateTaskRequest, RunnerType};
//!
//! # async fn example(repo: std::sync::Arc<MyRepo>, runner: std::sync::Arc<MyRunner>) -> axm_types::AxmResult<()> {
//! let manager = AgentManager::builder(repo)
//!     .with_runner(runner)
//!     .with_config(ManagerConfig::default())
//!     .build()?;
//!
//! let profile = manager
//!     .create_profile(CreateProfileRequest::new("builder", RunnerType::ClaudeCode, 600))
//!     .await?;
//! let task = manager.create_task(CreateTaskRequest::new("Fix lints", "/repo/pkg")).await?;
//! let run = manager.start_run(task.id, profile.id).await?;
//! println!("started run {}", run.id);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod capabilities;
pub mod config;
pub mod event_stream;
pub mod logging;
pub mod manager;
pub mod orchestrator;
pub mod scope_lock;

pub use capabilities::{
    Clock, IdSource, RandomIds, Repository, Runner, RunnerOutcome, RunnerRegistry, RunnerSession,
    RunSpec, SandboxProvider, SandboxSpec, SystemClock,
};
pub use config::ManagerConfig;
pub use event_stream::EventStream;
pub use logging::{init_tracing, LogFormat};
pub use manager::{AgentManager, AgentManagerBuilder};
pub use orchestrator::{RunOrchestrator, StartRunOptions, CANCELLED_MSG};
pub use scope_lock::{ScopeLock, ScopeLockManager};
