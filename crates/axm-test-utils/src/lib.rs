//! Testing utilities for the AXM workspace
//!
//! In-memory fakes for the external capabilities plus fixtures.

#![allow(missing_docs)]

pub mod clock;
pub mod fixtures;
pub mod repo;
pub mod runner;
pub mod sandbox;

pub use clock::{PausedClock, SequentialIds};
pub use fixtures::{editing_events, fast_config, Harness};
pub use repo::InMemoryRepository;
pub use runner::{Script, ScriptedRunner, Step};
pub use sandbox::FakeSandboxProvider;
