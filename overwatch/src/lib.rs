//! Human-supervised plan-and-execute sessions for agent-built software projects.
//!
//! A session takes a goal, asks a planner agent for a dependency-ordered task
//! plan, gets the operator's approval, then runs one executor agent call per
//! task in a deterministic topological order, pausing between tasks.
//!
//! - **[`core`]**: Pure, deterministic logic (graph checks, validation,
//!   scheduling, progress reports). No I/O.
//! - **[`io`]**: Side-effecting operations (config, agent processes, prompts,
//!   terminal interaction, session logs).
//! - **[`agents`]**: Planner and executor roles built on an agent backend.
//!
//! [`session`] holds the phase state machine and [`workflow`] drives it
//! end to end for the CLI.

pub mod agents;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod plan;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
