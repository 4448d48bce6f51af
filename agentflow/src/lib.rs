//! Configuration-driven task orchestration for pluggable agents.
//!
//! A pipeline document declares **agents** (text generation back ends),
//! **plugins** (execution strategies) and **tools** (narrow callables), plus
//! an optional task list. Tasks pass data to each other through
//! `{{tasks.<id>.output}}` placeholders. A [`planner::Planner`] can also turn
//! a free-form goal into a plan of built-in [`commands`].
//!
//! The crate keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (dependency resolution, status
//!   tracking, graph validation). No I/O.
//! - **[`io`]**: Side-effecting operations (pipeline and settings files,
//!   task outputs, child processes).
//!
//! [`task_manager`] executes single tasks and sequential batches;
//! [`scheduler`] runs a plan round by round on a bounded worker pool.

pub mod agents;
pub mod cancel;
pub mod commands;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod plan;
pub mod planner;
pub mod plugins;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod task;
pub mod task_manager;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
pub mod workspace;
