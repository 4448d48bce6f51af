//! Stable exit codes for agentflow CLI commands.

/// Command succeeded; for `run`, every task completed.
pub const OK: i32 = 0;
/// Invalid pipeline, settings, plan or other errors before execution.
pub const INVALID: i32 = 1;
/// `run` finished but at least one task failed.
pub const TASK_FAILED: i32 = 2;
/// `run` stopped with tasks still pending.
pub const STALLED: i32 = 3;
