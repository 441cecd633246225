//! Stable exit codes for `issue-agent` commands.

/// Command succeeded; for `run`, every phase was processed.
pub const OK: i32 = 0;
/// Invalid config, a failed setup step, or a run stopped by a model failure.
pub const INVALID: i32 = 1;
/// `issue-agent run` ended because the global step budget ran out.
pub const BUDGET_EXHAUSTED: i32 = 2;
