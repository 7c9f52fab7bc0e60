//! Stable exit codes for orchestrator CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid workflow, config or arguments, or any other failure.
pub const INVALID: i32 = 1;
/// `orchestrator prompt` was asked for a step whose inputs are not all supplied.
pub const MISSING_VARIABLE: i32 = 3;
