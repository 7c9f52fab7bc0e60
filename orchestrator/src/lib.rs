//! Markdown workflow orchestrator for tool-calling agents.
//!
//! A workflow document describes ordered steps: what to do, which tools to
//! call, which variables flow in and out, and which assertions must hold. The
//! orchestrator parses the document, hands the agent one step prompt at a
//! time, and records the results it reports back. The architecture keeps a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (parsing, resolution, the step
//!   state machine, prompt rendering). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config and workflow files).
//!
//! [`session`] combines both behind the five workflow operations, and
//! [`server`] exposes them as tools over line-delimited JSON on stdio.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod server;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
