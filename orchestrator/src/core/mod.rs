//! Deterministic, pure logic for workflow execution.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod parser;
pub mod prompt;
pub mod resolver;
pub mod run;
pub mod types;
