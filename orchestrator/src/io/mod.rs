//! Filesystem access for the orchestrator: config and workflow files.

pub mod config;
pub mod workflow_file;
