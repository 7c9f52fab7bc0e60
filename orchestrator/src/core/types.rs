//! Shared deterministic types for the workflow core.
//!
//! These types define stable contracts between the parser, the state machine
//! and the prompt composer. They do not depend on I/O and serialize the same
//! way across runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Runtime variables accumulated across a run, keyed by case-sensitive name.
///
/// A `BTreeMap` keeps snapshots and prompts stable regardless of insertion order.
pub type VariableMap = BTreeMap<String, Value>;

/// One unit of work parsed from a workflow document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    /// Zero-based position in document order.
    pub index: usize,
    pub name: String,
    /// Nearest preceding level-2 heading, for reporting only.
    pub section: Option<String>,
    pub description: String,
    /// Tool names in the order the agent is expected to invoke them. Never empty.
    pub tools: Vec<String>,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<OutputMapping>,
    /// Natural-language success criteria, forwarded verbatim.
    pub assertions: Vec<String>,
}

/// A variable a step requires before its prompt may be composed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputSpec {
    pub name: String,
    pub description: String,
}

/// Advisory extraction hint paired with the variable it populates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputMapping {
    /// Free text such as `result.items[0].id`; never evaluated by the core.
    pub source: String,
    pub variable: String,
}

/// Lifecycle status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    NotStarted,
    InProgress,
    Passed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::NotStarted => "not_started",
            StepStatus::InProgress => "in_progress",
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

/// Status an agent may report for the active step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedStatus {
    Passed,
    Failed,
    /// Reserved for manual skips; does not halt the remaining steps.
    Skipped,
}

impl From<ReportedStatus> for StepStatus {
    fn from(status: ReportedStatus) -> Self {
        match status {
            ReportedStatus::Passed => StepStatus::Passed,
            ReportedStatus::Failed => StepStatus::Failed,
            ReportedStatus::Skipped => StepStatus::Skipped,
        }
    }
}

/// Agent-reported verdict for one assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub assertion: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Everything the agent sends back after executing a step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StepReport {
    pub step_number: usize,
    pub status: ReportedStatus,
    #[serde(default)]
    pub assertion_results: Vec<AssertionResult>,
    #[serde(default)]
    pub output_variables: VariableMap,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Recorded result of a step, one slot per step in a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StepOutcome {
    pub status: StepStatus,
    pub assertion_results: Vec<AssertionResult>,
    pub output_variables: VariableMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StepOutcome {
    /// True when every reported assertion passed (vacuously true for none).
    pub fn all_assertions_passed(&self) -> bool {
        self.assertion_results.iter().all(|result| result.passed)
    }
}

/// Render a variable value the way it is substituted into prompt text.
///
/// Strings render raw; every other JSON value renders as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
