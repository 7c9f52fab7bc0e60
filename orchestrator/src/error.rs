//! Closed error taxonomy for workflow operations.
//!
//! Every error the core can raise maps to exactly one [`ErrorKind`] and carries
//! a suggestion aimed at the agent (or human) driving the workflow. The tool
//! host renders errors through [`WorkflowError::report`], which is the single
//! place the variants are matched exhaustively.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

const STEP_EXAMPLE: &str = "### 🔧 WORKFLOW STEP: Step name\n\
```\n\
Step description here\n\
```\n\
\n\
### 🛠️ TOOL: tool_name";

const TOOL_EXAMPLE: &str = "### 🛠️ TOOL: tool_name\n\
*or*\n\
### 🛠️ TOOLS:\n\
- first_tool\n\
- second_tool";

/// Errors raised by the parser, the state machine and the session.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow file not found at {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("failed to read workflow file {}: {source}", .path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid workflow format in step {step} ('{name}'): {issue}")]
    InvalidFormat {
        step: usize,
        name: String,
        issue: String,
    },

    #[error("no workflow steps found")]
    EmptyWorkflow,

    #[error("step {step} ('{name}') has no tool specification")]
    MissingToolSpec { step: usize, name: String },

    #[error("variable '{variable}' required by step {step} ('{name}') has not been set")]
    VariableMissing {
        variable: String,
        step: usize,
        name: String,
    },

    #[error("received result for step {reported}, but {}", describe_expected(.expected))]
    StepOutOfOrder {
        reported: usize,
        expected: Option<usize>,
    },

    #[error("cannot {operation}: no workflow has been loaded")]
    NoWorkflowLoaded { operation: &'static str },

    #[error("failed to render step prompt: {0}")]
    Template(#[from] minijinja::Error),
}

/// Stable wire names for [`WorkflowError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FileNotFound,
    FileUnreadable,
    InvalidFormat,
    EmptyWorkflow,
    MissingToolSpec,
    VariableMissing,
    StepOutOfOrder,
    NoWorkflowLoaded,
    /// Raised by the tool host for requests that never reach the session.
    InvalidRequest,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::FileNotFound => "file_not_found",
            ErrorKind::FileUnreadable => "file_unreadable",
            ErrorKind::InvalidFormat => "invalid_format",
            ErrorKind::EmptyWorkflow => "empty_workflow",
            ErrorKind::MissingToolSpec => "missing_tool_spec",
            ErrorKind::VariableMissing => "variable_missing",
            ErrorKind::StepOutOfOrder => "step_out_of_order",
            ErrorKind::NoWorkflowLoaded => "no_workflow_loaded",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

/// Serializable rendering of an error for the driving agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::FileNotFound { .. } => ErrorKind::FileNotFound,
            WorkflowError::FileUnreadable { .. } => ErrorKind::FileUnreadable,
            WorkflowError::InvalidFormat { .. } => ErrorKind::InvalidFormat,
            WorkflowError::EmptyWorkflow => ErrorKind::EmptyWorkflow,
            WorkflowError::MissingToolSpec { .. } => ErrorKind::MissingToolSpec,
            WorkflowError::VariableMissing { .. } => ErrorKind::VariableMissing,
            WorkflowError::StepOutOfOrder { .. } => ErrorKind::StepOutOfOrder,
            WorkflowError::NoWorkflowLoaded { .. } => ErrorKind::NoWorkflowLoaded,
            WorkflowError::Template(_) => ErrorKind::Unexpected,
        }
    }

    /// Quick action that resolves the error.
    pub fn suggestion(&self) -> String {
        match self {
            WorkflowError::FileNotFound { .. } => {
                "Check that the file path is correct and the file exists".to_string()
            }
            WorkflowError::FileUnreadable { .. } => {
                "Ensure the file is readable and UTF-8 encoded".to_string()
            }
            WorkflowError::InvalidFormat { .. } => {
                "Ensure each step follows the required format".to_string()
            }
            WorkflowError::EmptyWorkflow => {
                "Workflow files must contain at least one step block".to_string()
            }
            WorkflowError::MissingToolSpec { .. } => {
                "Each workflow step must specify a TOOL or TOOLS section".to_string()
            }
            WorkflowError::VariableMissing { .. } => {
                "Ensure a prior step defines this variable in its OUTPUTS section and reports it"
                    .to_string()
            }
            WorkflowError::StepOutOfOrder {
                expected: Some(expected),
                ..
            } => format!("Report results for step {expected} first"),
            WorkflowError::StepOutOfOrder { expected: None, .. } => {
                "The workflow is finished; use reset_workflow to run it again".to_string()
            }
            WorkflowError::NoWorkflowLoaded { .. } => {
                "Load a workflow first using load_workflow(file_path)".to_string()
            }
            WorkflowError::Template(_) => {
                "Check the prompt_template configured for the orchestrator".to_string()
            }
        }
    }

    /// Example of the expected document shape, for format errors.
    pub fn example(&self) -> Option<&'static str> {
        match self {
            WorkflowError::InvalidFormat { .. } | WorkflowError::EmptyWorkflow => {
                Some(STEP_EXAMPLE)
            }
            WorkflowError::MissingToolSpec { .. } => Some(TOOL_EXAMPLE),
            _ => None,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            suggestion: self.suggestion(),
            example: self.example().map(str::to_string),
        }
    }
}

fn describe_expected(expected: &Option<usize>) -> String {
    match expected {
        Some(step) => format!("step {step} is in progress"),
        None => "the workflow is already complete".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_names_both_steps() {
        let err = WorkflowError::StepOutOfOrder {
            reported: 3,
            expected: Some(1),
        };
        assert_eq!(
            err.to_string(),
            "received result for step 3, but step 1 is in progress"
        );
        assert_eq!(err.suggestion(), "Report results for step 1 first");
    }

    #[test]
    fn out_of_order_after_completion_points_at_reset() {
        let err = WorkflowError::StepOutOfOrder {
            reported: 2,
            expected: None,
        };
        assert!(err.to_string().contains("already complete"));
        assert!(err.suggestion().contains("reset_workflow"));
    }

    #[test]
    fn report_carries_kind_and_example() {
        let err = WorkflowError::MissingToolSpec {
            step: 0,
            name: "Step with no tool".to_string(),
        };
        let report = err.report();
        assert_eq!(report.kind, ErrorKind::MissingToolSpec);
        assert!(report.message.contains("no tool specification"));
        assert!(report.example.as_deref().unwrap_or("").contains("TOOLS:"));

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["type"], "missing_tool_spec");
    }

    #[test]
    fn file_not_found_has_no_example() {
        let err = WorkflowError::FileNotFound {
            path: PathBuf::from("/nonexistent/path.md"),
        };
        assert!(err.to_string().contains("not found"));
        assert_eq!(err.example(), None);
        assert_eq!(err.kind().as_str(), "file_not_found");
    }
}
