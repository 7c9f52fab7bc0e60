//! Step state machine for a loaded workflow.
//!
//! A [`WorkflowRun`] owns the parsed steps, the cursor, one outcome slot per
//! step and the variable map. It is the only mutable object in the system and
//! changes only through [`WorkflowRun::begin_current`], [`WorkflowRun::report`]
//! and [`WorkflowRun::reset`].

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};

use crate::core::parser::WorkflowDocument;
use crate::core::prompt::PromptComposer;
use crate::core::types::{
    AssertionResult, ReportedStatus, Step, StepOutcome, StepReport, StepStatus, VariableMap,
};
use crate::error::WorkflowError;

/// Position of the run within its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "step")]
pub enum Cursor {
    /// Index of the step awaiting execution or a report.
    At(usize),
    /// All steps are terminal, either by finishing or by halting on a failure.
    Complete,
}

/// What [`WorkflowRun::current`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Current<'a> {
    Step(&'a Step),
    Complete,
}

/// Reported results that did not cover every declared assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionMismatch {
    pub expected: usize,
    pub received: usize,
}

impl AssertionMismatch {
    pub fn message(&self) -> String {
        format!(
            "Assertion count mismatch: expected {}, received {}. {} assertion(s) unverified.",
            self.expected,
            self.received,
            self.expected - self.received
        )
    }
}

/// Acknowledgement of a recorded report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportReceipt {
    pub step: usize,
    pub status: StepStatus,
    pub cursor: Cursor,
    /// Steps marked skipped because this report halted the run.
    pub skipped: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_mismatch: Option<AssertionMismatch>,
}

/// Per-step entry of a [`StateSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSnapshot {
    pub index: usize,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub status: StepStatus,
    pub assertion_results: Vec<AssertionResult>,
    /// False when any reported assertion failed.
    pub all_assertions_passed: bool,
    pub output_variables: VariableMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// The most recent failed step and its reported error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step: usize,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Read-only view of a run for external reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub total_steps: usize,
    pub cursor: Cursor,
    pub is_complete: bool,
    pub is_failed: bool,
    pub completed_steps: Vec<usize>,
    pub failed_steps: Vec<usize>,
    pub skipped_steps: Vec<usize>,
    pub variables: VariableMap,
    pub steps: Vec<StepSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<StepFailure>,
}

/// Aggregate produced once a run reaches [`Cursor::Complete`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionSummary {
    pub total_steps: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Index of the failed step that halted the run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<usize>,
    pub variables: VariableMap,
}

/// A loaded workflow and its execution state.
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    source: Option<PathBuf>,
    title: Option<String>,
    steps: Vec<Step>,
    cursor: Cursor,
    variables: VariableMap,
    outcomes: Vec<StepOutcome>,
}

impl WorkflowRun {
    /// Create a run positioned at the first step.
    ///
    /// Fails with [`WorkflowError::EmptyWorkflow`] when the document has no steps.
    pub fn new(document: WorkflowDocument) -> Result<Self, WorkflowError> {
        if document.steps.is_empty() {
            return Err(WorkflowError::EmptyWorkflow);
        }
        let outcomes = vec![StepOutcome::default(); document.steps.len()];
        Ok(Self {
            source: None,
            title: document.title,
            steps: document.steps,
            cursor: Cursor::At(0),
            variables: VariableMap::new(),
            outcomes,
        })
    }

    /// Record where the document was loaded from, for snapshots.
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Seed variables before the first step runs, as if earlier steps had
    /// reported them. Cleared again by [`WorkflowRun::reset`].
    pub fn with_variables(mut self, variables: VariableMap) -> Self {
        self.variables = variables;
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn variables(&self) -> &VariableMap {
        &self.variables
    }

    pub fn outcome(&self, index: usize) -> Option<&StepOutcome> {
        self.outcomes.get(index)
    }

    pub fn is_complete(&self) -> bool {
        self.cursor == Cursor::Complete
    }

    pub fn is_failed(&self) -> bool {
        self.outcomes
            .iter()
            .any(|outcome| outcome.status == StepStatus::Failed)
    }

    pub fn current(&self) -> Current<'_> {
        match self.cursor {
            Cursor::At(index) => Current::Step(&self.steps[index]),
            Cursor::Complete => Current::Complete,
        }
    }

    /// Mark the current step in progress. Idempotent; a no-op once complete.
    pub fn begin_current(&mut self) {
        let Cursor::At(index) = self.cursor else {
            return;
        };
        let outcome = &mut self.outcomes[index];
        if outcome.status == StepStatus::NotStarted {
            outcome.status = StepStatus::InProgress;
            debug!(step = index, "step in progress");
        }
    }

    /// Ensure every declared input of step `index` is present in the variable map.
    pub fn require_inputs(&self, index: usize) -> Result<(), WorkflowError> {
        let Some(step) = self.steps.get(index) else {
            return Ok(());
        };
        match step
            .inputs
            .iter()
            .find(|input| !self.variables.contains_key(&input.name))
        {
            Some(missing) => Err(WorkflowError::VariableMissing {
                variable: missing.name.clone(),
                step: step.index,
                name: step.name.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Validate inputs and compose the prompt for step `index` against the
    /// current variable map. Returns `None` for an index past the last step.
    pub fn prompt_for(
        &self,
        index: usize,
        composer: &PromptComposer,
    ) -> Result<Option<String>, WorkflowError> {
        let Some(step) = self.steps.get(index) else {
            return Ok(None);
        };
        self.require_inputs(index)?;
        let prompt = composer.compose(step, self.steps.len(), &self.variables)?;
        Ok(Some(prompt))
    }

    /// Record the agent's result for the current step.
    ///
    /// Fails without mutating anything when `report.step_number` is not the
    /// cursor. A failed step halts the run and marks every later step skipped.
    pub fn report(&mut self, report: StepReport) -> Result<ReportReceipt, WorkflowError> {
        let index = match self.cursor {
            Cursor::At(index) if index == report.step_number => index,
            Cursor::At(index) => {
                return Err(WorkflowError::StepOutOfOrder {
                    reported: report.step_number,
                    expected: Some(index),
                });
            }
            Cursor::Complete => {
                return Err(WorkflowError::StepOutOfOrder {
                    reported: report.step_number,
                    expected: None,
                });
            }
        };

        self.begin_current();

        let declared = self.steps[index].assertions.len();
        let received = report.assertion_results.len();
        let assertion_mismatch = (received < declared).then_some(AssertionMismatch {
            expected: declared,
            received,
        });

        let status = StepStatus::from(report.status);
        if report.status == ReportedStatus::Passed {
            for (name, value) in &report.output_variables {
                self.variables.insert(name.clone(), value.clone());
            }
        }
        self.outcomes[index] = StepOutcome {
            status,
            assertion_results: report.assertion_results,
            output_variables: report.output_variables,
            error_message: report.error_message,
        };

        let mut skipped = Vec::new();
        match report.status {
            ReportedStatus::Passed | ReportedStatus::Skipped => self.advance(index),
            ReportedStatus::Failed => {
                for (later, outcome) in self.outcomes.iter_mut().enumerate().skip(index + 1) {
                    if outcome.status == StepStatus::NotStarted {
                        outcome.status = StepStatus::Skipped;
                        skipped.push(later);
                    }
                }
                self.cursor = Cursor::Complete;
            }
        }

        info!(
            step = index,
            status = status.as_str(),
            cursor = ?self.cursor,
            skipped = skipped.len(),
            "step result recorded"
        );

        Ok(ReportReceipt {
            step: index,
            status,
            cursor: self.cursor,
            skipped,
            assertion_mismatch,
        })
    }

    fn advance(&mut self, index: usize) {
        let next = index + 1;
        self.cursor = if next < self.steps.len() {
            Cursor::At(next)
        } else {
            Cursor::Complete
        };
    }

    /// Rewind to the first step, clearing outcomes and variables. Steps are kept.
    pub fn reset(&mut self) {
        self.cursor = Cursor::At(0);
        self.variables.clear();
        for outcome in &mut self.outcomes {
            *outcome = StepOutcome::default();
        }
        debug!(steps = self.steps.len(), "workflow run reset");
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let indices_with = |status: StepStatus| -> Vec<usize> {
            self.outcomes
                .iter()
                .enumerate()
                .filter(|(_, outcome)| outcome.status == status)
                .map(|(index, _)| index)
                .collect()
        };

        let steps = self
            .steps
            .iter()
            .zip(&self.outcomes)
            .map(|(step, outcome)| StepSnapshot {
                index: step.index,
                name: step.name.clone(),
                section: step.section.clone(),
                status: outcome.status,
                assertion_results: outcome.assertion_results.clone(),
                all_assertions_passed: outcome.all_assertions_passed(),
                output_variables: outcome.output_variables.clone(),
                error_message: outcome.error_message.clone(),
            })
            .collect();

        StateSnapshot {
            source: self.source.clone(),
            title: self.title.clone(),
            total_steps: self.steps.len(),
            cursor: self.cursor,
            is_complete: self.is_complete(),
            is_failed: self.is_failed(),
            completed_steps: indices_with(StepStatus::Passed),
            failed_steps: indices_with(StepStatus::Failed),
            skipped_steps: indices_with(StepStatus::Skipped),
            variables: self.variables.clone(),
            steps,
            last_error: self.last_failure(),
        }
    }

    fn last_failure(&self) -> Option<StepFailure> {
        self.steps
            .iter()
            .zip(&self.outcomes)
            .rev()
            .find(|(_, outcome)| outcome.status == StepStatus::Failed)
            .map(|(step, outcome)| StepFailure {
                step: step.index,
                name: step.name.clone(),
                message: outcome.error_message.clone(),
            })
    }

    /// Totals for a run; meaningful once [`WorkflowRun::is_complete`] holds.
    pub fn completion_summary(&self) -> CompletionSummary {
        let count = |status: StepStatus| {
            self.outcomes
                .iter()
                .filter(|outcome| outcome.status == status)
                .count()
        };
        CompletionSummary {
            total_steps: self.steps.len(),
            passed: count(StepStatus::Passed),
            failed: count(StepStatus::Failed),
            skipped: count(StepStatus::Skipped),
            halted_at: self.last_failure().map(|failure| failure.step),
            variables: self.variables.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_document;
    use crate::error::ErrorKind;
    use crate::test_support::{VALID_WORKFLOW, failed, passed, workflow_with_steps};
    use serde_json::json;

    fn run_of(doc: &str) -> WorkflowRun {
        WorkflowRun::new(parse_document(doc).expect("parse")).expect("run")
    }

    #[test]
    fn starts_at_first_step_with_nothing_recorded() {
        let run = run_of(VALID_WORKFLOW);
        assert_eq!(run.cursor(), Cursor::At(0));
        assert!(matches!(run.current(), Current::Step(step) if step.index == 0));
        assert!(
            run.snapshot()
                .steps
                .iter()
                .all(|s| s.status == StepStatus::NotStarted)
        );
    }

    #[test]
    fn begin_current_is_idempotent() {
        let mut run = run_of(VALID_WORKFLOW);
        run.begin_current();
        run.begin_current();
        assert_eq!(
            run.outcome(0).map(|o| o.status),
            Some(StepStatus::InProgress)
        );
        assert_eq!(
            run.outcome(1).map(|o| o.status),
            Some(StepStatus::NotStarted)
        );
    }

    #[test]
    fn pass_merges_outputs_and_advances() {
        let mut run = run_of(VALID_WORKFLOW);
        let receipt = run
            .report(passed(0, &[("REPO_NAME", json!("demo"))]))
            .expect("report");

        assert_eq!(receipt.status, StepStatus::Passed);
        assert_eq!(receipt.cursor, Cursor::At(1));
        assert_eq!(run.variables().get("REPO_NAME"), Some(&json!("demo")));
    }

    #[test]
    fn later_output_overwrites_earlier_value() {
        let mut run = run_of(&workflow_with_steps(2));
        run.report(passed(0, &[("X", json!("first"))])).expect("r0");
        run.report(passed(1, &[("X", json!("second"))])).expect("r1");
        assert_eq!(run.variables().get("X"), Some(&json!("second")));
        assert!(run.is_complete());
    }

    #[test]
    fn out_of_order_report_fails_without_mutation() {
        let mut run = run_of(VALID_WORKFLOW);
        let before = run.snapshot();

        let err = run
            .report(passed(2, &[("REPO_NAME", json!("x"))]))
            .expect_err("out of order");
        assert_eq!(err.kind(), ErrorKind::StepOutOfOrder);
        assert_eq!(run.snapshot(), before);
    }

    #[test]
    fn duplicate_report_is_out_of_order() {
        let mut run = run_of(VALID_WORKFLOW);
        run.report(passed(0, &[])).expect("first");
        let err = run.report(passed(0, &[])).expect_err("duplicate");
        assert!(matches!(
            err,
            WorkflowError::StepOutOfOrder {
                reported: 0,
                expected: Some(1)
            }
        ));
    }

    #[test]
    fn failure_skips_remaining_steps_and_halts() {
        let mut run = run_of(&workflow_with_steps(4));
        run.report(passed(0, &[])).expect("r0");
        let receipt = run
            .report(failed(1, "tool returned 500"))
            .expect("r1");

        assert_eq!(receipt.cursor, Cursor::Complete);
        assert_eq!(receipt.skipped, vec![2, 3]);
        assert!(run.is_failed());
        assert_eq!(run.current(), Current::Complete);

        let snapshot = run.snapshot();
        let statuses: Vec<StepStatus> = snapshot.steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Passed,
                StepStatus::Failed,
                StepStatus::Skipped,
                StepStatus::Skipped
            ]
        );
        assert_eq!(
            snapshot.last_error,
            Some(StepFailure {
                step: 1,
                name: "Step 1".to_string(),
                message: Some("tool returned 500".to_string()),
            })
        );
    }

    #[test]
    fn failed_report_does_not_merge_outputs() {
        let mut run = run_of(&workflow_with_steps(2));
        let mut report = failed(0, "boom");
        report.output_variables.insert("X".to_string(), json!(1));
        run.report(report).expect("report");
        assert!(run.variables().is_empty());
    }

    #[test]
    fn reports_after_completion_are_rejected() {
        let mut run = run_of(&workflow_with_steps(1));
        run.report(passed(0, &[])).expect("r0");
        let err = run.report(passed(1, &[])).expect_err("complete");
        assert!(matches!(
            err,
            WorkflowError::StepOutOfOrder { expected: None, .. }
        ));
    }

    #[test]
    fn manual_skip_advances_without_halting() {
        let mut run = run_of(&workflow_with_steps(3));
        let mut report = passed(0, &[("X", json!(1))]);
        report.status = ReportedStatus::Skipped;
        let receipt = run.report(report).expect("skip");

        assert_eq!(receipt.status, StepStatus::Skipped);
        assert_eq!(receipt.cursor, Cursor::At(1));
        assert!(receipt.skipped.is_empty());
        assert!(run.variables().is_empty());
        assert_eq!(
            run.outcome(2).map(|o| o.status),
            Some(StepStatus::NotStarted)
        );
    }

    #[test]
    fn fewer_assertion_results_than_declared_is_flagged() {
        let mut run = run_of(VALID_WORKFLOW);
        let mut report = passed(0, &[("REPO_NAME", json!("r"))]);
        report.assertion_results = vec![AssertionResult {
            assertion: "result contains \"repositories\"".to_string(),
            passed: true,
            detail: Some("Found".to_string()),
        }];
        let receipt = run.report(report).expect("report");
        let mismatch = receipt.assertion_mismatch.expect("mismatch");
        assert_eq!(mismatch.expected, 2);
        assert_eq!(mismatch.received, 1);
        assert!(mismatch.message().contains("1 assertion(s) unverified"));
    }

    #[test]
    fn require_inputs_names_missing_variable_and_step() {
        let run = run_of(VALID_WORKFLOW);
        let err = run.require_inputs(1).expect_err("missing");
        match err {
            WorkflowError::VariableMissing {
                variable,
                step,
                name,
            } => {
                assert_eq!(variable, "REPO_NAME");
                assert_eq!(step, 1);
                assert_eq!(name, "Set repository context");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(run.require_inputs(0).is_ok());
    }

    #[test]
    fn reset_clears_outcomes_and_variables_but_keeps_steps() {
        let mut run = run_of(&workflow_with_steps(3));
        run.report(passed(0, &[("X", json!("v"))])).expect("r0");
        run.report(failed(1, "nope")).expect("r1");

        run.reset();

        assert_eq!(run.cursor(), Cursor::At(0));
        assert!(run.variables().is_empty());
        assert_eq!(run.steps().len(), 3);
        assert!(
            run.snapshot()
                .steps
                .iter()
                .all(|s| s.status == StepStatus::NotStarted)
        );
    }

    #[test]
    fn completion_summary_counts_statuses() {
        let mut run = run_of(&workflow_with_steps(4));
        run.report(passed(0, &[("A", json!(true))])).expect("r0");
        run.report(failed(1, "x")).expect("r1");

        let summary = run.completion_summary();
        assert_eq!(summary.total_steps, 4);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.halted_at, Some(1));
        assert_eq!(summary.variables.get("A"), Some(&json!(true)));
    }

    #[test]
    fn seeded_variables_satisfy_inputs() {
        let run = run_of(VALID_WORKFLOW).with_variables(
            [("REPO_NAME".to_string(), json!("seeded"))]
                .into_iter()
                .collect(),
        );
        let prompt = run
            .prompt_for(1, &PromptComposer::default())
            .expect("prompt")
            .expect("step exists");
        assert!(prompt.contains("repository seeded"));
    }

    #[test]
    fn snapshot_serializes_cursor_with_tag() {
        let run = run_of(VALID_WORKFLOW);
        let value = serde_json::to_value(run.snapshot()).expect("serialize");
        assert_eq!(value["cursor"], json!({"state": "at", "step": 0}));
        assert_eq!(value["steps"][0]["status"], "not_started");
    }
}
