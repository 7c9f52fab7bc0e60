//! Session facade over a single workflow run.
//!
//! [`Orchestrator`] holds at most one [`WorkflowRun`] plus the prompt composer,
//! and exposes the five operations the tool host dispatches to. Every
//! operation except [`Orchestrator::load`] fails with
//! [`WorkflowError::NoWorkflowLoaded`] until a workflow has been loaded.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::parser::WorkflowDocument;
use crate::core::prompt::PromptComposer;
use crate::core::run::{
    CompletionSummary, Cursor, ReportReceipt, StateSnapshot, WorkflowRun,
};
use crate::core::types::{Step, StepReport};
use crate::error::{ErrorReport, WorkflowError};
use crate::io::config::OrchestratorConfig;
use crate::io::workflow_file::load_document;

/// Compact description of one step, used in load and check output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSummary {
    pub index: usize,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub description: String,
    pub tools: Vec<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub assertion_count: usize,
}

impl From<&Step> for StepSummary {
    fn from(step: &Step) -> Self {
        Self {
            index: step.index,
            name: step.name.clone(),
            section: step.section.clone(),
            description: step.description.clone(),
            tools: step.tools.clone(),
            inputs: step.inputs.iter().map(|input| input.name.clone()).collect(),
            outputs: step
                .outputs
                .iter()
                .map(|output| output.variable.clone())
                .collect(),
            assertion_count: step.assertions.len(),
        }
    }
}

/// Result of a successful load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub step_count: usize,
    pub first_step: StepSummary,
}

/// A composed prompt and the step it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepPrompt {
    pub step_number: usize,
    pub step_name: String,
    pub total_steps: usize,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextPrompt {
    Step(StepPrompt),
    Complete(CompletionSummary),
}

/// What the agent should do after a report has been recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NextAction {
    Prompt(StepPrompt),
    Complete(CompletionSummary),
    /// The next step cannot be prompted yet; the report itself was recorded.
    Blocked { error: ErrorReport },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportResponse {
    pub receipt: ReportReceipt,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub next: NextAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub cursor: Cursor,
    pub total_steps: usize,
}

/// Owner of the current run and the settings used to drive it.
#[derive(Debug)]
pub struct Orchestrator {
    run: Option<WorkflowRun>,
    composer: PromptComposer,
    warn_on_assertion_mismatch: bool,
}

impl Orchestrator {
    pub fn new(composer: PromptComposer) -> Self {
        Self {
            run: None,
            composer,
            warn_on_assertion_mismatch: true,
        }
    }

    /// Build a session from config, resolving a custom template against `base_dir`.
    pub fn from_config(config: &OrchestratorConfig, base_dir: &Path) -> anyhow::Result<Self> {
        let composer = config.composer(base_dir)?;
        Ok(Self {
            run: None,
            composer,
            warn_on_assertion_mismatch: config.warn_on_assertion_mismatch,
        })
    }

    /// Tool name rendered in prompt footers for the agent's callback.
    pub fn callback_tool(&self) -> &str {
        self.composer.callback_tool()
    }

    /// Parse the workflow at `path` and replace any existing run with it.
    ///
    /// On failure the previous run, if any, is left untouched.
    pub fn load(&mut self, path: &Path) -> Result<LoadSummary, WorkflowError> {
        let document = load_document(path)?;
        self.install(document, Some(path.to_path_buf()))
    }

    /// Replace any existing run with an already parsed document.
    pub fn load_document(
        &mut self,
        document: WorkflowDocument,
    ) -> Result<LoadSummary, WorkflowError> {
        self.install(document, None)
    }

    fn install(
        &mut self,
        document: WorkflowDocument,
        source: Option<PathBuf>,
    ) -> Result<LoadSummary, WorkflowError> {
        let mut run = WorkflowRun::new(document)?;
        if let Some(path) = &source {
            run = run.with_source(path.clone());
        }

        let summary = LoadSummary {
            source,
            title: run.title().map(str::to_string),
            step_count: run.steps().len(),
            first_step: StepSummary::from(&run.steps()[0]),
        };
        info!(
            steps = summary.step_count,
            source = ?summary.source,
            replaced = self.run.is_some(),
            "workflow loaded"
        );
        self.run = Some(run);
        Ok(summary)
    }

    /// Prompt for the step at the cursor, marking it in progress.
    ///
    /// Once the run is complete (finished or halted) this returns the
    /// completion summary instead.
    pub fn get_next_prompt(&mut self) -> Result<NextPrompt, WorkflowError> {
        let run = loaded_mut(&mut self.run, "execute workflow step")?;
        let Cursor::At(index) = run.cursor() else {
            debug!("next prompt requested on a complete run");
            return Ok(NextPrompt::Complete(run.completion_summary()));
        };
        let prompt = issue_prompt(run, index, &self.composer)?;
        Ok(NextPrompt::Step(prompt))
    }

    /// Record the agent's result for the current step and say what comes next.
    pub fn report_result(&mut self, report: StepReport) -> Result<ReportResponse, WorkflowError> {
        let run = loaded_mut(&mut self.run, "report step result")?;
        let receipt = run.report(report)?;

        let warning = receipt.assertion_mismatch.as_ref().map(|mismatch| {
            let message = mismatch.message();
            if self.warn_on_assertion_mismatch {
                warn!(step = receipt.step, "{message}");
            }
            message
        });

        let next = match receipt.cursor {
            Cursor::Complete => NextAction::Complete(run.completion_summary()),
            Cursor::At(index) => match issue_prompt(run, index, &self.composer) {
                Ok(prompt) => NextAction::Prompt(prompt),
                Err(err) => {
                    warn!(step = index, error = %err, "next step is blocked");
                    NextAction::Blocked {
                        error: err.report(),
                    }
                }
            },
        };

        Ok(ReportResponse {
            receipt,
            warning,
            next,
        })
    }

    /// Render the prompt for any step against the current variables without
    /// touching the run.
    pub fn preview(&self, index: usize) -> Result<Option<StepPrompt>, WorkflowError> {
        let run = loaded(&self.run, "preview step prompt")?;
        let Some(prompt) = run.prompt_for(index, &self.composer)? else {
            return Ok(None);
        };
        Ok(Some(StepPrompt {
            step_number: index,
            step_name: run.steps()[index].name.clone(),
            total_steps: run.steps().len(),
            prompt,
        }))
    }

    pub fn get_state(&self) -> Result<StateSnapshot, WorkflowError> {
        Ok(loaded(&self.run, "get workflow state")?.snapshot())
    }

    /// Rewind the loaded run to its first step, keeping the parsed steps.
    pub fn reset(&mut self) -> Result<ResetSummary, WorkflowError> {
        let run = loaded_mut(&mut self.run, "reset workflow")?;
        run.reset();
        info!(steps = run.steps().len(), "workflow reset");
        Ok(ResetSummary {
            cursor: run.cursor(),
            total_steps: run.steps().len(),
        })
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(PromptComposer::default())
    }
}

fn loaded<'a>(
    run: &'a Option<WorkflowRun>,
    operation: &'static str,
) -> Result<&'a WorkflowRun, WorkflowError> {
    run.as_ref()
        .ok_or(WorkflowError::NoWorkflowLoaded { operation })
}

fn loaded_mut<'a>(
    run: &'a mut Option<WorkflowRun>,
    operation: &'static str,
) -> Result<&'a mut WorkflowRun, WorkflowError> {
    run.as_mut()
        .ok_or(WorkflowError::NoWorkflowLoaded { operation })
}

/// Compose the prompt for `index` and only then mark the step in progress, so
/// a blocked step stays `not_started`.
fn issue_prompt(
    run: &mut WorkflowRun,
    index: usize,
    composer: &PromptComposer,
) -> Result<StepPrompt, WorkflowError> {
    let prompt = run
        .prompt_for(index, composer)?
        .ok_or(WorkflowError::StepOutOfOrder {
            reported: index,
            expected: None,
        })?;
    run.begin_current();
    let step = &run.steps()[index];
    debug!(step = index, name = %step.name, "issued step prompt");
    Ok(StepPrompt {
        step_number: index,
        step_name: step.name.clone(),
        total_steps: run.steps().len(),
        prompt,
    })
}
