//! Step prompt composer for the driving agent.
//!
//! Renders one step into a self-contained instruction: the resolved
//! description, the tools to call and their order, the verbatim assertions,
//! output extraction hints, and a footer describing the callback the agent must
//! make. Rendering is deterministic and never touches the run.

use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::resolver::resolve;
use crate::core::types::{OutputMapping, Step, VariableMap, display_value};
use crate::error::WorkflowError;

/// Tool the agent calls to report a step result, unless configured otherwise.
pub const DEFAULT_CALLBACK_TOOL: &str = "report_step_result";

const STEP_TEMPLATE: &str = include_str!("prompts/step.md");
const TEMPLATE_NAME: &str = "step_prompt";

/// Template view of a step with its description already resolved.
#[derive(Debug, Serialize)]
struct StepView<'a> {
    /// One-based, for humans.
    number: usize,
    /// Zero-based, echoed back in the callback.
    index: usize,
    total: usize,
    name: &'a str,
    section: Option<&'a str>,
    description: String,
    tools: &'a [String],
    inputs: Vec<InputView<'a>>,
    assertions: &'a [String],
    outputs: &'a [OutputMapping],
    output_variables: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct InputView<'a> {
    name: &'a str,
    description: &'a str,
    value: String,
}

impl<'a> StepView<'a> {
    fn new(step: &'a Step, total: usize, variables: &VariableMap) -> Self {
        let inputs = step
            .inputs
            .iter()
            .map(|input| InputView {
                name: &input.name,
                description: &input.description,
                value: variables
                    .get(&input.name)
                    .map(display_value)
                    .unwrap_or_else(|| format!("[{}]", input.name)),
            })
            .collect();

        Self {
            number: step.index + 1,
            index: step.index,
            total,
            name: &step.name,
            section: step.section.as_deref(),
            description: resolve(&step.description, variables),
            tools: &step.tools,
            inputs,
            assertions: &step.assertions,
            outputs: &step.outputs,
            output_variables: step
                .outputs
                .iter()
                .map(|output| output.variable.as_str())
                .collect(),
        }
    }
}

/// Template engine wrapper that renders step prompts.
#[derive(Debug)]
pub struct PromptComposer {
    env: Environment<'static>,
    callback_tool: String,
}

impl PromptComposer {
    /// Composer using the built-in template.
    pub fn new(callback_tool: impl Into<String>) -> Self {
        Self::with_template(STEP_TEMPLATE.to_string(), callback_tool)
            .expect("built-in step template should be valid")
    }

    /// Composer using a caller-supplied minijinja template.
    ///
    /// The template receives `step` and `callback_tool`.
    pub fn with_template(
        source: String,
        callback_tool: impl Into<String>,
    ) -> Result<Self, WorkflowError> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template_owned(TEMPLATE_NAME, source)?;
        Ok(Self {
            env,
            callback_tool: callback_tool.into(),
        })
    }

    pub fn callback_tool(&self) -> &str {
        &self.callback_tool
    }

    /// Render the prompt for `step` out of `total_steps`.
    ///
    /// Placeholders in the description resolve against `variables`; assertion
    /// text is left exactly as written.
    pub fn compose(
        &self,
        step: &Step,
        total_steps: usize,
        variables: &VariableMap,
    ) -> Result<String, WorkflowError> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        let rendered = template.render(context! {
            step => StepView::new(step, total_steps, variables),
            callback_tool => self.callback_tool.as_str(),
        })?;
        Ok(rendered)
    }
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self::new(DEFAULT_CALLBACK_TOOL)
    }
}
