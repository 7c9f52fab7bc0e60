//! Markdown workflow parser.
//!
//! A workflow document is a sequence of step blocks:
//!
//! ````markdown
//! # Title
//!
//! ## Discovery Phase
//!
//! ### 🔧 WORKFLOW STEP: Discover repositories
//! ```
//! Find all repositories in the current project.
//! ```
//!
//! ### 🛠️ TOOL: repository_discovery
//!
//! ### 📤 OUTPUTS:
//! - result.repositories[0].name → REPO_NAME
//!
//! ### ✅ ASSERT:
//! - result.repositories.length > 0
//! ````
//!
//! Markers are matched on their keyword; the leading emoji is optional. Lines
//! inside fenced blocks are never treated as markers. Parsing either yields
//! every step or fails; it never returns a partial workflow.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::core::types::{InputSpec, OutputMapping, Step};
use crate::error::WorkflowError;

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^###\s*(?:[^\s#]\S*\s+)?(WORKFLOW STEP|TOOLS|TOOL|INPUTS|OUTPUTS|ASSERT)\s*:\s*(.*?)\s*$",
    )
    .expect("marker regex is valid")
});
static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s+(.+?)\s*$").expect("section regex is valid"));
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\s+(.+?)\s*$").expect("title regex is valid"));
static RULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})$")
        .expect("rule regex is valid")
});

const FENCE: &str = "```";

/// A parsed workflow document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowDocument {
    /// First level-1 heading before the first step, informational only.
    pub title: Option<String>,
    pub steps: Vec<Step>,
}

/// Parse workflow text into its ordered steps.
pub fn parse(text: &str) -> Result<Vec<Step>, WorkflowError> {
    parse_document(text).map(|document| document.steps)
}

/// Parse workflow text into steps plus the document title.
pub fn parse_document(text: &str) -> Result<WorkflowDocument, WorkflowError> {
    let (title, blocks) = split_blocks(text);
    if blocks.is_empty() {
        return Err(WorkflowError::EmptyWorkflow);
    }

    let steps = blocks
        .into_iter()
        .enumerate()
        .map(|(index, block)| parse_block(index, block))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(steps = steps.len(), title = ?title, "parsed workflow document");
    Ok(WorkflowDocument { title, steps })
}

/// Marker keywords that may appear inside a step block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Marker {
    Step,
    Tools,
    Inputs,
    Outputs,
    Assertions,
}

impl Marker {
    fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "WORKFLOW STEP" => Marker::Step,
            "TOOL" | "TOOLS" => Marker::Tools,
            "INPUTS" => Marker::Inputs,
            "OUTPUTS" => Marker::Outputs,
            _ => Marker::Assertions,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Marker::Step => "WORKFLOW STEP",
            Marker::Tools => "TOOL/TOOLS",
            Marker::Inputs => "INPUTS",
            Marker::Outputs => "OUTPUTS",
            Marker::Assertions => "ASSERT",
        }
    }
}

fn parse_marker(line: &str) -> Option<(Marker, &str)> {
    let caps = MARKER_RE.captures(line.trim_end())?;
    let keyword = caps.get(1)?.as_str();
    let inline = caps.get(2).map_or("", |m| m.as_str());
    Some((Marker::from_keyword(keyword), inline))
}

/// A markdown thematic break such as `---`; it closes any open list.
fn is_rule(line: &str) -> bool {
    RULE_RE.is_match(line.trim_end())
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

/// Raw lines belonging to one step header, before field extraction.
#[derive(Debug)]
struct RawBlock<'a> {
    name: String,
    section: Option<String>,
    lines: Vec<&'a str>,
}

/// Split the document at step headers, tracking title and section headings.
fn split_blocks(text: &str) -> (Option<String>, Vec<RawBlock<'_>>) {
    let mut title = None;
    let mut section: Option<String> = None;
    let mut blocks: Vec<RawBlock<'_>> = Vec::new();
    let mut in_fence = false;

    for line in text.lines() {
        if is_fence(line) {
            in_fence = !in_fence;
        } else if !in_fence {
            if let Some((Marker::Step, name)) = parse_marker(line) {
                blocks.push(RawBlock {
                    name: name.to_string(),
                    section: section.clone(),
                    lines: Vec::new(),
                });
                continue;
            }
            if let Some(caps) = SECTION_RE.captures(line) {
                section = Some(caps[1].to_string());
            } else if blocks.is_empty()
                && title.is_none()
                && let Some(caps) = TITLE_RE.captures(line)
            {
                title = Some(caps[1].to_string());
            }
        }

        if let Some(block) = blocks.last_mut() {
            block.lines.push(line);
        }
    }

    (title, blocks)
}

/// Field accumulator for a single step block.
struct BlockParser {
    index: usize,
    name: String,
    declared: HashSet<Marker>,
    description: Option<String>,
    tools: Option<Vec<String>>,
    inputs: Vec<InputSpec>,
    outputs: Vec<OutputMapping>,
    assertions: Vec<String>,
}

impl BlockParser {
    fn invalid(&self, issue: impl Into<String>) -> WorkflowError {
        WorkflowError::InvalidFormat {
            step: self.index,
            name: self.name.clone(),
            issue: issue.into(),
        }
    }

    fn declare(&mut self, marker: Marker) -> Result<(), WorkflowError> {
        if marker == Marker::Step || !self.declared.insert(marker) {
            return Err(self.invalid(format!("duplicate {} declaration", marker.label())));
        }
        if marker == Marker::Tools {
            self.tools = Some(Vec::new());
        }
        Ok(())
    }

    fn push_item(&mut self, marker: Marker, item: &str) -> Result<(), WorkflowError> {
        match marker {
            Marker::Tools => {
                let tool = item.trim_matches('`').trim();
                if !tool.is_empty() {
                    self.tools.get_or_insert_with(Vec::new).push(tool.to_string());
                }
            }
            Marker::Inputs => {
                let (name, description) = item.split_once(':').ok_or_else(|| {
                    self.invalid(format!(
                        "input '{item}' must use the form 'NAME: description'"
                    ))
                })?;
                let name = name.trim();
                if name.is_empty() {
                    return Err(self.invalid(format!("input '{item}' has no variable name")));
                }
                let spec = InputSpec {
                    name: name.to_string(),
                    description: description.trim().to_string(),
                };
                match self.inputs.iter_mut().find(|existing| existing.name == spec.name) {
                    Some(existing) => *existing = spec,
                    None => self.inputs.push(spec),
                }
            }
            Marker::Outputs => {
                let (source, variable) = item
                    .split_once('→')
                    .or_else(|| item.split_once("->"))
                    .ok_or_else(|| {
                        self.invalid(format!(
                            "output '{item}' must use the form 'source.path → VARIABLE'"
                        ))
                    })?;
                let (source, variable) = (source.trim(), variable.trim());
                if source.is_empty() || variable.is_empty() {
                    return Err(self.invalid(format!(
                        "output '{item}' needs both a source path and a variable name"
                    )));
                }
                self.outputs.push(OutputMapping {
                    source: source.to_string(),
                    variable: variable.to_string(),
                });
            }
            Marker::Assertions => self.assertions.push(item.to_string()),
            Marker::Step => unreachable!("step headers are consumed while splitting blocks"),
        }
        Ok(())
    }

    fn finish(self, section: Option<String>) -> Result<Step, WorkflowError> {
        let description = match &self.description {
            None => return Err(self.invalid("missing a description code block")),
            Some(text) if text.is_empty() => {
                return Err(self.invalid("description code block is empty"));
            }
            Some(text) => text.clone(),
        };
        let tools = match self.tools {
            Some(tools) if !tools.is_empty() => tools,
            _ => {
                return Err(WorkflowError::MissingToolSpec {
                    step: self.index,
                    name: self.name,
                });
            }
        };

        Ok(Step {
            index: self.index,
            name: self.name,
            section,
            description,
            tools,
            inputs: self.inputs,
            outputs: self.outputs,
            assertions: self.assertions,
        })
    }
}

fn parse_block(index: usize, block: RawBlock<'_>) -> Result<Step, WorkflowError> {
    let mut parser = BlockParser {
        index,
        name: block.name,
        declared: HashSet::new(),
        description: None,
        tools: None,
        inputs: Vec::new(),
        outputs: Vec::new(),
        assertions: Vec::new(),
    };
    if parser.name.is_empty() {
        return Err(parser.invalid("step heading has no name"));
    }

    let mut fence: Option<Vec<&str>> = None;
    let mut list: Option<Marker> = None;

    for line in block.lines {
        let trimmed = line.trim();

        if let Some(buffer) = fence.as_mut() {
            if trimmed.starts_with(FENCE) {
                if parser.description.is_none() {
                    parser.description = Some(buffer.join("\n").trim().to_string());
                }
                fence = None;
            } else {
                buffer.push(line);
            }
            continue;
        }

        if trimmed.starts_with(FENCE) {
            fence = Some(Vec::new());
            list = None;
            continue;
        }

        if let Some((marker, inline)) = parse_marker(line) {
            parser.declare(marker)?;
            if !inline.is_empty() {
                parser.push_item(marker, inline)?;
            }
            list = Some(marker);
            continue;
        }

        if is_rule(line) {
            list = None;
            continue;
        }

        if let Some(marker) = list {
            if trimmed.is_empty() {
                continue;
            }
            if let Some(item) = trimmed.strip_prefix('-') {
                let item = item.trim();
                if !item.is_empty() {
                    parser.push_item(marker, item)?;
                }
                continue;
            }
            list = None;
        }
    }

    if fence.is_some() {
        return Err(parser.invalid("unterminated fenced code block"));
    }

    let step = parser.finish(block.section)?;
    debug!(
        index = step.index,
        name = %step.name,
        tools = step.tools.len(),
        inputs = step.inputs.len(),
        outputs = step.outputs.len(),
        assertions = step.assertions.len(),
        "parsed step"
    );
    Ok(step)
}
