//! Line-delimited JSON tool host.
//!
//! Each request is one JSON object per line:
//!
//! ```text
//! {"id": 1, "tool": "load_workflow", "arguments": {"file_path": "deploy.md"}}
//! ```
//!
//! and each reply is one line:
//!
//! ```text
//! {"id": 1, "ok": true, "result": {...}}
//! {"id": 1, "ok": false, "error": {"type": "...", "message": "...", "suggestion": "..."}}
//! ```
//!
//! Arguments are validated against the tool's input schema (Draft 2020-12)
//! before dispatch. Requests are handled one at a time, in arrival order.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use jsonschema::{Draft, Validator};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::core::types::StepReport;
use crate::error::{ErrorKind, ErrorReport};
use crate::session::Orchestrator;

const TOOLS_JSON: &str = include_str!("../schemas/tools.json");

/// Tool that returns the catalogue itself; it takes no arguments.
pub const LIST_TOOLS: &str = "list_tools";
pub const LOAD_WORKFLOW: &str = "load_workflow";
pub const EXECUTE_WORKFLOW_STEP: &str = "execute_workflow_step";
pub const REPORT_STEP_RESULT: &str = "report_step_result";
pub const GET_WORKFLOW_STATE: &str = "get_workflow_state";
pub const RESET_WORKFLOW: &str = "reset_workflow";

/// Tool names the callback tool may not take over.
pub const RESERVED_TOOLS: [&str; 5] = [
    LIST_TOOLS,
    LOAD_WORKFLOW,
    EXECUTE_WORKFLOW_STEP,
    GET_WORKFLOW_STATE,
    RESET_WORKFLOW,
];

/// Catalogue entry for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct Request {
    tool: String,
    #[serde(default)]
    arguments: Value,
}

/// One reply line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    pub id: Value,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl Reply {
    fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, error: ErrorReport) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoadArgs {
    file_path: PathBuf,
}

/// Serves the session's operations as tools.
pub struct ToolHost {
    session: Orchestrator,
    tools: Vec<ToolSpec>,
    validators: BTreeMap<String, Validator>,
}

impl ToolHost {
    /// Load the tool catalogue and compile every input schema.
    ///
    /// The report tool is published under the session's callback tool name so
    /// the name in prompt footers is always callable.
    pub fn new(session: Orchestrator) -> Result<Self> {
        let callback = session.callback_tool();
        if RESERVED_TOOLS.contains(&callback) {
            bail!("callback tool '{callback}' collides with a built-in tool");
        }

        let mut tools: Vec<ToolSpec> =
            serde_json::from_str(TOOLS_JSON).context("parse tool catalogue")?;
        for tool in &mut tools {
            if tool.name == REPORT_STEP_RESULT {
                tool.name = callback.to_string();
            }
        }

        let mut validators = BTreeMap::new();
        for tool in &tools {
            let validator = jsonschema::options()
                .with_draft(Draft::Draft202012)
                .build(&tool.input_schema)
                .with_context(|| format!("compile input schema for {}", tool.name))?;
            validators.insert(tool.name.clone(), validator);
        }
        debug!(tools = tools.len(), "tool catalogue loaded");

        Ok(Self {
            session,
            tools,
            validators,
        })
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    /// Answer requests from `reader` until end of input.
    ///
    /// Blank lines are ignored. Only I/O failures end the loop early; every
    /// malformed request gets an error reply.
    pub fn serve<R: BufRead, W: Write>(&mut self, reader: R, mut writer: W) -> Result<()> {
        info!("tool host ready");
        for line in reader.lines() {
            let line = line.context("read request line")?;
            if line.trim().is_empty() {
                continue;
            }
            let reply = self.handle_line(&line);
            serde_json::to_writer(&mut writer, &reply).context("serialize reply")?;
            writer.write_all(b"\n").context("write reply")?;
            writer.flush().context("flush reply")?;
        }
        info!("input closed, tool host stopping");
        Ok(())
    }

    /// Handle one raw request line.
    pub fn handle_line(&mut self, line: &str) -> Reply {
        let raw: Value = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "rejected malformed request");
                return Reply::failure(
                    Value::Null,
                    invalid_request(
                        format!("request is not valid JSON: {err}"),
                        "Send one JSON object per line",
                    ),
                );
            }
        };
        let id = raw.get("id").cloned().unwrap_or(Value::Null);
        let request: Request = match serde_json::from_value(raw) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "rejected request without a tool");
                return Reply::failure(
                    id,
                    invalid_request(
                        format!("malformed request: {err}"),
                        "Requests look like {\"id\": 1, \"tool\": \"list_tools\", \"arguments\": {}}",
                    ),
                );
            }
        };

        match self.call(&request.tool, request.arguments) {
            Ok(result) => Reply::success(id, result),
            Err(error) => Reply::failure(id, error),
        }
    }

    /// Validate `arguments` and dispatch to the named tool.
    pub fn call(&mut self, tool: &str, arguments: Value) -> Result<Value, ErrorReport> {
        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };
        info!(tool, "tool called");

        if tool == LIST_TOOLS {
            return to_result(&json!({ "tools": self.tools }));
        }

        let Some(validator) = self.validators.get(tool) else {
            warn!(tool, "unknown tool");
            return Err(invalid_request(
                format!("unknown tool '{tool}'"),
                "Call list_tools to see the available tools",
            ));
        };
        let violations: Vec<String> = validator
            .iter_errors(&arguments)
            .map(|err| err.to_string())
            .collect();
        if !violations.is_empty() {
            warn!(tool, violations = violations.len(), "arguments rejected");
            return Err(invalid_request(
                format!(
                    "invalid arguments for {tool}:\n- {}",
                    violations.join("\n- ")
                ),
                "Check the tool's input_schema from list_tools",
            ));
        }

        let result = if tool == self.session.callback_tool() {
            let report: StepReport = parse_arguments(tool, arguments)?;
            self.session
                .report_result(report)
                .map_err(|err| err.report())
                .and_then(|response| to_result(&response))
        } else {
            match tool {
                LOAD_WORKFLOW => {
                    let args: LoadArgs = parse_arguments(tool, arguments)?;
                    self.session
                        .load(&args.file_path)
                        .map_err(|err| err.report())
                        .and_then(|summary| to_result(&summary))
                }
                EXECUTE_WORKFLOW_STEP => self
                    .session
                    .get_next_prompt()
                    .map_err(|err| err.report())
                    .and_then(|next| to_result(&next)),
                GET_WORKFLOW_STATE => self
                    .session
                    .get_state()
                    .map_err(|err| err.report())
                    .and_then(|state| to_result(&state)),
                RESET_WORKFLOW => self
                    .session
                    .reset()
                    .map_err(|err| err.report())
                    .and_then(|summary| to_result(&summary)),
                other => Err(invalid_request(
                    format!("tool '{other}' has no handler"),
                    "Call list_tools to see the available tools",
                )),
            }
        };

        if let Err(error) = &result {
            warn!(tool, kind = error.kind.as_str(), "{}", error.message);
        }
        result
    }
}

fn invalid_request(message: String, suggestion: &str) -> ErrorReport {
    ErrorReport {
        kind: ErrorKind::InvalidRequest,
        message,
        suggestion: suggestion.to_string(),
        example: None,
    }
}

fn parse_arguments<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T, ErrorReport> {
    serde_json::from_value(arguments).map_err(|err| {
        invalid_request(
            format!("invalid arguments for {tool}: {err}"),
            "Check the tool's input_schema from list_tools",
        )
    })
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, ErrorReport> {
    serde_json::to_value(value).map_err(|err| ErrorReport {
        kind: ErrorKind::Unexpected,
        message: format!("failed to serialize result: {err}"),
        suggestion: "Report this as a bug in the orchestrator".to_string(),
        example: None,
    })
}
