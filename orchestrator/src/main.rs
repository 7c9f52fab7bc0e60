//! Markdown workflow orchestrator.
//!
//! Serves workflow tools to an agent over stdio, and offers offline commands to
//! check a workflow document and render a single step prompt.

use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::debug;

use orchestrator::core::resolver::placeholders;
use orchestrator::core::run::WorkflowRun;
use orchestrator::core::types::VariableMap;
use orchestrator::error::{ErrorKind, WorkflowError};
use orchestrator::exit_codes;
use orchestrator::io::config::{
    DEFAULT_CONFIG_FILE, OrchestratorConfig, load_config, write_config,
};
use orchestrator::io::workflow_file::load_document;
use orchestrator::logging;
use orchestrator::server::ToolHost;
use orchestrator::session::{Orchestrator, StepSummary};

#[derive(Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Step-by-step orchestration of markdown workflows for tool-calling agents"
)]
struct Cli {
    /// Config file (defaults to `.orchestrator.toml` in the working directory).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve workflow tools as line-delimited JSON over stdin/stdout.
    Serve,
    /// Parse a workflow file and print its steps.
    Check {
        /// Workflow markdown file.
        file: PathBuf,
    },
    /// Render the prompt for one step without running the workflow.
    Prompt {
        /// Workflow markdown file.
        file: PathBuf,
        /// Zero-based step number.
        #[arg(short, long, default_value_t = 0)]
        step: usize,
        /// Variable available to the step, as NAME=VALUE. Repeatable.
        #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },
    /// Write the default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    match cli.command {
        Command::Serve => cmd_serve(&config_path),
        Command::Check { file } => cmd_check(&file),
        Command::Prompt { file, step, vars } => cmd_prompt(&config_path, &file, step, vars),
        Command::InitConfig { force } => cmd_init_config(&config_path, force),
    }
}

fn cmd_serve(config_path: &Path) -> Result<i32> {
    let session = session_from_config(config_path)?;
    let mut host = ToolHost::new(session)?;
    let stdin = io::stdin();
    let stdout = io::stdout();
    host.serve(BufReader::new(stdin.lock()), stdout.lock())?;
    Ok(exit_codes::OK)
}

fn cmd_check(file: &Path) -> Result<i32> {
    let document = match load_document(file) {
        Ok(document) => document,
        Err(err) => {
            print_workflow_error(&err);
            return Ok(exit_codes::INVALID);
        }
    };

    if let Some(title) = &document.title {
        println!("{title}");
    }
    println!("{} step(s)", document.steps.len());
    for step in &document.steps {
        println!("{}", describe_step(&StepSummary::from(step)));
        for name in placeholders(&step.description) {
            if !step.inputs.iter().any(|input| input.name == name) {
                println!("     note: [{name}] is not a declared input and may render verbatim");
            }
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_prompt(
    config_path: &Path,
    file: &Path,
    step: usize,
    vars: Vec<(String, String)>,
) -> Result<i32> {
    let config = load_config(config_path)?;
    let composer = config.composer(&config_base_dir(config_path))?;

    let document = match load_document(file) {
        Ok(document) => document,
        Err(err) => {
            print_workflow_error(&err);
            return Ok(exit_codes::INVALID);
        }
    };
    let step_count = document.steps.len();
    let variables: VariableMap = vars
        .into_iter()
        .map(|(name, value)| (name, Value::String(value)))
        .collect();
    debug!(variables = variables.len(), step, "rendering offline prompt");

    let run = WorkflowRun::new(document)?.with_variables(variables);
    match run.prompt_for(step, &composer) {
        Ok(Some(prompt)) => {
            println!("{prompt}");
            Ok(exit_codes::OK)
        }
        Ok(None) => bail!("step {step} does not exist; the workflow has {step_count} step(s)"),
        Err(err) if err.kind() == ErrorKind::VariableMissing => {
            print_workflow_error(&err);
            Ok(exit_codes::MISSING_VARIABLE)
        }
        Err(err) => {
            print_workflow_error(&err);
            Ok(exit_codes::INVALID)
        }
    }
}

fn cmd_init_config(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        bail!(
            "{} already exists; pass --force to overwrite",
            config_path.display()
        );
    }
    write_config(config_path, &OrchestratorConfig::default())
        .with_context(|| format!("write {}", config_path.display()))?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn session_from_config(config_path: &Path) -> Result<Orchestrator> {
    let config = load_config(config_path)?;
    Orchestrator::from_config(&config, &config_base_dir(config_path))
}

fn config_base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn describe_step(step: &StepSummary) -> String {
    let mut line = format!("  {}. {} [{}]", step.index, step.name, step.tools.join(", "));
    if !step.inputs.is_empty() {
        line.push_str(&format!(" inputs: {}", step.inputs.join(", ")));
    }
    if !step.outputs.is_empty() {
        line.push_str(&format!(" outputs: {}", step.outputs.join(", ")));
    }
    if step.assertion_count > 0 {
        line.push_str(&format!(" assertions: {}", step.assertion_count));
    }
    line
}

fn print_workflow_error(err: &WorkflowError) {
    let report = err.report();
    eprintln!("error[{}]: {}", report.kind.as_str(), report.message);
    eprintln!("suggestion: {}", report.suggestion);
    if let Some(example) = report.example {
        eprintln!("example:\n{example}");
    }
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    let Some((name, value)) = raw.split_once('=') else {
        return Err(format!("expected NAME=VALUE, got '{raw}'"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err("variable name must not be empty".to_string());
    }
    Ok((name.to_string(), value.to_string()))
}
