//! CLI tests for the offline commands.
//!
//! Spawns the orchestrator binary and checks exit codes and output.

use std::process::Command;

use orchestrator::exit_codes;
use orchestrator::io::config::{DEFAULT_CONFIG_FILE, OrchestratorConfig, load_config};
use orchestrator::test_support::{TestWorkspace, VALID_WORKFLOW, WORKFLOW_WITHOUT_TOOLS};

fn orchestrator(workspace: &TestWorkspace) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_orchestrator"));
    command.current_dir(workspace.path());
    command
}

#[test]
fn check_lists_steps() {
    let workspace = TestWorkspace::new();
    workspace.write_workflow("flow.md", VALID_WORKFLOW);

    let output = orchestrator(&workspace)
        .args(["check", "flow.md"])
        .output()
        .expect("orchestrator check");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Test Workflow"));
    assert!(stdout.contains("3 step(s)"));
    assert!(stdout.contains("2. Create pull request [get_current_branch, create_pull_request]"));
}

#[test]
fn check_reports_format_errors() {
    let workspace = TestWorkspace::new();
    workspace.write_workflow("bad.md", WORKFLOW_WITHOUT_TOOLS);

    let output = orchestrator(&workspace)
        .args(["check", "bad.md"])
        .output()
        .expect("orchestrator check");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[missing_tool_spec]"));
    assert!(stderr.contains("suggestion:"));
}

#[test]
fn check_missing_file_is_invalid() {
    let workspace = TestWorkspace::new();
    let output = orchestrator(&workspace)
        .args(["check", "absent.md"])
        .output()
        .expect("orchestrator check");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error[file_not_found]"));
}

#[test]
fn prompt_renders_step_with_vars() {
    let workspace = TestWorkspace::new();
    workspace.write_workflow("flow.md", VALID_WORKFLOW);

    let output = orchestrator(&workspace)
        .args(["prompt", "flow.md", "--step", "1", "--var", "REPO_NAME=demo"])
        .output()
        .expect("orchestrator prompt");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("## Workflow Step 2 of 3: Set repository context"));
    assert!(stdout.contains("Configure the working context to repository demo"));
}

#[test]
fn prompt_without_required_var_exits_missing_variable() {
    let workspace = TestWorkspace::new();
    workspace.write_workflow("flow.md", VALID_WORKFLOW);

    let output = orchestrator(&workspace)
        .args(["prompt", "flow.md", "--step", "1"])
        .output()
        .expect("orchestrator prompt");

    assert_eq!(output.status.code(), Some(exit_codes::MISSING_VARIABLE));
    assert!(String::from_utf8_lossy(&output.stderr).contains("REPO_NAME"));
}

#[test]
fn prompt_past_last_step_is_invalid() {
    let workspace = TestWorkspace::new();
    workspace.write_workflow("flow.md", VALID_WORKFLOW);

    let output = orchestrator(&workspace)
        .args(["prompt", "flow.md", "--step", "9"])
        .output()
        .expect("orchestrator prompt");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("step 9 does not exist"));
}

#[test]
fn prompt_uses_configured_callback_tool() {
    let workspace = TestWorkspace::new();
    workspace.write_workflow("flow.md", VALID_WORKFLOW);
    workspace.write_file(DEFAULT_CONFIG_FILE, "callback_tool = \"submit_result\"\n");

    let output = orchestrator(&workspace)
        .args(["prompt", "flow.md"])
        .output()
        .expect("orchestrator prompt");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&output.stdout).contains("call `submit_result` with:"));
}

#[test]
fn init_config_writes_defaults_once() {
    let workspace = TestWorkspace::new();

    let status = orchestrator(&workspace)
        .arg("init-config")
        .status()
        .expect("orchestrator init-config");
    assert_eq!(status.code(), Some(exit_codes::OK));
    let path = workspace.path().join(DEFAULT_CONFIG_FILE);
    assert_eq!(
        load_config(&path).expect("load"),
        OrchestratorConfig::default()
    );

    let again = orchestrator(&workspace)
        .arg("init-config")
        .output()
        .expect("orchestrator init-config");
    assert_eq!(again.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&again.stderr).contains("--force"));

    let forced = orchestrator(&workspace)
        .args(["init-config", "--force"])
        .status()
        .expect("orchestrator init-config --force");
    assert_eq!(forced.code(), Some(exit_codes::OK));
}

#[test]
fn check_notes_undeclared_placeholders() {
    let workspace = TestWorkspace::new();
    workspace.write_workflow(
        "flow.md",
        "### 🔧 WORKFLOW STEP: Greet\n```\nSay hello to [USER_NAME]\n```\n\n### 🛠️ TOOL: greet\n",
    );

    let output = orchestrator(&workspace)
        .args(["check", "flow.md"])
        .output()
        .expect("orchestrator check");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(
        String::from_utf8_lossy(&output.stdout)
            .contains("note: [USER_NAME] is not a declared input")
    );
}
