//! Test-only fixtures: sample workflows, report builders and a scratch workspace.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;

use crate::core::types::{ReportedStatus, StepReport};

/// Three steps across three sections with a variable flowing from step 0 to step 1.
pub const VALID_WORKFLOW: &str = r#"# Test Workflow

## Discovery Phase

### 🔧 WORKFLOW STEP: Discover repositories
```
Find all repositories in the current project.
```

### 🛠️ TOOL: repository_discovery

### 📤 OUTPUTS:
- result.repositories[0].name → REPO_NAME

### ✅ ASSERT:
- result contains "repositories"
- result.repositories.length > 0

## Setup Phase

### 🔧 WORKFLOW STEP: Set repository context
```
Configure the working context to repository [REPO_NAME]
```

### 🛠️ TOOL: set_repository_context

### 📥 INPUTS:
- REPO_NAME: Repository name from discovery step

### ✅ ASSERT:
- result.success == true

## Action Phase

### 🔧 WORKFLOW STEP: Create pull request
```
Create a PR from feature-branch to main
```

### 🛠️ TOOLS:
- get_current_branch
- create_pull_request

### 📤 OUTPUTS:
- result.pullRequestId → PR_ID

### ✅ ASSERT:
- result.status == "active"
- result.pullRequestId > 0
"#;

/// A single step with one tool and one assertion, and no title.
pub const SIMPLE_WORKFLOW: &str = r#"### 🔧 WORKFLOW STEP: Run a single tool
```
Execute the discovery tool and verify results.
```

### 🛠️ TOOL: discovery_tool

### ✅ ASSERT:
- result.success == true
"#;

pub const WORKFLOW_WITHOUT_TOOLS: &str = r#"# Bad Workflow

### 🔧 WORKFLOW STEP: Step with no tool
```
This step has no TOOL section.
```
"#;

pub const EMPTY_WORKFLOW: &str = r#"# Empty Workflow

This workflow has no executable steps.
"#;

/// Build a workflow of `count` steps named `Step 0..count`, each with its own
/// tool and no inputs, outputs or assertions.
pub fn workflow_with_steps(count: usize) -> String {
    let mut doc = String::from("# Generated Workflow\n");
    for index in 0..count {
        doc.push_str(&format!(
            "\n### 🔧 WORKFLOW STEP: Step {index}\n```\nDo thing {index}.\n```\n\n### 🛠️ TOOL: tool_{index}\n"
        ));
    }
    doc
}

/// A passing report for `step` carrying the given output variables.
pub fn passed(step: usize, outputs: &[(&str, Value)]) -> StepReport {
    StepReport {
        step_number: step,
        status: ReportedStatus::Passed,
        assertion_results: Vec::new(),
        output_variables: outputs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect(),
        error_message: None,
    }
}

/// A failing report for `step` with an error message.
pub fn failed(step: usize, message: &str) -> StepReport {
    StepReport {
        step_number: step,
        status: ReportedStatus::Failed,
        assertion_results: Vec::new(),
        output_variables: Default::default(),
        error_message: Some(message.to_string()),
    }
}

/// Temporary directory for workflow and config files, removed on drop.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp workspace"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `name` inside the workspace and return its path.
    pub fn write_workflow(&self, name: &str, contents: &str) -> PathBuf {
        self.write_file(name, contents)
    }

    pub fn write_file(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directory");
        }
        fs::write(&path, contents).expect("write workspace file");
        path
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
