//! Orchestrator configuration stored in `.orchestrator.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::prompt::{DEFAULT_CALLBACK_TOOL, PromptComposer};
use crate::server::RESERVED_TOOLS;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".orchestrator.toml";

/// Orchestrator configuration (TOML).
///
/// Meant to be edited by humans. Missing fields fall back to defaults, so an
/// empty file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Tool name the agent is told to call after executing a step.
    pub callback_tool: String,

    /// Log a warning when a report carries fewer assertion results than the
    /// step declares.
    pub warn_on_assertion_mismatch: bool,

    /// Minijinja template replacing the built-in step prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            callback_tool: DEFAULT_CALLBACK_TOOL.to_string(),
            warn_on_assertion_mismatch: true,
            prompt_template: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        let tool = self.callback_tool.trim();
        if tool.is_empty() {
            return Err(anyhow!("callback_tool must be a non-empty string"));
        }
        if tool.chars().any(char::is_whitespace) {
            return Err(anyhow!("callback_tool must not contain whitespace"));
        }
        if RESERVED_TOOLS.contains(&tool) {
            return Err(anyhow!("callback_tool '{tool}' collides with a built-in tool"));
        }
        if let Some(template) = &self.prompt_template
            && template.as_os_str().is_empty()
        {
            return Err(anyhow!("prompt_template must not be an empty path"));
        }
        Ok(())
    }

    /// Build the prompt composer this config describes.
    ///
    /// A relative `prompt_template` is resolved against `base_dir`, normally the
    /// directory holding the config file.
    pub fn composer(&self, base_dir: &Path) -> Result<PromptComposer> {
        let Some(template) = &self.prompt_template else {
            return Ok(PromptComposer::new(self.callback_tool.clone()));
        };
        let path = base_dir.join(template);
        let source = fs::read_to_string(&path)
            .with_context(|| format!("read prompt template {}", path.display()))?;
        debug!(template = %path.display(), "using custom prompt template");
        PromptComposer::with_template(source, self.callback_tool.clone())
            .with_context(|| format!("compile prompt template {}", path.display()))
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file missing, using defaults");
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OrchestratorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse;
    use crate::core::types::VariableMap;
    use crate::test_support::SIMPLE_WORKFLOW;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, OrchestratorConfig::default());
        assert_eq!(cfg.callback_tool, "report_step_result");
        assert!(cfg.warn_on_assertion_mismatch);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("orchestrator.toml");
        let cfg = OrchestratorConfig {
            callback_tool: "submit_result".to_string(),
            warn_on_assertion_mismatch: false,
            prompt_template: Some(PathBuf::from("prompts/step.md")),
        };
        write_config(&path, &cfg).expect("write");
        assert!(!path.with_extension("toml.tmp").exists());
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("orchestrator.toml");
        fs::write(&path, "warn_on_assertion_mismatch = false\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.callback_tool, DEFAULT_CALLBACK_TOOL);
        assert!(!cfg.warn_on_assertion_mismatch);
    }

    #[test]
    fn blank_callback_tool_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("orchestrator.toml");
        fs::write(&path, "callback_tool = \"  \"\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("callback_tool"));
    }

    #[test]
    fn callback_tool_cannot_shadow_builtin_tool() {
        let cfg = OrchestratorConfig {
            callback_tool: "reset_workflow".to_string(),
            ..OrchestratorConfig::default()
        };
        let err = cfg.validate().expect_err("reserved");
        assert!(err.to_string().contains("built-in tool"));
    }

    #[test]
    fn composer_reads_relative_template() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join("custom.md"),
            "{{ step.name }} then {{ callback_tool }}",
        )
        .expect("write template");
        let cfg = OrchestratorConfig {
            callback_tool: "done".to_string(),
            prompt_template: Some(PathBuf::from("custom.md")),
            ..OrchestratorConfig::default()
        };

        let composer = cfg.composer(temp.path()).expect("composer");
        let steps = parse(SIMPLE_WORKFLOW).expect("parse");
        let prompt = composer
            .compose(&steps[0], 1, &VariableMap::new())
            .expect("compose");
        assert_eq!(prompt, "Run a single tool then done");
    }

    #[test]
    fn composer_reports_missing_template() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = OrchestratorConfig {
            prompt_template: Some(PathBuf::from("absent.md")),
            ..OrchestratorConfig::default()
        };
        let err = cfg.composer(temp.path()).expect_err("missing");
        assert!(format!("{err:#}").contains("absent.md"));
    }
}
