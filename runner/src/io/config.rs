//! Runner configuration stored in `webrunner.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::early_stop::EarlyStopThresholds;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "webrunner.toml";

/// Runner configuration (TOML).
///
/// Meant to be edited by hand. Missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Completed steps after which a task is force-stopped.
    pub max_steps: usize,

    /// Ask the renderer to embed a screenshot for every step.
    pub render_screenshot: bool,

    /// Ask the environment to save a trace archive per task.
    pub save_trace: bool,

    pub early_stop: EarlyStopThresholds,
    pub observation: ObservationConfig,
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ObservationConfig {
    /// Maximum content lines kept per observation; `0` disables compression.
    pub line_limit: usize,

    /// JSON file overriding the default scoring weights.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights_path: Option<PathBuf>,

    /// JSONL file receiving one record per compression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Upper bound for each individual page probe.
    pub probe_timeout_ms: u64,

    /// Pause after an action before reading cart signals.
    pub settle_ms: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 200,
            settle_ms: 200,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_steps: 30,
            render_screenshot: true,
            save_trace: false,
            early_stop: EarlyStopThresholds::default(),
            observation: ObservationConfig::default(),
            feedback: FeedbackConfig::default(),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.early_stop.parsing_failure == 0 {
            return Err(anyhow!("early_stop.parsing_failure must be > 0"));
        }
        if self.early_stop.repeating_action == 0 {
            return Err(anyhow!("early_stop.repeating_action must be > 0"));
        }
        if self.feedback.probe_timeout_ms == 0 {
            return Err(anyhow!("feedback.probe_timeout_ms must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunnerConfig) -> Result<()> {
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

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, RunnerConfig::default());
        assert_eq!(cfg.max_steps, 30);
        assert_eq!(cfg.early_stop.parsing_failure, 3);
        assert_eq!(cfg.early_stop.repeating_action, 5);
        assert_eq!(cfg.observation.line_limit, 0);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/webrunner.toml");
        let mut cfg = RunnerConfig::default();
        cfg.observation.line_limit = 40;
        cfg.observation.weights_path = Some(PathBuf::from("weights.json"));
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("webrunner.toml");
        fs::write(
            &path,
            "max_steps = 12\n\n[early_stop]\nrepeating_action = 2\n\n[observation]\nline_limit = 25\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_steps, 12);
        assert_eq!(cfg.early_stop.parsing_failure, 3);
        assert_eq!(cfg.early_stop.repeating_action, 2);
        assert_eq!(cfg.observation.line_limit, 25);
        assert_eq!(cfg.feedback, FeedbackConfig::default());
        assert!(cfg.render_screenshot);
    }

    #[test]
    fn zero_thresholds_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("webrunner.toml");
        fs::write(&path, "[early_stop]\nparsing_failure = 0\n").expect("write");

        let err = load_config(&path).expect_err("zero threshold");
        assert!(format!("{err:#}").contains("parsing_failure must be > 0"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("webrunner.toml");
        fs::write(&path, "max_steps = \"many\"\n").expect("write");
        assert!(load_config(&path).is_err());
    }
}
