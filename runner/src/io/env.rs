//! Browser environment abstraction.

use std::path::Path;

use anyhow::Result;
use serde_json::Value;

use crate::core::types::{Action, StateInfo};
use crate::io::page::PageProbe;
use crate::io::task_config::TaskConfig;

/// What the environment reports after executing one action.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Raw textual observation, before compression.
    pub observation: String,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
    pub info: Value,
}

impl StepResult {
    pub fn into_state(self) -> StateInfo {
        StateInfo {
            observation: self.observation,
            info: self.info,
        }
    }
}

pub trait Environment {
    /// Load the task (start page, storage state) and return the first observation.
    fn reset(&mut self, task_file: &Path, task: &TaskConfig) -> Result<StateInfo>;

    /// Execute `action` against the page.
    fn step(&mut self, action: &Action) -> Result<StepResult>;

    /// Live page handle used for side-effect probes.
    fn page(&self) -> &dyn PageProbe;

    /// Write the trace recorded since the last reset to `path`.
    fn save_trace(&mut self, path: &Path) -> Result<()>;
}
