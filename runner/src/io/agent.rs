//! Agent abstraction.
//!
//! The [`Agent`] trait decouples the controller from the model backend and its
//! prompt format. Tests use scripted agents that replay predetermined actions.

use anyhow::Result;
use thiserror::Error;

use crate::core::types::{Action, MetaData, StateInfo, Trajectory};
use crate::io::task_config::TaskConfig;

/// Agent failures the controller recovers from by stopping the task.
///
/// Return these wrapped in `anyhow::Error`; the controller finds them with
/// `downcast_ref`. Any other error aborts the task.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to parse model output: {0}")]
    Parse(String),
    #[error("model provider error: {0}")]
    Provider(String),
}

pub trait Agent {
    /// Prepare for a new task.
    fn reset(&mut self, task: &TaskConfig) -> Result<()>;

    /// Choose the next action for the current trajectory.
    fn next_action(
        &mut self,
        trajectory: &Trajectory,
        intent: &str,
        images: &[String],
        meta: &MetaData,
    ) -> Result<Action>;

    /// Human-readable description of `action`, taken against `state`.
    fn describe_action(&self, action: &Action, state: &StateInfo) -> Result<String>;
}
