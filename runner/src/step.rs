//! Orchestration for a single trajectory step.
//!
//! A step asks the agent for an action (or synthesizes a stop), records it,
//! executes it against the environment, classifies the side effect, and
//! appends the next observation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::compress::select_lines;
use crate::core::early_stop::{ControlState, StopReason, early_stop};
use crate::core::scorer::ObservationWeights;
use crate::core::types::{Action, MetaData, StateInfo, Trajectory, same_action};
use crate::io::agent::{Agent, AgentError};
use crate::io::compression_log::append_compression_example;
use crate::io::config::RunnerConfig;
use crate::io::detector::FeedbackDetector;
use crate::io::env::Environment;
use crate::io::render::Renderer;
use crate::io::task_config::TaskConfig;
use crate::io::weights::load_weights;

/// Action equivalence used for loop detection.
pub type Equivalence = fn(&Action, &Action) -> bool;

/// Why a task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "finish", rename_all = "snake_case")]
pub enum TaskFinish {
    /// The agent chose to stop.
    AgentStop,
    /// The controller forced a stop.
    EarlyStop { reason: StopReason },
    /// The agent failed in a recoverable way; the run was stopped.
    AgentError { message: String },
    /// The environment reported the episode as terminated.
    Terminated,
}

/// Result of [`Controller::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Finished(TaskFinish),
}

/// Run-wide control plane settings, shared read-only by every task.
#[derive(Debug, Clone)]
pub struct Controller {
    config: RunnerConfig,
    weights: ObservationWeights,
    detector: FeedbackDetector,
    equivalence: Equivalence,
}

impl Controller {
    pub fn new(config: RunnerConfig, weights: ObservationWeights) -> Self {
        let detector = FeedbackDetector::from_config(&config.feedback);
        Self {
            config,
            weights,
            detector,
            equivalence: same_action,
        }
    }

    /// Build from config, loading weights from `observation.weights_path`.
    pub fn from_config(config: RunnerConfig) -> Self {
        let weights = load_weights(config.observation.weights_path.as_deref());
        Self::new(config, weights)
    }

    pub fn with_equivalence(mut self, equivalence: Equivalence) -> Self {
        self.equivalence = equivalence;
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Apply the configured line budget to a raw observation.
    ///
    /// Compression log failures are logged and otherwise ignored.
    pub fn compress(&self, observation: String, objective: &str) -> String {
        let limit = self.config.observation.line_limit;
        if limit == 0 {
            return observation;
        }
        let selection = select_lines(&observation, objective, limit, &self.weights);
        debug!(
            limit,
            kept = selection.selected.len(),
            "compressed observation"
        );
        if let Some(path) = &self.config.observation.log_path
            && let Err(err) =
                append_compression_example(path, objective, &observation, &selection.selected)
        {
            warn!(path = %path.display(), error = %format!("{err:#}"), "failed to log compression");
        }
        selection.text
    }

    /// Compress `state` in place against the task intent.
    pub fn prepare_state(&self, state: StateInfo, intent: &str) -> StateInfo {
        StateInfo {
            observation: self.compress(state.observation, intent),
            info: state.info,
        }
    }

    /// Choose the next action: a synthesized stop or the agent's choice.
    ///
    /// Returns the finish reason when the action was synthesized.
    pub fn decide<A: Agent>(
        &self,
        agent: &mut A,
        trajectory: &Trajectory,
        task: &TaskConfig,
        meta: &MetaData,
    ) -> Result<(Action, Option<TaskFinish>)> {
        let state = early_stop(
            trajectory,
            self.config.max_steps,
            &self.config.early_stop,
            self.equivalence,
        );
        if let ControlState::Stopped(reason) = state {
            info!(%reason, "early stop");
            return Ok((
                Action::stop(format!("Early stop: {reason}")),
                Some(TaskFinish::EarlyStop { reason }),
            ));
        }

        match agent.next_action(trajectory, &task.intent, &task.images, meta) {
            Ok(action) => Ok((action, None)),
            Err(err) => {
                let Some(agent_err) = err.downcast_ref::<AgentError>() else {
                    return Err(err.context("agent next_action"));
                };
                warn!(error = %agent_err, "agent failed, stopping task");
                let message = agent_err.to_string();
                Ok((
                    Action::stop(format!("ERROR: {message}")),
                    Some(TaskFinish::AgentError { message }),
                ))
            }
        }
    }

    /// Run one step of the protocol.
    ///
    /// Expects a trajectory ending in a state; leaves it ending in a state on
    /// `Continue` and in a stop action on `Finished`.
    pub fn step<A: Agent, E: Environment, R: Renderer>(
        &self,
        agent: &mut A,
        env: &mut E,
        renderer: &mut R,
        task: &TaskConfig,
        trajectory: &mut Trajectory,
        meta: &mut MetaData,
    ) -> Result<StepOutcome> {
        let (action, synthesized) = self.decide(agent, trajectory, task, meta)?;
        trajectory.push_action(action.clone());

        let state = trajectory.last_state();
        let description = agent
            .describe_action(&action, state)
            .context("describe action")?;
        renderer
            .render(&action, state, meta, self.config.render_screenshot)
            .context("render step")?;
        meta.action_history.push(description);

        if action.is_stop() {
            return Ok(StepOutcome::Finished(
                synthesized.unwrap_or(TaskFinish::AgentStop),
            ));
        }

        let before = self.detector.read_count(env.page());
        let result = env.step(&action).context("environment step")?;
        let event = self.detector.classify(env.page(), before);
        let feedback = event.feedback();
        info!(%feedback, "[Feedback]");
        meta.annotate_last(&feedback);
        meta.last_cart_event = Some(event);

        let terminated = result.terminated;
        trajectory.push_state(self.prepare_state(result.into_state(), &task.intent));
        if terminated {
            trajectory.push_action(Action::stop(""));
            return Ok(StepOutcome::Finished(TaskFinish::Terminated));
        }
        Ok(StepOutcome::Continue)
    }
}
