//! Early-stop state machine evaluated before every action request.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::types::{Action, ActionType, Trajectory};

/// Loop-detection thresholds, supplied once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStopThresholds {
    /// Consecutive unparseable actions that end the task.
    pub parsing_failure: usize,
    /// Repetitions of the same action that end the task.
    pub repeating_action: usize,
}

impl Default for EarlyStopThresholds {
    fn default() -> Self {
        Self {
            parsing_failure: 3,
            repeating_action: 5,
        }
    }
}

/// Why the controller forced a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StopReason {
    MaxSteps { max_steps: usize },
    ParseFailure { times: usize },
    RepeatedAction { times: usize },
    RepeatedTyping { times: usize },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::MaxSteps { max_steps } => write!(f, "reached max steps ({max_steps})"),
            StopReason::ParseFailure { times } => {
                write!(f, "repeated parse failure ({times} times)")
            }
            StopReason::RepeatedAction { times } => {
                write!(f, "same action repeated ({times} times)")
            }
            StopReason::RepeatedTyping { times } => {
                write!(f, "same typing action repeated ({times} times)")
            }
        }
    }
}

/// Controller state at a decision point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Running,
    Stopped(StopReason),
}

/// Decide whether the task must stop before the next action is requested.
///
/// Checks run in a fixed order and the first match wins:
///
/// 1. completed steps `>= max_steps`;
/// 2. the last `parsing_failure` actions are all `none` (needs that many actions);
/// 3. the last action repeats. Non-typing actions must fill the whole tail window
///    of `repeating_action` actions. Typing actions are counted over the entire
///    history, so scattered retyping of the same field also trips the check.
///
/// A threshold of `0` disables its check.
pub fn early_stop<F>(
    trajectory: &Trajectory,
    max_steps: usize,
    thresholds: &EarlyStopThresholds,
    equivalent: F,
) -> ControlState
where
    F: Fn(&Action, &Action) -> bool,
{
    if trajectory.completed_steps() >= max_steps {
        return ControlState::Stopped(StopReason::MaxSteps { max_steps });
    }

    let actions = trajectory.actions();

    let k = thresholds.parsing_failure;
    if k > 0
        && actions.len() >= k
        && actions[actions.len() - k..]
            .iter()
            .all(|action| action.action_type == ActionType::None)
    {
        return ControlState::Stopped(StopReason::ParseFailure { times: k });
    }

    let Some(last) = actions.last().copied() else {
        return ControlState::Running;
    };

    let k = thresholds.repeating_action;
    if k == 0 {
        return ControlState::Running;
    }
    if last.action_type == ActionType::Type {
        let repeats = actions
            .iter()
            .filter(|&&action| equivalent(action, last))
            .count();
        if repeats >= k {
            return ControlState::Stopped(StopReason::RepeatedTyping { times: k });
        }
    } else if actions.len() >= k
        && actions[actions.len() - k..]
            .iter()
            .all(|&action| equivalent(action, last))
    {
        return ControlState::Stopped(StopReason::RepeatedAction { times: k });
    }

    ControlState::Running
}
