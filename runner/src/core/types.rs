//! Shared deterministic types for the control plane.
//!
//! These types define stable contracts between the controller, the compressor
//! and the feedback detector. They do not depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminant of an [`Action`].
///
/// Only `Stop`, `None` and `Type` carry meaning for the controller; every other
/// action kind is kept verbatim and treated opaquely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    /// Ends the task; `answer` carries the final answer or stop reason.
    Stop,
    /// The agent output could not be parsed into an action.
    None,
    /// Typing text into a field.
    Type,
    /// Any other domain action (`click`, `scroll`, `goto`, ...).
    Other(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::Stop => "stop",
            ActionType::None => "none",
            ActionType::Type => "type",
            ActionType::Other(name) => name,
        }
    }
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "stop" => ActionType::Stop,
            "none" => ActionType::None,
            "type" => ActionType::Type,
            _ => ActionType::Other(value),
        }
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One agent action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    /// Action-specific fields (element id, typed text, url, ...). Opaque to the core.
    #[serde(default)]
    pub payload: Map<String, Value>,
    /// Final answer or stop reason; only meaningful for `Stop`.
    #[serde(default)]
    pub answer: String,
    /// Model text the action was parsed from, when available.
    #[serde(default)]
    pub raw_prediction: String,
}

impl Action {
    pub fn new(action_type: ActionType) -> Self {
        Self {
            action_type,
            payload: Map::new(),
            answer: String::new(),
            raw_prediction: String::new(),
        }
    }

    /// Build a terminal stop action carrying `answer`.
    pub fn stop(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            ..Self::new(ActionType::Stop)
        }
    }

    pub fn with_payload(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn is_stop(&self) -> bool {
        self.action_type == ActionType::Stop
    }
}

/// Default action equivalence: same discriminant and same payload.
///
/// Domains with richer notions of "same action" inject their own predicate.
pub fn same_action(a: &Action, b: &Action) -> bool {
    a.action_type == b.action_type && a.payload == b.payload
}

/// Observation handed to the agent for one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateInfo {
    pub observation: String,
    /// Environment-provided metadata (observation metadata, page info, ...).
    #[serde(default)]
    pub info: Value,
}

/// One element of a [`Trajectory`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrajectoryItem {
    State(StateInfo),
    Action(Action),
}

/// Alternating `state, action, state, action, ...` history of one task run.
///
/// Always starts with a state. Items are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TrajectoryItem>", into = "Vec<TrajectoryItem>")]
pub struct Trajectory {
    items: Vec<TrajectoryItem>,
}

impl Trajectory {
    pub fn new(initial: StateInfo) -> Self {
        Self {
            items: vec![TrajectoryItem::State(initial)],
        }
    }

    pub fn push_action(&mut self, action: Action) {
        self.items.push(TrajectoryItem::Action(action));
    }

    pub fn push_state(&mut self, state: StateInfo) {
        self.items.push(TrajectoryItem::State(state));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[TrajectoryItem] {
        &self.items
    }

    /// Number of completed action steps, `(len - 1) / 2` in integer arithmetic.
    pub fn completed_steps(&self) -> usize {
        self.items.len().saturating_sub(1) / 2
    }

    /// Actions in order, oldest first.
    pub fn actions(&self) -> Vec<&Action> {
        self.items
            .iter()
            .filter_map(|item| match item {
                TrajectoryItem::Action(action) => Some(action),
                TrajectoryItem::State(_) => None,
            })
            .collect()
    }

    pub fn last_action(&self) -> Option<&Action> {
        self.items.iter().rev().find_map(|item| match item {
            TrajectoryItem::Action(action) => Some(action),
            TrajectoryItem::State(_) => None,
        })
    }

    /// Most recent state (the one the next action will be taken against).
    pub fn last_state(&self) -> &StateInfo {
        self.items
            .iter()
            .rev()
            .find_map(|item| match item {
                TrajectoryItem::State(state) => Some(state),
                TrajectoryItem::Action(_) => None,
            })
            .expect("trajectory always starts with a state")
    }
}

impl TryFrom<Vec<TrajectoryItem>> for Trajectory {
    type Error = String;

    fn try_from(items: Vec<TrajectoryItem>) -> Result<Self, Self::Error> {
        for (idx, item) in items.iter().enumerate() {
            let expect_state = idx % 2 == 0;
            match (expect_state, item) {
                (true, TrajectoryItem::State(_)) | (false, TrajectoryItem::Action(_)) => {}
                (true, TrajectoryItem::Action(_)) => {
                    return Err(format!("trajectory item {idx}: expected state, found action"));
                }
                (false, TrajectoryItem::State(_)) => {
                    return Err(format!("trajectory item {idx}: expected action, found state"));
                }
            }
        }
        if items.is_empty() {
            return Err("trajectory must start with a state".to_string());
        }
        Ok(Self { items })
    }
}

impl From<Trajectory> for Vec<TrajectoryItem> {
    fn from(value: Trajectory) -> Self {
        value.items
    }
}

/// Outcome class of the side effect produced by the last action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    Added,
    Failed,
    NoChange,
}

/// Classified side effect of one non-stop step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEvent {
    pub status: CartStatus,
    pub before: u32,
    pub after: u32,
    pub success_text: Option<String>,
    pub error_text: Option<String>,
    #[serde(default)]
    pub url: String,
}

impl CartEvent {
    /// Human-readable feedback spliced into the action history.
    pub fn feedback(&self) -> String {
        match self.status {
            CartStatus::Failed => format!(
                "[Cart] Add failed: {}",
                self.error_text.as_deref().unwrap_or_default()
            ),
            CartStatus::Added if self.after > self.before => {
                format!("[Cart] Added: count {} -> {}", self.before, self.after)
            }
            CartStatus::Added => format!(
                "[Cart] Added (msg): {}",
                self.success_text.as_deref().unwrap_or_default()
            ),
            CartStatus::NoChange => "[Cart] No change".to_string(),
        }
    }
}

/// Per-task metadata handed to the agent and the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaData {
    /// Human-readable description of every action so far, starting with `"None"`.
    pub action_history: Vec<String>,
    /// Side effect of the previous step; replaced on every non-stop step.
    pub last_cart_event: Option<CartEvent>,
}

impl Default for MetaData {
    fn default() -> Self {
        Self {
            action_history: vec!["None".to_string()],
            last_cart_event: None,
        }
    }
}

impl MetaData {
    /// Append ` | <feedback>` to the most recent history entry.
    pub fn annotate_last(&mut self, feedback: &str) {
        if let Some(last) = self.action_history.last_mut() {
            last.push_str(" | ");
            last.push_str(feedback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(text: &str) -> StateInfo {
        StateInfo {
            observation: text.to_string(),
            info: Value::Null,
        }
    }

    #[test]
    fn action_type_round_trips_known_and_opaque_names() {
        assert_eq!(ActionType::from("STOP".to_string()), ActionType::Stop);
        assert_eq!(ActionType::from("type".to_string()), ActionType::Type);
        assert_eq!(
            ActionType::from("click".to_string()),
            ActionType::Other("click".to_string())
        );
        let json = serde_json::to_string(&Action::stop("done")).expect("serialize");
        assert!(json.contains("\"action_type\":\"stop\""));
    }

    #[test]
    fn completed_steps_uses_integer_division() {
        let mut trajectory = Trajectory::new(state("s0"));
        assert_eq!(trajectory.completed_steps(), 0);
        trajectory.push_action(Action::new(ActionType::None));
        assert_eq!(trajectory.completed_steps(), 0);
        trajectory.push_state(state("s1"));
        assert_eq!(trajectory.completed_steps(), 1);
        assert_eq!(trajectory.actions().len(), 1);
        assert_eq!(trajectory.last_state().observation, "s1");
    }

    #[test]
    fn trajectory_rejects_misordered_items() {
        let items = vec![TrajectoryItem::Action(Action::stop(""))];
        assert!(Trajectory::try_from(items).is_err());
        assert!(Trajectory::try_from(Vec::<TrajectoryItem>::new()).is_err());
    }

    #[test]
    fn annotate_last_appends_feedback() {
        let mut meta = MetaData::default();
        meta.action_history.push("click [12]".to_string());
        meta.annotate_last("[Cart] No change");
        assert_eq!(meta.action_history, vec!["None", "click [12] | [Cart] No change"]);
    }
}
