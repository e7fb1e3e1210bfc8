//! Scripted collaborators for unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};

use crate::core::types::{Action, ActionType, CartStatus, MetaData, StateInfo, Trajectory};
use crate::io::agent::{Agent, AgentError};
use crate::io::env::{Environment, StepResult};
use crate::io::page::PageProbe;
use crate::io::render::{Evaluator, Renderer};
use crate::io::results::{ResultDir, render_file_name};
use crate::io::task_config::TaskConfig;

/// Temporary directory holding `tasks/<id>.json` files and a `results/` dir.
pub struct TaskWorkspace {
    temp: tempfile::TempDir,
}

impl TaskWorkspace {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create temp dir")?;
        fs::create_dir_all(temp.path().join("tasks")).context("create tasks dir")?;
        Ok(Self { temp })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Write a task file with a numeric id and return its path.
    pub fn write_task(&self, id: u32) -> Result<PathBuf> {
        let path = self.root().join("tasks").join(format!("{id}.json"));
        let task = serde_json::json!({
            "task_id": id,
            "intent": format!("Add item {id} to the cart"),
            "image": null,
            "start_url": "http://shop.local"
        });
        fs::write(&path, task.to_string()).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn result_dir(&self) -> Result<ResultDir> {
        ResultDir::prepare(self.root().join("results"))
    }
}

/// Minimal task config with id `id`.
pub fn task(id: &str) -> TaskConfig {
    TaskConfig {
        task_id: id.to_string(),
        intent: format!("task {id} intent"),
        images: Vec::new(),
        storage_state: None,
        extra: Map::new(),
    }
}

pub fn click(element_id: u32) -> Action {
    Action::new(ActionType::Other("click".to_string())).with_payload("element_id", element_id)
}

pub fn typing(element_id: u32, text: &str) -> Action {
    Action::new(ActionType::Type)
        .with_payload("element_id", element_id)
        .with_payload("text", text)
}

/// Page with fixed element texts and script results.
#[derive(Debug, Default)]
pub struct FakePage {
    texts: BTreeMap<String, String>,
    failing: BTreeSet<String>,
    scripts: Vec<(String, Value)>,
    failing_scripts: bool,
    url: String,
    waits: RefCell<Vec<Duration>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    /// One element matching `selector` with inner text `text`.
    pub fn with_text(mut self, selector: &str, text: &str) -> Self {
        self.texts.insert(selector.to_string(), text.to_string());
        self
    }

    /// Probes against `selector` fail.
    pub fn with_failing(mut self, selector: &str) -> Self {
        self.failing.insert(selector.to_string());
        self
    }

    /// `evaluate(script)` returns `value`.
    pub fn with_script(mut self, script: &str, value: Value) -> Self {
        self.scripts.push((script.to_string(), value));
        self
    }

    /// Every `evaluate` call fails.
    pub fn with_failing_scripts(mut self) -> Self {
        self.failing_scripts = true;
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.borrow().clone()
    }
}

impl PageProbe for FakePage {
    fn count(&self, selector: &str, _timeout: Duration) -> Result<usize> {
        if self.failing.contains(selector) {
            return Err(anyhow!("timeout waiting for {selector}"));
        }
        Ok(usize::from(self.texts.contains_key(selector)))
    }

    fn inner_text(&self, selector: &str, _timeout: Duration) -> Result<String> {
        if self.failing.contains(selector) {
            return Err(anyhow!("timeout waiting for {selector}"));
        }
        self.texts
            .get(selector)
            .cloned()
            .ok_or_else(|| anyhow!("no element matches {selector}"))
    }

    fn evaluate(&self, script: &str, _timeout: Duration) -> Result<Value> {
        if self.failing_scripts {
            return Err(anyhow!("script evaluation failed"));
        }
        Ok(self
            .scripts
            .iter()
            .find(|(known, _)| known == script)
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null))
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn wait(&self, duration: Duration) -> Result<()> {
        self.waits.borrow_mut().push(duration);
        Ok(())
    }
}

/// One scripted agent reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Action(Action),
    ParseError(String),
    ProviderError(String),
    /// Non-recoverable error.
    Fatal(String),
}

/// Agent replaying a fixed list of replies; runs dry with an error.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    replies: VecDeque<ScriptedReply>,
    calls: usize,
    resets: Vec<String>,
    seen_events: Vec<Option<CartStatus>>,
}

impl ScriptedAgent {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: replies.into(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Task ids the agent was reset for, in order.
    pub fn resets(&self) -> &[String] {
        &self.resets
    }

    /// Status of `last_cart_event` at every `next_action` call.
    pub fn seen_events(&self) -> &[Option<CartStatus>] {
        &self.seen_events
    }
}

impl Agent for ScriptedAgent {
    fn reset(&mut self, task: &TaskConfig) -> Result<()> {
        self.resets.push(task.task_id.clone());
        Ok(())
    }

    fn next_action(
        &mut self,
        _trajectory: &Trajectory,
        _intent: &str,
        _images: &[String],
        meta: &MetaData,
    ) -> Result<Action> {
        self.calls += 1;
        self.seen_events
            .push(meta.last_cart_event.as_ref().map(|event| event.status));
        match self.replies.pop_front() {
            Some(ScriptedReply::Action(action)) => Ok(action),
            Some(ScriptedReply::ParseError(msg)) => Err(AgentError::Parse(msg).into()),
            Some(ScriptedReply::ProviderError(msg)) => Err(AgentError::Provider(msg).into()),
            Some(ScriptedReply::Fatal(msg)) => Err(anyhow!(msg)),
            None => Err(anyhow!("scripted agent ran out of replies")),
        }
    }

    fn describe_action(&self, action: &Action, _state: &StateInfo) -> Result<String> {
        if action.is_stop() {
            return Ok(format!("stop [{}]", action.answer));
        }
        let args: Vec<String> = action
            .payload
            .values()
            .map(|value| match value {
                Value::String(text) => format!("[{text}]"),
                other => format!("[{other}]"),
            })
            .collect();
        if args.is_empty() {
            return Ok(action.action_type.to_string());
        }
        Ok(format!("{} {}", action.action_type, args.join(" ")))
    }
}

/// One scripted environment transition.
#[derive(Debug, Default)]
pub struct ScriptedStep {
    observation: String,
    terminated: bool,
    page: Option<FakePage>,
    error: Option<String>,
}

impl ScriptedStep {
    pub fn new(observation: &str) -> Self {
        Self {
            observation: observation.to_string(),
            ..Self::default()
        }
    }

    /// Page state after the step.
    pub fn with_page(mut self, page: FakePage) -> Self {
        self.page = Some(page);
        self
    }

    pub fn terminated(mut self) -> Self {
        self.terminated = true;
        self
    }

    /// The step fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::default()
        }
    }
}

/// Environment replaying scripted transitions.
///
/// Every `reset` returns the initial observation. The page and the remaining
/// scripted steps carry over, so a batch consumes one shared script.
#[derive(Debug)]
pub struct ScriptedEnvironment {
    initial_observation: String,
    page: FakePage,
    steps: VecDeque<ScriptedStep>,
    executed: Vec<Action>,
    traces: Vec<PathBuf>,
}

impl ScriptedEnvironment {
    pub fn new(initial_observation: &str, page: FakePage) -> Self {
        Self {
            initial_observation: initial_observation.to_string(),
            page,
            steps: VecDeque::new(),
            executed: Vec::new(),
            traces: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<ScriptedStep>) -> Self {
        self.steps = steps.into();
        self
    }

    pub fn executed(&self) -> &[Action] {
        &self.executed
    }

    pub fn traces(&self) -> &[PathBuf] {
        &self.traces
    }
}

impl Environment for ScriptedEnvironment {
    fn reset(&mut self, _task_file: &Path, _task: &TaskConfig) -> Result<StateInfo> {
        Ok(StateInfo {
            observation: self.initial_observation.clone(),
            info: Value::Null,
        })
    }

    fn step(&mut self, action: &Action) -> Result<StepResult> {
        self.executed.push(action.clone());
        let step = self
            .steps
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted step left"))?;
        if let Some(message) = step.error {
            return Err(anyhow!(message));
        }
        if let Some(page) = step.page {
            self.page = page;
        }
        Ok(StepResult {
            observation: step.observation,
            reward: 0.0,
            terminated: step.terminated,
            truncated: false,
            info: Value::Null,
        })
    }

    fn page(&self) -> &dyn PageProbe {
        &self.page
    }

    fn save_trace(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(path, b"trace").with_context(|| format!("write {}", path.display()))?;
        self.traces.push(path.to_path_buf());
        Ok(())
    }
}

/// Renderer recording calls and writing an empty render file per task.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub opened: Vec<String>,
    /// Action type of every rendered step.
    pub rendered: Vec<String>,
    pub closed: usize,
}

impl Renderer for RecordingRenderer {
    fn open(&mut self, task: &TaskConfig, result_dir: &Path) -> Result<()> {
        let path = result_dir.join(render_file_name(&task.task_id));
        fs::write(&path, "<html></html>\n").with_context(|| format!("write {}", path.display()))?;
        self.opened.push(task.task_id.clone());
        Ok(())
    }

    fn render(
        &mut self,
        action: &Action,
        _state: &StateInfo,
        _meta: &MetaData,
        _render_screenshot: bool,
    ) -> Result<()> {
        self.rendered.push(action.action_type.to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed += 1;
        Ok(())
    }
}

/// Evaluator returning a fixed score per task file stem, `0` otherwise.
#[derive(Debug, Default)]
pub struct FixedEvaluator {
    scores: BTreeMap<String, f64>,
}

impl FixedEvaluator {
    pub fn new(scores: &[(&str, f64)]) -> Self {
        Self {
            scores: scores
                .iter()
                .map(|(stem, score)| ((*stem).to_string(), *score))
                .collect(),
        }
    }
}

impl Evaluator for FixedEvaluator {
    fn evaluate(
        &self,
        _trajectory: &Trajectory,
        task_file: &Path,
        _page: &dyn PageProbe,
    ) -> Result<f64> {
        let stem = task_file
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        Ok(self.scores.get(stem).copied().unwrap_or(0.0))
    }
}
