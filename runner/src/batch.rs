//! Sequential batch runs over task files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::io::agent::Agent;
use crate::io::env::Environment;
use crate::io::render::{Evaluator, Renderer};
use crate::io::results::ResultDir;
use crate::io::task_config::load_task;
use crate::step::{Controller, TaskFinish};
use crate::task::run_task;

/// Score of one task in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskScore {
    pub task_file: PathBuf,
    /// Task id, when the task file could be read.
    pub task_id: Option<String>,
    pub score: f64,
    /// How the task ended; `None` when it failed with an error.
    pub finish: Option<TaskFinish>,
    /// Error chain of a failed task.
    pub error: Option<String>,
}

impl TaskScore {
    pub fn passed(&self) -> bool {
        self.score == 1.0
    }
}

/// Summary of a batch invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub scores: Vec<TaskScore>,
}

impl BatchOutcome {
    /// Mean score over every task, failed tasks counting as `0`.
    pub fn average(&self) -> Option<f64> {
        if self.scores.is_empty() {
            return None;
        }
        let total: f64 = self.scores.iter().map(|score| score.score).sum();
        Some(total / self.scores.len() as f64)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskScore> {
        self.scores.iter().filter(|score| score.error.is_some())
    }
}

/// The collaborators a batch drives, bundled so they can be borrowed together.
pub struct Collaborators<'a, A, E, R, V> {
    pub agent: &'a mut A,
    pub env: &'a mut E,
    pub renderer: &'a mut R,
    pub evaluator: &'a V,
}

/// Run every task file in order.
///
/// A task that fails with an error is logged, appended to `error.txt`, scored
/// `0`, and the batch moves on. Only result-directory write failures abort.
#[instrument(skip_all, fields(tasks = task_files.len(), result_dir = %results.root().display()))]
pub fn run_batch<A, E, R, V, F>(
    controller: &Controller,
    collaborators: Collaborators<'_, A, E, R, V>,
    task_files: &[PathBuf],
    results: &ResultDir,
    mut on_task: F,
) -> Result<BatchOutcome>
where
    A: Agent,
    E: Environment,
    R: Renderer,
    V: Evaluator,
    F: FnMut(&TaskScore),
{
    let Collaborators {
        agent,
        env,
        renderer,
        evaluator,
    } = collaborators;
    results.dump_config(controller.config())?;
    results.record_log_file().context("record log file")?;

    let mut scores = Vec::with_capacity(task_files.len());
    for task_file in task_files {
        let score = match run_one(controller, agent, env, renderer, evaluator, task_file, results)
        {
            Ok(score) => score,
            Err(err) => {
                error!(
                    task_file = %task_file.display(),
                    error = %format!("{err:#}"),
                    "[Unhandled Error]"
                );
                results
                    .append_error(task_file, &err)
                    .context("record task error")?;
                TaskScore {
                    task_file: task_file.clone(),
                    task_id: None,
                    score: 0.0,
                    finish: None,
                    error: Some(format!("{err:#}")),
                }
            }
        };
        on_task(&score);
        scores.push(score);
    }

    let outcome = BatchOutcome { scores };
    if let Some(average) = outcome.average() {
        info!(average, "Average score");
    }
    Ok(outcome)
}

fn run_one<A: Agent, E: Environment, R: Renderer, V: Evaluator>(
    controller: &Controller,
    agent: &mut A,
    env: &mut E,
    renderer: &mut R,
    evaluator: &V,
    task_file: &Path,
    results: &ResultDir,
) -> Result<TaskScore> {
    let task = load_task(task_file)?;
    info!(config_file = %task_file.display(), "[Config file]");
    info!(intent = %task.intent, "[Intent]");

    let run = run_task(
        controller,
        agent,
        env,
        renderer,
        task_file,
        &task,
        results.root(),
    )?;
    let score = evaluator
        .evaluate(&run.trajectory, task_file, env.page())
        .context("evaluate trajectory")?;
    if score == 1.0 {
        info!(task_file = %task_file.display(), "[Result] (PASS)");
    } else {
        info!(task_file = %task_file.display(), score, "[Result] (FAIL)");
    }

    if controller.config().save_trace {
        let trace = results.trace_path(&task.task_id);
        env.save_trace(&trace)
            .with_context(|| format!("save trace {}", trace.display()))?;
    }

    Ok(TaskScore {
        task_file: task_file.to_path_buf(),
        task_id: Some(task.task_id),
        score,
        finish: Some(run.finish),
        error: None,
    })
}
