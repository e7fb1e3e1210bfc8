//! Run one task from reset to stop.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::types::{MetaData, Trajectory};
use crate::io::agent::Agent;
use crate::io::env::Environment;
use crate::io::render::Renderer;
use crate::io::task_config::TaskConfig;
use crate::step::{Controller, StepOutcome, TaskFinish};

/// Everything a finished task leaves behind for evaluation.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub trajectory: Trajectory,
    pub meta: MetaData,
    pub finish: TaskFinish,
}

/// Drive `task` until the agent stops, the controller stops it, or the
/// environment terminates.
///
/// The renderer is opened first and always closed, even when a step fails.
#[instrument(skip_all, fields(task_id = %task.task_id))]
pub fn run_task<A: Agent, E: Environment, R: Renderer>(
    controller: &Controller,
    agent: &mut A,
    env: &mut E,
    renderer: &mut R,
    task_file: &Path,
    task: &TaskConfig,
    result_dir: &Path,
) -> Result<TaskRun> {
    renderer.open(task, result_dir).context("open renderer")?;
    let run = drive(controller, agent, env, renderer, task_file, task);
    let closed = renderer.close().context("close renderer");
    match (run, closed) {
        (Ok(run), Ok(())) => Ok(run),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(error = %format!("{close_err:#}"), "renderer close failed after task error");
            Err(err)
        }
    }
}

fn drive<A: Agent, E: Environment, R: Renderer>(
    controller: &Controller,
    agent: &mut A,
    env: &mut E,
    renderer: &mut R,
    task_file: &Path,
    task: &TaskConfig,
) -> Result<TaskRun> {
    agent.reset(task).context("reset agent")?;
    let initial = env
        .reset(task_file, task)
        .with_context(|| format!("reset environment for {}", task_file.display()))?;
    let mut trajectory = Trajectory::new(controller.prepare_state(initial, &task.intent));
    let mut meta = MetaData::default();

    loop {
        match controller.step(agent, env, renderer, task, &mut trajectory, &mut meta)? {
            StepOutcome::Continue => {}
            StepOutcome::Finished(finish) => {
                info!(
                    steps = trajectory.completed_steps(),
                    ?finish,
                    "task finished"
                );
                return Ok(TaskRun {
                    trajectory,
                    meta,
                    finish,
                });
            }
        }
    }
}
