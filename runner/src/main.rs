//! Offline utilities over the webrunner control plane.
//!
//! Everything here works on files: compress a saved observation, replay the
//! early-stop check over a saved trajectory, list the tasks a batch still has
//! to run.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::warn;
use webrunner::core::compress::select_lines;
use webrunner::core::early_stop::{ControlState, early_stop};
use webrunner::core::types::{Trajectory, same_action};
use webrunner::exit_codes;
use webrunner::io::compression_log::append_compression_example;
use webrunner::io::config::{DEFAULT_CONFIG_FILE, RunnerConfig, load_config, write_config};
use webrunner::io::results::{task_range, unfinished_tasks};
use webrunner::io::weights::load_weights;
use webrunner::logging;

#[derive(Parser)]
#[command(
    name = "webrunner",
    version,
    about = "Trajectory control, observation compression and cart feedback for web agents"
)]
struct Cli {
    /// Runner config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Also write logs to a timestamped file in this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Keep the most relevant lines of an observation (file or stdin).
    Compress {
        /// Task objective the lines are scored against.
        #[arg(long)]
        objective: String,
        /// Content lines to keep; defaults to `observation.line_limit`.
        #[arg(long)]
        limit: Option<usize>,
        /// Weights JSON; defaults to `observation.weights_path`.
        #[arg(long)]
        weights: Option<PathBuf>,
        /// Append a JSONL record of the selection to this file.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Observation file; reads stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Evaluate the early-stop rules over a saved trajectory (exit 2 = stop).
    CheckStop {
        trajectory: PathBuf,
        /// Overrides `max_steps` from the config.
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// List task files in `[start, end)` without a render file in the result dir.
    Unfinished {
        #[arg(long)]
        tasks_dir: PathBuf,
        #[arg(long)]
        start: u32,
        #[arg(long)]
        end: u32,
        #[arg(long)]
        result_dir: PathBuf,
    },
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let log_file = cli
        .log_dir
        .as_deref()
        .map(|dir| logging::log_file_path(dir, Local::now()));
    logging::init(log_file.as_deref())?;

    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Compress {
            objective,
            limit,
            weights,
            log,
            file,
        } => {
            let cfg = load_config(&cli.config)?;
            cmd_compress(
                &cfg,
                &objective,
                limit,
                weights.as_deref(),
                log.as_deref(),
                file.as_deref(),
            )
        }
        Command::CheckStop {
            trajectory,
            max_steps,
        } => {
            let cfg = load_config(&cli.config)?;
            cmd_check_stop(&cfg, &trajectory, max_steps)
        }
        Command::Unfinished {
            tasks_dir,
            start,
            end,
            result_dir,
        } => cmd_unfinished(&tasks_dir, start, end, &result_dir),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &RunnerConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_compress(
    cfg: &RunnerConfig,
    objective: &str,
    limit: Option<usize>,
    weights: Option<&Path>,
    log: Option<&Path>,
    file: Option<&Path>,
) -> Result<i32> {
    let observation = match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("read observation from stdin")?;
            buf
        }
    };
    let weights = load_weights(weights.or(cfg.observation.weights_path.as_deref()));
    let limit = limit.unwrap_or(cfg.observation.line_limit);

    let selection = select_lines(&observation, objective, limit, &weights);
    if let Some(path) = log.or(cfg.observation.log_path.as_deref())
        && let Err(err) =
            append_compression_example(path, objective, &observation, &selection.selected)
    {
        warn!(path = %path.display(), error = %format!("{err:#}"), "failed to log compression");
    }
    println!("{}", selection.text);
    Ok(exit_codes::OK)
}

fn cmd_check_stop(cfg: &RunnerConfig, path: &Path, max_steps: Option<usize>) -> Result<i32> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let trajectory: Trajectory =
        serde_json::from_str(&raw).with_context(|| format!("parse trajectory {}", path.display()))?;
    let max_steps = max_steps.unwrap_or(cfg.max_steps);

    match early_stop(&trajectory, max_steps, &cfg.early_stop, same_action) {
        ControlState::Running => {
            println!(
                "running ({} of {max_steps} steps)",
                trajectory.completed_steps()
            );
            Ok(exit_codes::OK)
        }
        ControlState::Stopped(reason) => {
            println!("Early stop: {reason}");
            Ok(exit_codes::STOP)
        }
    }
}

fn cmd_unfinished(tasks_dir: &Path, start: u32, end: u32, result_dir: &Path) -> Result<i32> {
    let tasks = task_range(tasks_dir, start, end);
    for task in unfinished_tasks(&tasks, result_dir)? {
        println!("{}", task.display());
    }
    Ok(exit_codes::OK)
}
