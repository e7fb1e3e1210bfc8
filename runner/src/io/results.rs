//! Result directory layout for batch runs.
//!
//! ```text
//! <result_dir>/
//!   config.json          runner config, written once
//!   log_files.txt        one log file path per run that wrote here
//!   error.txt            appended diagnostics of failed tasks
//!   render_<id>.html     written by the renderer; marks the task finished
//!   traces/<id>.zip      written by the environment when tracing is on
//! ```

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::io::config::RunnerConfig;

const RENDER_PREFIX: &str = "render_";

pub fn render_file_name(task_id: &str) -> String {
    format!("{RENDER_PREFIX}{task_id}.html")
}

#[derive(Debug, Clone)]
pub struct ResultDir {
    root: PathBuf,
    log_file: Option<PathBuf>,
}

impl ResultDir {
    /// Create the directory (and `traces/`) if needed.
    pub fn prepare(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let traces = root.join("traces");
        fs::create_dir_all(&traces).with_context(|| format!("create {}", traces.display()))?;
        info!(result_dir = %root.display(), "prepared result directory");
        Ok(Self {
            root,
            log_file: None,
        })
    }

    /// Log file of the current run, recorded by [`ResultDir::record_log_file`].
    pub fn with_log_file(mut self, log_file: impl Into<PathBuf>) -> Self {
        self.log_file = Some(log_file.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trace_path(&self, task_id: &str) -> PathBuf {
        self.root.join("traces").join(format!("{task_id}.zip"))
    }

    pub fn error_path(&self) -> PathBuf {
        self.root.join("error.txt")
    }

    /// Write `config.json` unless an earlier run already did.
    pub fn dump_config(&self, cfg: &RunnerConfig) -> Result<()> {
        let path = self.root.join("config.json");
        if path.exists() {
            return Ok(());
        }
        let mut payload = serde_json::to_string_pretty(cfg).context("serialize config json")?;
        payload.push('\n');
        fs::write(&path, payload).with_context(|| format!("write {}", path.display()))
    }

    /// Append the current run's log file to `log_files.txt`, if there is one.
    pub fn record_log_file(&self) -> Result<()> {
        let Some(log_file) = &self.log_file else {
            return Ok(());
        };
        append_line(
            &self.root.join("log_files.txt"),
            &log_file.display().to_string(),
        )
    }

    /// Append a failed task's diagnostic to `error.txt`.
    pub fn append_error(&self, task_file: &Path, err: &anyhow::Error) -> Result<()> {
        append_line(
            &self.error_path(),
            &format!("[Config file]: {}\n[Unhandled Error] {err:?}\n", task_file.display()),
        )
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    writeln!(file, "{line}").with_context(|| format!("append {}", path.display()))
}

/// Task files `<start>.json` .. `<end - 1>.json` under `tasks_dir`.
pub fn task_range(tasks_dir: &Path, start: u32, end: u32) -> Vec<PathBuf> {
    (start..end)
        .map(|idx| tasks_dir.join(format!("{idx}.json")))
        .collect()
}

/// Task ids that already have a render file in `result_dir`.
pub fn finished_task_ids(result_dir: &Path) -> Result<BTreeSet<String>> {
    let mut finished = BTreeSet::new();
    if !result_dir.exists() {
        return Ok(finished);
    }
    let entries =
        fs::read_dir(result_dir).with_context(|| format!("read dir {}", result_dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("read dir {}", result_dir.display()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(rest) = name.strip_prefix(RENDER_PREFIX)
            && let Some(task_id) = rest.strip_suffix(".html")
        {
            finished.insert(task_id.to_string());
        }
    }
    Ok(finished)
}

/// Task files whose id (file stem) has no render file in `result_dir` yet.
pub fn unfinished_tasks(task_files: &[PathBuf], result_dir: &Path) -> Result<Vec<PathBuf>> {
    let finished = finished_task_ids(result_dir)?;
    Ok(task_files
        .iter()
        .filter(|path| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .is_none_or(|stem| !finished.contains(stem))
        })
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_creates_traces_and_records_logs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("results");
        let dir = ResultDir::prepare(&root).expect("prepare");
        assert!(dir.root().join("traces").is_dir());
        dir.record_log_file().expect("no log file");
        assert!(!root.join("log_files.txt").exists());

        for name in ["log_a.log", "log_b.log"] {
            let dir = ResultDir::prepare(&root)
                .expect("prepare again")
                .with_log_file(Path::new("log_files").join(name));
            dir.record_log_file().expect("record");
        }
        let logs = fs::read_to_string(root.join("log_files.txt")).expect("read");
        assert_eq!(logs, "log_files/log_a.log\nlog_files/log_b.log\n");
        assert_eq!(dir.trace_path("7"), dir.root().join("traces/7.zip"));
    }

    #[test]
    fn config_dump_is_written_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = ResultDir::prepare(temp.path()).expect("prepare");
        let first = RunnerConfig::default();
        dir.dump_config(&first).expect("dump");

        let second = RunnerConfig {
            max_steps: 3,
            ..RunnerConfig::default()
        };
        dir.dump_config(&second).expect("dump again");

        let stored: RunnerConfig = serde_json::from_str(
            &fs::read_to_string(temp.path().join("config.json")).expect("read"),
        )
        .expect("parse");
        assert_eq!(stored.max_steps, 30);
    }

    #[test]
    fn errors_accumulate_in_error_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = ResultDir::prepare(temp.path()).expect("prepare");
        let err = anyhow::anyhow!("browser crashed").context("step 3");
        dir.append_error(Path::new("tasks/1.json"), &err).expect("append");
        dir.append_error(Path::new("tasks/2.json"), &err).expect("append");

        let text = fs::read_to_string(dir.error_path()).expect("read");
        assert_eq!(text.matches("[Unhandled Error]").count(), 2);
        assert!(text.contains("tasks/2.json"));
        assert!(text.contains("browser crashed"));
    }

    #[test]
    fn unfinished_skips_rendered_tasks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let results = temp.path().join("results");
        fs::create_dir_all(&results).expect("mkdir");
        fs::write(results.join(render_file_name("1")), "<html/>").expect("write");
        fs::write(results.join("notes.html"), "").expect("write");

        let tasks = task_range(Path::new("config_files"), 0, 3);
        assert_eq!(tasks[2], PathBuf::from("config_files/2.json"));

        let pending = unfinished_tasks(&tasks, &results).expect("unfinished");
        assert_eq!(
            pending,
            vec![
                PathBuf::from("config_files/0.json"),
                PathBuf::from("config_files/2.json")
            ]
        );
    }

    #[test]
    fn missing_result_dir_means_nothing_finished() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tasks = task_range(temp.path(), 4, 6);
        let pending = unfinished_tasks(&tasks, &temp.path().join("absent")).expect("unfinished");
        assert_eq!(pending, tasks);
    }
}
