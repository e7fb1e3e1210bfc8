//! Per-step rendering and task evaluation seams.

use std::path::Path;

use anyhow::Result;

use crate::core::types::{Action, MetaData, StateInfo, Trajectory};
use crate::io::page::PageProbe;
use crate::io::task_config::TaskConfig;

/// Writes a human-readable record of a task run.
///
/// Implementations are expected to create `render_<task_id>.html` in the
/// result directory on `open`; resume relies on that file.
pub trait Renderer {
    fn open(&mut self, task: &TaskConfig, result_dir: &Path) -> Result<()>;

    fn render(
        &mut self,
        action: &Action,
        state: &StateInfo,
        meta: &MetaData,
        render_screenshot: bool,
    ) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Scores a finished trajectory, `1.0` meaning the task passed.
pub trait Evaluator {
    fn evaluate(
        &self,
        trajectory: &Trajectory,
        task_file: &Path,
        page: &dyn PageProbe,
    ) -> Result<f64>;
}
