//! Tracing setup for the runner.
//!
//! Everything goes to stderr in compact form. Batch runs can additionally
//! persist the same events to a plain-text log file, one per run, under
//! `log_files/`.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// `<dir>/log_<YYYYmmddHHMMSS>_<pid>.log`.
pub fn log_file_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    dir.join(format!(
        "log_{}_{}.log",
        now.format("%Y%m%d%H%M%S"),
        std::process::id()
    ))
}

/// Initialize the global tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `info` if unset. When `log_file` is given the
/// file (and its parent directory) is created and receives the same events
/// without ANSI colors.
///
/// # Example
/// ```bash
/// RUST_LOG=webrunner=debug webrunner compress --objective "add tote" --limit 40 obs.txt
/// ```
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create log dir {}", parent.display()))?;
            }
            let file =
                File::create(path).with_context(|| format!("create log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(file_layer)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn log_file_name_carries_timestamp_and_pid() {
        let now = Local
            .with_ymd_and_hms(2025, 1, 2, 3, 4, 5)
            .single()
            .expect("valid time");
        let path = log_file_path(Path::new("log_files"), now);
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .expect("file name");
        assert!(name.starts_with("log_20250102030405_"));
        assert!(name.ends_with(".log"));
        assert_eq!(path.parent(), Some(Path::new("log_files")));
    }
}
