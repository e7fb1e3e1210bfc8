//! Append-only JSONL log of compression decisions.
//!
//! Each record pairs an objective and raw observation with the lines the
//! compressor kept, for offline inspection or tuning of weights.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct CompressionRecord<'a> {
    objective: &'a str,
    observation: &'a str,
    selected_lines: &'a [String],
}

/// Append one compression record to `path`, creating parent directories.
///
/// Non-ASCII characters are written as `\uXXXX` escapes so the log stays ASCII.
pub fn append_compression_example(
    path: &Path,
    objective: &str,
    observation: &str,
    selected_lines: &[String],
) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let record = CompressionRecord {
        objective,
        observation,
        selected_lines,
    };
    let json = serde_json::to_string(&record).context("serialize compression record")?;
    let mut line = escape_non_ascii(&json);
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append {}", path.display()))
}

fn escape_non_ascii(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        if ch.is_ascii() {
            out.push(ch);
            continue;
        }
        let mut units = [0u16; 2];
        for unit in ch.encode_utf16(&mut units) {
            out.push_str(&format!("\\u{unit:04x}"));
        }
    }
    out
}
