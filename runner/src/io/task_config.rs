//! Task files: one JSON object per task.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One task definition.
///
/// Only the fields the runner needs are typed; everything else (evaluation
/// settings, start url, site list, ...) is kept in `extra` for the collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(deserialize_with = "id_from_number_or_string")]
    pub task_id: String,

    pub intent: String,

    /// Input images (paths or URLs), passed through to the agent untouched.
    #[serde(
        rename = "image",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub images: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_state: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub fn load_task(path: &Path) -> Result<TaskConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse task {}", path.display()))
}

fn id_from_number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(de::Error::custom(format!(
            "task_id must be a string or number, found {other}"
        ))),
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(image)) => vec![image],
        Some(OneOrMany::Many(images)) => images,
    })
}
