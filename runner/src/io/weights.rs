//! Loading of observation scoring weights.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::scorer::ObservationWeights;

/// Load weights from an optional JSON file, shallow-merged over the defaults.
///
/// Top-level keys present in the file replace the default value wholesale, so a
/// file `tag_bonus` table replaces the default table. A missing path or file
/// yields the defaults; an unreadable or ill-typed file is logged and also
/// yields the defaults.
pub fn load_weights(path: Option<&Path>) -> ObservationWeights {
    let Some(path) = path else {
        return ObservationWeights::default();
    };
    if !path.exists() {
        debug!(path = %path.display(), "weights file missing, using defaults");
        return ObservationWeights::default();
    }
    match read_weights(path) {
        Ok(weights) => {
            debug!(path = %path.display(), "loaded observation weights");
            weights
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %format!("{err:#}"),
                "invalid weights file, using defaults"
            );
            ObservationWeights::default()
        }
    }
}

fn read_weights(path: &Path) -> Result<ObservationWeights> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let overrides: Value =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    merge_weights(&ObservationWeights::default(), overrides)
}

/// Shallow-merge a JSON object over `base`.
///
/// `null` (an empty weights file body) leaves `base` unchanged.
pub fn merge_weights(base: &ObservationWeights, overrides: Value) -> Result<ObservationWeights> {
    let overrides = match overrides {
        Value::Null => return Ok(base.clone()),
        Value::Object(map) => map,
        other => return Err(anyhow!("weights must be a JSON object, found {other}")),
    };
    let mut merged = match serde_json::to_value(base).context("serialize base weights")? {
        Value::Object(map) => map,
        _ => return Err(anyhow!("base weights did not serialize to an object")),
    };
    for (key, value) in overrides {
        merged.insert(key, value);
    }
    serde_json::from_value(Value::Object(merged)).context("decode merged weights")
}
