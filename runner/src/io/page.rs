//! Raw page handle exposed by the browser driver.
//!
//! The [`PageProbe`] trait decouples side-effect detection from the actual
//! automation backend. Every call is best-effort: implementations may fail or
//! time out, and callers are expected to treat failures as "no signal".

use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

pub trait PageProbe {
    /// Number of elements matching `selector`.
    fn count(&self, selector: &str, timeout: Duration) -> Result<usize>;

    /// Inner text of the first element matching `selector`.
    fn inner_text(&self, selector: &str, timeout: Duration) -> Result<String>;

    /// Evaluate a script in the page and return its JSON result.
    fn evaluate(&self, script: &str, timeout: Duration) -> Result<Value>;

    /// Current page URL.
    fn url(&self) -> String;

    /// Block for `duration` so pending page updates can land.
    fn wait(&self, duration: Duration) -> Result<()>;
}
