//! Relevance scoring of observation lines against a task objective.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9]+").expect("token regex should be valid"));

/// `[id] [tag] [text]` accessibility-tree line.
static TAGGED_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(.*?)\]\s+\[(.*?)\]\s+\[(.*)\]").expect("tagged line regex should be valid")
});

/// Scoring weights for observation compression.
///
/// Built once per run (see `io::weights::load_weights`) and passed down read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationWeights {
    /// Score added per objective token found in a line.
    pub token_overlap_weight: f64,
    /// Bonus per element tag; unknown tags score 0.
    pub tag_bonus: BTreeMap<String, f64>,
}

impl Default for ObservationWeights {
    fn default() -> Self {
        let tag_bonus = [
            ("INPUT", 0.3),
            ("TEXTAREA", 0.3),
            ("SELECT", 0.2),
            ("BUTTON", 0.2),
            ("A", 0.1),
            ("StaticText", 0.0),
        ]
        .into_iter()
        .map(|(tag, bonus)| (tag.to_string(), bonus))
        .collect();
        Self {
            token_overlap_weight: 1.0,
            tag_bonus,
        }
    }
}

impl ObservationWeights {
    pub fn bonus_for(&self, tag: &str) -> f64 {
        self.tag_bonus.get(tag).copied().unwrap_or(0.0)
    }
}

/// Lowercase alphanumeric tokens of `text`, deduplicated.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Score `line` against pre-tokenized objective tokens.
///
/// Tokens match as plain substrings of the lowercased line, so short tokens
/// such as `a` match inside longer words.
pub fn score_tokens(line: &str, tokens: &BTreeSet<String>, weights: &ObservationWeights) -> f64 {
    let lower = line.to_lowercase();
    let overlap = tokens
        .iter()
        .filter(|token| lower.contains(token.as_str()))
        .count();
    let mut score = overlap as f64 * weights.token_overlap_weight;
    if let Some(caps) = TAGGED_LINE_RE.captures(line) {
        score += weights.bonus_for(&caps[2]);
    }
    score
}

/// Score a single observation line against the objective.
pub fn score_line(line: &str, objective: &str, weights: &ObservationWeights) -> f64 {
    score_tokens(line, &tokenize(objective), weights)
}
