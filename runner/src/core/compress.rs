//! Observation compression: keep the `limit` most relevant content lines.

use std::cmp::Ordering;

use serde::Serialize;

use crate::core::scorer::{ObservationWeights, score_tokens, tokenize};

/// Result of [`select_lines`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    /// Text to show the agent: prefix followed by the kept lines.
    pub text: String,
    /// Content lines that made it into `text`, in output order.
    pub selected: Vec<String>,
}

/// Split an observation into its unscored prefix and its content lines.
///
/// Content starts at the first line beginning with `[`; everything before it is prefix.
pub fn split_prefix(observation: &str) -> (Vec<&str>, Vec<&str>) {
    let lines: Vec<&str> = observation.lines().collect();
    let start = lines
        .iter()
        .position(|line| line.starts_with('['))
        .unwrap_or(lines.len());
    let (prefix, content) = lines.split_at(start);
    (prefix.to_vec(), content.to_vec())
}

/// Reduce `observation` to at most `limit` content lines.
///
/// - `limit == 0` disables compression: the input comes back with an empty selection.
/// - At most `limit` content lines: the input comes back unchanged.
/// - Otherwise lines are ranked by descending score, then ascending length, and
///   the top `limit` are emitted after the prefix in ranked order.
pub fn select_lines(
    observation: &str,
    objective: &str,
    limit: usize,
    weights: &ObservationWeights,
) -> Selection {
    if limit == 0 {
        return Selection {
            text: observation.to_string(),
            selected: Vec::new(),
        };
    }

    let (prefix, content) = split_prefix(observation);
    if content.len() <= limit {
        return Selection {
            text: observation.to_string(),
            selected: content.into_iter().map(str::to_string).collect(),
        };
    }

    let tokens = tokenize(objective);
    let mut scored: Vec<(f64, &str)> = content
        .into_iter()
        .map(|line| (score_tokens(line, &tokens, weights), line))
        .collect();
    // Stable: equal score and length keep document order.
    scored.sort_by(|(score_a, line_a), (score_b, line_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| line_a.chars().count().cmp(&line_b.chars().count()))
    });

    let selected: Vec<String> = scored
        .into_iter()
        .take(limit)
        .map(|(_, line)| line.to_string())
        .collect();
    let text = prefix
        .into_iter()
        .chain(selected.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join("\n");

    Selection { text, selected }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBS: &str = "Tab 0 (current): One Stop Market\n\
                       URL: http://shop.local/\n\
                       [1] [RootWebArea] [One Stop Market]\n\
                       [2] [A] [My Account]\n\
                       [3] [INPUT] [Search entire store here]\n\
                       [4] [StaticText] [Running shoes for women]\n\
                       [5] [BUTTON] [Add to Cart]\n\
                       [6] [StaticText] [Copyright 2024]";

    #[test]
    fn zero_limit_returns_input_and_empty_selection() {
        let selection = select_lines(OBS, "running shoes", 0, &ObservationWeights::default());
        assert_eq!(selection.text, OBS);
        assert!(selection.selected.is_empty());
    }

    #[test]
    fn within_limit_returns_input_with_all_content_lines() {
        let selection = select_lines(OBS, "running shoes", 6, &ObservationWeights::default());
        assert_eq!(selection.text, OBS);
        assert_eq!(selection.selected.len(), 6);
        assert_eq!(selection.selected[0], "[1] [RootWebArea] [One Stop Market]");
    }

    #[test]
    fn over_limit_keeps_prefix_and_top_scored_lines() {
        let weights = ObservationWeights::default();
        let selection = select_lines(OBS, "running shoes", 2, &weights);
        assert_eq!(
            selection.selected,
            vec![
                "[4] [StaticText] [Running shoes for women]".to_string(),
                "[3] [INPUT] [Search entire store here]".to_string(),
            ]
        );
        let lines: Vec<&str> = selection.text.lines().collect();
        assert_eq!(lines[0], "Tab 0 (current): One Stop Market");
        assert_eq!(lines[1], "URL: http://shop.local/");
        assert_eq!(
            &lines[2..],
            [
                "[4] [StaticText] [Running shoes for women]",
                "[3] [INPUT] [Search entire store here]"
            ]
        );
    }

    #[test]
    fn selected_lines_dominate_unselected_scores() {
        let weights = ObservationWeights::default();
        let objective = "add running shoes to cart";
        let limit = 3;
        let selection = select_lines(OBS, objective, limit, &weights);
        assert_eq!(selection.selected.len(), limit);

        let (_, content) = split_prefix(OBS);
        let min_selected = selection
            .selected
            .iter()
            .map(|line| score_line_for(line, objective))
            .fold(f64::INFINITY, f64::min);
        for line in content {
            if !selection.selected.iter().any(|kept| kept == line) {
                assert!(score_line_for(line, objective) <= min_selected, "{line}");
            }
        }
    }

    #[test]
    fn equal_scores_prefer_shorter_lines() {
        let obs = "[1] [StaticText] [a much longer line of text]\n\
                   [2] [StaticText] [short]\n\
                   [3] [StaticText] [medium line]";
        let selection = select_lines(obs, "zzz", 2, &ObservationWeights::default());
        assert_eq!(
            selection.selected,
            vec![
                "[2] [StaticText] [short]".to_string(),
                "[3] [StaticText] [medium line]".to_string(),
            ]
        );
        assert_eq!(selection.text, selection.selected.join("\n"));
    }

    #[test]
    fn prefix_only_observation_is_never_truncated() {
        let obs = "no tree here\njust text";
        let selection = select_lines(obs, "text", 1, &ObservationWeights::default());
        assert_eq!(selection.text, obs);
        assert!(selection.selected.is_empty());
    }

    #[test]
    fn content_continues_after_first_bracketed_line() {
        let (prefix, content) = split_prefix("head\n[1] [A] [x]\nplain tail line");
        assert_eq!(prefix, vec!["head"]);
        assert_eq!(content, vec!["[1] [A] [x]", "plain tail line"]);
    }

    fn score_line_for(line: &str, objective: &str) -> f64 {
        crate::core::scorer::score_line(line, objective, &ObservationWeights::default())
    }
}
