//! Deterministic classification of an action's side effect from page signals.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{CartEvent, CartStatus};

static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("digits regex should be valid"));

static CART_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bmy\s*cart\b").expect("cart label regex should be valid"));

/// Flash messages visible on the page, first non-empty text per category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMessages {
    pub success: Option<String>,
    pub error: Option<String>,
    pub notice: Option<String>,
}

impl PageMessages {
    pub fn is_complete(&self) -> bool {
        self.success.is_some() && self.error.is_some() && self.notice.is_some()
    }
}

/// Classify the outcome of an action.
///
/// Precedence: error message, then count increase, then success message.
/// Count widgets can lag or be cached, so an error message beats a higher count.
pub fn classify_cart(before: u32, after: u32, messages: &PageMessages, url: &str) -> CartEvent {
    let status = if messages.error.is_some() {
        CartStatus::Failed
    } else if after > before || messages.success.is_some() {
        CartStatus::Added
    } else {
        CartStatus::NoChange
    };
    CartEvent {
        status,
        before,
        after,
        success_text: messages.success.clone(),
        error_text: messages.error.clone(),
        url: url.to_string(),
    }
}

/// First run of digits in `text` once separators and whitespace are removed.
///
/// Counter widgets may wrap or pad the number (`" 1,204\n"`).
pub fn first_int(text: &str) -> Option<u32> {
    let cleaned = text.replace([',', ' ', '\t', '\r', '\n'], "");
    DIGITS_RE
        .find(&cleaned)
        .and_then(|m| m.as_str().parse().ok())
}

/// Largest integer embedded in `text`.
///
/// Cart links often render the count twice (`My Cart 12 12 items`).
pub fn max_int(text: &str) -> Option<u32> {
    DIGITS_RE
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .max()
}

/// Whether `text` carries a recognizable cart label.
pub fn has_cart_label(text: &str) -> bool {
    CART_LABEL_RE.is_match(text)
}

/// Collapse whitespace so a message fits on one history line.
pub fn normalize_message(text: &str) -> Option<String> {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!joined.is_empty()).then_some(joined)
}
