//! Best-effort cart feedback detection against a live page.
//!
//! Signals are read through one ordered probe chain: structural counter
//! selectors, then cart-labelled elements, then a zero default. Every probe
//! may fail or time out; failures are logged at debug level and the chain moves
//! on. Nothing here returns an error to the controller.

use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::feedback::{
    PageMessages, classify_cart, first_int, has_cart_label, max_int, normalize_message,
};
use crate::core::types::CartEvent;
use crate::io::config::FeedbackConfig;
use crate::io::page::PageProbe;

/// Script listing texts of elements that mention the cart label.
pub const LABEL_SCAN_SCRIPT: &str = r#"() => Array.from(document.querySelectorAll('a, span, div'))
  .map(e => (e.innerText || e.textContent || '').trim())
  .filter(t => t && /\bMy\s*Cart\b/i.test(t))
  .slice(0, 20)"#;

/// Script collecting flash message texts per category.
pub const MESSAGE_SCAN_SCRIPT: &str = r#"() => {
  const grab = (sel) => Array.from(document.querySelectorAll(sel))
    .map(e => (e.innerText || e.textContent || '').trim())
    .filter(Boolean)
    .slice(0, 2);
  return {
    success: grab('.message-success, .messages .message-success, .messages .success'),
    error: grab('.message-error, .messages .message-error, .messages .error'),
    notice: grab('.message-notice, .messages .message-notice, .messages .notice'),
  };
}"#;

/// One step of the cart count probe chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountProbe {
    /// Dedicated counter element; the first run of digits is the count.
    Counter(&'static str),
    /// Cart link; must carry the cart label, the largest integer is the count.
    Label(&'static str),
    /// Script scan of every element mentioning the cart label.
    LabelScan,
}

/// Count probes in the order they are tried.
pub const COUNT_PROBES: &[CountProbe] = &[
    CountProbe::Counter(".minicart-wrapper .action.showcart .counter.qty .counter-number"),
    CountProbe::Counter(".minicart-wrapper .action.showcart .counter-number"),
    CountProbe::Counter(".minicart-wrapper .action.showcart .counter.qty"),
    CountProbe::Counter("a.action.showcart .counter-number"),
    CountProbe::Counter("a.action.showcart .counter.qty"),
    CountProbe::Counter("a[href*='checkout/cart'] .counter-number"),
    CountProbe::Counter("a[href*='checkout/cart'] .counter.qty"),
    CountProbe::Label("a:has-text(\"My Cart\")"),
    CountProbe::Label("a.action.showcart"),
    CountProbe::Label("div.minicart-wrapper a.action.showcart"),
    CountProbe::Label("#minicart-wrapper a.action.showcart"),
    CountProbe::LabelScan,
];

pub const SUCCESS_SELECTORS: &[&str] = &[
    "div.message-success",
    "div.messages div.message-success",
    "div.page.messages div.message-success",
];

pub const ERROR_SELECTORS: &[&str] = &[
    "div.message-error",
    "div.messages div.message-error",
    "div.page.messages div.message-error",
];

pub const NOTICE_SELECTORS: &[&str] = &[
    "div.message-notice",
    "div.messages div.message-notice",
    "div.page.messages div.message-notice",
];

/// Reads cart counts and flash messages, and classifies action outcomes.
#[derive(Debug, Clone)]
pub struct FeedbackDetector {
    probe_timeout: Duration,
    settle: Duration,
}

impl FeedbackDetector {
    pub fn new(probe_timeout: Duration, settle: Duration) -> Self {
        Self {
            probe_timeout,
            settle,
        }
    }

    pub fn from_config(config: &FeedbackConfig) -> Self {
        Self::new(
            Duration::from_millis(config.probe_timeout_ms),
            Duration::from_millis(config.settle_ms),
        )
    }

    /// Current cart count, `0` when no probe yields a number.
    pub fn read_count(&self, page: &dyn PageProbe) -> u32 {
        for probe in COUNT_PROBES {
            match self.run_count_probe(page, probe) {
                Ok(Some(count)) => {
                    debug!(?probe, count, "cart count probe matched");
                    return count;
                }
                Ok(None) => {}
                Err(err) => debug!(?probe, error = %err, "cart count probe failed"),
            }
        }
        0
    }

    /// First visible flash message per category.
    pub fn read_messages(&self, page: &dyn PageProbe) -> PageMessages {
        let mut messages = PageMessages {
            success: self.first_message(page, SUCCESS_SELECTORS),
            error: self.first_message(page, ERROR_SELECTORS),
            notice: self.first_message(page, NOTICE_SELECTORS),
        };
        if !messages.is_complete() {
            self.fill_from_scan(page, &mut messages);
        }
        messages
    }

    /// Classify the side effect of the last action against the pre-action count.
    #[instrument(skip_all, fields(before = before))]
    pub fn classify(&self, page: &dyn PageProbe, before: u32) -> CartEvent {
        if !self.settle.is_zero()
            && let Err(err) = page.wait(self.settle)
        {
            debug!(error = %err, "settle wait failed");
        }
        let after = self.read_count(page);
        let messages = self.read_messages(page);
        if let Some(notice) = &messages.notice {
            debug!(notice = %notice, "page notice present");
        }
        classify_cart(before, after, &messages, &page.url())
    }

    fn run_count_probe(&self, page: &dyn PageProbe, probe: &CountProbe) -> Result<Option<u32>> {
        match probe {
            CountProbe::Counter(selector) => {
                Ok(self.first_text(page, selector)?.as_deref().and_then(first_int))
            }
            CountProbe::Label(selector) => Ok(self
                .first_text(page, selector)?
                .filter(|text| has_cart_label(text))
                .as_deref()
                .and_then(max_int)),
            CountProbe::LabelScan => {
                let texts = page.evaluate(LABEL_SCAN_SCRIPT, self.probe_timeout)?;
                Ok(string_list(&texts)
                    .into_iter()
                    .filter(|text| has_cart_label(text))
                    .find_map(|text| max_int(&text)))
            }
        }
    }

    fn first_message(&self, page: &dyn PageProbe, selectors: &[&str]) -> Option<String> {
        for selector in selectors {
            match self.first_text(page, selector) {
                Ok(Some(text)) => {
                    if let Some(message) = normalize_message(&text) {
                        return Some(message);
                    }
                }
                Ok(None) => {}
                Err(err) => debug!(selector, error = %err, "message probe failed"),
            }
        }
        None
    }

    fn fill_from_scan(&self, page: &dyn PageProbe, messages: &mut PageMessages) {
        let scanned = match page.evaluate(MESSAGE_SCAN_SCRIPT, self.probe_timeout) {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "message scan failed");
                return;
            }
        };
        let first = |key: &str| {
            scanned
                .get(key)
                .map(string_list)
                .unwrap_or_default()
                .iter()
                .find_map(|text| normalize_message(text))
        };
        if messages.success.is_none() {
            messages.success = first("success");
        }
        if messages.error.is_none() {
            messages.error = first("error");
        }
        if messages.notice.is_none() {
            messages.notice = first("notice");
        }
    }

    /// Trimmed text of the first element matching `selector`, if any.
    fn first_text(&self, page: &dyn PageProbe, selector: &str) -> Result<Option<String>> {
        if page.count(selector, self.probe_timeout)? == 0 {
            return Ok(None);
        }
        let text = page.inner_text(selector, self.probe_timeout)?;
        let trimmed = text.trim();
        Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Value::String(text) => vec![text.clone()],
        _ => Vec::new(),
    }
}
