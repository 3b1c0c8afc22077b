//! Immutable per-URL and per-batch result records.
//!
//! A [`PageOutcome`] is only observable once fully assembled; every failure
//! along the page lifecycle becomes data here instead of an error. Success is
//! always derived from the stored fields, never cached.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

/// Sentinel status meaning navigation never completed or the page never opened.
pub const STATUS_UNAVAILABLE: i64 = -1;

/// One discrete step in a page's fetch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Open,
    RouteFilter,
    Navigate,
    WaitNetworkIdle,
    WaitDomContent,
    WaitLoad,
    Extract,
    Hook,
    Close,
    /// Catch-all used when a whole task fails outside any stage handler.
    Task,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Open => "new_page()",
            Stage::RouteFilter => "route()",
            Stage::Navigate => "goto()",
            Stage::WaitNetworkIdle => "wait_for_load_state(networkidle)",
            Stage::WaitDomContent => "wait_for_load_state(domcontentloaded)",
            Stage::WaitLoad => "wait_for_load_state(load)",
            Stage::Extract => "content()",
            Stage::Hook => "page_hook",
            Stage::Close => "close()",
            Stage::Task => "task",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single recorded stage failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

/// The outcome of fetching a single URL.
///
/// `raw_html` is the markup exactly as extracted. `html` equals `raw_html`
/// unless any error detector fired, in which case it is forced empty while
/// the raw markup stays available for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageOutcome {
    pub raw_html: String,
    pub html: String,
    pub status_code: i64,
    pub stage_failures: Vec<StageFailure>,
    pub detected_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl PageOutcome {
    /// The canonical substitute outcome for a task that failed in a way no
    /// stage-level handler anticipated.
    pub fn task_failure() -> Self {
        Self {
            raw_html: String::new(),
            html: String::new(),
            status_code: STATUS_UNAVAILABLE,
            stage_failures: vec![StageFailure::new(
                Stage::Task,
                "task aborted before producing an outcome",
            )],
            detected_errors: Vec::new(),
            extra: None,
        }
    }

    /// Derived success check: non-empty final markup, no detected errors, and
    /// no recorded stage failures.
    pub fn is_success(&self) -> bool {
        !self.html.is_empty() && self.detected_errors.is_empty() && self.stage_failures.is_empty()
    }

    /// One-line human-readable summary for logging and debugging.
    pub fn summary(&self) -> String {
        format!(
            "status={} success={}",
            self.status_code,
            self.is_success()
        )
    }
}

impl fmt::Display for PageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// The result of one batch invocation: outcomes aligned positionally with the
/// input URL list, plus the elapsed wall-clock time for the whole batch.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub urls: Vec<String>,
    pub outcomes: Vec<PageOutcome>,
    pub elapsed: Duration,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Final markup per URL, in input order.
    pub fn htmls(&self) -> Vec<&str> {
        self.outcomes.iter().map(|o| o.html.as_str()).collect()
    }

    /// Status codes per URL, in input order.
    pub fn status_codes(&self) -> Vec<i64> {
        self.outcomes.iter().map(|o| o.status_code).collect()
    }

    /// Iterate over `(url, outcome)` pairs in input order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PageOutcome)> {
        self.urls
            .iter()
            .map(String::as_str)
            .zip(self.outcomes.iter())
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "#URLS: {}", self.urls.len())?;
        writeln!(f, "STATUSES: {:?}", self.status_codes())?;
        write!(f, "ELAPSED: {:.3} sec", self.elapsed.as_secs_f64())
    }
}
