//! The per-URL page lifecycle.
//!
//! One lifecycle drives exactly one URL through a fixed sequence of stages
//! against its own page: open, route setup, optional delay, navigation,
//! load-state waits, markup extraction, error detection, the optional page
//! hook, and teardown. Every stage after page-open is failure-isolated: a
//! failed stage is recorded in the outcome and the remaining stages still
//! run, because partial information (a failed navigation that still rendered
//! an error banner, say) is often exactly what detectors and callers need.

use std::sync::Arc;

use serde_json::json;

use crate::config::FetchConfig;
use crate::driver::{BrowserContext, LoadState};
use crate::logging::FetchLogger;
use crate::outcome::{PageOutcome, Stage, StageFailure, STATUS_UNAVAILABLE};

/// Drives single URLs through the fetch stages. Cheap to clone per task;
/// holds only shared read-only state.
#[derive(Clone)]
pub struct PageLifecycle {
    config: Arc<FetchConfig>,
    logger: Arc<FetchLogger>,
}

impl PageLifecycle {
    pub fn new(config: Arc<FetchConfig>, logger: Arc<FetchLogger>) -> Self {
        Self { config, logger }
    }

    /// Run the full stage sequence for one URL, always returning a fully
    /// assembled outcome. Only page-open failure short-circuits: without a
    /// page no later stage is meaningful.
    pub async fn run(&self, context: Arc<dyn BrowserContext>, url: &str) -> PageOutcome {
        let mut failures: Vec<StageFailure> = Vec::new();

        // 1. Open page. Terminal on failure for this URL only.
        let page = match context.new_page().await {
            Ok(page) => page,
            Err(err) => {
                self.logger.error(
                    format!("Error `new_page()` at '{url}': {err}"),
                    Some("open"),
                    None,
                );
                return PageOutcome {
                    raw_html: String::new(),
                    html: String::new(),
                    status_code: STATUS_UNAVAILABLE,
                    stage_failures: vec![StageFailure::new(Stage::Open, err.to_string())],
                    detected_errors: Vec::new(),
                    extra: None,
                };
            }
        };

        // 2. Install the route filter before navigation, when enabled.
        if let Some(filter) = &self.config.route_filter {
            if filter.block_resources() {
                if let Err(err) = page.install_route_filter(filter.clone()).await {
                    self.logger.error(
                        format!("Error `route()` at '{url}': {err}"),
                        Some("route"),
                        None,
                    );
                    failures.push(StageFailure::new(Stage::RouteFilter, err.to_string()));
                }
            }
        }

        // 3. Pre-navigation delay; suspends this task only.
        if let Some(range) = &self.config.delay {
            let pause = range.sample();
            if !pause.is_zero() {
                self.logger.debug(
                    format!("Delaying '{url}' by {:.3}s", pause.as_secs_f64()),
                    Some("delay"),
                    None,
                );
            }
            tokio::time::sleep(pause).await;
        }

        // 4. Navigate. Status keeps its sentinel when navigation fails.
        let mut status_code = STATUS_UNAVAILABLE;
        match page.goto(url, self.config.timeout_ms).await {
            Ok(status) => {
                status_code = status;
                self.logger.info(
                    format!("Response: {status} for '{url}'"),
                    Some("navigate"),
                    None,
                );
            }
            Err(err) => {
                self.logger.error(
                    format!("Error `goto()` at '{url}': {err}"),
                    Some("navigate"),
                    None,
                );
                failures.push(StageFailure::new(Stage::Navigate, err.to_string()));
            }
        }

        // 5. Load-state waits, each attempted independently.
        let waits = [
            (
                self.config.wait_for_network_idle,
                LoadState::NetworkIdle,
                Stage::WaitNetworkIdle,
            ),
            (
                self.config.wait_for_dom_content,
                LoadState::DomContentLoaded,
                Stage::WaitDomContent,
            ),
            (self.config.wait_for_load, LoadState::Load, Stage::WaitLoad),
        ];
        for (enabled, state, stage) in waits {
            if !enabled {
                continue;
            }
            if let Err(err) = page
                .wait_for_load_state(state, self.config.timeout_ms)
                .await
            {
                self.logger.error(
                    format!(
                        "Error `wait_for_load_state({})` at '{url}': {err}",
                        state.label()
                    ),
                    Some("wait"),
                    None,
                );
                failures.push(StageFailure::new(stage, err.to_string()));
            }
        }

        // 6. Extract markup. A page that exists always has markup; if the
        // driver still cannot produce it, record the failure and carry on
        // with an empty document.
        let raw_html = match page.content().await {
            Ok(html) => html,
            Err(err) => {
                self.logger.error(
                    format!("Error `content()` at '{url}': {err}"),
                    Some("extract"),
                    None,
                );
                failures.push(StageFailure::new(Stage::Extract, err.to_string()));
                String::new()
            }
        };

        // 7. Run every detector; all signatures accumulate in detector order.
        let mut detected_errors: Vec<String> = Vec::new();
        for detector in &self.config.detectors {
            let found = detector.detect(&raw_html);
            if !found.is_empty() {
                self.logger.error(
                    format!("'{}' detected errors at '{url}'", detector.name()),
                    Some("detect"),
                    Some(json!({ "errors": found })),
                );
                detected_errors.extend(found);
            }
        }
        let html = if detected_errors.is_empty() {
            raw_html.clone()
        } else {
            String::new()
        };

        // 8. Custom page hook; its failure costs the extra result, nothing else.
        let extra = match &self.config.page_hook {
            Some(hook) => {
                match (hook)(page.clone(), self.config.hook_args.clone()).await {
                    Ok(value) => Some(value),
                    Err(err) => {
                        self.logger.error(
                            format!("Error `page_hook` at '{url}': {err}"),
                            Some("hook"),
                            None,
                        );
                        failures.push(StageFailure::new(Stage::Hook, err.to_string()));
                        None
                    }
                }
            }
            None => None,
        };

        // 9. Close page. Recorded, but already-computed fields stand.
        if let Err(err) = page.close().await {
            self.logger.error(
                format!("Error `close()` at '{url}': {err}"),
                Some("close"),
                None,
            );
            failures.push(StageFailure::new(Stage::Close, err.to_string()));
        }

        PageOutcome {
            raw_html,
            html,
            status_code,
            stage_failures: failures,
            detected_errors,
            extra,
        }
    }
}
