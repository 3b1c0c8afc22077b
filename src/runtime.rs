//! Chromiumoxide-backed browser driver.
//!
//! Implements the [`BrowserDriver`] family of traits against a locally
//! launched Chromium. Route filtering rides on the CDP `Fetch` domain,
//! navigation status is read from `Network.responseReceived` events, and
//! load-state waits poll `document.readyState` plus a resource-count
//! heuristic for network idle (the CDP has no direct networkidle signal).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, ErrorReason, EventResponseReceived, ResourceType,
};
use chromiumoxide::page::Page;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::config::{BrowserEngine, FetchConfig, Verbosity};
use crate::driver::{BrowserContext, BrowserDriver, DriverError, LoadState, PageHandle};
use crate::logging::FetchLogger;
use crate::route::{ResourceKind, RouteDecision, RouteFilter, RouteRequest};

const READY_STATE_POLL_MS: u64 = 100;
const NETWORK_IDLE_POLL_MS: u64 = 250;
const NETWORK_IDLE_WINDOW_MS: u64 = 500;
const RESPONSE_DRAIN_MS: u64 = 250;

/// Driver that launches a local Chromium through chromiumoxide.
#[derive(Debug)]
pub struct ChromiumDriver {
    logger: Arc<FetchLogger>,
}

impl ChromiumDriver {
    pub fn new() -> Self {
        Self::with_logger(Arc::new(FetchLogger::new(Verbosity::default())))
    }

    /// Share the batch logger so driver-internal failures (route
    /// interception, the CDP event loop) reach the same sink as stage logs.
    pub fn with_logger(logger: Arc<FetchLogger>) -> Self {
        Self { logger }
    }
}

impl Default for ChromiumDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn launch(&self, config: &FetchConfig) -> Result<Arc<dyn BrowserContext>, DriverError> {
        // The engine mapping is validated, not silently coerced: this driver
        // speaks CDP and can only launch Chromium.
        if config.engine != BrowserEngine::Chromium {
            return Err(DriverError::UnsupportedEngine(config.engine));
        }

        let browser_config = build_browser_config(config)?;
        let (browser, handler) = Browser::launch(browser_config)
            .await
            .map_err(map_cdp_error)?;

        Ok(Arc::new(ChromiumContext {
            browser: Arc::new(browser),
            handler_task: Mutex::new(Some(spawn_handler(handler, self.logger.clone()))),
            logger: self.logger.clone(),
        }))
    }
}

struct ChromiumContext {
    browser: Arc<Browser>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    logger: Arc<FetchLogger>,
}

#[async_trait]
impl BrowserContext for ChromiumContext {
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, DriverError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(map_cdp_error)?;
        Ok(Arc::new(ChromiumPage {
            page,
            route_task: Mutex::new(None),
            logger: self.logger.clone(),
        }))
    }

    async fn close(&self) -> Result<(), DriverError> {
        // Dropping the last Browser handle kills the child process; here we
        // only stop pumping its event loop.
        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
    route_task: Mutex<Option<JoinHandle<()>>>,
    logger: Arc<FetchLogger>,
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn install_route_filter(&self, filter: Arc<dyn RouteFilter>) -> Result<(), DriverError> {
        self.page
            .execute(FetchEnableParams::default())
            .await
            .map_err(map_cdp_error)?;

        let mut events = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(map_cdp_error)?;

        let page = self.page.clone();
        let logger = self.logger.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let request = RouteRequest {
                    url: event.request.url.clone(),
                    resource_type: map_resource_type(&event.resource_type),
                };
                let request_id = event.request_id.clone();
                let result = match filter.decide(&request) {
                    RouteDecision::Allow => page
                        .execute(ContinueRequestParams::new(request_id))
                        .await
                        .map(|_| ()),
                    RouteDecision::Abort => page
                        .execute(FailRequestParams::new(request_id, ErrorReason::Aborted))
                        .await
                        .map(|_| ()),
                };
                if let Err(err) = result {
                    report_route_failure(&logger, &request.url, err);
                }
            }
        });

        *self.route_task.lock().await = Some(task);
        Ok(())
    }

    async fn goto(&self, url: &str, timeout_ms: u64) -> Result<i64, DriverError> {
        self.page
            .execute(NetworkEnableParams::default())
            .await
            .map_err(map_cdp_error)?;

        // Subscribe before navigating so the document response cannot be missed.
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(map_cdp_error)?;

        match timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await {
            Err(_) => {
                return Err(DriverError::Timeout {
                    operation: "goto",
                    timeout_ms,
                });
            }
            Ok(Err(err)) => return Err(map_cdp_error(err)),
            Ok(Ok(_)) => {}
        }

        if let Some(status) = document_status(&mut responses).await {
            return Ok(status);
        }
        if let Some(status) = navigation_entry_status(&self.page).await {
            return Ok(status);
        }
        // Navigation completed but neither the event stream nor the
        // navigation timing entry carried a status; report plain success.
        Ok(200)
    }

    async fn wait_for_load_state(
        &self,
        state: LoadState,
        timeout_ms: u64,
    ) -> Result<(), DriverError> {
        let budget = Duration::from_millis(timeout_ms);
        match state {
            LoadState::DomContentLoaded => {
                timeout(budget, await_ready_state(&self.page, &["interactive", "complete"]))
                    .await
                    .map_err(|_| DriverError::Timeout {
                        operation: "wait_for_load_state(domcontentloaded)",
                        timeout_ms,
                    })?
            }
            LoadState::Load => timeout(budget, await_ready_state(&self.page, &["complete"]))
                .await
                .map_err(|_| DriverError::Timeout {
                    operation: "wait_for_load_state(load)",
                    timeout_ms,
                })?,
            LoadState::NetworkIdle => timeout(budget, await_network_idle(&self.page))
                .await
                .map_err(|_| DriverError::Timeout {
                    operation: "wait_for_load_state(networkidle)",
                    timeout_ms,
                })?,
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        self.page
            .evaluate(script)
            .await
            .map_err(map_cdp_error)?
            .into_value::<Value>()
            .map_err(map_cdp_error)
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.page.content().await.map_err(map_cdp_error)
    }

    async fn close(&self) -> Result<(), DriverError> {
        if let Some(task) = self.route_task.lock().await.take() {
            task.abort();
        }
        self.page.clone().close().await.map_err(map_cdp_error)
    }
}

fn build_browser_config(config: &FetchConfig) -> Result<BrowserConfig, DriverError> {
    let mut builder = BrowserConfig::builder();

    if !config.headless {
        builder = builder.with_head();
    }

    if let Some(proxy) = &config.proxy {
        // Chromium takes the proxy address on the command line; credentialed
        // proxies additionally need Fetch-domain auth handling, which the
        // route-filter task does not perform.
        builder = builder.arg(format!("--proxy-server={}", proxy.server));
    }

    builder.build().map_err(DriverError::Message)
}

fn spawn_handler(
    mut handler: chromiumoxide::handler::Handler,
    logger: Arc<FetchLogger>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                logger.debug(format!("CDP event loop error: {err}"), Some("cdp"), None);
            }
        }
    })
}

fn report_route_failure(logger: &FetchLogger, url: &str, err: impl std::fmt::Display) {
    logger.error(
        format!("Route interception failed for '{url}': {err}"),
        Some("route"),
        None,
    );
}

fn map_cdp_error<E: std::fmt::Display>(err: E) -> DriverError {
    DriverError::Message(err.to_string())
}

fn map_resource_type(resource_type: &ResourceType) -> ResourceKind {
    match resource_type {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Media => ResourceKind::Media,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Xhr => ResourceKind::Xhr,
        ResourceType::Fetch => ResourceKind::Fetch,
        ResourceType::WebSocket => ResourceKind::WebSocket,
        _ => ResourceKind::Other,
    }
}

/// Pull the main-document response status out of the network event stream.
/// The response is normally buffered by the time `goto` resolves, so this
/// only drains briefly instead of waiting for quiet.
async fn document_status(
    responses: &mut (impl Stream<Item = Arc<EventResponseReceived>> + Unpin),
) -> Option<i64> {
    loop {
        match timeout(Duration::from_millis(RESPONSE_DRAIN_MS), responses.next()).await {
            Ok(Some(event)) => {
                if event.r#type == ResourceType::Document {
                    return Some(event.response.status);
                }
            }
            _ => return None,
        }
    }
}

/// Fallback status source: the Navigation Timing Level 2 entry.
async fn navigation_entry_status(page: &Page) -> Option<i64> {
    const NAV_STATUS_JS: &str = "(() => { \
        const entry = performance.getEntriesByType('navigation')[0]; \
        return entry && entry.responseStatus ? entry.responseStatus : 0; \
    })()";

    let value = page.evaluate(NAV_STATUS_JS).await.ok()?;
    value.into_value::<i64>().ok().filter(|status| *status > 0)
}

async fn await_ready_state(page: &Page, accepted: &[&str]) -> Result<(), DriverError> {
    loop {
        let state = page
            .evaluate("document.readyState")
            .await
            .map_err(map_cdp_error)?
            .into_value::<String>()
            .map_err(map_cdp_error)?;
        if accepted.contains(&state.as_str()) {
            return Ok(());
        }
        sleep(Duration::from_millis(READY_STATE_POLL_MS)).await;
    }
}

/// Network idle heuristic: the document is complete and the resource-entry
/// count has been stable for a full idle window.
async fn await_network_idle(page: &Page) -> Result<(), DriverError> {
    let mut last_count: i64 = -1;
    let mut stable_ms: u64 = 0;

    loop {
        let count = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .map_err(map_cdp_error)?
            .into_value::<i64>()
            .map_err(map_cdp_error)?;
        let ready = page
            .evaluate("document.readyState")
            .await
            .map_err(map_cdp_error)?
            .into_value::<String>()
            .map_err(map_cdp_error)?;

        if ready == "complete" && count == last_count {
            stable_ms += NETWORK_IDLE_POLL_MS;
            if stable_ms >= NETWORK_IDLE_WINDOW_MS {
                return Ok(());
            }
        } else {
            stable_ms = 0;
        }

        last_count = count;
        sleep(Duration::from_millis(NETWORK_IDLE_POLL_MS)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_chromium_engines_are_rejected_at_launch() {
        let driver = ChromiumDriver::new();

        for engine in [BrowserEngine::Firefox, BrowserEngine::Webkit] {
            let mut config = FetchConfig::default();
            config.engine = engine;
            match driver.launch(&config).await {
                Ok(_) => panic!("{} should be rejected", engine.label()),
                Err(err) => {
                    assert!(matches!(err, DriverError::UnsupportedEngine(e) if e == engine));
                }
            }
        }
    }

    #[test]
    fn browser_config_builds_with_proxy_and_headless() {
        let mut config = FetchConfig::default();
        config.headless = true;
        config.proxy = Some(crate::config::ProxyConfig::new("http://proxy:8080"));
        assert!(build_browser_config(&config).is_ok());
    }

    #[test]
    fn route_failures_reach_the_configured_log_sink() {
        use crate::logging::{LogConfig, LogLevel};
        use std::sync::Mutex as StdMutex;

        let records = Arc::new(StdMutex::new(Vec::new()));
        let capture = records.clone();
        let mut config = LogConfig::new(Verbosity::Minimal);
        config.external_logger = Some(Arc::new(move |record| {
            capture.lock().unwrap().push(record.clone());
        }));
        let logger = FetchLogger::with_config(config);

        report_route_failure(
            &logger,
            "https://example.test/banner.png",
            "request already handled",
        );

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Error);
        assert_eq!(records[0].category.as_deref(), Some("route"));
        assert!(records[0].message.contains("banner.png"));
    }

    #[test]
    fn resource_types_map_onto_route_kinds() {
        assert_eq!(
            map_resource_type(&ResourceType::Document),
            ResourceKind::Document
        );
        assert_eq!(map_resource_type(&ResourceType::Image), ResourceKind::Image);
        assert_eq!(map_resource_type(&ResourceType::Xhr), ResourceKind::Xhr);
        assert_eq!(map_resource_type(&ResourceType::Ping), ResourceKind::Other);
    }
}
