//! End-to-end batch behavior against a scripted in-memory driver.
//!
//! These tests exercise the public surface only: configuration, the
//! orchestrator, and the outcome model, with a driver that serves canned
//! markup instead of a real browser.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use renderfetch::{
    BatchFetcher, BrowserContext, BrowserDriver, DelayRange, DriverError, FetchConfig, LoadState,
    PageHandle, RouteFilter, SignatureDetector, Stage, STATUS_UNAVAILABLE,
};

#[derive(Clone)]
struct CannedResponse {
    status: i64,
    body: String,
}

fn canned(status: i64, body: &str) -> CannedResponse {
    CannedResponse {
        status,
        body: body.to_string(),
    }
}

/// Driver that resolves URLs against a fixed site map. Unknown URLs fail
/// navigation the way an unreachable host would.
struct SiteDriver {
    sites: Arc<HashMap<String, CannedResponse>>,
    pages_opened: Arc<AtomicUsize>,
}

impl SiteDriver {
    fn new(entries: Vec<(&str, CannedResponse)>) -> Self {
        let sites = entries
            .into_iter()
            .map(|(url, response)| (url.to_string(), response))
            .collect();
        Self {
            sites: Arc::new(sites),
            pages_opened: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct SiteContext {
    sites: Arc<HashMap<String, CannedResponse>>,
    pages_opened: Arc<AtomicUsize>,
}

struct SitePage {
    sites: Arc<HashMap<String, CannedResponse>>,
    current: Mutex<Option<String>>,
}

#[async_trait]
impl BrowserDriver for SiteDriver {
    async fn launch(&self, _config: &FetchConfig) -> Result<Arc<dyn BrowserContext>, DriverError> {
        Ok(Arc::new(SiteContext {
            sites: self.sites.clone(),
            pages_opened: self.pages_opened.clone(),
        }))
    }
}

#[async_trait]
impl BrowserContext for SiteContext {
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, DriverError> {
        self.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SitePage {
            sites: self.sites.clone(),
            current: Mutex::new(None),
        }))
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

#[async_trait]
impl PageHandle for SitePage {
    async fn install_route_filter(&self, _filter: Arc<dyn RouteFilter>) -> Result<(), DriverError> {
        Ok(())
    }

    async fn goto(&self, url: &str, _timeout_ms: u64) -> Result<i64, DriverError> {
        match self.sites.get(url) {
            Some(response) => {
                *self.current.lock().unwrap() = Some(url.to_string());
                Ok(response.status)
            }
            None => Err(DriverError::Message(format!(
                "net::ERR_NAME_NOT_RESOLVED at {url}"
            ))),
        }
    }

    async fn wait_for_load_state(
        &self,
        _state: LoadState,
        _timeout_ms: u64,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value, DriverError> {
        Ok(serde_json::Value::Null)
    }

    async fn content(&self) -> Result<String, DriverError> {
        let current = self.current.lock().unwrap();
        let body = current
            .as_ref()
            .and_then(|url| self.sites.get(url))
            .map(|response| response.body.clone())
            .unwrap_or_else(|| "<html><head></head><body></body></html>".to_string());
        Ok(body)
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

fn two_page_site() -> SiteDriver {
    SiteDriver::new(vec![
        (
            "https://site.test/ok",
            canned(200, "<html><body><h1>Welcome</h1></body></html>"),
        ),
        (
            "https://site.test/missing",
            canned(404, "<html><body><h1>Page Not Found</h1></body></html>"),
        ),
    ])
}

fn not_found_detector() -> Arc<SignatureDetector> {
    Arc::new(SignatureDetector::new(
        "not-found",
        vec!["Page Not Found".to_string()],
    ))
}

#[tokio::test]
async fn mixed_batch_separates_success_from_detected_error_page() {
    let config = FetchConfig::default().with_detector(not_found_detector());
    let fetcher = BatchFetcher::new(two_page_site(), config);

    let urls = vec![
        "https://site.test/ok".to_string(),
        "https://site.test/missing".to_string(),
    ];
    let result = fetcher.fetch(&urls).await.expect("batch runs");

    assert_eq!(result.len(), 2);
    assert_eq!(result.status_codes(), vec![200, 404]);

    let ok = &result.outcomes[0];
    assert!(ok.is_success());
    assert!(ok.html.contains("Welcome"));
    assert!(ok.detected_errors.is_empty());

    let missing = &result.outcomes[1];
    assert!(!missing.is_success());
    assert_eq!(missing.detected_errors, vec!["Page Not Found".to_string()]);
    assert!(missing.html.is_empty());
    assert!(missing.raw_html.contains("Page Not Found"));
    assert!(missing.stage_failures.is_empty());
}

#[tokio::test]
async fn unreachable_url_becomes_outcome_data_not_a_batch_error() {
    let fetcher = BatchFetcher::new(two_page_site(), FetchConfig::default());

    let urls = vec![
        "https://site.test/ok".to_string(),
        "https://nowhere.invalid/".to_string(),
    ];
    let result = fetcher.fetch(&urls).await.expect("batch still succeeds");

    assert!(result.outcomes[0].is_success());

    let unreachable = &result.outcomes[1];
    assert_eq!(unreachable.status_code, STATUS_UNAVAILABLE);
    assert_eq!(unreachable.stage_failures.len(), 1);
    assert_eq!(unreachable.stage_failures[0].stage, Stage::Navigate);
    assert!(
        unreachable.stage_failures[0]
            .message
            .contains("ERR_NAME_NOT_RESOLVED")
    );
}

#[tokio::test]
async fn duplicate_urls_are_fetched_independently() {
    let driver = two_page_site();
    let pages_opened = driver.pages_opened.clone();
    let fetcher = BatchFetcher::new(driver, FetchConfig::default());

    let urls = vec![
        "https://site.test/ok".to_string(),
        "https://site.test/ok".to_string(),
        "https://site.test/missing".to_string(),
    ];
    let result = fetcher.fetch(&urls).await.expect("batch runs");

    assert_eq!(result.len(), urls.len());
    assert_eq!(result.status_codes(), vec![200, 200, 404]);
    assert!(result.outcomes[0].is_success());
    assert!(result.outcomes[1].is_success());
    assert_eq!(result.outcomes[0].html, result.outcomes[1].html);
    // Each occurrence got its own page; nothing was deduplicated.
    assert_eq!(pages_opened.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn per_url_delays_overlap_across_the_batch() {
    let entries: Vec<(String, CannedResponse)> = (0..10)
        .map(|i| {
            (
                format!("https://site.test/page-{i}"),
                canned(200, "<html><body>page</body></html>"),
            )
        })
        .collect();
    let driver = SiteDriver::new(
        entries
            .iter()
            .map(|(url, response)| (url.as_str(), response.clone()))
            .collect(),
    );

    let mut config = FetchConfig::default();
    config.delay = Some(DelayRange::new(0.05, 0.05).expect("range"));
    let fetcher = BatchFetcher::new(driver, config);

    let urls: Vec<String> = (0..10)
        .map(|i| format!("https://site.test/page-{i}"))
        .collect();
    let result = fetcher.fetch(&urls).await.expect("batch runs");

    assert!(result.outcomes.iter().all(|o| o.is_success()));
    // Ten 50ms delays running serially would need 500ms; concurrent tasks
    // stay close to a single delay interval. Bounds are loose on purpose.
    assert!(result.elapsed >= Duration::from_millis(50));
    assert!(
        result.elapsed < Duration::from_millis(400),
        "batch took {:?}",
        result.elapsed
    );
}

#[tokio::test]
async fn zero_delay_range_adds_no_measurable_latency() {
    let mut config = FetchConfig::default();
    config.delay = Some(DelayRange::new(0.0, 0.0).expect("range"));
    let fetcher = BatchFetcher::new(two_page_site(), config);

    let urls = vec!["https://site.test/ok".to_string()];
    let result = fetcher.fetch(&urls).await.expect("batch runs");
    assert!(result.outcomes[0].is_success());
    assert!(
        result.elapsed < Duration::from_millis(200),
        "batch took {:?}",
        result.elapsed
    );
}

#[tokio::test]
async fn batch_display_summarizes_counts_statuses_and_elapsed() {
    let config = FetchConfig::default().with_detector(not_found_detector());
    let fetcher = BatchFetcher::new(two_page_site(), config);

    let urls = vec![
        "https://site.test/ok".to_string(),
        "https://site.test/missing".to_string(),
        "https://nowhere.invalid/".to_string(),
    ];
    let result = fetcher.fetch(&urls).await.expect("batch runs");

    let rendered = result.to_string();
    assert!(rendered.contains("#URLS: 3"));
    assert!(rendered.contains("STATUSES: [200, 404, -1]"));
    assert!(rendered.contains("ELAPSED: "));
    assert!(rendered.ends_with("sec"));
}

#[test]
fn blocking_facade_matches_async_results() {
    let config = FetchConfig::default().with_detector(not_found_detector());
    let fetcher = BatchFetcher::new(two_page_site(), config);

    let urls = vec![
        "https://site.test/ok".to_string(),
        "https://site.test/missing".to_string(),
    ];
    let result = fetcher.fetch_blocking(&urls).expect("blocking batch runs");

    assert_eq!(result.status_codes(), vec![200, 404]);
    assert!(result.outcomes[0].is_success());
    assert!(!result.outcomes[1].is_success());
}
