//! renderfetch: concurrent, browser-rendered URL fetching.
//!
//! The crate drives a headless browser to fetch batches of URLs whose content
//! only materializes after JavaScript execution. One shared browser context
//! serves a batch; every URL gets its own page, its own lifecycle task, and
//! its own outcome. Failures are data: a broken page never aborts the batch,
//! and outcomes always line up positionally with the input URLs.
//!
//! ```no_run
//! use renderfetch::{BatchFetcher, FetchConfig};
//!
//! # async fn run() -> Result<(), renderfetch::FetchError> {
//! let fetcher = BatchFetcher::chromium(FetchConfig::default());
//! let urls = vec!["https://example.com".to_string()];
//! let result = fetcher.fetch(&urls).await?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod detect;
pub mod driver;
pub mod lifecycle;
pub mod logging;
pub mod orchestrator;
pub mod outcome;
pub mod route;
pub mod runtime;

pub use config::{
    BrowserEngine, DelayRange, FetchConfig, FetchConfigError, ProxyConfig, Verbosity,
};
pub use detect::{ErrorDetector, SignatureDetector};
pub use driver::{
    BrowserContext, BrowserDriver, DriverError, HookArgs, HookError, LoadState, PageHandle,
    PageHook, PageHookFuture,
};
pub use lifecycle::PageLifecycle;
pub use logging::{FetchLogRecord, FetchLogger, LogCallback, LogConfig, LogLevel};
pub use orchestrator::{BatchFetcher, FetchError};
pub use outcome::{BatchResult, PageOutcome, Stage, StageFailure, STATUS_UNAVAILABLE};
pub use route::{ResourceBlockList, ResourceKind, RouteDecision, RouteFilter, RouteRequest};
pub use runtime::ChromiumDriver;
