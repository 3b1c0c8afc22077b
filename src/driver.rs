//! The browser-driver seam.
//!
//! The fetch core never touches a browser engine directly; it drives these
//! traits. A production driver wraps a real engine (see
//! [`ChromiumDriver`](crate::runtime::ChromiumDriver)); tests substitute mock
//! implementations to script every stage outcome.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::{Map as JsonMap, Value};
use thiserror::Error;

use crate::config::{BrowserEngine, FetchConfig};
use crate::route::RouteFilter;

/// Errors surfaced by driver implementations.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver error: {0}")]
    Message(String),
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
    #[error("engine '{}' is not supported by this driver", .0.label())]
    UnsupportedEngine(BrowserEngine),
}

/// Load states a page can be asked to wait for, each independently
/// toggleable in the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    DomContentLoaded,
    Load,
    NetworkIdle,
}

impl LoadState {
    pub fn label(self) -> &'static str {
        match self {
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::Load => "load",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

/// Launches a browser and produces the shared context for one batch.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Launch the browser described by the configuration and open one
    /// context shared by every page in the batch.
    async fn launch(&self, config: &FetchConfig) -> Result<Arc<dyn BrowserContext>, DriverError>;
}

/// The shared browser context. Read-only infrastructure for all tasks;
/// only page creation and teardown go through it.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    /// Open a fresh page owned exclusively by one lifecycle task.
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>, DriverError>;

    /// Tear down the context after every task has resolved.
    async fn close(&self) -> Result<(), DriverError>;
}

/// One isolated page, owned by exactly one lifecycle task.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Attach a route filter that intercepts every outgoing request on this
    /// page. Must be installed before navigation to catch document requests.
    async fn install_route_filter(&self, filter: Arc<dyn RouteFilter>) -> Result<(), DriverError>;

    /// Navigate to `url` and return the HTTP status reported by the
    /// navigation response.
    async fn goto(&self, url: &str, timeout_ms: u64) -> Result<i64, DriverError>;

    /// Wait until the page reaches `state`, or fail after `timeout_ms`.
    async fn wait_for_load_state(
        &self,
        state: LoadState,
        timeout_ms: u64,
    ) -> Result<(), DriverError>;

    /// Evaluate a script expression in the page and return its value.
    ///
    /// This is how page hooks interact with the live document: clicking
    /// elements, waiting on selectors, reading attributes.
    async fn evaluate(&self, script: &str) -> Result<Value, DriverError>;

    /// Read the page's current rendered markup.
    async fn content(&self) -> Result<String, DriverError>;

    /// Release the page.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Free-form keyword-argument bundle handed to the page hook.
pub type HookArgs = JsonMap<String, Value>;

/// Error produced by a page hook; the lifecycle records it as a stage
/// failure and drops the extra result.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HookError(pub String);

/// Future returned by a page hook invocation.
pub type PageHookFuture = BoxFuture<'static, Result<Value, HookError>>;

/// Site-specific page interaction injected as a strategy value.
///
/// Invoked once per URL after load-waiting and error detection, with the
/// live page handle and the configured argument bundle. The handle's
/// [`evaluate`](PageHandle::evaluate) gives the hook full scripted access to
/// the document (paging through a gallery, expanding lazy content). Its
/// return value becomes the outcome's extra-result payload verbatim.
pub type PageHook = Arc<dyn Fn(Arc<dyn PageHandle>, HookArgs) -> PageHookFuture + Send + Sync>;
