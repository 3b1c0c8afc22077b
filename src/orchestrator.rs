//! Concurrent batch orchestration.
//!
//! A [`BatchFetcher`] owns the driver and configuration for a batch: it
//! launches one browser context shared by every URL, fans out one page
//! lifecycle task per URL with no internal concurrency cap, and reassembles
//! the outcomes in input order regardless of completion order. A task that
//! fails outside its own stage handling is replaced by the canonical fallback
//! outcome; only shared-context launch failure ever reaches the caller as an
//! error.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::config::FetchConfig;
use crate::driver::{BrowserDriver, DriverError};
use crate::lifecycle::PageLifecycle;
use crate::logging::FetchLogger;
use crate::outcome::{BatchResult, PageOutcome};
use crate::runtime::ChromiumDriver;

/// Batch-level errors. Per-URL failures never appear here; they become
/// outcome data instead.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to launch shared browser context: {0}")]
    Launch(#[source] DriverError),
    #[error("failed to build blocking runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Orchestrates one batch of URLs against a single shared browser context.
pub struct BatchFetcher<D: BrowserDriver> {
    driver: D,
    config: Arc<FetchConfig>,
    logger: Arc<FetchLogger>,
}

impl BatchFetcher<ChromiumDriver> {
    /// Construct a fetcher backed by the bundled chromiumoxide driver. The
    /// batch logger is shared with the driver so driver-internal failures
    /// land in the same sink as stage logs.
    pub fn chromium(config: FetchConfig) -> Self {
        let logger = Arc::new(FetchLogger::new(config.verbose));
        Self::new(ChromiumDriver::with_logger(logger.clone()), config).with_logger(logger)
    }
}

impl<D: BrowserDriver + 'static> BatchFetcher<D> {
    pub fn new(driver: D, config: FetchConfig) -> Self {
        let logger = Arc::new(FetchLogger::new(config.verbose));
        Self {
            driver,
            config: Arc::new(config),
            logger,
        }
    }

    /// Replace the default logger, e.g. to forward records to an external sink.
    pub fn with_logger(mut self, logger: Arc<FetchLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch every URL concurrently and return outcomes in input order.
    ///
    /// Duplicates are fetched independently. The only error path is failure
    /// to launch the shared browser context; everything per-URL is reported
    /// inside the returned outcomes.
    pub async fn fetch(&self, urls: &[String]) -> Result<BatchResult, FetchError> {
        let started = Instant::now();

        let context = self
            .driver
            .launch(&self.config)
            .await
            .map_err(FetchError::Launch)?;

        let lifecycle = PageLifecycle::new(self.config.clone(), self.logger.clone());

        let mut handles = Vec::with_capacity(urls.len());
        for url in urls {
            let lifecycle = lifecycle.clone();
            let context = context.clone();
            let url = url.clone();
            handles.push(tokio::spawn(async move {
                lifecycle.run(context, &url).await
            }));
        }

        // Joining in spawn order keeps outcomes aligned with input URLs no
        // matter which tasks finish first.
        let mut outcomes = Vec::with_capacity(handles.len());
        for (handle, url) in handles.into_iter().zip(urls) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.logger.error(
                        format!("Task for '{url}' failed outside stage handling: {err}"),
                        Some("batch"),
                        None,
                    );
                    PageOutcome::task_failure()
                }
            };
            outcomes.push(outcome);
        }

        // Teardown only after every task has resolved. A failing teardown is
        // logged, never surfaced.
        if let Err(err) = context.close().await {
            self.logger.error(
                format!("Failed to close browser context: {err}"),
                Some("batch"),
                None,
            );
        }

        let result = BatchResult {
            urls: urls.to_vec(),
            outcomes,
            elapsed: started.elapsed(),
        };
        self.logger.info(
            format!(
                "Batch finished: {} urls in {:.3}s",
                result.len(),
                result.elapsed.as_secs_f64()
            ),
            Some("batch"),
            None,
        );
        Ok(result)
    }

    /// Synchronous facade over [`fetch`](Self::fetch): runs the batch on a
    /// private current-thread runtime to completion.
    ///
    /// Must not be called from inside an async context; use `fetch` there.
    pub fn fetch_blocking(&self, urls: &[String]) -> Result<BatchResult, FetchError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.fetch(urls))
    }
}
