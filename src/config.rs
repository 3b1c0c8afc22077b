//! Strongly-typed configuration for batch fetches.
//!
//! A [`FetchConfig`] is constructed once per batch and read-only for its
//! duration. Values come from defaults, from environment variables (with
//! optional `.env` support), or from the builder-style helpers that attach
//! the pluggable strategies: route filter, error detectors, and the
//! post-load page hook.

use std::env;
use std::fmt;
use std::num::{ParseFloatError, ParseIntError};
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detect::ErrorDetector;
use crate::driver::{HookArgs, PageHook};
use crate::route::RouteFilter;

/// Default navigation and load-state timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Browser engine selector.
///
/// The enumeration is closed; parsing an unrecognized selector from the
/// environment is a configuration error rather than a silent fallback.
/// Whether a driver can actually launch a given engine is validated at
/// launch time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserEngine {
    Chromium,
    Firefox,
    Webkit,
}

impl Default for BrowserEngine {
    fn default() -> Self {
        BrowserEngine::Chromium
    }
}

impl BrowserEngine {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Some(BrowserEngine::Chromium),
            "firefox" => Some(BrowserEngine::Firefox),
            "webkit" => Some(BrowserEngine::Webkit),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BrowserEngine::Chromium => "chromium",
            BrowserEngine::Firefox => "firefox",
            BrowserEngine::Webkit => "webkit",
        }
    }
}

/// Verbosity level for batch logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Minimal,
    Medium,
    Detailed,
}

impl Verbosity {
    pub fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Medium
    }
}

/// Proxy descriptor applied at browser launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProxyConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            username: None,
            password: None,
        }
    }
}

/// Inclusive pre-navigation delay range in seconds.
///
/// A duration is sampled uniformly per URL; the sampled sleep suspends only
/// the task that owns the page, never the batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    min_secs: f64,
    max_secs: f64,
}

impl DelayRange {
    pub fn new(min_secs: f64, max_secs: f64) -> Result<Self, FetchConfigError> {
        let valid = min_secs.is_finite() && max_secs.is_finite() && min_secs >= 0.0;
        if !valid || max_secs < min_secs {
            return Err(FetchConfigError::InvalidDelayRange { min_secs, max_secs });
        }
        Ok(Self { min_secs, max_secs })
    }

    pub fn min_secs(&self) -> f64 {
        self.min_secs
    }

    pub fn max_secs(&self) -> f64 {
        self.max_secs
    }

    /// Sample a uniform duration from the range.
    pub fn sample(&self) -> Duration {
        let secs = if self.max_secs <= self.min_secs {
            self.min_secs
        } else {
            rand::thread_rng().gen_range(self.min_secs..=self.max_secs)
        };
        Duration::from_secs_f64(secs)
    }
}

/// Caller-supplied configuration bundle, immutable for the duration of a batch.
#[derive(Clone)]
pub struct FetchConfig {
    pub engine: BrowserEngine,
    pub headless: bool,
    pub route_filter: Option<Arc<dyn RouteFilter>>,
    pub proxy: Option<ProxyConfig>,
    pub wait_for_network_idle: bool,
    pub wait_for_dom_content: bool,
    pub wait_for_load: bool,
    pub timeout_ms: u64,
    pub delay: Option<DelayRange>,
    pub detectors: Vec<Arc<dyn ErrorDetector>>,
    pub page_hook: Option<PageHook>,
    pub hook_args: HookArgs,
    pub verbose: Verbosity,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngine::default(),
            headless: false,
            route_filter: None,
            proxy: None,
            wait_for_network_idle: false,
            wait_for_dom_content: false,
            wait_for_load: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            delay: None,
            detectors: Vec::new(),
            page_hook: None,
            hook_args: HookArgs::new(),
            verbose: Verbosity::default(),
        }
    }
}

impl FetchConfig {
    /// Construct a configuration by reading relevant environment variables,
    /// after loading a `.env` file if present.
    pub fn from_env() -> Result<Self, FetchConfigError> {
        let _ = dotenv();
        let mut config = FetchConfig::default();

        if let Some(value) = env_var("RENDERFETCH_ENGINE") {
            config.engine = BrowserEngine::parse(&value).ok_or_else(|| {
                FetchConfigError::invalid_enum("RENDERFETCH_ENGINE", value.clone())
            })?;
        }

        if let Some(value) = env_var("RENDERFETCH_HEADLESS") {
            config.headless = parse_bool("RENDERFETCH_HEADLESS", &value)?;
        }

        if let Some(value) = env_var("RENDERFETCH_TIMEOUT_MS") {
            config.timeout_ms = parse_u64("RENDERFETCH_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = env_var("RENDERFETCH_WAIT_NETWORK_IDLE") {
            config.wait_for_network_idle = parse_bool("RENDERFETCH_WAIT_NETWORK_IDLE", &value)?;
        }

        if let Some(value) = env_var("RENDERFETCH_WAIT_DOM_CONTENT") {
            config.wait_for_dom_content = parse_bool("RENDERFETCH_WAIT_DOM_CONTENT", &value)?;
        }

        if let Some(value) = env_var("RENDERFETCH_WAIT_LOAD") {
            config.wait_for_load = parse_bool("RENDERFETCH_WAIT_LOAD", &value)?;
        }

        let delay_min = env_var("RENDERFETCH_DELAY_MIN_SECS")
            .map(|value| parse_f64("RENDERFETCH_DELAY_MIN_SECS", &value))
            .transpose()?;
        let delay_max = env_var("RENDERFETCH_DELAY_MAX_SECS")
            .map(|value| parse_f64("RENDERFETCH_DELAY_MAX_SECS", &value))
            .transpose()?;
        match (delay_min, delay_max) {
            (None, None) => {}
            (min, max) => {
                let min = min.unwrap_or(0.0);
                let max = max.unwrap_or(min);
                config.delay = Some(DelayRange::new(min, max)?);
            }
        }

        if let Some(server) = env_var("RENDERFETCH_PROXY_SERVER") {
            config.proxy = Some(ProxyConfig {
                server,
                username: env_var("RENDERFETCH_PROXY_USERNAME"),
                password: env_var("RENDERFETCH_PROXY_PASSWORD"),
            });
        }

        if let Some(value) = env_var("RENDERFETCH_VERBOSE") {
            let parsed = parse_u8("RENDERFETCH_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed).ok_or_else(|| {
                FetchConfigError::invalid_enum("RENDERFETCH_VERBOSE", parsed.to_string())
            })?;
        }

        Ok(config)
    }

    /// Attach a route filter consulted once per outgoing network request.
    pub fn with_route_filter(mut self, filter: Arc<dyn RouteFilter>) -> Self {
        self.route_filter = Some(filter);
        self
    }

    /// Append an error-page detector; detectors run in attachment order.
    pub fn with_detector(mut self, detector: Arc<dyn ErrorDetector>) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Install the post-load page hook and its keyword-argument bundle.
    pub fn with_page_hook(mut self, hook: PageHook, args: HookArgs) -> Self {
        self.page_hook = Some(hook);
        self.hook_args = args;
        self
    }
}

impl fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchConfig")
            .field("engine", &self.engine)
            .field("headless", &self.headless)
            .field("route_filter", &self.route_filter.is_some())
            .field("proxy", &self.proxy)
            .field("wait_for_network_idle", &self.wait_for_network_idle)
            .field("wait_for_dom_content", &self.wait_for_dom_content)
            .field("wait_for_load", &self.wait_for_load)
            .field("timeout_ms", &self.timeout_ms)
            .field("delay", &self.delay)
            .field("detectors", &self.detectors.len())
            .field("page_hook", &self.page_hook.is_some())
            .field("hook_args", &self.hook_args)
            .field("verbose", &self.verbose)
            .finish()
    }
}

/// Errors that can arise while constructing a [`FetchConfig`].
#[derive(Debug, Error)]
pub enum FetchConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidFloat {
        field: &'static str,
        value: String,
        #[source]
        source: ParseFloatError,
    },
    #[error("invalid delay range: min {min_secs}s, max {max_secs}s")]
    InvalidDelayRange { min_secs: f64, max_secs: f64 },
}

impl FetchConfigError {
    fn invalid_enum(field: &'static str, value: String) -> Self {
        FetchConfigError::InvalidEnumVariant { field, value }
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, FetchConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(FetchConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, FetchConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| FetchConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, FetchConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| FetchConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_f64(field: &'static str, value: &str) -> Result<f64, FetchConfigError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|source| FetchConfigError::InvalidFloat {
            field,
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(vars: &[(&str, Option<&str>)]) -> Self {
            let saved = vars
                .iter()
                .map(|(key, value)| {
                    let original = env::var(key).ok();
                    match value {
                        Some(v) => unsafe {
                            env::set_var(key, v);
                        },
                        None => unsafe {
                            env::remove_var(key);
                        },
                    };
                    ((*key).to_string(), original)
                })
                .collect();
            EnvGuard { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => unsafe {
                        env::set_var(&key, v);
                    },
                    None => unsafe {
                        env::remove_var(&key);
                    },
                }
            }
        }
    }

    fn with_env<F, T>(vars: &[(&str, Option<&str>)], f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let lock = env_lock().lock().expect("env mutex poisoned");
        let guard = EnvGuard::new(vars);
        let result = f();
        drop(guard);
        drop(lock);
        result
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = FetchConfig::default();
        assert_eq!(config.engine, BrowserEngine::Chromium);
        assert!(!config.headless);
        assert!(config.route_filter.is_none());
        assert!(config.proxy.is_none());
        assert!(!config.wait_for_network_idle);
        assert!(!config.wait_for_dom_content);
        assert!(!config.wait_for_load);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(config.delay.is_none());
        assert!(config.detectors.is_empty());
        assert!(config.page_hook.is_none());
        assert_eq!(config.verbose, Verbosity::Medium);
    }

    #[test]
    fn from_env_parses_values() {
        let vars = [
            ("RENDERFETCH_ENGINE", Some("chromium")),
            ("RENDERFETCH_HEADLESS", Some("true")),
            ("RENDERFETCH_TIMEOUT_MS", Some("30000")),
            ("RENDERFETCH_WAIT_NETWORK_IDLE", Some("yes")),
            ("RENDERFETCH_WAIT_DOM_CONTENT", Some("1")),
            ("RENDERFETCH_WAIT_LOAD", Some("off")),
            ("RENDERFETCH_DELAY_MIN_SECS", Some("0.5")),
            ("RENDERFETCH_DELAY_MAX_SECS", Some("2.0")),
            ("RENDERFETCH_PROXY_SERVER", Some("http://proxy:8080")),
            ("RENDERFETCH_PROXY_USERNAME", Some("user")),
            ("RENDERFETCH_PROXY_PASSWORD", Some("pass")),
            ("RENDERFETCH_VERBOSE", Some("2")),
        ];

        with_env(&vars, || {
            let config = FetchConfig::from_env().expect("config from env");
            assert_eq!(config.engine, BrowserEngine::Chromium);
            assert!(config.headless);
            assert_eq!(config.timeout_ms, 30_000);
            assert!(config.wait_for_network_idle);
            assert!(config.wait_for_dom_content);
            assert!(!config.wait_for_load);
            let delay = config.delay.expect("delay range");
            assert_eq!(delay.min_secs(), 0.5);
            assert_eq!(delay.max_secs(), 2.0);
            let proxy = config.proxy.expect("proxy");
            assert_eq!(proxy.server, "http://proxy:8080");
            assert_eq!(proxy.username.as_deref(), Some("user"));
            assert_eq!(proxy.password.as_deref(), Some("pass"));
            assert_eq!(config.verbose, Verbosity::Detailed);
        });
    }

    #[test]
    fn unrecognized_engine_is_a_config_error() {
        with_env(&[("RENDERFETCH_ENGINE", Some("netscape"))], || {
            let err = FetchConfig::from_env().expect_err("should reject engine");
            assert!(matches!(
                err,
                FetchConfigError::InvalidEnumVariant {
                    field: "RENDERFETCH_ENGINE",
                    ..
                }
            ));
        });
    }

    #[test]
    fn delay_range_rejects_inverted_bounds() {
        let err = DelayRange::new(2.0, 1.0).expect_err("inverted range");
        assert!(matches!(err, FetchConfigError::InvalidDelayRange { .. }));
        assert!(DelayRange::new(-1.0, 1.0).is_err());
        assert!(DelayRange::new(0.0, 0.0).is_ok());
    }

    #[test]
    fn delay_sample_stays_within_bounds() {
        let range = DelayRange::new(0.05, 0.2).expect("range");
        for _ in 0..100 {
            let sampled = range.sample().as_secs_f64();
            assert!((0.05..=0.2).contains(&sampled));
        }

        let fixed = DelayRange::new(0.1, 0.1).expect("range");
        assert_eq!(fixed.sample(), Duration::from_secs_f64(0.1));
    }
}
