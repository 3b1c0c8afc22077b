//! Network route filtering.
//!
//! A route filter is consulted once per outgoing request on a page, before
//! navigation begins, and decides whether the driver lets the request through
//! or aborts it. Filters are installed only when their blocking mode is
//! enabled, so a disabled filter costs nothing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Coarse classification of a network request, mirroring the CDP resource
/// types a page can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    Xhr,
    Fetch,
    WebSocket,
    Other,
}

/// Minimal request descriptor handed to a [`RouteFilter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub url: String,
    pub resource_type: ResourceKind,
}

/// Verdict for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    Abort,
}

/// Policy deciding which outgoing network requests a page may make.
pub trait RouteFilter: Send + Sync {
    /// Whether the filter should be attached at all. Checked once before
    /// navigation; when `false` the page runs unfiltered.
    fn block_resources(&self) -> bool;

    /// Decide a single request.
    fn decide(&self, request: &RouteRequest) -> RouteDecision;
}

/// Route filter that aborts requests for a configured set of resource kinds.
#[derive(Debug, Clone)]
pub struct ResourceBlockList {
    enabled: bool,
    blocked: HashSet<ResourceKind>,
}

impl ResourceBlockList {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            blocked: HashSet::new(),
        }
    }

    /// Block the heavyweight page assets that rarely matter for scraping:
    /// images, media, fonts, and stylesheets.
    pub fn with_default_exclusions(mut self) -> Self {
        self.blocked.extend([
            ResourceKind::Image,
            ResourceKind::Media,
            ResourceKind::Font,
            ResourceKind::Stylesheet,
        ]);
        self
    }

    pub fn with_blocked(mut self, kind: ResourceKind) -> Self {
        self.blocked.insert(kind);
        self
    }

    /// Enable blocking without changing the exclusion set.
    pub fn block_on(&mut self) {
        self.enabled = true;
    }

    /// Disable blocking; the filter will not be attached.
    pub fn block_off(&mut self) {
        self.enabled = false;
    }

    pub fn blocked(&self) -> &HashSet<ResourceKind> {
        &self.blocked
    }
}

impl RouteFilter for ResourceBlockList {
    fn block_resources(&self) -> bool {
        self.enabled
    }

    fn decide(&self, request: &RouteRequest) -> RouteDecision {
        if self.blocked.contains(&request.resource_type) {
            RouteDecision::Abort
        } else {
            RouteDecision::Allow
        }
    }
}
