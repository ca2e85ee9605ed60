//! Request classification.

use http::Method;
use tracing::trace;

use crate::config::{AssetRules, WorkerConfig};
use crate::net::Request;
use crate::registry::CacheKind;

/// Why a request is left to the network untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassReason {
    NonGet,
    CrossOrigin,
    /// The worker is not (yet) controlling pages.
    Inactive,
}

/// Where a fetch event is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not handled; the request goes to the network as-is.
    Bypass(BypassReason),
    /// Static asset served stale-while-revalidate from the given cache.
    StaleWhileRevalidate(CacheKind),
    /// HTML document, network first with offline fallback.
    Navigation,
    /// Anything else, network first.
    NetworkFirst,
}

/// A suffix predicate mapping paths to a cache.
#[derive(Debug, Clone)]
pub struct AssetClassRule {
    pub kind: CacheKind,
    suffixes: Vec<String>,
}

impl AssetClassRule {
    pub fn new(kind: CacheKind, suffixes: &[String]) -> Self {
        Self {
            kind,
            suffixes: suffixes.iter().map(|s| s.to_ascii_lowercase()).collect(),
        }
    }

    /// Check a URL path (no query) against the suffix list.
    pub fn matches(&self, path: &str) -> bool {
        let path = path.to_ascii_lowercase();
        self.suffixes.iter().any(|s| path.ends_with(s.as_str()))
    }
}

/// Classifies intercepted requests.
///
/// Rules are checked in priority order: images, fonts, styles/scripts.
#[derive(Debug, Clone)]
pub struct Router {
    origin: url::Origin,
    rules: Vec<AssetClassRule>,
}

impl Router {
    pub fn new(origin: url::Origin, rules: &AssetRules) -> Self {
        Self {
            origin,
            rules: vec![
                AssetClassRule::new(CacheKind::Images, &rules.images),
                AssetClassRule::new(CacheKind::Fonts, &rules.fonts),
                AssetClassRule::new(CacheKind::Static, &rules.styles_scripts),
            ],
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.origin.origin(), &config.asset_rules)
    }

    /// The cache a static asset path belongs to, if any.
    pub fn asset_class(&self, path: &str) -> Option<CacheKind> {
        self.rules
            .iter()
            .find(|rule| rule.matches(path))
            .map(|rule| rule.kind)
    }

    /// Classify a request. Exactly one route applies.
    pub fn classify(&self, request: &Request) -> Route {
        let route = if request.method != Method::GET {
            Route::Bypass(BypassReason::NonGet)
        } else if !request.is_same_origin(&self.origin) {
            Route::Bypass(BypassReason::CrossOrigin)
        } else if let Some(kind) = self.asset_class(request.url.path()) {
            Route::StaleWhileRevalidate(kind)
        } else if request.accepts_html() {
            Route::Navigation
        } else {
            Route::NetworkFirst
        };

        trace!(url = %request.url, ?route, "Classified request");
        route
    }
}
