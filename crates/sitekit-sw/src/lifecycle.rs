//! Install and activate.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::SharedCacheStorage;
use crate::net::{FetchError, Fetcher, Request};
use crate::registry::{CacheKind, CacheRegistry};
use crate::ServiceWorkerError;

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerState {
    /// Initial state, script evaluated.
    #[default]
    Parsed,
    /// Installing (install event).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and controlling pages.
    Activated,
}

/// Lifecycle bookkeeping for one worker instance.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    state: WorkerState,
    skip_waiting: bool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == WorkerState::Activated
    }

    /// Prefer immediate activation over waiting for old clients to close.
    pub fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    /// Installed and told not to wait for a separate activation.
    pub fn should_activate(&self) -> bool {
        self.state == WorkerState::Installed && self.skip_waiting
    }

    /// Move to `next` if the transition is legal.
    pub fn transition(&mut self, next: WorkerState) -> Result<(), ServiceWorkerError> {
        use WorkerState::*;

        let legal = matches!(
            (self.state, next),
            (Parsed, Installing)
                | (Installing, Installed)
                | (Installed, Activating)
                | (Activating, Activated)
        );
        if !legal {
            return Err(ServiceWorkerError::State(format!(
                "Cannot move from {:?} to {:?}",
                self.state, next
            )));
        }

        debug!(from = ?self.state, to = ?next, "Worker state change");
        self.state = next;
        Ok(())
    }
}

// ==================== Install ====================

/// Result of precaching the static manifest.
#[derive(Debug, Clone, Default)]
pub struct PrecacheReport {
    /// URLs stored, in manifest order.
    pub cached: Vec<Url>,
    /// URLs that could not be stored, with the reason.
    pub failed: Vec<(Url, FetchError)>,
}

impl PrecacheReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetch every manifest entry and store it in the static cache.
///
/// Entry failures are recorded, never propagated: install completes with a
/// partial precache.
pub async fn precache(
    caches: &SharedCacheStorage,
    fetcher: &dyn Fetcher,
    registry: &CacheRegistry,
    manifest: &[Url],
) -> PrecacheReport {
    let cache_name = registry.name(CacheKind::Static);
    caches.write().await.open(cache_name);

    let requests: Vec<Request> = manifest.iter().cloned().map(Request::get).collect();
    let responses = join_all(requests.iter().cloned().map(|r| fetcher.fetch(r))).await;

    let mut report = PrecacheReport::default();
    let mut caches = caches.write().await;
    let cache = caches.open(cache_name);

    for (request, result) in requests.into_iter().zip(responses) {
        let outcome = match result {
            Ok(response) if response.is_success() => cache
                .put(&request, response)
                .map_err(|e| FetchError::Failed(e.to_string())),
            Ok(response) => Err(FetchError::Failed(format!(
                "unexpected status {}",
                response.status
            ))),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => report.cached.push(request.url),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Precache entry failed");
                report.failed.push((request.url, e));
            }
        }
    }

    info!(
        cache = cache_name,
        cached = report.cached.len(),
        failed = report.failed.len(),
        "Precache complete"
    );
    report
}

// ==================== Activate ====================

/// Result of activation.
#[derive(Debug, Clone, Default)]
pub struct ActivationReport {
    /// Stale cache names that were deleted.
    pub deleted: Vec<String>,
    /// Number of clients claimed.
    pub claimed: usize,
}

/// Delete every cache whose name is not in the current version set.
pub async fn purge_stale(caches: &SharedCacheStorage, registry: &CacheRegistry) -> Vec<String> {
    let mut caches = caches.write().await;
    let stale: Vec<String> = caches
        .keys()
        .into_iter()
        .filter(|name| !registry.is_current(name))
        .collect();

    for name in &stale {
        caches.delete(name);
        info!(cache = %name, "Deleted stale cache");
    }
    stale
}
