//! Caching strategies.
//!
//! Each strategy is a single network attempt plus cache reads and writes; no
//! strategy retries. Cache writes are limited to 2xx responses.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::cache::SharedCacheStorage;
use crate::net::{FetchError, Fetcher, Request, Response};
use crate::registry::{CacheKind, CacheRegistry};
use crate::scope::EventScope;

/// Where a response handed to the page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    OfflineDocument,
}

/// A response handed back to the page.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub response: Response,
    pub source: ResponseSource,
}

impl FetchOutcome {
    fn network(response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
        }
    }

    fn cache(response: Response) -> Self {
        Self {
            response,
            source: ResponseSource::Cache,
        }
    }
}

/// Everything a strategy touches.
#[derive(Clone)]
pub struct StrategyContext {
    pub caches: SharedCacheStorage,
    pub fetcher: Arc<dyn Fetcher>,
    pub registry: Arc<CacheRegistry>,
}

impl StrategyContext {
    /// Fetch from the network and store a successful response in `cache_name`.
    async fn fetch_and_store(&self, cache_name: &str, request: Request) -> Result<Response, FetchError> {
        let response = self.fetcher.fetch(request.clone()).await?;
        store(&self.caches, cache_name, &request, &response).await;
        Ok(response)
    }

    /// Store a response in the background, tied to the event's lifetime.
    fn store_in_background(&self, scope: &EventScope, kind: CacheKind, request: Request, response: &Response) {
        let caches = self.caches.clone();
        let cache_name = self.registry.name(kind).to_string();
        let response = response.clone();
        scope.wait_until(async move {
            store(&caches, &cache_name, &request, &response).await;
        });
    }

    async fn cached(&self, cache_name: &str, request: &Request) -> Option<Response> {
        let caches = self.caches.read().await;
        caches
            .get(cache_name)
            .and_then(|cache| cache.match_request(request))
            .map(|entry| entry.response.clone())
    }

    async fn cached_anywhere(&self, request: &Request) -> Option<Response> {
        let caches = self.caches.read().await;
        caches
            .match_request(request)
            .map(|entry| entry.response.clone())
    }
}

/// Write a response into a cache. Non-2xx responses are skipped.
pub(crate) async fn store(
    caches: &SharedCacheStorage,
    cache_name: &str,
    request: &Request,
    response: &Response,
) -> bool {
    if !response.is_success() {
        trace!(url = %request.url, status = response.status.as_u16(), "Not caching unsuccessful response");
        return false;
    }

    let mut caches = caches.write().await;
    match caches.open(cache_name).put(request, response.clone()) {
        Ok(()) => true,
        Err(e) => {
            warn!(cache = cache_name, error = %e, "Cache put failed");
            false
        }
    }
}

/// Serve from cache when present; always refresh from the network.
///
/// On a miss the caller waits for the network response. A failed refresh
/// after a hit is logged and dropped.
pub async fn stale_while_revalidate(
    ctx: &StrategyContext,
    scope: &EventScope,
    kind: CacheKind,
    request: Request,
) -> Result<FetchOutcome, FetchError> {
    let cache_name = ctx.registry.name(kind).to_string();

    match ctx.cached(&cache_name, &request).await {
        Some(cached) => {
            trace!(url = %request.url, cache = %cache_name, "Cache hit, revalidating");
            let ctx = ctx.clone();
            scope.wait_until(async move {
                let url = request.url.clone();
                if let Err(e) = ctx.fetch_and_store(&cache_name, request).await {
                    debug!(url = %url, error = %e, "Background revalidation failed");
                }
            });
            Ok(FetchOutcome::cache(cached))
        }
        None => {
            trace!(url = %request.url, cache = %cache_name, "Cache miss");
            ctx.fetch_and_store(&cache_name, request)
                .await
                .map(FetchOutcome::network)
        }
    }
}

/// Network first for HTML documents, falling back to the cache and then to
/// the offline document.
pub async fn navigation(
    ctx: &StrategyContext,
    scope: &EventScope,
    request: Request,
    offline_document: &Request,
) -> Result<FetchOutcome, FetchError> {
    match ctx.fetcher.fetch(request.clone()).await {
        Ok(response) => {
            ctx.store_in_background(scope, CacheKind::Runtime, request, &response);
            Ok(FetchOutcome::network(response))
        }
        Err(e) => {
            debug!(url = %request.url, error = %e, "Navigation offline, trying cache");
            if let Some(cached) = ctx.cached_anywhere(&request).await {
                return Ok(FetchOutcome::cache(cached));
            }
            match ctx.cached_anywhere(offline_document).await {
                Some(document) => Ok(FetchOutcome {
                    response: document,
                    source: ResponseSource::OfflineDocument,
                }),
                None => {
                    warn!(url = %offline_document.url, "Offline document missing from cache");
                    Err(e)
                }
            }
        }
    }
}

/// Network first, falling back to any cached entry.
pub async fn network_first(
    ctx: &StrategyContext,
    scope: &EventScope,
    request: Request,
) -> Result<FetchOutcome, FetchError> {
    match ctx.fetcher.fetch(request.clone()).await {
        Ok(response) => {
            ctx.store_in_background(scope, CacheKind::Runtime, request, &response);
            Ok(FetchOutcome::network(response))
        }
        Err(e) => match ctx.cached_anywhere(&request).await {
            Some(cached) => {
                debug!(url = %request.url, error = %e, "Network failed, serving cache");
                Ok(FetchOutcome::cache(cached))
            }
            None => Err(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStorage;
    use futures::future::{BoxFuture, FutureExt};
    use http::StatusCode;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use url::Url;

    /// Serves canned bodies; unknown URLs fail as offline.
    #[derive(Default)]
    struct Canned {
        bodies: Mutex<HashMap<String, (StatusCode, String)>>,
    }

    impl Canned {
        fn serve(&self, url: &Url, status: StatusCode, body: &str) {
            self.bodies
                .lock()
                .unwrap()
                .insert(url.to_string(), (status, body.to_string()));
        }
    }

    impl Fetcher for Canned {
        fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response, FetchError>> {
            let hit = self.bodies.lock().unwrap().get(request.url.as_str()).cloned();
            async move {
                let (status, body) = hit.ok_or(FetchError::Offline)?;
                Ok(Response::new(request.url, status, body))
            }
            .boxed()
        }
    }

    fn url(path: &str) -> Url {
        Url::parse("https://saga.example/").unwrap().join(path).unwrap()
    }

    fn context(fetcher: Arc<Canned>) -> StrategyContext {
        StrategyContext {
            caches: CacheStorage::shared(),
            fetcher,
            registry: Arc::new(CacheRegistry::new("saga", 1)),
        }
    }

    #[tokio::test]
    async fn test_swr_miss_waits_for_network() {
        let fetcher = Arc::new(Canned::default());
        fetcher.serve(&url("/app.js"), StatusCode::OK, "v1");
        let ctx = context(fetcher);
        let scope = EventScope::new();

        let outcome = stale_while_revalidate(&ctx, &scope, CacheKind::Static, Request::get(url("/app.js")))
            .await
            .unwrap();

        assert_eq!(outcome.source, ResponseSource::Network);
        assert_eq!(outcome.response.text(), "v1");
        assert!(ctx.cached("saga-static-v1", &Request::get(url("/app.js"))).await.is_some());
    }

    #[tokio::test]
    async fn test_swr_miss_offline_rejects() {
        let ctx = context(Arc::new(Canned::default()));
        let scope = EventScope::new();

        let result = stale_while_revalidate(&ctx, &scope, CacheKind::Static, Request::get(url("/app.js"))).await;
        assert_eq!(result.unwrap_err(), FetchError::Offline);
    }

    #[tokio::test]
    async fn test_swr_hit_survives_failed_refresh() {
        let ctx = context(Arc::new(Canned::default()));
        let request = Request::get(url("/app.css"));
        store(&ctx.caches, "saga-static-v1", &request, &Response::ok(url("/app.css"), "cached")).await;
        let scope = EventScope::new();

        let outcome = stale_while_revalidate(&ctx, &scope, CacheKind::Static, request.clone())
            .await
            .unwrap();
        scope.settle().await;

        assert_eq!(outcome.source, ResponseSource::Cache);
        assert_eq!(outcome.response.text(), "cached");
        assert_eq!(ctx.cached("saga-static-v1", &request).await.unwrap().text(), "cached");
    }

    #[tokio::test]
    async fn test_unsuccessful_response_not_cached() {
        let fetcher = Arc::new(Canned::default());
        fetcher.serve(&url("/api/missing"), StatusCode::NOT_FOUND, "nope");
        let ctx = context(fetcher);
        let scope = EventScope::new();

        let outcome = network_first(&ctx, &scope, Request::get(url("/api/missing")))
            .await
            .unwrap();
        scope.settle().await;

        assert_eq!(outcome.response.status, StatusCode::NOT_FOUND);
        assert!(ctx.cached_anywhere(&Request::get(url("/api/missing"))).await.is_none());
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_cache() {
        let ctx = context(Arc::new(Canned::default()));
        let request = Request::get(url("/api/data"));
        store(&ctx.caches, "saga-runtime-v1", &request, &Response::ok(url("/api/data"), "[1]")).await;
        let scope = EventScope::new();

        let outcome = network_first(&ctx, &scope, request).await.unwrap();
        assert_eq!(outcome.source, ResponseSource::Cache);
        assert_eq!(outcome.response.text(), "[1]");
    }

    #[tokio::test]
    async fn test_navigation_offline_without_document_rejects() {
        let ctx = context(Arc::new(Canned::default()));
        let scope = EventScope::new();

        let result = navigation(
            &ctx,
            &scope,
            Request::navigate(url("/lore/")),
            &Request::get(url("/offline.html")),
        )
        .await;
        assert_eq!(result.unwrap_err(), FetchError::Offline);
    }
}
