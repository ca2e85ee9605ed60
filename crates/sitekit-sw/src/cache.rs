//! Cache storage: named caches of request → response pairs.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use http::Method;
use tokio::sync::RwLock;
use tracing::trace;

use crate::net::{Request, Response};
use crate::ServiceWorkerError;

/// Cache storage shared by every worker instance of the origin.
pub type SharedCacheStorage = Arc<RwLock<CacheStorage>>;

/// Key of a cached entry: method plus fragment-less URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    method: Method,
    url: String,
}

impl CacheKey {
    fn of(request: &Request) -> Self {
        Self {
            method: request.method.clone(),
            url: request.cache_url(),
        }
    }
}

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The request the response was stored under.
    pub request: Request,

    /// The stored response.
    pub response: Response,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

/// A cache instance.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    entries: HashMap<CacheKey, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        self.entries.get(&CacheKey::of(request))
    }

    /// Store a response, replacing any entry for the same request.
    ///
    /// Only GET requests can be stored.
    pub fn put(&mut self, request: &Request, response: Response) -> Result<(), ServiceWorkerError> {
        if request.method != Method::GET {
            return Err(ServiceWorkerError::Cache(format!(
                "Cannot cache {} request for {}",
                request.method, request.url
            )));
        }

        trace!(cache = %self.name, url = %request.url, "Cache put");
        let entry = CacheEntry {
            request: request.clone(),
            response,
            cached_at: now_millis(),
        };
        self.entries.insert(CacheKey::of(request), entry);
        Ok(())
    }

    /// Delete entry.
    pub fn delete(&mut self, request: &Request) -> bool {
        self.entries.remove(&CacheKey::of(request)).is_some()
    }

    /// Requests of every stored entry, sorted by URL.
    pub fn keys(&self) -> Vec<Request> {
        let mut keys: Vec<Request> = self.entries.values().map(|e| e.request.clone()).collect();
        keys.sort_by(|a, b| a.url.as_str().cmp(b.url.as_str()));
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// Cache storage (the `caches` global).
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
    /// Cache names in creation order.
    order: Vec<String>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a storage handle that can be shared between workers.
    pub fn shared() -> SharedCacheStorage {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Open a cache (creates if doesn't exist).
    pub fn open(&mut self, name: &str) -> &mut Cache {
        if !self.caches.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Get an existing cache.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.order.retain(|n| n != name);
        self.caches.remove(name).is_some()
    }

    /// Get all cache names, in creation order.
    pub fn keys(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Match across all caches, oldest cache first.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        self.order
            .iter()
            .filter_map(|name| self.caches.get(name))
            .find_map(|cache| cache.match_request(request))
    }

    /// Entry count per cache, in creation order.
    pub fn report(&self) -> Vec<(String, usize)> {
        self.order
            .iter()
            .filter_map(|name| self.caches.get(name).map(|c| (name.clone(), c.len())))
            .collect()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use url::Url;

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    fn ok(url: &str, body: &'static str) -> Response {
        Response::ok(Url::parse(url).unwrap(), body)
    }

    #[test]
    fn test_cache_put_and_match() {
        let mut cache = Cache::new("v1");
        let request = get("https://example.com/style.css");

        cache
            .put(&request, ok("https://example.com/style.css", "a{}"))
            .unwrap();

        assert!(cache.match_request(&request).is_some());
        assert!(cache
            .match_request(&get("https://example.com/other.css"))
            .is_none());
    }

    #[test]
    fn test_cache_rejects_non_get() {
        let mut cache = Cache::new("v1");
        let request = Request::post(
            Url::parse("https://example.com/api").unwrap(),
            Bytes::from_static(b"{}"),
        );

        let result = cache.put(&request, ok("https://example.com/api", "{}"));
        assert!(matches!(result, Err(ServiceWorkerError::Cache(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_put_overwrites() {
        let mut cache = Cache::new("v1");
        let request = get("https://example.com/app.js");

        cache.put(&request, ok("https://example.com/app.js", "old")).unwrap();
        cache.put(&request, ok("https://example.com/app.js", "new")).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.match_request(&request).unwrap().response.text(), "new");
    }

    #[test]
    fn test_fragment_ignored() {
        let mut cache = Cache::new("v1");
        cache
            .put(&get("https://example.com/lore/"), ok("https://example.com/lore/", "x"))
            .unwrap();

        assert!(cache
            .match_request(&get("https://example.com/lore/#cap-3"))
            .is_some());
    }

    #[test]
    fn test_cache_delete() {
        let mut cache = Cache::new("v1");
        let request = get("https://example.com/style.css");
        cache
            .put(&request, ok("https://example.com/style.css", "a{}"))
            .unwrap();

        assert!(cache.delete(&request));
        assert!(!cache.delete(&request));
        assert!(cache.match_request(&request).is_none());
    }

    #[test]
    fn test_cache_storage() {
        let mut storage = CacheStorage::new();

        assert!(storage.get("v1").is_none());

        storage.open("v1");
        assert!(storage.get("v1").is_some());

        assert!(storage.delete("v1"));
        assert!(!storage.delete("v1"));
        assert!(storage.get("v1").is_none());
        assert!(storage.keys().is_empty());
    }

    #[test]
    fn test_storage_keys_in_creation_order() {
        let mut storage = CacheStorage::new();
        storage.open("b");
        storage.open("a");
        storage.open("b");

        assert_eq!(storage.keys(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_storage_match_across_caches() {
        let mut storage = CacheStorage::new();
        let request = get("https://example.com/data.json");
        storage
            .open("first")
            .put(&request, ok("https://example.com/data.json", "1"))
            .unwrap();
        storage
            .open("second")
            .put(&request, ok("https://example.com/data.json", "2"))
            .unwrap();

        assert_eq!(
            storage.match_request(&request).unwrap().response.text(),
            "1"
        );
    }

    #[test]
    fn test_keys_sorted() {
        let mut cache = Cache::new("test");
        cache.put(&get("https://example.com/b.js"), ok("https://example.com/b.js", "")).unwrap();
        cache.put(&get("https://example.com/a.js"), ok("https://example.com/a.js", "")).unwrap();

        let keys = cache.keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].url.path(), "/a.js");
    }
}
