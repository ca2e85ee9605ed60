//! # Sitekit Offline Worker
//!
//! The offline caching layer of the Sitekit static site, modelled as a service
//! worker that mediates every same-origin request through a set of named,
//! versioned caches.
//!
//! ## Features
//!
//! - **Lifecycle**: install (precache), activate (purge stale versions, claim clients)
//! - **Routing**: images, fonts, styles/scripts, HTML navigations, everything else
//! - **Strategies**: stale-while-revalidate, navigation network-first, generic network-first
//! - **Control channel**: `SKIP_WAITING` and `CLEAR_CACHE` messages from the page
//! - **Push / sync**: notifications, notification clicks, `update-content` background sync
//!
//! ## Architecture
//!
//! ```text
//! WorkerEvent ──► ServiceWorker::dispatch
//!                     ├── Install ───────► precache (static cache), then activate unless waiting
//!                     ├── Activate ──────► purge stale caches, claim clients
//!                     ├── Fetch ─────────► Router::classify ──► strategy
//!                     ├── Message ───────► ControlMessage
//!                     ├── Push / NotificationClick
//!                     └── Sync ──────────► refresh static cache
//!
//! CacheStorage (shared)
//!     └── Cache ("<app>-<kind>-v<N>")
//!             └── Request → Response
//! ```

use thiserror::Error;

pub mod cache;
pub mod clients;
pub mod config;
pub mod lifecycle;
pub mod message;
pub mod net;
pub mod push;
pub mod registry;
pub mod router;
pub mod scope;
pub mod strategy;
pub mod worker;

pub use cache::{Cache, CacheEntry, CacheStorage, SharedCacheStorage};
pub use clients::{Client, ClientId, ClientMatchOptions, Clients};
pub use config::{
    AssetRules, ConfigError, NotificationDefaults, WorkerConfig, CACHE_VERSION, DEFAULT_ORIGIN,
};
pub use lifecycle::{ActivationReport, Lifecycle, PrecacheReport, WorkerState};
pub use message::{ControlMessage, ControlReply, MessageEvent, ReplyPort};
pub use net::{FetchError, Fetcher, HttpFetcher, Request, Response};
pub use push::{
    Notification, NotificationAction, NotificationClickEvent, NotificationId, Notifications,
    PushEvent, PushPayload, SyncEvent, SyncReport,
};
pub use registry::{CacheKind, CacheRegistry};
pub use router::{AssetClassRule, BypassReason, Route, Router};
pub use scope::EventScope;
pub use strategy::{FetchOutcome, ResponseSource};
pub use worker::{EventOutcome, ServiceWorker, WorkerEvent};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone)]
pub enum ServiceWorkerError {
    #[error("Network error: {0}")]
    Network(#[from] FetchError),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Message error: {0}")]
    Message(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<ConfigError> for ServiceWorkerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;
