//! Worker configuration
//!
//! Built once at worker startup and shared immutably. The cache version is a
//! deploy-time constant: bump [`CACHE_VERSION`] whenever the precache manifest
//! or any cached asset changes shape.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::registry::CacheRegistry;

/// Current cache version.
pub const CACHE_VERSION: u32 = 3;

/// Origin of the local dev server, used when no origin is configured.
pub const DEFAULT_ORIGIN: &str = "http://localhost:4321/";

/// Errors raised while loading or validating a configuration.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Prefix of every cache name
    pub app_id: String,

    /// Cache version baked into every cache name
    pub version: u32,

    /// Origin the worker controls
    pub origin: Url,

    /// Root-relative paths precached on install, in order
    pub static_cache_urls: Vec<String>,

    /// Root-relative path served to navigations when offline and uncached
    pub offline_document: String,

    /// Suffix tables for static asset classification
    pub asset_rules: AssetRules,

    /// Notification defaults for push events
    pub notification: NotificationDefaults,

    /// Background sync tag that refreshes the static cache
    pub sync_tag: String,

    /// Activate straight after install instead of waiting for `SKIP_WAITING`
    /// or a host-sent activate event
    pub skip_waiting: bool,
}

/// Path suffixes per asset class. Matching is case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetRules {
    pub images: Vec<String>,
    pub fonts: Vec<String>,
    pub styles_scripts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub explore_title: String,
    pub close_title: String,
    /// URL opened by the `explore` action
    pub open_url: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            app_id: "transmedia".to_string(),
            version: CACHE_VERSION,
            origin: Url::parse(DEFAULT_ORIGIN).expect("DEFAULT_ORIGIN is a valid URL"),
            static_cache_urls: [
                "/",
                "/offline.html",
                "/manifest.json",
                "/favicon.svg",
                "/icons/icon-192.png",
                "/icons/icon-512.png",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            offline_document: "/offline.html".to_string(),
            asset_rules: AssetRules::default(),
            notification: NotificationDefaults::default(),
            sync_tag: "update-content".to_string(),
            skip_waiting: true,
        }
    }
}

impl Default for AssetRules {
    fn default() -> Self {
        let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            images: owned(&[
                ".png", ".jpg", ".jpeg", ".gif", ".webp", ".avif", ".svg", ".ico",
            ]),
            fonts: owned(&[".woff", ".woff2", ".ttf", ".otf", ".eot"]),
            styles_scripts: owned(&[".css", ".js", ".mjs"]),
        }
    }
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "Nueva actualización".to_string(),
            body: "Hay nuevo contenido disponible en el universo".to_string(),
            icon: "/icons/icon-192.png".to_string(),
            badge: "/icons/icon-72.png".to_string(),
            vibrate: vec![100, 50, 100],
            explore_title: "Explorar".to_string(),
            close_title: "Cerrar".to_string(),
            open_url: "/".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Default configuration for a given origin.
    pub fn for_origin(origin: Url) -> Self {
        Self {
            origin,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Check the invariants the worker relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_id.trim().is_empty() {
            return Err(ConfigError::Invalid("app_id must not be empty".to_string()));
        }
        if self.version == 0 {
            return Err(ConfigError::Invalid("version must be at least 1".to_string()));
        }
        if let Some(path) = self
            .static_cache_urls
            .iter()
            .chain(std::iter::once(&self.offline_document))
            .find(|p| !p.starts_with('/'))
        {
            return Err(ConfigError::Invalid(format!(
                "path is not root-relative: {path}"
            )));
        }
        if !self.static_cache_urls.contains(&self.offline_document) {
            return Err(ConfigError::Invalid(format!(
                "offline document {} is not precached",
                self.offline_document
            )));
        }
        Ok(())
    }

    /// The registry of current cache names.
    pub fn registry(&self) -> CacheRegistry {
        CacheRegistry::new(&self.app_id, self.version)
    }

    /// Resolve a root-relative path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        self.origin
            .join(path)
            .map_err(|e| ConfigError::Invalid(format!("{path}: {e}")))
    }

    /// Absolute URLs of the precache manifest, in order.
    pub fn static_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.static_cache_urls
            .iter()
            .map(|p| self.resolve(p))
            .collect()
    }
}
