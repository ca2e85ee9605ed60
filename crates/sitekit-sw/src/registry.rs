//! The fixed set of logical caches and their versioned storage names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A logical cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    /// App shell, styles and scripts.
    Static,
    /// HTML documents and everything else fetched at runtime.
    Runtime,
    /// Images.
    Images,
    /// Web fonts.
    Fonts,
}

impl CacheKind {
    /// Every logical cache, in registry order.
    pub const ALL: [CacheKind; 4] = [
        CacheKind::Static,
        CacheKind::Runtime,
        CacheKind::Images,
        CacheKind::Fonts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Static => "static",
            CacheKind::Runtime => "runtime",
            CacheKind::Images => "images",
            CacheKind::Fonts => "fonts",
        }
    }

    fn index(&self) -> usize {
        match self {
            CacheKind::Static => 0,
            CacheKind::Runtime => 1,
            CacheKind::Images => 2,
            CacheKind::Fonts => 3,
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps each [`CacheKind`] to exactly one versioned storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRegistry {
    names: [String; 4],
}

impl CacheRegistry {
    /// Build the names `"<app_id>-<kind>-v<version>"`.
    pub fn new(app_id: &str, version: u32) -> Self {
        Self {
            names: CacheKind::ALL.map(|kind| format!("{app_id}-{kind}-v{version}")),
        }
    }

    /// Storage key of a logical cache.
    pub fn name(&self, kind: CacheKind) -> &str {
        &self.names[kind.index()]
    }

    /// Whether a storage key belongs to the current version set.
    pub fn is_current(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}
