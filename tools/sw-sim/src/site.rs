//! The worker's network in the simulator: a built site directory or a live
//! origin, behind a switch that can cut it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use sitekit_sw::{FetchError, Fetcher, Request, Response};
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Site directory not found: {0}")]
    NotADirectory(PathBuf),
}

/// A [`Fetcher`] answering from a static build output (e.g. `dist/`).
///
/// `/lore/` maps to `lore/index.html`, `/lore` to `lore`, `lore.html` or
/// `lore/index.html`, whichever exists first.
#[derive(Debug)]
pub struct DirFetcher {
    root: PathBuf,
}

impl DirFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SiteError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SiteError::NotADirectory(root));
        }
        Ok(Self { root })
    }

    fn candidates(root: &Path, url_path: &str) -> Vec<PathBuf> {
        let segments: Vec<&str> = url_path
            .split('/')
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .collect();
        let base = segments.iter().fold(root.to_path_buf(), |p, s| p.join(s));

        if url_path.ends_with('/') {
            vec![base.join("index.html")]
        } else {
            vec![
                base.clone(),
                base.with_extension("html"),
                base.join("index.html"),
            ]
        }
    }
}

impl Fetcher for DirFetcher {
    fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response, FetchError>> {
        let candidates = Self::candidates(&self.root, request.url.path());

        async move {
            for file in candidates {
                if !file.is_file() {
                    continue;
                }
                let body = tokio::fs::read(&file)
                    .await
                    .map_err(|e| FetchError::Failed(format!("{}: {}", file.display(), e)))?;
                trace!(url = %request.url, file = %file.display(), "Served from site");

                let mime = mime_guess::from_path(&file).first_or_octet_stream();
                let mut response = Response::ok(request.url, body);
                if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
                    response = response.with_header(CONTENT_TYPE, value);
                }
                return Ok(response);
            }

            Ok(Response::new(request.url, StatusCode::NOT_FOUND, "Not Found"))
        }
        .boxed()
    }
}

/// Wraps any [`Fetcher`] with a switch that simulates losing the network.
pub struct Connectivity {
    inner: Arc<dyn Fetcher>,
    online: AtomicBool,
}

impl Connectivity {
    pub fn new(inner: Arc<dyn Fetcher>) -> Self {
        Self {
            inner,
            online: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) connectivity.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Fetcher for Connectivity {
    fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response, FetchError>> {
        if self.online.load(Ordering::SeqCst) {
            self.inner.fetch(request)
        } else {
            trace!(url = %request.url, "Network cut");
            async { Err(FetchError::Offline) }.boxed()
        }
    }
}
