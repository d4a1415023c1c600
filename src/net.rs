//! Network abstraction shared by the page and the offline cache worker.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};

use crate::error::{Error, Result};

/// How a request interacts with HTTP caches along the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Use the host's default caching behaviour.
    #[default]
    Default,
    /// Bypass every HTTP cache (`Cache-Control: no-store`).
    NoStore,
}

/// A GET request for a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Absolute URL of the resource.
    pub url: Url,
    /// Cache behaviour for this request.
    pub cache: CacheMode,
}

impl Request {
    /// Creates a GET request with default caching.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            url,
            cache: CacheMode::Default,
        }
    }

    /// Sets the cache mode.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response with the given status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Abstraction over the host's network stack for testability.
///
/// A returned `Ok` carries any HTTP status, including errors; `Err` means no
/// response was received at all.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// Performs the request and buffers the whole response.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Resolves a path such as `apps.json` or `/style.css` against a base URL.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if the path cannot be joined.
pub fn resolve(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))
}

/// Returns true if both URLs share scheme, host, and port.
#[must_use]
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// Builds a configured HTTP client.
fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .build()
}

/// Default [`HttpFetch`] implementation backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Creates a fetcher with a pooled, keep-alive client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let mut builder = self.client.get(request.url.clone());
        if request.cache == CacheMode::NoStore {
            builder = builder.header(CACHE_CONTROL, "no-store");
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response.bytes().await?;

        log::debug!("GET {} -> {status} ({} bytes)", request.url, body.len());

        Ok(Response {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted network fake shared by the page and worker tests.

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Serves canned responses by URL and counts every call.
    #[derive(Default)]
    pub struct MockFetch {
        responses: Mutex<HashMap<String, Response>>,
        requests: Mutex<Vec<Request>>,
        calls: AtomicUsize,
    }

    impl MockFetch {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, url: &str, response: Response) {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_string(), response);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpFetch for MockFetch {
        async fn fetch(&self, request: &Request) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .get(request.url.as_str())
                .cloned()
                .ok_or_else(|| Error::Network(format!("connection refused: {}", request.url)))
        }
    }
}
