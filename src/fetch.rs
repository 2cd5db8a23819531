//! Network fetch abstraction.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};

use crate::error::{Error, Result};
use crate::key::RequestKey;
use crate::response::CachedResponse;

/// How a fetch interacts with intermediate HTTP caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Normal HTTP caching rules apply.
    #[default]
    Default,
    /// Always go to the network and ignore any intermediate cache.
    Reload,
}

/// A request handed to a [`Fetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Method and URL of the request.
    pub key: RequestKey,
    /// Cache interaction mode.
    pub cache_mode: CacheMode,
}

impl FetchRequest {
    /// Creates a request with default cache semantics.
    #[must_use]
    pub const fn new(key: RequestKey) -> Self {
        Self {
            key,
            cache_mode: CacheMode::Default,
        }
    }

    /// Creates a request that bypasses intermediate caches.
    #[must_use]
    pub const fn reload(key: RequestKey) -> Self {
        Self {
            key,
            cache_mode: CacheMode::Reload,
        }
    }
}

/// Abstraction over the network so the reconciler can be tested offline.
///
/// Implementations resolve with whatever status the server returned; only
/// failures to obtain a response at all are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs the request and buffers the full response.
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse>;
}

/// [`Fetcher`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Wraps an existing client.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Builds a fetcher with a pooled client suited to many small asset requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn with_defaults() -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse> {
        let method = reqwest::Method::from_bytes(request.key.method.as_bytes())
            .map_err(|e| Error::Url(format!("{}: {e}", request.key.method)))?;
        let mut builder = self.client.request(method, &request.key.url);
        if request.cache_mode == CacheMode::Reload {
            builder = builder
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
        }

        let response = builder.send().await.map_err(|e| Error::Network {
            url: request.key.url.clone(),
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?;

        log::debug!("{} -> {status} ({} bytes)", request.key, body.len());
        Ok(CachedResponse {
            status,
            headers,
            body,
        })
    }
}
