//! HTTP client for fetching mesh descriptors and payload chunks.
//!
//! This module provides the `Client` type, the reqwest-backed
//! [`ChunkSource`] used by the loading pipeline.

use std::sync::Arc;

use crate::cache::{Cache, NoCache, chunk_key};
use crate::descriptor::MeshDescriptor;
use crate::error::{Error, Result};
use crate::progress::{DEFAULT_CAPACITY, ProgressTracker, RequestId};
use crate::range::ByteRange;
use crate::source::{self, ChunkSource};

/// HTTP client for fetching mesh data.
///
/// The client handles HTTP requests, caching, and progress bookkeeping. It is
/// designed to be runtime-agnostic and works with any async executor.
///
/// # Example
///
/// ```ignore
/// let client = Client::new();
/// let descriptor = client.fetch_descriptor("http://localhost/bunny.json").await?;
/// ```
pub struct Client<C: Cache = NoCache> {
    http: reqwest::Client,
    cache: Arc<C>,
    progress: ProgressTracker,
}

impl Client<NoCache> {
    /// Create a new client with default settings and no caching.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cache(NoCache)
    }
}

impl Default for Client<NoCache> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Cache> Client<C> {
    /// Create a new client with a custom cache.
    #[must_use]
    pub fn with_cache(cache: C) -> Self {
        Self::with_http_and_cache(reqwest::Client::new(), cache)
    }

    /// Create a new client with a custom HTTP client and cache.
    #[must_use]
    pub fn with_http_and_cache(http: reqwest::Client, cache: C) -> Self {
        Self {
            http,
            cache: Arc::new(cache),
            progress: ProgressTracker::with_capacity(DEFAULT_CAPACITY),
        }
    }

    /// Track at most `capacity` concurrent requests in the progress table.
    #[must_use]
    pub fn with_progress_capacity(mut self, capacity: usize) -> Self {
        self.progress = ProgressTracker::with_capacity(capacity);
        self
    }

    /// Shared progress table, updated as response bodies stream in.
    #[must_use]
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// The response cache.
    #[must_use]
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Fetch and validate a mesh descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP request fails or the document is not a
    /// valid descriptor.
    pub async fn fetch_descriptor(&self, url: &str) -> Result<MeshDescriptor> {
        source::resolve(self, url).await
    }

    /// Fetch `range` of the resource at `url`, using the cache if available.
    ///
    /// A server that ignores the `Range` header answers `200` with the whole
    /// resource; those bytes are returned as-is and the caller decides what
    /// to do with the length mismatch.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not a success.
    pub async fn fetch_range(&self, url: &str, range: ByteRange) -> Result<Vec<u8>> {
        let key = chunk_key(url, range);
        if let Some(data) = self.cache.get(&key).await? {
            tracing::debug!(url, %range, "cache hit");
            self.credit_cached(data.len());
            return Ok(data);
        }

        tracing::debug!(url, %range, "fetching");

        let mut request = self.http.get(url);
        if let Some(value) = range.header_value() {
            request = request.header(reqwest::header::RANGE, value);
        }
        let response = request.send().await.map_err(|e| http_error(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if range.expected_len().is_some() && status != reqwest::StatusCode::PARTIAL_CONTENT {
            tracing::debug!(url, %range, status = status.as_u16(), "range not honored");
        }

        let data = self.read_body(url, range, response).await?;

        self.cache.put(&key, data.clone()).await?;

        Ok(data)
    }

    #[cfg(not(target_family = "wasm"))]
    async fn read_body(
        &self,
        url: &str,
        range: ByteRange,
        mut response: reqwest::Response,
    ) -> Result<Vec<u8>> {
        let total = response.content_length();
        let id = self.progress.lock().register(total);
        if id.is_none() {
            tracing::debug!(url, "progress table full, request untracked");
        }

        // Content-Length is only a hint; never reserve more than was asked for.
        let reserve = match (total, range.expected_len()) {
            (Some(total), Some(expected)) => total.min(expected),
            _ => 0,
        };
        let mut data = Vec::with_capacity(usize::try_from(reserve).unwrap_or(0));
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    data.extend_from_slice(&chunk);
                    if let Some(id) = id {
                        self.progress.lock().update(id, data.len() as u64, None);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    if let Some(id) = id {
                        self.progress.lock().abandon(id);
                    }
                    return Err(http_error(url, &e));
                }
            }
        }

        self.finish(id);
        Ok(data)
    }

    // Browser fetch hands over the body in one piece.
    #[cfg(target_family = "wasm")]
    async fn read_body(
        &self,
        url: &str,
        _range: ByteRange,
        response: reqwest::Response,
    ) -> Result<Vec<u8>> {
        let id = self.progress.lock().register(response.content_length());
        let data = match response.bytes().await {
            Ok(data) => data.to_vec(),
            Err(e) => {
                if let Some(id) = id {
                    self.progress.lock().abandon(id);
                }
                return Err(http_error(url, &e));
            }
        };
        if let Some(id) = id {
            self.progress.lock().update(id, data.len() as u64, None);
        }
        self.finish(id);
        Ok(data)
    }

    fn finish(&self, id: Option<RequestId>) {
        if let Some(id) = id {
            self.progress.lock().finish(id);
        }
    }

    fn credit_cached(&self, len: usize) {
        let mut table = self.progress.lock();
        if let Some(id) = table.register(Some(len as u64)) {
            table.update(id, len as u64, None);
            table.finish(id);
        }
    }
}

impl<C: Cache> ChunkSource for Client<C> {
    fn fetch(&self, url: &str, range: ByteRange) -> impl Future<Output = Result<Vec<u8>>> {
        self.fetch_range(url, range)
    }
}

fn http_error(url: &str, e: &reqwest::Error) -> Error {
    Error::Http {
        url: url.to_string(),
        message: e.to_string(),
    }
}
