//! HTTP client wrapper for range-resumable downloads.
//!
//! This module provides the `HttpClient` struct which opens GET requests
//! with an optional `Range: bytes=<offset>-` header and classifies the
//! response per the resume rules: `200` restarts from zero, `206` continues
//! from the requested offset, anything else is an error.

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::engine::EngineError;
use super::error::DownloadError;
use crate::config::EngineConfig;
use crate::user_agent;

/// HTTP client for streaming downloads.
///
/// This client is designed to be created once and reused for every task of
/// an engine, taking advantage of connection pooling.
///
/// # Example
///
/// ```no_run
/// use rangeget_core::download::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let response = client.open("https://example.com/file.zip", 0).await?;
/// println!("total: {:?}", response.total_bytes());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// An accepted (`200`/`206`) response, ready to stream.
#[derive(Debug)]
pub struct RangeResponse {
    response: reqwest::Response,
    offset: u64,
    content_length: Option<u64>,
}

impl RangeResponse {
    /// True when the server honored the range request (`206`).
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.response.status() == StatusCode::PARTIAL_CONTENT
    }

    /// Byte offset the body starts at: the requested offset for `206`, zero
    /// for `200`.
    #[must_use]
    pub fn start_offset(&self) -> u64 {
        if self.is_partial() { self.offset } else { 0 }
    }

    /// Full resource size when the server sent `Content-Length`.
    ///
    /// `206`: offset + remaining length. `200`: the length itself.
    #[must_use]
    pub fn total_bytes(&self) -> Option<u64> {
        self.content_length
            .map(|length| self.start_offset().saturating_add(length))
    }

    /// HTTP status code of the response.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.response.status().as_u16()
    }

    /// Consumes the response into a stream of body chunks.
    pub fn into_body(self) -> BodyStream {
        BodyStream::new(self.response)
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 30 seconds per stalled read
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let client = build_client(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
            &user_agent::default_download_user_agent(),
        )
        .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Creates a client using the timeouts and User-Agent of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ClientBuild`] when reqwest rejects the
    /// configuration (for example an unparsable User-Agent).
    #[instrument(level = "debug", skip(config))]
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = build_client(
            config.connect_timeout,
            config.read_timeout,
            &config.user_agent,
        )
        .map_err(EngineError::ClientBuild)?;
        Ok(Self { client })
    }

    /// Sends a GET for `url`, requesting a continuation from `offset` when it
    /// is non-zero.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid
    /// - The request fails (network error, timeout)
    /// - The server answers with anything other than `200` or `206`
    #[instrument(skip(self), fields(url = %url))]
    pub async fn open(&self, url: &str, offset: u64) -> Result<RangeResponse, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let mut request = self.client.get(parsed);
        if offset > 0 {
            request = request.header(RANGE, range_header_value(offset));
            debug!(offset, "requesting byte-range continuation");
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        debug!(
            status = status.as_u16(),
            content_length, offset, "response accepted"
        );

        Ok(RangeResponse {
            response,
            offset,
            content_length,
        })
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// `bytes=<offset>-`, the open-ended range form.
#[must_use]
pub fn range_header_value(offset: u64) -> String {
    format!("bytes={offset}-")
}

fn build_client(
    connect_timeout: Duration,
    read_timeout: Duration,
    user_agent: &str,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .read_timeout(read_timeout)
        .user_agent(user_agent)
        .build()
}

/// Streaming response body.
pub struct BodyStream {
    url: String,
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
}

impl std::fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyStream").field("url", &self.url).finish()
    }
}

impl BodyStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            url: response.url().to_string(),
            inner: response.bytes_stream().boxed(),
        }
    }

    /// Next chunk of the body, `None` at end of stream.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, DownloadError>> {
        let item = self.inner.next().await?;
        Some(item.map_err(|e| DownloadError::network(self.url.clone(), e)))
    }
}
