//! HTTP client wrapper for capability probes and ranged segment fetches.
//!
//! [`HttpClient`] is created once per run and cloned into every worker,
//! sharing reqwest's connection pool.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap, RANGE};
use reqwest::{Client, Method, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, IO_BUFFER_BYTES, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::fetcher::ProgressSink;
use super::types::{ByteRange, ResourceDescriptor};
use crate::user_agent;

/// HTTP client for probing resources and fetching byte ranges.
///
/// # Example
///
/// ```no_run
/// use pdownload_core::download::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let descriptor = client.probe("https://example.com/big.iso").await?;
/// println!("{} bytes, ranges: {}", descriptor.total_size, descriptor.range_supported);
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

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// - Connect timeout: 30 seconds
    /// - Per-request timeout: 5 minutes
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// The request timeout applies to each probe or segment fetch on its own,
    /// so one stalled connection cannot hold up the whole session forever.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = build_client(connect_timeout_secs, read_timeout_secs)
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Learns the size of a resource and whether it honors byte ranges.
    ///
    /// Sends a `HEAD` request; no body is transferred.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] if `url` does not parse
    /// - [`DownloadError::Network`] / [`DownloadError::Timeout`] on transport failure
    /// - [`DownloadError::HttpStatus`] on a non-success status
    /// - [`DownloadError::InvalidResponse`] if `Content-Length` is absent or not a number
    #[instrument(skip(self), fields(url = %url))]
    pub async fn probe(&self, url: &str) -> Result<ResourceDescriptor, DownloadError> {
        Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;

        let response = self.send_request(Method::HEAD, url, None).await?;
        let headers = response.headers();

        let total_size = parse_content_length(headers).ok_or_else(|| {
            DownloadError::invalid_response(url, "missing or non-numeric Content-Length")
        })?;
        let range_supported = accepts_byte_ranges(headers);

        info!(total_size, range_supported, "probe complete");

        Ok(ResourceDescriptor {
            url: url.to_string(),
            total_size,
            range_supported,
        })
    }

    /// Fetches one byte range into `dest`, returning the bytes written.
    ///
    /// With `ranged` the request carries `Range: bytes=start-end`; without it
    /// a plain `GET` is sent (the single-segment plan of a server that does
    /// not support ranges). The body is streamed to disk as it arrives.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::Network`] / [`DownloadError::Timeout`] on transport failure
    /// - [`DownloadError::HttpStatus`] on a non-success status
    /// - [`DownloadError::RangeMismatch`] if the byte count differs from `range.len()`
    /// - [`DownloadError::Io`] if the segment file cannot be written
    #[instrument(skip(self, dest, progress), fields(url = %url, index = range.index))]
    pub async fn fetch_range(
        &self,
        url: &str,
        range: &ByteRange,
        dest: &Path,
        ranged: bool,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<u64, DownloadError> {
        let range_header = ranged.then(|| range.header_value());
        let response = self
            .send_request(Method::GET, url, range_header.as_deref())
            .await?;

        if ranged && response.status() != StatusCode::PARTIAL_CONTENT {
            debug!(status = %response.status(), "server answered ranged request without 206");
        }

        let file = File::create(dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?;

        let received = stream_range_to_file(file, response, url, range, dest, progress).await?;
        if received != range.len() {
            return Err(DownloadError::range_mismatch(
                url,
                range.index,
                range.len(),
                received,
            ));
        }

        debug!(bytes = received, "segment fetched");
        Ok(received)
    }

    async fn send_request(
        &self,
        method: Method,
        url: &str,
        range_header: Option<&str>,
    ) -> Result<reqwest::Response, DownloadError> {
        let mut request = self.client.request(method, url);
        if let Some(range) = range_header {
            request = request.header(RANGE, range);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        if !response.status().is_success() {
            return Err(DownloadError::http_status(url, response.status().as_u16()));
        }

        Ok(response)
    }
}

/// Streams a response body into a segment file.
///
/// Stops as soon as the body runs past the expected range length, so a server
/// that ignores `Range` and sends the full body does not fill the disk.
async fn stream_range_to_file(
    file: File,
    response: reqwest::Response,
    url: &str,
    range: &ByteRange,
    path: &Path,
    progress: Option<&dyn ProgressSink>,
) -> Result<u64, DownloadError> {
    let expected = range.len();
    let mut writer = BufWriter::with_capacity(IO_BUFFER_BYTES, file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::from_reqwest(url, e))?;
        let chunk_len = chunk.len() as u64;

        if bytes_written + chunk_len > expected {
            return Err(DownloadError::range_mismatch(
                url,
                range.index,
                expected,
                bytes_written + chunk_len,
            ));
        }

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(path, e))?;

        bytes_written += chunk_len;
        if let Some(sink) = progress {
            sink.advance(chunk_len);
        }
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(path, e))?;

    Ok(bytes_written)
}

fn build_client(
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .user_agent(user_agent::default_download_user_agent())
        .build()
}

/// Declared body length, if present and numeric.
pub(crate) fn parse_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// True when the server advertises `Accept-Ranges: bytes`.
pub(crate) fn accepts_byte_ranges(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.split(',')
                .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"))
        })
}
