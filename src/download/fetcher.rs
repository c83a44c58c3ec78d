//! Segment fetching seam.
//!
//! The coordinator talks to a [`SegmentFetcher`] trait object so retry
//! behavior (and test doubles) can wrap the HTTP implementation without the
//! coordinator knowing.
//!
//! # Object Safety
//!
//! This trait uses `async_trait` to support dynamic dispatch via
//! `Arc<dyn SegmentFetcher>`. Rust 2024 native async traits are not
//! object-safe.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::client::HttpClient;
use super::error::DownloadError;
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use super::types::ByteRange;

/// Receives byte counts as segment data lands on disk.
pub trait ProgressSink: Send + Sync {
    /// Called once per session, after the probe, with the resource size.
    fn start(&self, _total_bytes: u64) {}

    /// Called after `bytes` more bytes were written.
    fn advance(&self, bytes: u64);
}

/// Everything a fetcher needs to materialize one segment.
#[derive(Debug, Clone, Copy)]
pub struct SegmentJob<'a> {
    /// Resource URL.
    pub url: &'a str,
    /// Range to fetch.
    pub range: ByteRange,
    /// Segment file to write.
    pub path: &'a Path,
    /// Whether to send a `Range` header.
    pub ranged: bool,
}

/// Fills one segment's storage with exactly `job.range.len()` bytes.
#[async_trait]
pub trait SegmentFetcher: Send + Sync {
    /// Fetches the segment, returning the number of bytes written.
    async fn fetch(&self, job: SegmentJob<'_>) -> Result<u64, DownloadError>;
}

/// [`SegmentFetcher`] backed by [`HttpClient::fetch_range`].
#[derive(Clone)]
pub struct HttpSegmentFetcher {
    client: HttpClient,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl HttpSegmentFetcher {
    /// Creates a fetcher without progress reporting.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            progress: None,
        }
    }

    /// Reports written bytes to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl std::fmt::Debug for HttpSegmentFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSegmentFetcher")
            .field("client", &self.client)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

#[async_trait]
impl SegmentFetcher for HttpSegmentFetcher {
    async fn fetch(&self, job: SegmentJob<'_>) -> Result<u64, DownloadError> {
        self.client
            .fetch_range(
                job.url,
                &job.range,
                job.path,
                job.ranged,
                self.progress.as_deref(),
            )
            .await
    }
}

/// Retries transient failures of an inner fetcher according to a [`RetryPolicy`].
///
/// Each attempt rewrites the segment file from scratch.
#[derive(Debug)]
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
    retried: AtomicUsize,
}

impl<F> RetryingFetcher<F> {
    /// Wraps `inner` with `policy`.
    #[must_use]
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            retried: AtomicUsize::new(0),
        }
    }

    /// Number of retry attempts made so far, across all segments.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F: SegmentFetcher> SegmentFetcher for RetryingFetcher<F> {
    #[instrument(skip(self, job), fields(index = job.range.index))]
    async fn fetch(&self, job: SegmentJob<'_>) -> Result<u64, DownloadError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.inner.fetch(job).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => match self.policy.should_retry(classify_error(&e), attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next_attempt,
                    } => {
                        info!(
                            index = job.range.index,
                            attempt = next_attempt,
                            max_attempts = self.policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            error = %e,
                            "retrying segment"
                        );
                        self.retried.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(index = job.range.index, %reason, "not retrying segment");
                        return Err(e);
                    }
                },
            }
        }
    }
}
