//! Session orchestration: probe, plan, fetch, merge.
//!
//! [`Downloader::run`] drives the stages strictly in order. A stage never
//! starts before its predecessor succeeded, and the first failing stage ends
//! the session with a [`SessionError`] naming it.
//!
//! # Example
//!
//! ```no_run
//! use pdownload_core::download::{Downloader, DownloaderConfig};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::new(DownloaderConfig::default())?;
//! let report = downloader
//!     .run("https://example.com/big.iso", Path::new("./downloads"))
//!     .await?;
//! println!("{} bytes in {} segments", report.total_bytes, report.segments);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument};
use url::Url;

use super::client::HttpClient;
use super::constants::{
    CONNECT_TIMEOUT_SECS, MAX_WORKERS, MIN_WORKERS, READ_TIMEOUT_SECS, default_worker_count,
};
use super::coordinator::Coordinator;
use super::error::{DownloadError, SessionError};
use super::fetcher::{HttpSegmentFetcher, ProgressSink, RetryingFetcher};
use super::filename::{filename_from_url, resolve_unique_path};
use super::merge::merge_segments;
use super::planner::plan_ranges;
use super::retry::RetryPolicy;
use super::storage::SegmentStore;
use super::types::DownloadSession;

/// Tunables for a [`Downloader`].
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Number of byte ranges and the concurrency limit (1-64).
    pub worker_count: usize,
    /// Per-segment retry behavior. The default makes a single attempt.
    pub retry_policy: RetryPolicy,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Per-request timeout in seconds.
    pub read_timeout_secs: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            retry_policy: RetryPolicy::default(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

impl DownloaderConfig {
    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidWorkerCount`] if `worker_count` is
    /// outside 1-64.
    pub fn validate(&self) -> Result<(), SessionError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.worker_count) {
            return Err(SessionError::InvalidWorkerCount {
                value: self.worker_count,
                min: MIN_WORKERS,
                max: MAX_WORKERS,
            });
        }
        Ok(())
    }
}

/// Summary of a successful download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    /// Downloaded URL.
    pub url: String,
    /// Path of the written file.
    pub path: PathBuf,
    /// Bytes in the written file.
    pub total_bytes: u64,
    /// Number of segments fetched.
    pub segments: usize,
    /// Whether segments were fetched with `Range` requests.
    pub ranged: bool,
    /// Concurrency limit used.
    pub workers: usize,
    /// Retry attempts across all segments.
    pub retries: usize,
    /// Wall-clock duration of the session.
    pub elapsed_ms: u64,
}

/// Downloads one URL per [`run`](Self::run) call using parallel byte ranges.
pub struct Downloader {
    config: DownloaderConfig,
    client: HttpClient,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}

impl Downloader {
    /// Creates a downloader, building its HTTP client from the configured
    /// timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidWorkerCount`] if the configuration is
    /// out of range.
    pub fn new(config: DownloaderConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let client =
            HttpClient::new_with_timeouts(config.connect_timeout_secs, config.read_timeout_secs);
        Ok(Self {
            config,
            client,
            progress: None,
        })
    }

    /// Reports progress of every subsequent run to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Downloads `url` into `target_dir`.
    ///
    /// The file name comes from the URL's last path segment; an existing file
    /// is never overwritten (a numeric suffix is chosen instead). Segment
    /// files live in a hidden directory inside `target_dir` for the duration
    /// of the run.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Probe`] if the URL is invalid or the probe fails
    /// - [`SessionError::Storage`] if segment storage cannot be created
    /// - [`SessionError::Fetch`] if any segment fails
    /// - [`SessionError::Merge`] if reassembly fails
    ///
    /// On every error path no destination file and no segment storage remain.
    #[instrument(skip(self, target_dir), fields(url = %url, dir = %target_dir.display()))]
    pub async fn run(&self, url: &str, target_dir: &Path) -> Result<DownloadReport, SessionError> {
        let started = Instant::now();

        let parsed = Url::parse(url)
            .map_err(|_| SessionError::Probe(DownloadError::invalid_url(url)))?;
        let descriptor = self.client.probe(url).await.map_err(SessionError::Probe)?;

        let target_path = resolve_unique_path(target_dir, &filename_from_url(&parsed));
        let ranges = plan_ranges(
            descriptor.total_size,
            self.config.worker_count,
            descriptor.range_supported,
        );
        debug!(
            path = %target_path.display(),
            ranges = ranges.len(),
            "session planned"
        );

        let store = SegmentStore::create_in(target_dir).map_err(SessionError::Storage)?;
        let session = DownloadSession::new(
            descriptor,
            ranges,
            target_path,
            self.config.worker_count,
            store,
        );
        let ranged = session.ranged();
        let segment_count = session.segments.len();

        if let Some(progress) = &self.progress {
            progress.start(session.descriptor.total_size);
        }

        let mut http = HttpSegmentFetcher::new(self.client.clone());
        if let Some(progress) = &self.progress {
            http = http.with_progress(Arc::clone(progress));
        }
        let fetcher = Arc::new(RetryingFetcher::new(
            http,
            self.config.retry_policy.clone(),
        ));
        let coordinator = Coordinator::new(fetcher.clone());

        let (session, stats) = coordinator.run_all(session).await?;
        let path = session.target_path.clone();
        let total_bytes = merge_segments(session)
            .await
            .map_err(SessionError::Merge)?;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            path = %path.display(),
            bytes = total_bytes,
            segments = stats.completed,
            elapsed_ms,
            "download complete"
        );

        Ok(DownloadReport {
            url: url.to_string(),
            path,
            total_bytes,
            segments: segment_count,
            ranged,
            workers: self.config.worker_count,
            retries: fetcher.retried(),
            elapsed_ms,
        })
    }
}
