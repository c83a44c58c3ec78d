//! Error types for the download module.
//!
//! Errors are layered the same way the pipeline is: [`DownloadError`] covers a
//! single probe, segment fetch, or merge step; [`AggregateDownloadError`] is
//! what the coordinator surfaces once every dispatched segment has settled;
//! [`SessionError`] tags a failure with the pipeline stage it came from.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while probing, fetching, or merging.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The server response lacks metadata required to plan ranges.
    #[error("invalid response from {url}: {reason}")]
    InvalidResponse {
        /// The probed URL.
        url: String,
        /// What was missing or malformed.
        reason: String,
    },

    /// Received byte count disagrees with the requested range.
    #[error(
        "range mismatch for segment {index} of {url}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    RangeMismatch {
        /// The URL being fetched.
        url: String,
        /// Segment index.
        index: usize,
        /// Length of the requested range.
        expected_bytes: u64,
        /// Bytes actually received (may stop early once the range is exceeded).
        actual_bytes: u64,
    },

    /// File system error (create, write, delete).
    #[error("IO error on {}: {source}", path.display())]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Merge was asked to run while some segments had not completed.
    #[error("cannot merge: {pending} segment(s) not complete")]
    IncompleteSegments {
        /// Number of segments not in the `Complete` state.
        pending: usize,
    },

    /// A segment worker task panicked or was aborted.
    #[error("segment {index} worker terminated abnormally: {message}")]
    WorkerPanic {
        /// Segment index the worker was executing.
        index: usize,
        /// Join error description.
        message: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a network or timeout error depending on the reqwest error kind.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a range mismatch error.
    pub fn range_mismatch(
        url: impl Into<String>,
        index: usize,
        expected_bytes: u64,
        actual_bytes: u64,
    ) -> Self {
        Self::RangeMismatch {
            url: url.into(),
            index,
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path the source error doesn't carry.

/// Session-level failure reported by the coordinator once all in-flight
/// segments have settled and at least one of them failed.
#[derive(Debug, Error)]
#[error("{failed} segment(s) failed; first failure in segment {index}: {source}")]
pub struct AggregateDownloadError {
    /// Index of the first segment observed to fail.
    pub index: usize,
    /// Total number of failed segments.
    pub failed: usize,
    /// The first observed segment failure.
    #[source]
    pub source: DownloadError,
}

/// Terminal error of one download session, tagged with the failing stage.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Worker count outside the accepted range.
    #[error("invalid worker count {value}: must be between {min} and {max}")]
    InvalidWorkerCount {
        /// The rejected value.
        value: usize,
        /// Minimum accepted.
        min: usize,
        /// Maximum accepted.
        max: usize,
    },

    /// The capability probe failed.
    #[error("probe failed: {0}")]
    Probe(#[source] DownloadError),

    /// Temporary segment storage could not be prepared.
    #[error("storage failed: {0}")]
    Storage(#[source] DownloadError),

    /// One or more segment fetches failed.
    #[error("fetch failed: {0}")]
    Fetch(#[from] AggregateDownloadError),

    /// Reassembly of the output file failed.
    #[error("merge failed: {0}")]
    Merge(#[source] DownloadError),
}

impl SessionError {
    /// Short name of the pipeline stage that failed.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidWorkerCount { .. } => "config",
            Self::Probe(_) => "probe",
            Self::Storage(_) => "storage",
            Self::Fetch(_) => "fetch",
            Self::Merge(_) => "merge",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_timeout_display() {
        let error = DownloadError::timeout("https://example.com/file.iso");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/file.iso"));
    }

    #[test]
    fn test_download_error_http_status_display() {
        let error = DownloadError::http_status("https://example.com/file.iso", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(
            msg.contains("https://example.com/file.iso"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_download_error_invalid_response_display() {
        let error =
            DownloadError::invalid_response("https://example.com/a", "missing Content-Length");
        let msg = error.to_string();
        assert!(msg.contains("invalid response"), "got: {msg}");
        assert!(msg.contains("missing Content-Length"), "got: {msg}");
    }

    #[test]
    fn test_download_error_range_mismatch_display() {
        let error = DownloadError::range_mismatch("https://example.com/a", 2, 34, 100);
        let msg = error.to_string();
        assert!(msg.contains("segment 2"), "got: {msg}");
        assert!(msg.contains("expected 34"), "got: {msg}");
        assert!(msg.contains("got 100"), "got: {msg}");
    }

    #[test]
    fn test_download_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/out.bin"), io_error);
        assert!(error.to_string().contains("/tmp/out.bin"));
    }

    #[test]
    fn test_aggregate_error_names_first_failure() {
        let error = AggregateDownloadError {
            index: 1,
            failed: 2,
            source: DownloadError::http_status("https://example.com/a", 503),
        };
        let msg = error.to_string();
        assert!(msg.starts_with("2 segment(s) failed"), "got: {msg}");
        assert!(msg.contains("segment 1"), "got: {msg}");
        assert!(msg.contains("503"), "got: {msg}");
    }

    #[test]
    fn test_session_error_stage_names() {
        let probe = SessionError::Probe(DownloadError::invalid_response("u", "r"));
        assert_eq!(probe.stage(), "probe");
        assert!(probe.to_string().starts_with("probe failed"));

        let fetch = SessionError::from(AggregateDownloadError {
            index: 0,
            failed: 1,
            source: DownloadError::timeout("u"),
        });
        assert_eq!(fetch.stage(), "fetch");

        let merge = SessionError::Merge(DownloadError::IncompleteSegments { pending: 1 });
        assert_eq!(merge.stage(), "merge");
        assert!(merge.to_string().starts_with("merge failed"));
    }
}
