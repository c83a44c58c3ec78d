//! Parallel ranged download pipeline.
//!
//! A session runs four stages in order:
//!
//! 1. **Probe** ([`HttpClient::probe`]): `HEAD` the URL for its size and
//!    `Accept-Ranges` support.
//! 2. **Plan** ([`plan_ranges`]): split the size into contiguous inclusive
//!    byte ranges, one per worker, or a single range without range support.
//! 3. **Fetch** ([`Coordinator::run_all`]): fetch every range concurrently
//!    into its own temporary segment file, bounded by the worker count.
//! 4. **Merge** ([`merge_segments`]): concatenate segments in range order into
//!    the destination, which is created exclusively.
//!
//! [`Downloader`] drives the whole pipeline. Any failure removes all segment
//! storage and any partial destination.
//!
//! # Example
//!
//! ```no_run
//! use pdownload_core::download::{Downloader, DownloaderConfig};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DownloaderConfig {
//!     worker_count: 8,
//!     ..DownloaderConfig::default()
//! };
//! let report = Downloader::new(config)?
//!     .run("https://example.com/big.iso", Path::new("."))
//!     .await?;
//! println!("Downloaded: {}", report.path.display());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod coordinator;
mod error;
mod fetcher;
mod filename;
mod merge;
mod planner;
mod retry;
mod session;
mod storage;
mod types;

pub use client::HttpClient;
pub use coordinator::{Coordinator, CoordinatorStats};
pub use error::{AggregateDownloadError, DownloadError, SessionError};
pub use fetcher::{HttpSegmentFetcher, ProgressSink, RetryingFetcher, SegmentFetcher, SegmentJob};
pub use filename::filename_from_url;
pub use merge::merge_segments;
pub use planner::plan_ranges;
pub use retry::{DEFAULT_MAX_ATTEMPTS, FailureType, RetryDecision, RetryPolicy, classify_error};
pub use session::{DownloadReport, Downloader, DownloaderConfig};
pub use storage::SegmentStore;
pub use types::{ByteRange, DownloadSession, ResourceDescriptor, Segment, SegmentStatus};

// Note: no module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
