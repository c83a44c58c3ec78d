//! Parallel ranged downloader library.
//!
//! Downloads a single HTTP resource by splitting it into byte ranges, fetching
//! the ranges concurrently into temporary segments, and reassembling them in
//! order. Servers without range support fall back to one sequential request.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Probe, range planning, concurrent segment fetch, and merge
//! - [`imageconv`] - Batch image format conversion over a directory tree

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod imageconv;
mod user_agent;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use download::{
    DownloadError, DownloadReport, Downloader, DownloaderConfig, HttpClient, RetryPolicy,
    SessionError,
};
