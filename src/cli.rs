//! CLI argument definitions using clap derive macros.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::Parser;
use url::Url;

use pdownload_core::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Download one file over HTTP using parallel byte-range requests.
///
/// The file is split into one range per process, fetched concurrently, and
/// reassembled in order. Servers without range support are downloaded with a
/// single request.
#[derive(Parser, Debug)]
#[command(name = "pdownload")]
#[command(author, version, about)]
pub struct Args {
    /// URL of the file to download (http or https)
    pub url: String,

    /// Directory to write the file into (defaults to the current directory)
    #[arg(short = 'd', long = "dir")]
    pub dir: Option<PathBuf>,

    /// Number of parallel range requests (1-64, defaults to the CPU count)
    #[arg(short = 'p', long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub procs: Option<u8>,

    /// Maximum retry attempts per segment for transient failures (0-10)
    #[arg(short = 'r', long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: u8,

    /// TCP connect timeout in seconds
    #[arg(long, default_value_t = CONNECT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub connect_timeout: u64,

    /// Per-request timeout in seconds (bounds one stalled segment)
    #[arg(long, default_value_t = READ_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=86400))]
    pub timeout: u64,

    /// Print the download report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Log level used when `RUST_LOG` is not set.
    /// Priority: quiet flag > verbose flag > default (info).
    #[must_use]
    pub fn default_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }
}

/// Accepts only absolute `http`/`https` URLs with a host.
pub(crate) fn validate_url(raw: &str) -> Result<Url> {
    let Ok(url) = Url::parse(raw) else {
        bail!("invalid URL '{raw}': expected an absolute http or https URL");
    };
    if !matches!(url.scheme(), "http" | "https") {
        bail!(
            "unsupported URL scheme '{}' in '{raw}': only http and https are supported",
            url.scheme()
        );
    }
    if url.host_str().is_none_or(str::is_empty) {
        bail!("invalid URL '{raw}': missing host");
    }
    Ok(url)
}

/// Resolves the target directory; it must already exist.
pub(crate) fn validate_target_dir(dir: Option<&Path>) -> Result<PathBuf> {
    let dir = dir.map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    if !dir.exists() {
        bail!("target directory does not exist: {}", dir.display());
    }
    if !dir.is_dir() {
        bail!("target path is not a directory: {}", dir.display());
    }
    Ok(dir)
}
