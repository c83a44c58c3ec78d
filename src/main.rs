//! CLI entry point for the parallel downloader.

use std::io::{self, IsTerminal};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use pdownload_core::download::constants::default_worker_count;
use pdownload_core::download::{Downloader, DownloaderConfig, RetryPolicy};
use tracing::{debug, error, info};

mod cli;
mod progress;

use cli::Args;
use progress::ByteProgress;

/// Process outcome, mapped to the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessExit {
    /// File written.
    Success,
    /// The download session failed.
    Failure,
    /// Bad arguments; nothing was attempted.
    Usage,
}

impl ProcessExit {
    fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Usage => 2,
        }
    }
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        Self::from(exit.code())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    init_tracing(args.default_log_level());
    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            eprintln!("error: {e:#}");
            ProcessExit::Failure.into()
        }
    }
}

/// Priority: `RUST_LOG` env var > quiet flag > verbose flag > default (info).
fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn run(args: Args) -> Result<ProcessExit> {
    let url = match cli::validate_url(&args.url) {
        Ok(url) => url,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(ProcessExit::Usage);
        }
    };
    let target_dir = match cli::validate_target_dir(args.dir.as_deref()) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(ProcessExit::Usage);
        }
    };

    let config = DownloaderConfig {
        worker_count: args.procs.map_or_else(default_worker_count, usize::from),
        // -r counts retries; the policy counts attempts.
        retry_policy: RetryPolicy::with_max_attempts(u32::from(args.max_retries) + 1),
        connect_timeout_secs: args.connect_timeout,
        read_timeout_secs: args.timeout,
    };
    let mut downloader = Downloader::new(config)?;

    let show_progress = !args.no_progress && !args.quiet && io::stderr().is_terminal();
    let progress = show_progress.then(|| Arc::new(ByteProgress::new()));
    if let Some(progress) = &progress {
        downloader = downloader.with_progress(progress.clone());
    }

    info!(
        url = %url,
        dir = %target_dir.display(),
        workers = downloader.config().worker_count,
        "pdownload starting"
    );
    let result = downloader.run(url.as_str(), &target_dir).await;

    if let Some(progress) = &progress {
        progress.finish();
    }

    match result {
        Ok(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if !args.quiet {
                println!("{}", report.path.display());
            }
            Ok(ProcessExit::Success)
        }
        Err(e) => {
            error!(stage = e.stage(), error = %e, "download failed");
            eprintln!("error: {e}");
            Ok(ProcessExit::Failure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_exit_codes() {
        assert_eq!(ProcessExit::Success.code(), 0);
        assert_eq!(ProcessExit::Failure.code(), 1);
        assert_eq!(ProcessExit::Usage.code(), 2);
    }
}
