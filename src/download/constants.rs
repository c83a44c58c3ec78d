//! Constants for the download module (timeouts, worker limits, buffers).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default per-request timeout (5 minutes), bounding one stalled segment.
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Minimum allowed worker count.
pub const MIN_WORKERS: usize = 1;

/// Maximum allowed worker count.
pub const MAX_WORKERS: usize = 64;

/// Buffer size for segment writes and merge copies (64 KiB).
pub const IO_BUFFER_BYTES: usize = 64 * 1024;

/// Prefix of the per-session temporary segment directory.
pub const SEGMENT_DIR_PREFIX: &str = ".pdownload-";

/// Worker count used when the host parallelism is unknown.
const FALLBACK_WORKERS: usize = 4;

/// Default worker count: host parallelism, clamped to the accepted range.
#[must_use]
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map_or(FALLBACK_WORKERS, std::num::NonZeroUsize::get)
        .clamp(MIN_WORKERS, MAX_WORKERS)
}
