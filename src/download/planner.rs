//! Byte-range planning.
//!
//! Splits `[0, total_size)` into contiguous inclusive ranges, one per worker.
//! Sizes differ by at most one byte: with `base = total / workers`, the first
//! `total % workers` ranges get `base + 1` bytes.

use tracing::{debug, instrument};

use super::types::ByteRange;

/// Plans the byte ranges for a resource.
///
/// - `total_size == 0` yields no ranges.
/// - Without range support, or with a single worker, yields one range
///   covering the whole resource.
/// - More workers than bytes yields one single-byte range per byte.
///
/// The result is ordered by `index` and depends only on the inputs.
#[must_use]
#[instrument(level = "debug")]
pub fn plan_ranges(total_size: u64, worker_count: usize, range_supported: bool) -> Vec<ByteRange> {
    if total_size == 0 {
        return Vec::new();
    }

    let workers = if range_supported {
        u64::try_from(worker_count.max(1))
            .unwrap_or(u64::MAX)
            .min(total_size)
    } else {
        1
    };

    let base = total_size / workers;
    let remainder = total_size % workers;

    let mut ranges = Vec::with_capacity(usize::try_from(workers).unwrap_or_default());
    let mut start = 0u64;
    for i in 0..workers {
        let len = if i < remainder { base + 1 } else { base };
        let end = start + len - 1;
        ranges.push(ByteRange {
            index: usize::try_from(i).unwrap_or(usize::MAX),
            start,
            end,
        });
        start = end + 1;
    }

    debug!(ranges = ranges.len(), base, remainder, "planned ranges");
    ranges
}
