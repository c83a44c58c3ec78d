//! Value types passed between pipeline stages.
//!
//! The prober produces a [`ResourceDescriptor`], the planner turns it into
//! [`ByteRange`]s, and the session wraps each range in a [`Segment`] that is
//! owned by exactly one worker while it is being fetched.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::error::DownloadError;
use super::storage::SegmentStore;

/// What the capability probe learned about a remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceDescriptor {
    /// The probed URL.
    pub url: String,
    /// Declared content length in bytes.
    pub total_size: u64,
    /// Whether the server advertises `Accept-Ranges: bytes`.
    pub range_supported: bool,
}

/// An inclusive slice `[start, end]` of the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    /// Position of this range in the plan.
    pub index: usize,
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered by the range.
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the HTTP `Range` request header.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}, {}]", self.index, self.start, self.end)
    }
}

/// Lifecycle of a segment. Only the worker holding the segment moves it
/// forward.
#[derive(Debug, Default)]
pub enum SegmentStatus {
    /// Planned, not dispatched.
    #[default]
    Pending,
    /// A worker is fetching it.
    InFlight,
    /// All bytes of the range are in storage.
    Complete,
    /// The fetch failed permanently.
    Failed(DownloadError),
}

impl SegmentStatus {
    /// Returns true once the segment reached `Complete` or `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_))
    }
}

/// One planned range together with its temporary storage.
#[derive(Debug)]
pub struct Segment {
    /// The byte range this segment materializes.
    pub range: ByteRange,
    path: PathBuf,
    status: SegmentStatus,
}

impl Segment {
    /// Creates a pending segment stored at `path`.
    #[must_use]
    pub fn new(range: ByteRange, path: PathBuf) -> Self {
        Self {
            range,
            path,
            status: SegmentStatus::Pending,
        }
    }

    /// Location of the segment's temporary bytes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> &SegmentStatus {
        &self.status
    }

    /// Returns true if the segment completed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self.status, SegmentStatus::Complete)
    }

    pub(crate) fn mark_in_flight(&mut self) {
        self.status = SegmentStatus::InFlight;
    }

    pub(crate) fn mark_complete(&mut self) {
        self.status = SegmentStatus::Complete;
    }

    pub(crate) fn mark_failed(&mut self, error: DownloadError) {
        self.status = SegmentStatus::Failed(error);
    }

    /// Consumes the segment, returning its failure if it has one.
    pub(crate) fn into_failure(self) -> Option<DownloadError> {
        match self.status {
            SegmentStatus::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// All state of one download run.
///
/// The session owns its segments and the directory holding them. It is
/// consumed by the coordinator on failure and by the merge engine on success,
/// so storage is released exactly once.
#[derive(Debug)]
pub struct DownloadSession {
    /// What the probe learned.
    pub descriptor: ResourceDescriptor,
    /// Segments ordered by `range.index`.
    pub segments: Vec<Segment>,
    /// Final output path.
    pub target_path: PathBuf,
    /// Concurrency limit for the coordinator.
    pub worker_count: usize,
    store: SegmentStore,
}

impl DownloadSession {
    /// Assembles a session, allocating one segment per planned range.
    #[must_use]
    pub fn new(
        descriptor: ResourceDescriptor,
        ranges: Vec<ByteRange>,
        target_path: PathBuf,
        worker_count: usize,
        store: SegmentStore,
    ) -> Self {
        let segments = ranges
            .into_iter()
            .map(|range| Segment::new(range, store.segment_path(range.index)))
            .collect();
        Self {
            descriptor,
            segments,
            target_path,
            worker_count: worker_count.max(1),
            store,
        }
    }

    /// Whether segment requests carry a `Range` header.
    #[must_use]
    pub fn ranged(&self) -> bool {
        self.descriptor.range_supported
    }

    /// Number of segments not yet `Complete`.
    #[must_use]
    pub fn incomplete_count(&self) -> usize {
        self.segments.iter().filter(|s| !s.is_complete()).count()
    }

    /// Directory holding the segment files.
    #[must_use]
    pub fn storage_dir(&self) -> &Path {
        self.store.path()
    }

    /// Deletes every segment file and the segment directory.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if a file or the directory cannot be removed.
    pub async fn release_storage(self) -> Result<(), DownloadError> {
        self.store.release(&self.segments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_len_is_inclusive() {
        let range = ByteRange {
            index: 0,
            start: 0,
            end: 33,
        };
        assert_eq!(range.len(), 34);

        let single = ByteRange {
            index: 1,
            start: 7,
            end: 7,
        };
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_byte_range_header_value() {
        let range = ByteRange {
            index: 2,
            start: 67,
            end: 99,
        };
        assert_eq!(range.header_value(), "bytes=67-99");
        assert_eq!(range.to_string(), "#2 [67, 99]");
    }

    #[test]
    fn test_segment_status_transitions() {
        let range = ByteRange {
            index: 0,
            start: 0,
            end: 9,
        };
        let mut segment = Segment::new(range, PathBuf::from("/tmp/seg"));
        assert!(matches!(segment.status(), SegmentStatus::Pending));
        assert!(!segment.status().is_terminal());

        segment.mark_in_flight();
        assert!(matches!(segment.status(), SegmentStatus::InFlight));

        segment.mark_failed(DownloadError::timeout("https://example.com"));
        assert!(segment.status().is_terminal());
        assert!(matches!(
            segment.into_failure(),
            Some(DownloadError::Timeout { .. })
        ));
    }

    #[test]
    fn test_complete_segment_has_no_failure() {
        let range = ByteRange {
            index: 0,
            start: 0,
            end: 0,
        };
        let mut segment = Segment::new(range, PathBuf::from("/tmp/seg"));
        segment.mark_complete();
        assert!(segment.is_complete());
        assert!(segment.into_failure().is_none());
    }
}
