//! Temporary segment storage.
//!
//! Each session gets a hidden directory next to its destination file, so the
//! merge never crosses filesystems. The directory is a [`TempDir`]: explicit
//! release reports errors, and dropping it removes whatever is left.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use super::constants::SEGMENT_DIR_PREFIX;
use super::error::DownloadError;
use super::types::Segment;

/// Directory holding one session's segment files.
#[derive(Debug)]
pub struct SegmentStore {
    dir: TempDir,
}

impl SegmentStore {
    /// Creates a fresh segment directory inside `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the directory cannot be created.
    pub fn create_in(parent: &Path) -> Result<Self, DownloadError> {
        let dir = tempfile::Builder::new()
            .prefix(SEGMENT_DIR_PREFIX)
            .tempdir_in(parent)
            .map_err(|e| DownloadError::io(parent, e))?;
        debug!(dir = %dir.path().display(), "created segment directory");
        Ok(Self { dir })
    }

    /// Path of the segment directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Storage path for the segment with the given index.
    #[must_use]
    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.dir.path().join(format!("segment-{index:05}.part"))
    }

    /// Removes every segment file, then the directory itself.
    ///
    /// Segments that were never written are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] for the first file or directory that
    /// cannot be removed.
    pub async fn release(self, segments: &[Segment]) -> Result<(), DownloadError> {
        for segment in segments {
            match tokio::fs::remove_file(segment.path()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(DownloadError::io(segment.path(), e)),
            }
        }
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| DownloadError::io(&path, e))?;
        debug!(dir = %path.display(), "released segment directory");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::types::ByteRange;

    #[tokio::test]
    async fn test_store_lives_inside_parent() {
        let parent = tempfile::TempDir::new().unwrap();
        let store = SegmentStore::create_in(parent.path()).unwrap();

        assert!(store.path().starts_with(parent.path()));
        assert!(
            store
                .path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(SEGMENT_DIR_PREFIX)
        );
        assert_eq!(
            store.segment_path(3).file_name().unwrap(),
            "segment-00003.part"
        );
    }

    #[tokio::test]
    async fn test_release_removes_files_and_directory() {
        let parent = tempfile::TempDir::new().unwrap();
        let store = SegmentStore::create_in(parent.path()).unwrap();
        let dir = store.path().to_path_buf();

        let written = Segment::new(
            ByteRange {
                index: 0,
                start: 0,
                end: 3,
            },
            store.segment_path(0),
        );
        let never_written = Segment::new(
            ByteRange {
                index: 1,
                start: 4,
                end: 7,
            },
            store.segment_path(1),
        );
        std::fs::write(written.path(), b"abcd").unwrap();

        store.release(&[written, never_written]).await.unwrap();

        assert!(!dir.exists());
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_create_in_missing_parent_fails() {
        let parent = tempfile::TempDir::new().unwrap();
        let missing = parent.path().join("nope");
        let result = SegmentStore::create_in(&missing);
        assert!(matches!(result, Err(DownloadError::Io { .. })));
    }
}
