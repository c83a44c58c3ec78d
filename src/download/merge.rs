//! Merge engine: concatenates completed segments into the destination file.
//!
//! The destination either ends up complete or does not exist. Segment
//! storage is removed on both paths.

use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::constants::IO_BUFFER_BYTES;
use super::error::DownloadError;
use super::types::DownloadSession;

/// Writes `session.target_path` as the concatenation of all segments in
/// ascending `range.index` order, then releases segment storage.
///
/// The destination is opened with exclusive creation: an existing file is
/// never overwritten. Segments are streamed one at a time, so memory use does
/// not depend on the resource size.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// - [`DownloadError::IncompleteSegments`] if any segment is not `Complete`
/// - [`DownloadError::Io`] on any create, read, write, or sync failure
///   (including `AlreadyExists` for the destination)
/// - [`DownloadError::RangeMismatch`] if the written total differs from the
///   probed size
///
/// On error the partially written destination and all segment storage are
/// deleted; a pre-existing destination is left untouched.
#[instrument(skip(session), fields(path = %session.target_path.display(), segments = session.segments.len()))]
pub async fn merge_segments(mut session: DownloadSession) -> Result<u64, DownloadError> {
    let pending = session.incomplete_count();
    if pending > 0 {
        release_after_failure(session, false).await;
        return Err(DownloadError::IncompleteSegments { pending });
    }

    session.segments.sort_by_key(|segment| segment.range.index);

    let target = session.target_path.clone();
    let file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
        .await
    {
        Ok(file) => file,
        Err(e) => {
            release_after_failure(session, false).await;
            return Err(DownloadError::io(target, e));
        }
    };

    let result = concatenate(&session, file).await;
    match result {
        Ok(written) => {
            session.release_storage().await?;
            info!(bytes = written, path = %target.display(), "merge complete");
            Ok(written)
        }
        Err(e) => {
            warn!(error = %e, path = %target.display(), "merge failed; removing partial output");
            release_after_failure(session, true).await;
            Err(e)
        }
    }
}

async fn concatenate(session: &DownloadSession, file: File) -> Result<u64, DownloadError> {
    let target = &session.target_path;
    let mut writer = BufWriter::with_capacity(IO_BUFFER_BYTES, file);
    let mut written: u64 = 0;

    for segment in &session.segments {
        let copied = append_segment(&mut writer, segment.path(), target).await?;
        if copied != segment.range.len() {
            return Err(DownloadError::range_mismatch(
                &session.descriptor.url,
                segment.range.index,
                segment.range.len(),
                copied,
            ));
        }
        debug!(index = segment.range.index, bytes = copied, "appended segment");
        written += copied;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(target, e))?;
    writer
        .get_ref()
        .sync_all()
        .await
        .map_err(|e| DownloadError::io(target, e))?;

    if written != session.descriptor.total_size {
        return Err(DownloadError::range_mismatch(
            &session.descriptor.url,
            session.segments.len(),
            session.descriptor.total_size,
            written,
        ));
    }

    Ok(written)
}

async fn append_segment(
    writer: &mut BufWriter<File>,
    segment_path: &Path,
    target: &Path,
) -> Result<u64, DownloadError> {
    let segment_file = File::open(segment_path)
        .await
        .map_err(|e| DownloadError::io(segment_path, e))?;
    let mut reader = BufReader::with_capacity(IO_BUFFER_BYTES, segment_file);

    tokio::io::copy_buf(&mut reader, writer)
        .await
        .map_err(|e| DownloadError::io(target, e))
}

/// Cleanup for every failing merge path. Errors are logged, never returned,
/// so the original failure reaches the caller.
async fn release_after_failure(session: DownloadSession, remove_target: bool) {
    if remove_target {
        match tokio::fs::remove_file(&session.target_path).await {
            Ok(()) => debug!(path = %session.target_path.display(), "removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %session.target_path.display(), error = %e, "failed to remove partial output");
            }
        }
    }
    if let Err(e) = session.release_storage().await {
        warn!(error = %e, "failed to remove segment storage");
    }
}
