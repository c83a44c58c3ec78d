//! Download coordinator: bounded fan-out of segment fetches and fan-in of
//! their results.
//!
//! # Concurrency Model
//!
//! - Each segment is fetched in its own Tokio task on a [`JoinSet`]
//! - At most `worker_count` tasks are in flight at once
//! - A segment is moved into its task and handed back when the task ends, so
//!   only the executing worker ever changes its status
//! - After the first failure no new segment is dispatched, but in-flight
//!   tasks are never cancelled; the coordinator waits for all of them
//! - On failure the session's segment storage is deleted before returning

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::{Id, JoinSet};
use tracing::{debug, info, instrument, warn};

use super::error::{AggregateDownloadError, DownloadError};
use super::fetcher::{SegmentFetcher, SegmentJob};
use super::types::{ByteRange, DownloadSession, Segment, SegmentStatus};

/// Counters from one [`Coordinator::run_all`] invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Segments handed to a worker.
    pub dispatched: usize,
    /// Segments that completed.
    pub completed: usize,
    /// Bytes held by completed segments.
    pub bytes: u64,
}

/// Runs every segment of a session through a [`SegmentFetcher`].
#[derive(Clone)]
pub struct Coordinator {
    fetcher: Arc<dyn SegmentFetcher>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator").finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Creates a coordinator dispatching through `fetcher`.
    #[must_use]
    pub fn new(fetcher: Arc<dyn SegmentFetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetches all segments of `session`, at most `session.worker_count` at a time.
    ///
    /// Returns the session with every segment `Complete`, ready to merge.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateDownloadError`] naming the first observed segment
    /// failure once every in-flight fetch has settled. By then the session's
    /// temporary storage has been deleted.
    #[instrument(
        skip(self, session),
        fields(segments = session.segments.len(), workers = session.worker_count)
    )]
    pub async fn run_all(
        &self,
        mut session: DownloadSession,
    ) -> Result<(DownloadSession, CoordinatorStats), AggregateDownloadError> {
        let url: Arc<str> = Arc::from(session.descriptor.url.as_str());
        let ranged = session.ranged();
        let limit = session.worker_count.max(1);

        let mut pending: VecDeque<Segment> = std::mem::take(&mut session.segments).into();
        let mut settled: Vec<Segment> = Vec::with_capacity(pending.len());
        let mut tasks: JoinSet<Segment> = JoinSet::new();
        let mut in_flight: HashMap<Id, (ByteRange, PathBuf)> = HashMap::new();

        let mut stats = CoordinatorStats::default();
        let mut failed = 0usize;
        let mut first_failure: Option<usize> = None;

        info!(segments = pending.len(), limit, ranged, "dispatching segments");

        loop {
            while first_failure.is_none() && tasks.len() < limit {
                let Some(segment) = pending.pop_front() else {
                    break;
                };
                let meta = (segment.range, segment.path().to_path_buf());
                let handle = tasks.spawn(fetch_segment(
                    Arc::clone(&self.fetcher),
                    Arc::clone(&url),
                    segment,
                    ranged,
                ));
                in_flight.insert(handle.id(), meta);
                stats.dispatched += 1;
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };

            let segment = match joined {
                Ok((id, segment)) => {
                    in_flight.remove(&id);
                    segment
                }
                Err(join_error) => {
                    let Some((range, path)) = in_flight.remove(&join_error.id()) else {
                        warn!(error = %join_error, "unknown segment task terminated");
                        continue;
                    };
                    warn!(index = range.index, error = %join_error, "segment task panicked");
                    let mut segment = Segment::new(range, path);
                    segment.mark_failed(DownloadError::WorkerPanic {
                        index: range.index,
                        message: join_error.to_string(),
                    });
                    segment
                }
            };

            match segment.status() {
                SegmentStatus::Complete => {
                    stats.completed += 1;
                    stats.bytes += segment.range.len();
                }
                SegmentStatus::Failed(error) => {
                    failed += 1;
                    if first_failure.is_none() {
                        warn!(
                            index = segment.range.index,
                            error = %error,
                            in_flight = tasks.len(),
                            "segment failed; no further segments will be dispatched"
                        );
                        first_failure = Some(segment.range.index);
                    }
                }
                SegmentStatus::Pending | SegmentStatus::InFlight => {
                    warn!(index = segment.range.index, "worker returned unsettled segment");
                }
            }
            settled.push(segment);
        }

        settled.extend(pending);
        settled.sort_by_key(|segment| segment.range.index);
        session.segments = settled;

        let Some(index) = first_failure else {
            info!(
                completed = stats.completed,
                bytes = stats.bytes,
                "all segments complete"
            );
            return Ok((session, stats));
        };

        let source = session
            .segments
            .iter()
            .position(|segment| segment.range.index == index)
            .and_then(|pos| session.segments.swap_remove(pos).into_failure())
            .unwrap_or_else(|| DownloadError::WorkerPanic {
                index,
                message: "failure record lost".to_string(),
            });

        debug!(dir = %session.storage_dir().display(), "removing segment storage after failure");
        if let Err(e) = session.release_storage().await {
            warn!(error = %e, "failed to remove segment storage");
        }

        Err(AggregateDownloadError {
            index,
            failed,
            source,
        })
    }
}

/// Body of one worker task. Owns `segment` for the duration of the fetch.
async fn fetch_segment(
    fetcher: Arc<dyn SegmentFetcher>,
    url: Arc<str>,
    mut segment: Segment,
    ranged: bool,
) -> Segment {
    segment.mark_in_flight();
    let job = SegmentJob {
        url: &url,
        range: segment.range,
        path: segment.path(),
        ranged,
    };

    let result = fetcher.fetch(job).await;
    match result {
        Ok(bytes) => {
            debug!(index = segment.range.index, bytes, "segment complete");
            segment.mark_complete();
        }
        Err(e) => {
            debug!(index = segment.range.index, error = %e, "segment fetch failed");
            segment.mark_failed(e);
        }
    }
    segment
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::download::planner::plan_ranges;
    use crate::download::storage::SegmentStore;
    use crate::download::types::ResourceDescriptor;

    /// Writes `range.len()` bytes after a delay; fails for selected indices.
    #[derive(Default)]
    struct FakeFetcher {
        fail: HashSet<usize>,
        panic_on: HashSet<usize>,
        delays_ms: HashMap<usize, u64>,
        active: AtomicUsize,
        max_active: AtomicUsize,
        started: Mutex<Vec<usize>>,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl SegmentFetcher for FakeFetcher {
        async fn fetch(&self, job: SegmentJob<'_>) -> Result<u64, DownloadError> {
            let index = job.range.index;
            self.started.lock().unwrap().push(index);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);

            let delay = self.delays_ms.get(&index).copied().unwrap_or(5);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            tokio::fs::write(job.path, vec![b'x'; usize::try_from(job.range.len()).unwrap()])
                .await
                .unwrap();

            self.active.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);

            if self.panic_on.contains(&index) {
                panic!("injected worker panic");
            }
            if self.fail.contains(&index) {
                return Err(DownloadError::http_status(job.url, 503));
            }
            Ok(job.range.len())
        }
    }

    fn session(parent: &TempDir, total: u64, workers: usize) -> DownloadSession {
        let descriptor = ResourceDescriptor {
            url: "https://example.com/big.iso".to_string(),
            total_size: total,
            range_supported: true,
        };
        let store = SegmentStore::create_in(parent.path()).unwrap();
        DownloadSession::new(
            descriptor,
            plan_ranges(total, workers, true),
            parent.path().join("big.iso"),
            workers,
            store,
        )
    }

    #[tokio::test]
    async fn test_run_all_completes_every_segment() {
        let parent = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let coordinator = Coordinator::new(fetcher.clone());

        let (session, stats) = coordinator.run_all(session(&parent, 100, 3)).await.unwrap();

        assert_eq!(stats.dispatched, 3);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.bytes, 100);
        assert_eq!(session.incomplete_count(), 0);
        let indices: Vec<usize> = session.segments.iter().map(|s| s.range.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        for segment in &session.segments {
            assert_eq!(
                std::fs::metadata(segment.path()).unwrap().len(),
                segment.range.len()
            );
        }
    }

    #[tokio::test]
    async fn test_run_all_respects_worker_limit() {
        let parent = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher {
            delays_ms: (0..8).map(|i| (i, 20)).collect(),
            ..FakeFetcher::default()
        });
        let coordinator = Coordinator::new(fetcher.clone());

        // 8 ranges, but only 3 may run at once.
        let mut s = session(&parent, 800, 8);
        s.worker_count = 3;
        let (_session, stats) = coordinator.run_all(s).await.unwrap();

        assert_eq!(stats.completed, 8);
        assert!(fetcher.max_active.load(Ordering::SeqCst) <= 3);
        assert!(fetcher.max_active.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_failure_stops_dispatch_but_lets_in_flight_finish() {
        let parent = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher {
            fail: HashSet::from([0]),
            delays_ms: HashMap::from([(0, 1), (1, 100)]),
            ..FakeFetcher::default()
        });
        let coordinator = Coordinator::new(fetcher.clone());

        let mut s = session(&parent, 600, 6);
        s.worker_count = 2;
        let storage_dir = s.storage_dir().to_path_buf();

        let error = coordinator.run_all(s).await.unwrap_err();

        assert_eq!(error.index, 0);
        assert_eq!(error.failed, 1);
        assert!(matches!(
            error.source,
            DownloadError::HttpStatus { status: 503, .. }
        ));
        // Only the first two segments were ever dispatched, and the slow one
        // ran to completion rather than being cancelled.
        let mut started = fetcher.started.lock().unwrap().clone();
        started.sort_unstable();
        assert_eq!(started, vec![0, 1]);
        assert_eq!(fetcher.finished.load(Ordering::SeqCst), 2);

        assert!(!storage_dir.exists(), "segment storage must be removed");
        assert!(!parent.path().join("big.iso").exists());
    }

    #[tokio::test]
    async fn test_aggregate_error_counts_every_failure() {
        let parent = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher {
            fail: HashSet::from([1, 2]),
            delays_ms: HashMap::from([(0, 50), (1, 1), (2, 30)]),
            ..FakeFetcher::default()
        });
        let coordinator = Coordinator::new(fetcher);

        let error = coordinator.run_all(session(&parent, 30, 3)).await.unwrap_err();

        assert_eq!(error.index, 1, "first failure observed is the fastest");
        assert_eq!(error.failed, 2);
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_worker_panic_becomes_segment_failure() {
        let parent = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher {
            panic_on: HashSet::from([1]),
            ..FakeFetcher::default()
        });
        let coordinator = Coordinator::new(fetcher);

        let error = coordinator.run_all(session(&parent, 20, 2)).await.unwrap_err();

        assert_eq!(error.index, 1);
        assert!(matches!(
            error.source,
            DownloadError::WorkerPanic { index: 1, .. }
        ));
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_session_dispatches_nothing() {
        let parent = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let coordinator = Coordinator::new(fetcher.clone());

        let (session, stats) = coordinator.run_all(session(&parent, 0, 4)).await.unwrap();

        assert_eq!(stats, CoordinatorStats::default());
        assert!(session.segments.is_empty());
        assert!(fetcher.started.lock().unwrap().is_empty());
    }
}
