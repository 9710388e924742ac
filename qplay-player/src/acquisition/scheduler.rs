//! Acquisition scheduler
//!
//! Background task that keeps the queue head locally available before
//! playback needs it. Runs on a fixed tick plus an explicit wake-up after
//! queue mutation, so a freshly enqueued head does not wait out the interval.
//!
//! Retries are bounded: a head that keeps failing is skipped (removed from
//! the queue with a `TrackUnavailable` notification) instead of stalling the
//! queue forever.

use crate::acquisition::{AcquisitionIndex, TrackFetcher};
use crate::queue::PlayQueue;
use crate::state::SharedState;
use qplay_common::{config::Config, PlayerEvent, TrackId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};

/// Per-track retry bookkeeping
struct RetryRecord {
    attempts: u32,
    next_retry: Instant,
}

/// Background loop that acquires the queue head ahead of playback
pub struct AcquisitionScheduler {
    queue: PlayQueue,
    index: Arc<AcquisitionIndex>,
    fetcher: Arc<dyn TrackFetcher>,
    state: Arc<SharedState>,
    wake: Arc<Notify>,
    tick_interval: Duration,
    max_attempts: u32,
    backoff_base: Duration,
    retries: Mutex<HashMap<TrackId, RetryRecord>>,
}

impl AcquisitionScheduler {
    pub fn new(
        queue: PlayQueue,
        index: Arc<AcquisitionIndex>,
        fetcher: Arc<dyn TrackFetcher>,
        state: Arc<SharedState>,
        wake: Arc<Notify>,
        config: &Config,
    ) -> Self {
        Self {
            queue,
            index,
            fetcher,
            state,
            wake,
            tick_interval: config.acquire_interval(),
            max_attempts: config.max_fetch_attempts.max(1),
            backoff_base: config.fetch_backoff(),
            retries: Mutex::new(HashMap::new()),
        }
    }

    /// Run until shutdown
    ///
    /// Each cycle waits for the tick interval or an explicit wake-up,
    /// whichever comes first, then processes the queue head once. The
    /// acquisition call itself may block for the duration of a download;
    /// queue readers are never blocked by it.
    pub async fn run(self: Arc<Self>) {
        let mut tick = interval(self.tick_interval);
        info!(
            "Acquisition scheduler started ({}ms interval)",
            self.tick_interval.as_millis()
        );

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = self.wake.notified() => {}
            }

            if self.state.is_shutdown() {
                debug!("Acquisition scheduler stopping");
                break;
            }

            self.process_head().await;
        }
    }

    /// One scheduling cycle: acquire the queue head if it is not yet local
    async fn process_head(&self) {
        let Some(head) = self.queue.front().await else {
            self.retries.lock().unwrap().clear();
            return;
        };

        // Only the head is ever fetched; bookkeeping for tracks that left
        // the queue by other means (reset, force-play clear) is stale
        self.retries.lock().unwrap().retain(|track, _| track == &head);

        if self.index.contains(&head).await {
            self.retries.lock().unwrap().remove(&head);
            return;
        }

        // Honor the backoff window from a previous failure
        {
            let retries = self.retries.lock().unwrap();
            if let Some(record) = retries.get(&head) {
                if Instant::now() < record.next_retry {
                    return;
                }
            }
        }

        debug!("Acquiring next in queue: {}", head);
        match self.fetcher.ensure_available(&head).await {
            Ok(path) => {
                if let Err(e) = self.index.insert(head.clone()).await {
                    warn!("Failed to record {} in index: {}", head, e);
                }
                self.retries.lock().unwrap().remove(&head);
                info!("Acquired {} -> {}", head, path.display());
            }
            Err(e) => self.record_failure(head, e).await,
        }
    }

    async fn record_failure(&self, head: TrackId, error: crate::error::Error) {
        let attempts = {
            let retries = self.retries.lock().unwrap();
            retries.get(&head).map(|r| r.attempts).unwrap_or(0) + 1
        };

        if attempts >= self.max_attempts {
            warn!(
                "Giving up on {} after {} attempts: {}",
                head, attempts, error
            );
            self.skip_head(head).await;
            return;
        }

        let delay = self.backoff_base * 2u32.saturating_pow(attempts - 1);
        warn!(
            "Acquisition of {} failed (attempt {}/{}), retrying in {:?}: {}",
            head, attempts, self.max_attempts, delay, error
        );
        self.retries.lock().unwrap().insert(
            head,
            RetryRecord {
                attempts,
                next_retry: Instant::now() + delay,
            },
        );
    }

    /// Remove an unacquirable head so the queue keeps moving
    async fn skip_head(&self, head: TrackId) {
        // The user may have mutated the queue during the fetch; only pop if
        // the failing track is still at the front.
        if self.queue.front().await.as_ref() == Some(&head) {
            self.queue.pop_front().await;
            self.state.bus().emit_lossy(PlayerEvent::queue_changed());
        }
        self.retries.lock().unwrap().remove(&head);
        self.state
            .bus()
            .emit_lossy(PlayerEvent::track_unavailable(head));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fetcher that fails a scripted number of times before succeeding
    struct ScriptedFetcher {
        fail_times: u32,
        calls: AtomicU32,
    }

    impl ScriptedFetcher {
        fn new(fail_times: u32) -> Self {
            Self {
                fail_times,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TrackFetcher for ScriptedFetcher {
        async fn ensure_available(&self, track: &TrackId) -> crate::error::Result<PathBuf> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(Error::Acquisition("scripted failure".to_string()))
            } else {
                Ok(PathBuf::from(format!("/tmp/{}.mp3", track)))
            }
        }
    }

    fn scheduler_with(
        fetcher: Arc<ScriptedFetcher>,
        max_attempts: u32,
    ) -> (
        Arc<AcquisitionScheduler>,
        PlayQueue,
        Arc<SharedState>,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.max_fetch_attempts = max_attempts;
        config.fetch_backoff_ms = 0; // no backoff gating in tests

        let queue = PlayQueue::new();
        let state = Arc::new(SharedState::new(64));
        let index =
            Arc::new(AcquisitionIndex::load(dir.path().join("downloaded.txt")).unwrap());

        let scheduler = Arc::new(AcquisitionScheduler::new(
            queue.clone(),
            index,
            fetcher,
            state.clone(),
            Arc::new(Notify::new()),
            &config,
        ));
        (scheduler, queue, state, dir)
    }

    #[tokio::test]
    async fn test_head_is_acquired_and_indexed() {
        let fetcher = Arc::new(ScriptedFetcher::new(0));
        let (scheduler, queue, _state, _dir) = scheduler_with(fetcher.clone(), 3);

        queue.push_back(TrackId::from("a")).await;
        scheduler.process_head().await;

        assert!(scheduler.index.contains(&TrackId::from("a")).await);
        assert_eq!(fetcher.calls(), 1);
        // Head stays queued; acquisition never mutates queue order
        assert_eq!(queue.front().await, Some(TrackId::from("a")));
    }

    #[tokio::test]
    async fn test_already_indexed_head_is_not_refetched() {
        let fetcher = Arc::new(ScriptedFetcher::new(0));
        let (scheduler, queue, _state, _dir) = scheduler_with(fetcher.clone(), 3);

        queue.push_back(TrackId::from("a")).await;
        scheduler.index.insert(TrackId::from("a")).await.unwrap();

        scheduler.process_head().await;
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_queue_is_a_noop() {
        let fetcher = Arc::new(ScriptedFetcher::new(0));
        let (scheduler, _queue, _state, _dir) = scheduler_with(fetcher.clone(), 3);

        scheduler.process_head().await;
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let fetcher = Arc::new(ScriptedFetcher::new(1));
        let (scheduler, queue, _state, _dir) = scheduler_with(fetcher.clone(), 3);

        queue.push_back(TrackId::from("flaky")).await;

        scheduler.process_head().await; // fails
        assert!(!scheduler.index.contains(&TrackId::from("flaky")).await);

        scheduler.process_head().await; // succeeds
        assert!(scheduler.index.contains(&TrackId::from("flaky")).await);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_emptied_queue_clears_retry_bookkeeping() {
        let fetcher = Arc::new(ScriptedFetcher::new(u32::MAX));
        let (scheduler, queue, _state, _dir) = scheduler_with(fetcher, 5);

        queue.push_back(TrackId::from("gone")).await;
        scheduler.process_head().await; // fails, record stored
        assert_eq!(scheduler.retries.lock().unwrap().len(), 1);

        queue.reset().await;
        scheduler.process_head().await;
        assert!(scheduler.retries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_departed_head_record_is_pruned() {
        let fetcher = Arc::new(ScriptedFetcher::new(1));
        let (scheduler, queue, _state, _dir) = scheduler_with(fetcher, 5);

        queue.push_back(TrackId::from("old")).await;
        scheduler.process_head().await; // fails, record stored

        // The queue is replaced underneath the scheduler
        queue.reset().await;
        queue.push_back(TrackId::from("new")).await;
        scheduler.process_head().await;

        assert!(scheduler.index.contains(&TrackId::from("new")).await);
        assert!(scheduler.retries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_skip_the_head() {
        let fetcher = Arc::new(ScriptedFetcher::new(u32::MAX));
        let (scheduler, queue, state, _dir) = scheduler_with(fetcher.clone(), 2);
        let mut rx = state.subscribe();

        queue.extend([TrackId::from("dead"), TrackId::from("next")]).await;

        scheduler.process_head().await; // attempt 1
        assert_eq!(queue.front().await, Some(TrackId::from("dead")));

        scheduler.process_head().await; // attempt 2 -> give up, skip
        assert_eq!(queue.front().await, Some(TrackId::from("next")));

        let mut saw_unavailable = false;
        let mut saw_queue_changed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                PlayerEvent::TrackUnavailable { track, .. } => {
                    assert_eq!(track, TrackId::from("dead"));
                    saw_unavailable = true;
                }
                PlayerEvent::QueueChanged { .. } => saw_queue_changed = true,
                _ => {}
            }
        }
        assert!(saw_unavailable);
        assert!(saw_queue_changed);
    }
}
