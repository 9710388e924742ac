//! Playback engine
//!
//! Coordinates the queue, the acquisition index, the audio backend, and the
//! event bus. Owns the playback state machine (Idle / Loaded / Playing /
//! Paused) and the natural end-of-track handling that auto-advances the
//! queue.
//!
//! Notification discipline: `force_play` is the only emitter of
//! `SongChanged`, so every track switch produces exactly one such event.

use crate::acquisition::{AcquisitionIndex, TrackFetcher};
use crate::backend::AudioBackend;
use crate::error::{Error, Result};
use crate::queue::PlayQueue;
use crate::state::SharedState;
use qplay_common::{PlaybackState, PlayerEvent, TrackId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Playback controller
///
/// Cheap to clone via `Arc`; the command surface, the completion watcher,
/// and tests all drive the same engine.
pub struct PlaybackEngine {
    state: Arc<SharedState>,
    queue: PlayQueue,
    index: Arc<AcquisitionIndex>,
    fetcher: Arc<dyn TrackFetcher>,
    backend: Arc<dyn AudioBackend>,

    /// Wakes the acquisition scheduler after queue mutation
    wake: Arc<Notify>,

    /// Edge detector for the completion watcher: last observed busy value
    was_busy: AtomicBool,
}

impl PlaybackEngine {
    pub fn new(
        state: Arc<SharedState>,
        queue: PlayQueue,
        index: Arc<AcquisitionIndex>,
        fetcher: Arc<dyn TrackFetcher>,
        backend: Arc<dyn AudioBackend>,
        wake: Arc<Notify>,
    ) -> Self {
        Self {
            state,
            queue,
            index,
            fetcher,
            backend,
            wake,
            was_busy: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn queue(&self) -> &PlayQueue {
        &self.queue
    }

    /// Fail fast once quit() has run
    fn guard(&self) -> Result<()> {
        if self.state.is_shutdown() {
            Err(Error::InvalidState("player has shut down".to_string()))
        } else {
            Ok(())
        }
    }

    /// Append one track to the queue
    pub async fn enqueue(&self, track: TrackId) -> Result<()> {
        self.guard()?;
        self.queue.push_back(track).await;
        self.state.bus().emit_lossy(PlayerEvent::queue_changed());
        self.wake.notify_one();
        Ok(())
    }

    /// Append several tracks, firing a single queue-changed notification
    pub async fn enqueue_many(&self, tracks: Vec<TrackId>) -> Result<()> {
        self.guard()?;
        if tracks.is_empty() {
            return Ok(());
        }
        self.queue.extend(tracks).await;
        self.state.bus().emit_lossy(PlayerEvent::queue_changed());
        self.wake.notify_one();
        Ok(())
    }

    /// Load a track immediately, replacing whatever is playing
    ///
    /// Acquires the track inline if it is not yet local, then stops whatever
    /// is playing and leaves the new track loaded but paused; reaching
    /// `Playing` takes an explicit `unpause`. A failed acquisition leaves
    /// current playback running. Emits exactly one `SongChanged` (plus
    /// `QueueChanged` when `clear_queue` is set).
    pub async fn force_play(&self, track: TrackId, clear_queue: bool) -> Result<()> {
        self.guard()?;

        // Inline acquisition covers both "never acquired" and "indexed but
        // the file went missing": ensure_available is idempotent and cheap
        // when the resource is already on disk. It runs before the backend
        // is touched; a failed acquisition leaves current playback intact.
        let path = self.fetcher.ensure_available(&track).await?;
        if !self.index.contains(&track).await {
            if let Err(e) = self.index.insert(track.clone()).await {
                warn!("Failed to record {} in index: {}", track, e);
            }
        }

        if let Err(e) = self.backend.stop() {
            warn!("Backend stop before load failed: {}", e);
        }
        self.was_busy.store(false, Ordering::SeqCst);

        if let Err(e) = self.backend.load(&path) {
            // The old track is already stopped; settle idle so the watcher
            // has no stale Playing state to act on.
            let had_track = self.state.current_track().await.is_some();
            self.state.set_current_track(None).await;
            self.state.set_playback_state(PlaybackState::Idle).await;
            self.state
                .bus()
                .emit_lossy(PlayerEvent::backend_error(e.to_string()));
            if had_track {
                self.state
                    .bus()
                    .emit_lossy(PlayerEvent::song_changed(None));
            }
            return Err(e);
        }

        self.state.set_playback_state(PlaybackState::Loaded).await;
        self.state.set_current_track(Some(track.clone())).await;

        if clear_queue {
            self.queue.reset().await;
            self.state.bus().emit_lossy(PlayerEvent::queue_changed());
        }

        info!("Loaded track {}", track);
        self.state
            .bus()
            .emit_lossy(PlayerEvent::song_changed(Some(track)));
        self.wake.notify_one();
        Ok(())
    }

    /// Start playing the head of the queue
    ///
    /// Fails with `EmptyQueue` if nothing is queued.
    pub async fn play_queue(&self) -> Result<()> {
        self.guard()?;
        let head = self.queue.front().await.ok_or(Error::EmptyQueue)?;

        info!("Playing {}", head);
        self.force_play(head, false).await?;
        self.queue.pop_front().await;
        // Notify the pop before unpause so a backend play failure cannot
        // leave subscribers with a stale queue view
        self.state.bus().emit_lossy(PlayerEvent::queue_changed());
        self.unpause().await?;
        Ok(())
    }

    /// Skip to the next queued track
    ///
    /// Fails with `EmptyQueue` if nothing is queued, leaving the current
    /// track and playback state untouched.
    pub async fn skip_forward(&self) -> Result<()> {
        self.guard()?;
        let head = self.queue.front().await.ok_or(Error::EmptyQueue)?;

        info!(
            "Skipping to {} from {:?}",
            head,
            self.state.current_track().await
        );

        // Defensive pause; a failure here must not abort the skip
        if let Err(e) = self.pause().await {
            debug!("Defensive pause before skip failed: {}", e);
        }

        self.force_play(head, false).await?;
        self.queue.pop_front().await;
        self.state.bus().emit_lossy(PlayerEvent::queue_changed());
        self.unpause().await?;
        Ok(())
    }

    /// Suspend playback
    ///
    /// Deduplicated: pausing while already paused (or with nothing loaded)
    /// is a no-op. On backend failure the state is left unchanged and the
    /// error is both returned and surfaced on the bus.
    pub async fn pause(&self) -> Result<()> {
        self.guard()?;
        match self.state.playback_state().await {
            PlaybackState::Paused | PlaybackState::Idle => return Ok(()),
            PlaybackState::Loaded | PlaybackState::Playing => {}
        }

        self.backend.pause().map_err(|e| {
            self.state
                .bus()
                .emit_lossy(PlayerEvent::backend_error(e.to_string()));
            e
        })?;
        self.state.set_playback_state(PlaybackState::Paused).await;
        Ok(())
    }

    /// Resume (or start) audible playback of the loaded track
    pub async fn unpause(&self) -> Result<()> {
        self.guard()?;
        if self.state.current_track().await.is_none() {
            return Ok(());
        }

        self.backend.play().map_err(|e| {
            self.state
                .bus()
                .emit_lossy(PlayerEvent::backend_error(e.to_string()));
            e
        })?;
        self.state.set_playback_state(PlaybackState::Playing).await;
        Ok(())
    }

    /// Stop playback and shut the player down
    ///
    /// Idempotent. Both background loops observe the shutdown flag on their
    /// next tick; any playback operation afterwards fails with
    /// `InvalidState`.
    pub async fn quit(&self) {
        if !self.state.begin_shutdown() {
            return;
        }
        info!("Shutting down player");

        self.state.set_current_track(None).await;
        self.state.set_playback_state(PlaybackState::Idle).await;

        if let Err(e) = self.backend.stop() {
            warn!("Backend stop during shutdown failed: {}", e);
        }
        if let Err(e) = self.backend.release() {
            warn!("Backend release failed: {}", e);
        }

        // Nudge the scheduler so it notices the flag without waiting a tick
        self.wake.notify_one();
    }

    /// One completion-watcher observation
    ///
    /// Detects the backend's busy-to-idle transition while in `Playing`;
    /// `Paused` and `Loaded` explicitly suppress completion detection. On a
    /// detected completion the queue auto-advances.
    pub async fn check_track_end(&self) -> Result<()> {
        if self.state.is_shutdown() {
            return Ok(());
        }

        let busy = self.backend.is_busy()?;
        let was_busy = self.was_busy.swap(busy, Ordering::SeqCst);

        if was_busy && !busy && self.state.playback_state().await == PlaybackState::Playing {
            debug!("Natural end of track detected");
            self.handle_track_complete().await?;
        }
        Ok(())
    }

    /// Natural end-of-track: advance to the next queued track or settle idle
    async fn handle_track_complete(&self) -> Result<()> {
        self.state.set_current_track(None).await;

        let Some(next) = self.queue.pop_front().await else {
            self.state.set_playback_state(PlaybackState::Idle).await;
            self.state
                .bus()
                .emit_lossy(PlayerEvent::song_changed(None));
            return Ok(());
        };

        match self.force_play(next.clone(), false).await {
            Ok(()) => {
                self.state.bus().emit_lossy(PlayerEvent::queue_changed());
                self.unpause().await?;
                Ok(())
            }
            Err(e) => {
                // Could not start the successor; settle idle rather than
                // leaving a half-advanced state behind.
                warn!("Failed to advance to {}: {}", next, e);
                self.state.set_playback_state(PlaybackState::Idle).await;
                self.state
                    .bus()
                    .emit_lossy(PlayerEvent::song_changed(None));
                Err(e)
            }
        }
    }
}
