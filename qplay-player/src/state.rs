//! Shared playback state
//!
//! Thread-safe state shared between the command surface, the acquisition
//! scheduler, and the completion watcher. Locks are held only across the
//! mutation itself, never across a backend or acquisition call.

use qplay_common::{EventBus, PlaybackState, PlayerEvent, TrackId};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, RwLock};

/// Shared state accessible by all components
pub struct SharedState {
    /// Current playback state
    playback_state: RwLock<PlaybackState>,

    /// Currently playing track (None when idle)
    current_track: RwLock<Option<TrackId>>,

    /// Event broadcaster for consumers (UI layer etc.)
    bus: EventBus,

    /// Set once by quit(); both background loops observe it on their next
    /// tick, and every playback operation fails fast afterwards.
    shutdown: AtomicBool,
}

impl SharedState {
    /// Create new shared state, idle and not playing
    pub fn new(event_capacity: usize) -> Self {
        Self {
            playback_state: RwLock::new(PlaybackState::Idle),
            current_track: RwLock::new(None),
            bus: EventBus::new(event_capacity),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Access the event bus
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.bus.subscribe()
    }

    /// Get current playback state
    pub async fn playback_state(&self) -> PlaybackState {
        *self.playback_state.read().await
    }

    /// Set playback state, broadcasting the change
    pub async fn set_playback_state(&self, state: PlaybackState) {
        let changed = {
            let mut guard = self.playback_state.write().await;
            let changed = *guard != state;
            *guard = state;
            changed
        };
        if changed {
            self.bus
                .emit_lossy(PlayerEvent::playback_state_changed(state));
        }
    }

    /// Get the currently playing track
    pub async fn current_track(&self) -> Option<TrackId> {
        self.current_track.read().await.clone()
    }

    /// Set the currently playing track
    pub async fn set_current_track(&self, track: Option<TrackId>) {
        *self.current_track.write().await = track;
    }

    /// Whether quit() has been requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Mark shutdown; returns true for the call that initiated it
    pub fn begin_shutdown(&self) -> bool {
        !self.shutdown.swap(true, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state_is_idle() {
        let state = SharedState::new(16);
        assert_eq!(state.playback_state().await, PlaybackState::Idle);
        assert!(state.current_track().await.is_none());
        assert!(!state.is_shutdown());
    }

    #[tokio::test]
    async fn test_state_change_is_broadcast() {
        let state = SharedState::new(16);
        let mut rx = state.subscribe();

        state.set_playback_state(PlaybackState::Playing).await;
        match rx.recv().await.unwrap() {
            PlayerEvent::PlaybackStateChanged { state, .. } => {
                assert_eq!(state, PlaybackState::Playing);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unchanged_state_is_not_rebroadcast() {
        let state = SharedState::new(16);
        let mut rx = state.subscribe();

        state.set_playback_state(PlaybackState::Idle).await;
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_is_one_shot() {
        let state = SharedState::new(16);
        assert!(state.begin_shutdown());
        assert!(!state.begin_shutdown());
        assert!(state.is_shutdown());
    }
}
