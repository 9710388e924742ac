//! Event types for the qplay notification system
//!
//! Communication between the playback core and its consumers (a terminal UI,
//! logging, media-key integration) is one-way and fire-and-forget:
//! - **EventBus** (tokio::broadcast): one-to-many event fan-out
//! - Each subscriber drains its own receiver in its own task, so a slow or
//!   failing consumer never blocks the mutation that produced the event.

use crate::types::TrackId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Playback state machine
///
/// `Loaded` is distinct from `Playing`: a freshly loaded track is held paused
/// by the backend until an explicit unpause transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// No track loaded, nothing to resume
    Idle,
    /// Track handed to the backend, held paused
    Loaded,
    /// Backend actively producing audio
    Playing,
    /// Playback suspended by the user
    Paused,
}

/// qplay event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Current track changed (None when playback settled to idle)
    SongChanged {
        track: Option<TrackId>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue contents changed (notification only - no data)
    QueueChanged {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback state changed
    PlaybackStateChanged {
        state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A queued track exhausted its acquisition retry budget and was skipped
    TrackUnavailable {
        track: TrackId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Non-fatal audio backend failure surfaced to consumers
    BackendError {
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    pub fn song_changed(track: Option<TrackId>) -> Self {
        Self::SongChanged {
            track,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn queue_changed() -> Self {
        Self::QueueChanged {
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn playback_state_changed(state: PlaybackState) -> Self {
        Self::PlaybackStateChanged {
            state,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn track_unavailable(track: TrackId) -> Self {
        Self::TrackUnavailable {
            track,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn backend_error(message: impl Into<String>) -> Self {
        Self::BackendError {
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// One-to-many event broadcaster
///
/// Wraps a `tokio::sync::broadcast` channel. Subscribers that fall behind by
/// more than `capacity` events lose the oldest ones; emission itself never
/// blocks.
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` otherwise.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
