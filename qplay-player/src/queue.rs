//! Playback queue
//!
//! Ordered FIFO of track ids shared between the command surface, the
//! acquisition scheduler, and the completion handler. Every mutation happens
//! under a single write lock, so concurrent readers always observe the queue
//! atomically. Notification is the engine's job, not the queue's.

use qplay_common::TrackId;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Guarded FIFO of queued tracks
///
/// Cheap to clone; all clones share the same underlying queue.
#[derive(Clone, Default)]
pub struct PlayQueue {
    inner: Arc<RwLock<VecDeque<TrackId>>>,
}

impl PlayQueue {
    /// Create a new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty the queue unconditionally
    pub async fn reset(&self) {
        self.inner.write().await.clear();
    }

    /// Append one track to the tail
    pub async fn push_back(&self, track: TrackId) {
        self.inner.write().await.push_back(track);
    }

    /// Append several tracks to the tail, preserving their order
    pub async fn extend(&self, tracks: impl IntoIterator<Item = TrackId>) {
        self.inner.write().await.extend(tracks);
    }

    /// Remove and return the head, or None if the queue is empty
    pub async fn pop_front(&self) -> Option<TrackId> {
        self.inner.write().await.pop_front()
    }

    /// Non-mutating read of the head
    pub async fn front(&self) -> Option<TrackId> {
        self.inner.read().await.front().cloned()
    }

    /// Number of queued tracks
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check whether the queue is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Copy of the current contents, head first
    pub async fn snapshot(&self) -> Vec<TrackId> {
        self.inner.read().await.iter().cloned().collect()
    }
}
