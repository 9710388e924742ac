//! Background monitoring tasks for playback

use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, warn};

use crate::engine::PlaybackEngine;

/// Start background monitoring tasks
pub fn start_monitoring(engine: Arc<PlaybackEngine>, watch_interval: Duration) {
    tokio::spawn(completion_watch_task(engine, watch_interval));
}

/// Completion watch task
///
/// Polls the backend for the busy-to-idle transition that marks the natural
/// end of a track. Kept as a poll rather than a backend callback so any
/// backend that can answer "is there audio left" works unchanged.
async fn completion_watch_task(engine: Arc<PlaybackEngine>, watch_interval: Duration) {
    let mut interval = time::interval(watch_interval);

    info!(
        "Completion watch task started ({}ms interval)",
        watch_interval.as_millis()
    );

    loop {
        interval.tick().await;

        if engine.state().is_shutdown() {
            debug!("Completion watch task stopping");
            break;
        }

        if let Err(e) = engine.check_track_end().await {
            warn!("Error checking track end: {}", e);
        }
    }
}
