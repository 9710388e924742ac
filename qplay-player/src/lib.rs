//! # qplay Player Library
//!
//! Core playback coordination for qplay: a FIFO track queue, a background
//! acquisition scheduler that keeps the queue head locally available, and a
//! playback engine that detects natural end-of-track and auto-advances.
//!
//! **Architecture:** user commands, the acquisition scheduler, and the
//! completion watcher run at independent paces, sharing state behind
//! `Arc`/`RwLock` guards and communicating outward through a broadcast event
//! bus. Audio output and track retrieval sit behind the `AudioBackend` and
//! `TrackFetcher` traits.

pub mod acquisition;
pub mod backend;
pub mod engine;
pub mod error;
pub mod monitor;
pub mod queue;
pub mod state;

pub use engine::PlaybackEngine;
pub use error::{Error, Result};
pub use queue::PlayQueue;
pub use state::SharedState;
