//! Track acquisition
//!
//! Making queued tracks locally playable: the durable index of what is
//! already on disk, the fetcher that retrieves a track from the remote
//! service, and the background scheduler that keeps the queue head available
//! ahead of playback.

pub mod fetcher;
pub mod index;
pub mod scheduler;

pub use fetcher::{CommandFetcher, TrackFetcher};
pub use index::AcquisitionIndex;
pub use scheduler::AcquisitionScheduler;
