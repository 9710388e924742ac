//! # qplay Common Library
//!
//! Shared code for the qplay player:
//! - Track identity (`TrackId`)
//! - Event types (`PlayerEvent` enum) and the broadcast `EventBus`
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
pub use events::{EventBus, PlaybackState, PlayerEvent};
pub use types::TrackId;
