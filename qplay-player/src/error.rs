//! Error types for qplay-player
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Nothing here is fatal: acquisition failures are retried or
//! surfaced, backend failures are reported to the caller, and state errors
//! fail fast at the call site.

use thiserror::Error;

/// Main error type for the qplay player
#[derive(Error, Debug)]
pub enum Error {
    /// Remote fetch or conversion of a track failed
    #[error("Acquisition failed: {0}")]
    Acquisition(String),

    /// Audio backend operation failed
    #[error("Audio backend error: {0}")]
    Backend(String),

    /// Operation requires a non-empty queue
    #[error("Queue is empty")]
    EmptyQueue,

    /// Operation invoked in a state that cannot honor it (e.g. after quit)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the player Error
pub type Result<T> = std::result::Result<T, Error>;
