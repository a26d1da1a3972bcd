//! Error types for mixcore
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//!
//! Setup-time failures (init, streamer creation, append) are returned
//! synchronously to the caller. Failures that occur while the real-time
//! callback is mixing are never raised through the callback; they are queued
//! and delivered via [`crate::speaker::EngineEvent`], which is why `Error`
//! derives `Clone`: a failed stream keeps its error for `err()` queries while
//! a copy travels through the event queue.

use thiserror::Error;

/// Main error type for mixcore
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Invalid parameters or invalid state for setup operations
    /// (bad format, zero batch size, double-init, play before init)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Out-of-bounds streamer range or seek target
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Non-recoverable decode failure surfaced from a source stream
    #[error("Decode error: {0}")]
    Decode(String),

    /// Audio output device failure (reported asynchronously)
    #[error("Audio device error: {0}")]
    Device(String),

    /// Operation attempted after the playback engine was closed
    #[error("Already closed: {0}")]
    AlreadyClosed(String),
}

/// Convenience Result type using mixcore Error
pub type Result<T> = std::result::Result<T, Error>;
