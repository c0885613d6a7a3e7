//! Error types for claw-eventwatch.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while watching and forwarding events.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The cluster API session could not be established.
    #[error("cluster session failed: {0}")]
    ClusterSession(String),

    /// The watch subscription could not be opened.
    #[error("watch setup failed: {0}")]
    WatchSetup(String),

    /// The watch stream ended.
    #[error("watch stream closed")]
    StreamClosed,

    /// The watch stream failed mid-flight.
    #[error("watch stream error: {0}")]
    Stream(String),

    /// A watch item could not be decoded.
    #[error("failed to decode watch event: {0}")]
    Decode(String),

    /// A notification could not be delivered.
    #[error("notification failed: {0}")]
    NotificationFailed(String),

    /// A notification did not complete in time.
    #[error("notification timed out after {0:?}")]
    NotificationTimeout(Duration),

    /// Event model error.
    #[error(transparent)]
    Event(#[from] claw_events::EventError),
}

impl WatchError {
    /// Returns true if the error must terminate the process.
    ///
    /// Only notification errors are recoverable; the dispatch loop logs them
    /// and moves on to the next event.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::NotificationFailed(_) | Self::NotificationTimeout(_)
        )
    }
}

impl From<serde_json::Error> for WatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type for watch operations.
pub type Result<T> = std::result::Result<T, WatchError>;
