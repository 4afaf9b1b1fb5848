//! Error types for the capture-stream crate.

use capture_api::CaptureError;

/// Errors from the poll scheduler.
#[derive(Debug, thiserror::Error)]
pub enum PollingError {
    /// `start` was called on a running scheduler
    #[error("Poll scheduler is already running")]
    AlreadyRunning,

    /// Empty device or field id
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The poll worker thread could not be started
    #[error("Failed to spawn poll worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Errors from stream channels and the stream service.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// No stream is registered under the id
    #[error("There is no stream for id '{0}'")]
    UnknownStream(String),

    /// The stream was closed by its consumer or evicted for falling behind
    #[error("Stream has been closed")]
    Closed,

    /// Nothing arrived within the requested time
    #[error("Timed out waiting for an event")]
    Timeout,

    /// The underlying provider call failed
    #[error(transparent)]
    Capture(CaptureError),
}

impl From<CaptureError> for StreamError {
    fn from(error: CaptureError) -> Self {
        match error {
            CaptureError::SessionClosed => StreamError::Closed,
            other => StreamError::Capture(other),
        }
    }
}

/// Result type for polling operations
pub type PollingResult<T> = std::result::Result<T, PollingError>;

/// Result type for stream operations
pub type StreamResult<T> = std::result::Result<T, StreamError>;
