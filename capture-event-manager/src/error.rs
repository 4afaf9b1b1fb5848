use thiserror::Error;

/// Errors that can occur while setting up the event manager
///
/// Provider call failures are not wrapped here; sessions return the
/// provider's [`CaptureError`](capture_api::CaptureError) untouched.
#[derive(Error, Debug)]
pub enum EventManagerError {
    /// The dispatch thread could not be started
    #[error("Failed to spawn dispatch worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Result type for Event Manager operations
pub type Result<T> = std::result::Result<T, EventManagerError>;
