//! Error types shared by providers, the event manager and the layers above

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error used as the underlying cause of provider and persistence failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by capability providers and everything layered on top of them
///
/// Provider and session passthrough calls return these untouched, so a caller
/// sees exactly what the driver reported.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Unknown device id
    #[error("Device with id '{0}' does not exist")]
    DeviceNotFound(String),

    /// Unknown field id on a known device
    #[error("Field with id '{field}' does not exist on device '{device}'")]
    FieldNotFound { device: String, field: String },

    /// Empty key, empty property name or similar caller mistake
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Provider-level failure (device or connection unavailable)
    ///
    /// `context` describes the operation that failed; `source` carries the
    /// driver's own error when there is one.
    #[error("Operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Atomic write of the persisted configuration failed
    #[error("Failed to persist configuration to {}", path.display())]
    PersistenceFailed {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    /// The session was already closed
    #[error("Session has been closed")]
    SessionClosed,
}

impl CaptureError {
    /// Create an `OperationFailed` error without an underlying cause
    pub fn operation_failed(context: impl Into<String>) -> Self {
        Self::OperationFailed {
            context: context.into(),
            source: None,
        }
    }

    /// Create an `OperationFailed` error wrapping the driver's error
    pub fn operation_failed_with(
        context: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::OperationFailed {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    /// Create a `PersistenceFailed` error for `path`
    pub fn persistence_failed(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self::PersistenceFailed {
            path: path.into(),
            source: source.into(),
        }
    }

    /// True for `DeviceNotFound` and `FieldNotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CaptureError::DeviceNotFound(_) | CaptureError::FieldNotFound { .. }
        )
    }
}

/// Result type for capture operations
pub type Result<T> = std::result::Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_operation_failed_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "serial port timeout");
        let err = CaptureError::operation_failed_with("read d1/f1", io);

        assert_eq!(err.to_string(), "Operation failed: read d1/f1");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_operation_failed_without_source() {
        let err = CaptureError::operation_failed("device offline");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(CaptureError::DeviceNotFound("d1".into()).is_not_found());
        assert!(CaptureError::FieldNotFound {
            device: "d1".into(),
            field: "f1".into()
        }
        .is_not_found());
        assert!(!CaptureError::SessionClosed.is_not_found());
    }

    #[test]
    fn test_persistence_failed_display() {
        let err = CaptureError::persistence_failed(
            "/tmp/registry.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/registry.json"));
    }
}
