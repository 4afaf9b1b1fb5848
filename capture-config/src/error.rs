//! Error types for capture-config

use std::io;
use std::path::PathBuf;

use capture_api::CaptureError;
use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading, mutating or saving the registry
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration from {}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse configuration in {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Writing or renaming the temp file failed; the previous file is untouched
    #[error("Failed to persist configuration to {}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Device with id '{0}' does not exist")]
    DeviceNotFound(String),

    #[error("Field with id '{field}' does not exist on device '{device}'")]
    FieldNotFound { device: String, field: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ConfigError {
    pub(crate) fn field_not_found(device: &str, field: &str) -> Self {
        ConfigError::FieldNotFound {
            device: device.to_string(),
            field: field.to_string(),
        }
    }
}

impl From<ConfigError> for CaptureError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Load { path, source } | ConfigError::Persist { path, source } => {
                CaptureError::persistence_failed(path, source)
            }
            ConfigError::Parse { path, source } => CaptureError::persistence_failed(path, source),
            ConfigError::DeviceNotFound(id) => CaptureError::DeviceNotFound(id),
            ConfigError::FieldNotFound { device, field } => {
                CaptureError::FieldNotFound { device, field }
            }
            ConfigError::InvalidArgument(msg) => CaptureError::InvalidArgument(msg),
        }
    }
}
