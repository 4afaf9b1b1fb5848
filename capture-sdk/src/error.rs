use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Capture error: {0}")]
    Capture(#[from] capture_api::CaptureError),

    #[error("Configuration error: {0}")]
    Config(#[from] capture_config::ConfigError),

    #[error("Event manager error: {0}")]
    EventManager(#[from] capture_event_manager::EventManagerError),

    #[error("Polling error: {0}")]
    Polling(#[from] capture_stream::PollingError),

    #[error("Stream error: {0}")]
    Stream(#[from] capture_stream::StreamError),

    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),
}

pub type Result<T> = std::result::Result<T, SdkError>;
