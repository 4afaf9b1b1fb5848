//! Logging setup for applications using capture-sdk
//!
//! Every crate in the workspace logs through `tracing`; nothing is printed
//! until the application installs a subscriber, either its own or one of the
//! modes below.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No subscriber is installed
    Silent,
    /// Compact stderr output at info level
    Development,
    /// Verbose output with threads and source locations
    Debug,
}

impl std::str::FromStr for LoggingMode {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "silent" => Ok(LoggingMode::Silent),
            "development" | "dev" => Ok(LoggingMode::Development),
            "debug" => Ok(LoggingMode::Debug),
            other => Err(LoggingError::InvalidEnv(format!("unknown logging mode '{}'", other))),
        }
    }
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid environment variable: {0}")]
    InvalidEnv(String),
}

/// Install a global subscriber for `mode`
///
/// Call once, early. A second call fails with
/// [`LoggingError::TracingInit`].
///
/// # Environment Variables
///
/// - `CAPTURE_LOG_LEVEL`: filter directive, e.g. `debug` or
///   `capture_stream=trace`
/// - `RUST_LOG`: used when `CAPTURE_LOG_LEVEL` is unset
///
/// ```rust,ignore
/// capture_sdk::logging::init_logging(LoggingMode::Development)?;
/// ```
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_thread_names(true)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug")?;

            Registry::default()
                .with(
                    fmt::layer()
                        .pretty()
                        .with_thread_names(true)
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// Install a subscriber chosen by `CAPTURE_LOG_MODE`
///
/// `silent`, `development` or `debug`; unset means silent. An unknown value
/// is an error rather than a silent fallback.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    let mode = match std::env::var("CAPTURE_LOG_MODE") {
        Ok(value) => value.parse()?,
        Err(std::env::VarError::NotPresent) => LoggingMode::Silent,
        Err(e) => return Err(LoggingError::InvalidEnv(format!("CAPTURE_LOG_MODE: {}", e))),
    };

    init_logging(mode)
}

fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    let directive = std::env::var("CAPTURE_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.to_string());

    EnvFilter::try_new(&directive)
        .map_err(|e| LoggingError::InvalidEnv(format!("filter '{}': {}", directive, e)))
}

/// Whether a global subscriber has been installed
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_silent_mode() {
        assert!(init_logging(LoggingMode::Silent).is_ok());
    }

    #[rstest]
    #[case("silent", LoggingMode::Silent)]
    #[case("Development", LoggingMode::Development)]
    #[case("dev", LoggingMode::Development)]
    #[case("DEBUG", LoggingMode::Debug)]
    fn test_mode_from_str(#[case] input: &str, #[case] expected: LoggingMode) {
        assert_eq!(input.parse::<LoggingMode>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(matches!(
            "loud".parse::<LoggingMode>(),
            Err(LoggingError::InvalidEnv(_))
        ));
    }
}
