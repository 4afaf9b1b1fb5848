//! Top-level SDK configuration
//!
//! One serializable document feeding the per-crate configuration types.
//! Nothing is read implicitly: load it with [`CaptureConfig::load`] or build
//! it in code.

use std::path::{Path, PathBuf};
use std::time::Duration;

use capture_config::{read_json, write_json_atomic, ConfigError};
use capture_event_manager::EventManagerConfig;
use capture_stream::{PollConfig, StreamConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Names the dispatch thread and tags report notifications
    pub source_id: Option<String>,

    /// Where the device registry is persisted
    pub registry_path: PathBuf,

    /// Grace period for stopping worker threads
    #[serde(rename = "shutdownGraceMs", with = "duration_ms")]
    pub shutdown_grace: Duration,

    /// Default change-only setting for polled fields
    pub event_only_on_change: bool,

    pub failure_backoff: bool,

    /// Undelivered events a stream may hold before it is evicted
    pub stream_queue_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let poll = PollConfig::default();
        Self {
            source_id: None,
            registry_path: Self::default_registry_path(),
            shutdown_grace: poll.shutdown_grace,
            event_only_on_change: poll.event_only_on_change,
            failure_backoff: poll.failure_backoff,
            stream_queue_capacity: StreamConfig::default().queue_capacity,
        }
    }
}

impl CaptureConfig {
    /// `<config dir>/capture-sdk/registry.json`, or `./registry.json` when
    /// the platform has no config directory
    pub fn default_registry_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("capture-sdk").join("registry.json"))
            .unwrap_or_else(|| PathBuf::from("registry.json"))
    }

    /// Read a configuration file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match read_json(path)? {
            Some(config) => {
                tracing::debug!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            None => {
                tracing::debug!("No configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
        }
    }

    /// Write the configuration atomically
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write_json_atomic(path.as_ref(), self)
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = path.into();
        self
    }

    pub fn event_manager_config(&self) -> EventManagerConfig {
        let config = EventManagerConfig::default().with_shutdown_grace(self.shutdown_grace);
        match &self.source_id {
            Some(id) => config.with_source_id(id.clone()),
            None => config,
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            event_only_on_change: self.event_only_on_change,
            failure_backoff: self.failure_backoff,
            shutdown_grace: self.shutdown_grace,
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::default().with_queue_capacity(self.stream_queue_capacity)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
