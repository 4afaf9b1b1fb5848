//! Event manager configuration

use std::time::Duration;

/// Configuration for [`EventManager`](crate::EventManager)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventManagerConfig {
    /// How long shutdown waits for the dispatch worker before detaching it.
    /// Default: 3 seconds
    pub shutdown_grace: Duration,

    /// Identifies this manager in thread names and log output.
    /// Default: None
    pub source_id: Option<String>,
}

impl Default for EventManagerConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(3),
            source_id: None,
        }
    }
}

impl EventManagerConfig {
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub(crate) fn worker_name(&self) -> String {
        match &self.source_id {
            Some(id) => format!("capture-dispatch-{}", id),
            None => "capture-dispatch".to_string(),
        }
    }
}
