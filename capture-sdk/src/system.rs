use std::sync::Arc;

use capture_api::CapabilityProvider;
use capture_config::DeviceRegistry;
use capture_event_manager::{EventManager, Session};
use capture_stream::{EventStream, PollScheduler, StreamService};

use crate::config::CaptureConfig;
use crate::error::Result;
use crate::feed::ReportFeed;
use crate::memory::MemoryProvider;
use crate::report::ReportSink;

/// Entry point wiring one provider to sessions, streams, pollers and
/// report feeds
pub struct CaptureSystem {
    manager: Arc<EventManager>,
    streams: StreamService,
    config: CaptureConfig,
}

impl CaptureSystem {
    pub fn new(provider: impl CapabilityProvider + 'static, config: CaptureConfig) -> Result<Self> {
        let manager = Arc::new(EventManager::with_config(
            provider,
            config.event_manager_config(),
        )?);
        let streams = StreamService::with_config(Arc::clone(&manager), config.stream_config());

        tracing::debug!(
            "Capture system ready (source {:?})",
            config.source_id.as_deref().unwrap_or("default")
        );
        Ok(Self {
            manager,
            streams,
            config,
        })
    }

    /// Build a system around a [`MemoryProvider`] backed by the configured
    /// registry file; the returned clone shares the provider's state
    pub fn with_memory_provider(config: CaptureConfig) -> Result<(Self, MemoryProvider)> {
        let registry = DeviceRegistry::open(&config.registry_path)?;
        let provider = MemoryProvider::new(registry);
        let system = Self::new(provider.clone(), config)?;
        Ok((system, provider))
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<EventManager> {
        &self.manager
    }

    pub fn session(&self) -> Session {
        self.manager.create_session()
    }

    pub fn streams(&self) -> &StreamService {
        &self.streams
    }

    pub fn open_stream(&self, id: impl Into<String>) -> EventStream {
        self.streams.open_stream(id)
    }

    /// A stopped scheduler using the configured poll defaults
    pub fn poll_scheduler(&self) -> PollScheduler {
        PollScheduler::new(self.config.poll_config())
    }

    /// A disabled report feed on a new session
    pub fn report_feed(&self, source_id: impl Into<String>, sink: Arc<dyn ReportSink>) -> ReportFeed {
        ReportFeed::new(source_id, self.session(), sink, self.config.poll_config())
    }

    /// Close every stream and stop event dispatch
    pub fn shutdown(&self) {
        self.streams.close_all();
        self.manager.shutdown();
    }
}
