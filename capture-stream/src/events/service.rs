//! Streams keyed by consumer id

use std::sync::Arc;

use capture_event_manager::EventManager;
use dashmap::DashMap;

use crate::config::StreamConfig;
use crate::error::{StreamError, StreamResult};
use crate::events::channel::{EventStream, StreamHandle};

/// Per-consumer streams over one [`EventManager`]
///
/// Opening a stream under an id that is already in use closes the previous
/// stream. Closed and evicted streams are pruned lazily.
pub struct StreamService {
    manager: Arc<EventManager>,
    streams: DashMap<String, StreamHandle>,
    config: StreamConfig,
}

impl StreamService {
    pub fn new(manager: Arc<EventManager>) -> Self {
        Self::with_config(manager, StreamConfig::default())
    }

    pub fn with_config(manager: Arc<EventManager>, config: StreamConfig) -> Self {
        Self {
            manager,
            streams: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<EventManager> {
        &self.manager
    }

    /// Open the stream for `id`, replacing any previous one
    pub fn open_stream(&self, id: impl Into<String>) -> EventStream {
        let id = id.into();
        let stream = EventStream::open(&self.manager, id.clone(), self.config.queue_capacity);

        if let Some(previous) = self.streams.insert(id, stream.handle().clone()) {
            tracing::debug!("Replacing stream {}", previous.id());
            previous.close();
        }
        stream
    }

    /// Open a stream under a generated id; see [`EventStream::id`]
    pub fn open_anonymous_stream(&self) -> EventStream {
        self.open_stream(uuid::Uuid::new_v4().to_string())
    }

    pub fn subscribe(&self, id: &str, device: &str, field: &str) -> StreamResult<()> {
        self.handle(id)?.subscribe(device, field)
    }

    /// Unknown ids are ignored
    pub fn unsubscribe(&self, id: &str, device: &str, field: &str) -> StreamResult<()> {
        match self.handle(id) {
            Ok(handle) => handle.unsubscribe(device, field),
            Err(StreamError::UnknownStream(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Close and forget the stream for `id`; false if there was none
    pub fn close(&self, id: &str) -> bool {
        match self.streams.remove(id) {
            Some((_, handle)) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    pub fn close_all(&self) {
        let handles: Vec<StreamHandle> = self.streams.iter().map(|e| e.value().clone()).collect();
        self.streams.clear();
        for handle in handles {
            handle.close();
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.streams.get(id).is_some_and(|h| !h.is_closed())
    }

    /// Number of open streams
    pub fn len(&self) -> usize {
        self.prune();
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handle(&self, id: &str) -> StreamResult<StreamHandle> {
        let handle = self
            .streams
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StreamError::UnknownStream(id.to_string()))?;

        if handle.is_closed() {
            self.streams.remove_if(id, |_, h| h.is_closed());
            return Err(StreamError::Closed);
        }
        Ok(handle)
    }

    fn prune(&self) {
        self.streams.retain(|_, handle| !handle.is_closed());
    }
}

impl Drop for StreamService {
    fn drop(&mut self) {
        self.close_all();
    }
}
