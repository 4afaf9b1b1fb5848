//! Reference-counted provider multiplexer
//!
//! Owns one capability provider and hands out [`Session`]s. The provider is
//! opened for the first live session and closed when the last one closes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use capture_api::{CapabilityProvider, EventSink, SubscriptionKey};
use parking_lot::Mutex;

use crate::config::EventManagerConfig;
use crate::error::{EventManagerError, Result};
use crate::registry::{ListenerRegistry, SessionId, SessionSink};
use crate::session::Session;
use crate::worker::DispatchWorker;

/// The provider plus whether it is currently open
pub(crate) struct ProviderState {
    pub(crate) provider: Box<dyn CapabilityProvider>,
    pub(crate) opened: bool,
}

impl ProviderState {
    fn open(&mut self, sink: EventSink) {
        match self.provider.open(sink) {
            Ok(()) => {
                self.opened = true;
                tracing::info!("Opened provider '{}'", self.provider.name());
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to open provider '{}', will retry on next session: {}",
                    self.provider.name(),
                    e
                );
            }
        }
    }

    pub(crate) fn close(&mut self) {
        self.opened = false;
        match self.provider.close() {
            Ok(()) => tracing::info!("Closed provider '{}'", self.provider.name()),
            Err(e) => tracing::warn!("Failed to close provider '{}': {}", self.provider.name(), e),
        }
    }
}

/// State shared by the manager handle and every session
pub(crate) struct Inner {
    /// Guards every provider call and all subscription bookkeeping
    pub(crate) provider: Mutex<ProviderState>,
    pub(crate) registry: Arc<ListenerRegistry>,
    sink: EventSink,
    worker: Mutex<DispatchWorker>,
    next_session: AtomicU64,
    config: EventManagerConfig,
}

impl Drop for Inner {
    fn drop(&mut self) {
        tracing::debug!(
            "Event manager dropping, {} keys still subscribed",
            self.registry.keys().len()
        );
        self.worker.get_mut().stop(self.config.shutdown_grace);
    }
}

/// Shares one capability provider between any number of sessions
///
/// # Example
///
/// ```rust,ignore
/// use capture_event_manager::EventManager;
///
/// let manager = EventManager::new(my_provider)?;
///
/// let session = manager.create_session();
/// session.set_listener_fn(|event| {
///     println!("{:?}", event);
///     Ok(())
/// });
/// session.subscribe("scale-1", "weight")?;
///
/// // Closing the last session closes the provider
/// session.close();
/// ```
pub struct EventManager {
    inner: Arc<Inner>,
}

impl EventManager {
    /// Create an event manager with default configuration
    pub fn new(provider: impl CapabilityProvider + 'static) -> Result<Self> {
        Self::with_config(provider, EventManagerConfig::default())
    }

    /// Create an event manager and start its dispatch worker
    pub fn with_config(
        provider: impl CapabilityProvider + 'static,
        config: EventManagerConfig,
    ) -> Result<Self> {
        let registry = Arc::new(ListenerRegistry::new());
        let worker = DispatchWorker::spawn(config.worker_name(), Arc::clone(&registry))
            .map_err(EventManagerError::WorkerSpawn)?;
        let sink = worker.sink();

        Ok(Self {
            inner: Arc::new(Inner {
                provider: Mutex::new(ProviderState {
                    provider: Box::new(provider),
                    opened: false,
                }),
                registry,
                sink,
                worker: Mutex::new(worker),
                next_session: AtomicU64::new(0),
                config,
            }),
        })
    }

    /// Create a new session, opening the provider if it is not open yet
    ///
    /// A failed open is logged and retried by the next `create_session`.
    pub fn create_session(&self) -> Session {
        let id = SessionId::new(self.inner.next_session.fetch_add(1, Ordering::SeqCst) + 1);
        let sink = Arc::new(SessionSink::new(id));

        {
            let mut state = self.inner.provider.lock();
            let count = self.inner.registry.add_session(Arc::clone(&sink));
            tracing::debug!("Session count: {} -> {} ({} created)", count - 1, count, id);

            if !state.opened {
                state.open(self.inner.sink.clone());
            }
        }

        Session::new(Arc::clone(&self.inner), sink)
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.inner.registry.session_count()
    }

    /// Whether the provider is currently open
    pub fn is_provider_open(&self) -> bool {
        self.inner.provider.lock().opened
    }

    /// Number of sessions subscribed to the key
    pub fn listener_count(&self, device: &str, field: &str) -> usize {
        self.inner
            .registry
            .listener_count(&SubscriptionKey::new(device, field))
    }

    /// Keys currently subscribed at the provider
    pub fn subscribed_keys(&self) -> Vec<SubscriptionKey> {
        let mut keys = self.inner.registry.keys();
        keys.sort();
        keys
    }

    pub fn config(&self) -> &EventManagerConfig {
        &self.inner.config
    }

    /// Stop the dispatch worker now
    ///
    /// Normally the worker stops once the manager and all sessions are
    /// dropped. After this call provider events are no longer delivered.
    pub fn shutdown(&self) {
        self.inner.worker.lock().stop(self.inner.config.shutdown_grace);
    }
}

impl Inner {
    #[cfg(test)]
    pub(crate) fn dispatch_thread(&self) -> Option<std::thread::ThreadId> {
        self.worker.lock().thread_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture_api::testing::MockProvider;

    #[test]
    fn test_open_on_first_close_on_last() {
        let mock = MockProvider::new();
        let manager = EventManager::new(mock.clone()).unwrap();
        assert!(!manager.is_provider_open());

        let a = manager.create_session();
        let b = manager.create_session();
        assert_eq!(mock.open_count(), 1);
        assert_eq!(manager.session_count(), 2);

        a.close();
        assert_eq!(mock.close_count(), 0);
        assert!(manager.is_provider_open());

        b.close();
        assert_eq!(mock.close_count(), 1);
        assert!(!manager.is_provider_open());
        assert_eq!(manager.session_count(), 0);
    }

    #[test]
    fn test_failed_open_retried_on_next_session() {
        let mock = MockProvider::new();
        mock.set_fail_open(true);
        let manager = EventManager::new(mock.clone()).unwrap();

        let _first = manager.create_session();
        assert!(!manager.is_provider_open());

        mock.set_fail_open(false);
        let _second = manager.create_session();
        assert!(manager.is_provider_open());
        assert_eq!(mock.open_count(), 2);
    }

    #[test]
    fn test_reopen_after_all_sessions_closed() {
        let mock = MockProvider::new();
        let manager = EventManager::new(mock.clone()).unwrap();

        manager.create_session().close();
        drop(manager.create_session());

        assert_eq!(mock.open_count(), 2);
        assert_eq!(mock.close_count(), 2);
    }

    #[test]
    fn test_dispatch_thread_named_after_source() {
        let manager = EventManager::with_config(
            MockProvider::new(),
            EventManagerConfig::default().with_source_id("dock"),
        )
        .unwrap();
        assert!(manager.inner.dispatch_thread().is_some());
        assert_eq!(manager.config().worker_name(), "capture-dispatch-dock");

        manager.shutdown();
        assert!(manager.inner.dispatch_thread().is_none());
    }
}
