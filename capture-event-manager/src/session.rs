//! Per-consumer session handle

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use capture_api::{
    BoxError, CapabilityProvider, CaptureError, CaptureEvent, Device, FieldReader, Properties,
    Result, SubscriptionKey, Value,
};
use parking_lot::Mutex;

use crate::listener::EventListener;
use crate::manager::Inner;
use crate::registry::{SessionId, SessionSink};

/// A consumer's lease on the shared provider
///
/// Owns the keys it subscribed and at most one listener. Provider calls made
/// through a session are serialized with every other session's calls.
///
/// Closing (explicitly or by dropping) releases every key and, for the last
/// live session, closes the provider. Closing twice is a no-op.
pub struct Session {
    inner: Arc<Inner>,
    sink: Arc<SessionSink>,
    keys: Mutex<HashSet<SubscriptionKey>>,
}

impl Session {
    pub(crate) fn new(inner: Arc<Inner>, sink: Arc<SessionSink>) -> Self {
        Self {
            inner,
            sink,
            keys: Mutex::new(HashSet::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.sink.id
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }

    // ========================================================================
    // Listener
    // ========================================================================

    /// Replace the listener that receives this session's events
    pub fn set_listener(&self, listener: Arc<dyn EventListener>) {
        self.sink.set_listener(Some(listener));
    }

    /// Closure form of [`set_listener`](Self::set_listener)
    pub fn set_listener_fn<F>(&self, listener: F)
    where
        F: Fn(&CaptureEvent) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.sink.set_listener(Some(Arc::new(listener)));
    }

    pub fn clear_listener(&self) {
        self.sink.set_listener(None);
    }

    pub fn has_listener(&self) -> bool {
        self.sink.has_listener()
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Subscribe this session to value changes of one field
    ///
    /// The provider is only asked to subscribe when no other session holds
    /// the key. Subscribing a key twice from one session is a no-op.
    pub fn subscribe(&self, device: &str, field: &str) -> Result<()> {
        let key = SubscriptionKey::try_new(device, field)?;
        self.with_provider(|provider| {
            if self.keys.lock().contains(&key) {
                return Ok(());
            }

            let registry = &self.inner.registry;
            if !registry.has_key_listeners(&key) {
                provider.subscribe(device, field)?;
                tracing::debug!("Provider subscribed to {}", key);
            }
            registry.add_key_listener(key.clone(), Arc::clone(&self.sink));
            tracing::debug!(
                "Listeners for {}: {}",
                key,
                registry.listener_count(&key)
            );

            self.keys.lock().insert(key);
            Ok(())
        })
    }

    /// Drop this session's interest in a field
    ///
    /// The provider is asked to unsubscribe when no session is left on the key.
    /// Unknown keys are ignored.
    pub fn unsubscribe(&self, device: &str, field: &str) -> Result<()> {
        let key = SubscriptionKey::new(device, field);
        self.with_provider(|provider| {
            if !self.keys.lock().remove(&key) {
                return Ok(());
            }

            if self.inner.registry.remove_key_listener(&key, self.id()) {
                tracing::debug!("Last listener for {} gone, provider unsubscribing", key);
                provider.unsubscribe(device, field)?;
            }
            Ok(())
        })
    }

    /// Release every key this session holds; provider failures are logged
    pub fn unsubscribe_all(&self) {
        let mut state = self.inner.provider.lock();
        self.release_keys(&mut *state.provider);
    }

    pub fn is_subscribed(&self, device: &str, field: &str) -> bool {
        self.keys.lock().contains(&SubscriptionKey::new(device, field))
    }

    pub fn subscribed_keys(&self) -> Vec<SubscriptionKey> {
        let mut keys: Vec<_> = self.keys.lock().iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Release all keys and leave the manager
    ///
    /// Best-effort: provider failures are logged, never returned. The last
    /// live session closes the provider.
    pub fn close(&self) {
        if !self.sink.mark_closed() {
            return;
        }
        self.sink.set_listener(None);

        let mut state = self.inner.provider.lock();
        self.release_keys(&mut *state.provider);

        let remaining = self.inner.registry.remove_session(self.id());
        tracing::debug!(
            "Session count: {} -> {} ({} closed)",
            remaining + 1,
            remaining,
            self.id()
        );

        if remaining == 0 && state.opened {
            state.close();
        }
    }

    fn release_keys(&self, provider: &mut dyn CapabilityProvider) {
        let keys: Vec<_> = self.keys.lock().drain().collect();
        for key in keys {
            if !self.inner.registry.remove_key_listener(&key, self.id()) {
                continue;
            }
            tracing::debug!("Last listener for {} gone, provider unsubscribing", key);
            if let Err(e) = provider.unsubscribe(key.device(), key.field()) {
                tracing::warn!("Failed to unsubscribe {} while releasing {}: {}", key, self.id(), e);
            }
        }
    }

    /// Run `f` under the provider lock unless the session is closed
    fn with_provider<T>(&self, f: impl FnOnce(&mut dyn CapabilityProvider) -> Result<T>) -> Result<T> {
        let mut state = self.inner.provider.lock();
        if self.is_closed() {
            return Err(CaptureError::SessionClosed);
        }
        f(&mut *state.provider)
    }

    // ========================================================================
    // Provider passthrough
    // ========================================================================

    pub fn properties(&self) -> Result<Properties> {
        self.with_provider(|p| p.properties())
    }

    pub fn set_properties(&self, properties: Properties) -> Result<()> {
        self.with_provider(|p| p.set_properties(properties))
    }

    pub fn set_property(&self, name: &str, value: &str) -> Result<()> {
        self.with_provider(|p| p.set_property(name, value))
    }

    pub fn devices(&self) -> Result<HashMap<String, Device>> {
        self.with_provider(|p| p.devices())
    }

    pub fn label(&self, device: &str) -> Result<Option<String>> {
        self.with_provider(|p| p.label(device))
    }

    pub fn set_label(&self, device: &str, label: Option<String>) -> Result<()> {
        self.with_provider(|p| p.set_label(device, label))
    }

    pub fn field_label(&self, device: &str, field: &str) -> Result<Option<String>> {
        self.with_provider(|p| p.field_label(device, field))
    }

    pub fn set_field_label(&self, device: &str, field: &str, label: Option<String>) -> Result<()> {
        self.with_provider(|p| p.set_field_label(device, field, label))
    }

    pub fn set_device_property(&self, device: &str, name: &str, value: &str) -> Result<()> {
        self.with_provider(|p| p.set_device_property(device, name, value))
    }

    pub fn set_field_property(
        &self,
        device: &str,
        field: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        self.with_provider(|p| p.set_field_property(device, field, name, value))
    }

    pub fn value(&self, device: &str, field: &str) -> Result<Value> {
        self.with_provider(|p| p.value(device, field))
    }

    pub fn set_value(&self, device: &str, field: &str, value: Value) -> Result<()> {
        self.with_provider(|p| p.set_value(device, field, value))
    }

    pub fn add(&self, device: Device) -> Result<String> {
        self.with_provider(|p| p.add(device))
    }

    pub fn remove(&self, device: &str) -> Result<()> {
        self.with_provider(|p| p.remove(device))
    }
}

impl FieldReader for Session {
    fn read_value(&self, device: &str, field: &str) -> Result<Value> {
        self.value(device, field)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .field("keys", &self.keys.lock().len())
            .finish()
    }
}
