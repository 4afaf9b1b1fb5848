//! In-memory reference provider
//!
//! [`MemoryProvider`] keeps device metadata in a [`DeviceRegistry`] and
//! field values in a table. It is a complete [`CapabilityProvider`], useful
//! for demos, tests and as a template for real drivers.
//!
//! Clones share state, so a clone kept outside the event manager can simulate
//! hardware with [`push_value`](MemoryProvider::push_value) and
//! [`set_usable`](MemoryProvider::set_usable).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use capture_api::{
    CapabilityProvider, CaptureError, CaptureEvent, Device, EventSink, Properties, Result,
    SubscriptionKey, Value,
};
use capture_config::DeviceRegistry;
use parking_lot::Mutex;

struct MemoryState {
    registry: DeviceRegistry,
    values: Mutex<HashMap<SubscriptionKey, Value>>,
    subscribed: Mutex<HashSet<SubscriptionKey>>,
    sink: Mutex<Option<EventSink>>,
}

#[derive(Clone)]
pub struct MemoryProvider {
    state: Arc<MemoryState>,
}

impl MemoryProvider {
    pub fn new(registry: DeviceRegistry) -> Self {
        Self {
            state: Arc::new(MemoryState {
                registry,
                values: Mutex::new(HashMap::new()),
                subscribed: Mutex::new(HashSet::new()),
                sink: Mutex::new(None),
            }),
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.state.registry
    }

    pub fn is_open(&self) -> bool {
        self.state.sink.lock().is_some()
    }

    /// Simulate a value arriving from the hardware
    pub fn push_value(&self, device: &str, field: &str, value: impl Into<Value>) -> Result<()> {
        self.store_value(device, field, value.into())
    }

    /// Mark a device usable or unusable and broadcast the change
    pub fn set_usable(&self, device: &str, usable: bool) -> Result<()> {
        let mut found = self
            .state
            .registry
            .device(device)
            .ok_or_else(|| CaptureError::DeviceNotFound(device.to_string()))?;
        if found.usable == usable {
            return Ok(());
        }
        found.usable = usable;
        self.state.registry.add(found)?;
        self.emit(CaptureEvent::device_usability(device, usable));
        Ok(())
    }

    /// Broadcast a field usability change
    pub fn set_field_usable(&self, device: &str, field: &str, usable: bool) -> Result<()> {
        self.require_field(device, field)?;
        self.emit(CaptureEvent::field_usability(device, field, usable));
        Ok(())
    }

    fn emit(&self, event: CaptureEvent) {
        let sink = self.state.sink.lock().clone();
        if let Some(sink) = sink {
            sink.send(event);
        }
    }

    fn require_usable(&self, device: &str) -> Result<Device> {
        let found = self
            .state
            .registry
            .device(device)
            .ok_or_else(|| CaptureError::DeviceNotFound(device.to_string()))?;
        if !found.usable {
            return Err(CaptureError::operation_failed(format!(
                "device '{}' is not usable",
                device
            )));
        }
        Ok(found)
    }

    fn require_field(&self, device: &str, field: &str) -> Result<()> {
        let found = self
            .state
            .registry
            .device(device)
            .ok_or_else(|| CaptureError::DeviceNotFound(device.to_string()))?;
        if found.field(field).is_none() {
            return Err(CaptureError::FieldNotFound {
                device: device.to_string(),
                field: field.to_string(),
            });
        }
        Ok(())
    }

    fn store_value(&self, device: &str, field: &str, value: Value) -> Result<()> {
        self.require_usable(device)?;
        self.require_field(device, field)?;

        let key = SubscriptionKey::new(device, field);
        self.state.values.lock().insert(key.clone(), value.clone());

        if self.state.subscribed.lock().contains(&key) {
            self.emit(CaptureEvent::value_changed(device, field, value));
        }
        Ok(())
    }
}

impl CapabilityProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn open(&mut self, sink: EventSink) -> Result<()> {
        let mut current = self.state.sink.lock();
        if current.is_some() {
            return Err(CaptureError::operation_failed("memory provider is already open"));
        }
        *current = Some(sink);
        tracing::debug!("Memory provider opened");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.sink.lock().take();
        self.state.subscribed.lock().clear();
        tracing::debug!("Memory provider closed");
        Ok(())
    }

    fn properties(&mut self) -> Result<Properties> {
        Ok(self.state.registry.properties())
    }

    fn set_properties(&mut self, properties: Properties) -> Result<()> {
        Ok(self.state.registry.set_properties(properties)?)
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        Ok(self.state.registry.set_property(name, value)?)
    }

    fn devices(&mut self) -> Result<HashMap<String, Device>> {
        Ok(self.state.registry.devices())
    }

    fn label(&mut self, device: &str) -> Result<Option<String>> {
        Ok(self.state.registry.label(device)?)
    }

    fn set_label(&mut self, device: &str, label: Option<String>) -> Result<()> {
        Ok(self.state.registry.set_label(device, label)?)
    }

    fn field_label(&mut self, device: &str, field: &str) -> Result<Option<String>> {
        Ok(self.state.registry.field_label(device, field)?)
    }

    fn set_field_label(&mut self, device: &str, field: &str, label: Option<String>) -> Result<()> {
        Ok(self.state.registry.set_field_label(device, field, label)?)
    }

    fn set_device_property(&mut self, device: &str, name: &str, value: &str) -> Result<()> {
        Ok(self.state.registry.set_device_property(device, name, value)?)
    }

    fn set_field_property(
        &mut self,
        device: &str,
        field: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        Ok(self
            .state
            .registry
            .set_field_property(device, field, name, value)?)
    }

    fn value(&mut self, device: &str, field: &str) -> Result<Value> {
        self.require_usable(device)?;
        self.require_field(device, field)?;
        Ok(self
            .state
            .values
            .lock()
            .get(&SubscriptionKey::new(device, field))
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn set_value(&mut self, device: &str, field: &str, value: Value) -> Result<()> {
        self.store_value(device, field, value)
    }

    fn subscribe(&mut self, device: &str, field: &str) -> Result<()> {
        self.require_field(device, field)?;
        self.state
            .subscribed
            .lock()
            .insert(SubscriptionKey::new(device, field));
        Ok(())
    }

    fn unsubscribe(&mut self, device: &str, field: &str) -> Result<()> {
        self.state
            .subscribed
            .lock()
            .remove(&SubscriptionKey::new(device, field));
        Ok(())
    }

    fn add(&mut self, mut device: Device) -> Result<String> {
        if device.id.is_empty() {
            device.id = uuid::Uuid::new_v4().to_string();
        }
        let id = device.id.clone();
        self.state.registry.add_and_save(device)?;
        tracing::debug!("Memory provider added {}", id);
        Ok(id)
    }

    fn remove(&mut self, device: &str) -> Result<()> {
        self.state.registry.remove_and_save(device)?;
        self.state.values.lock().retain(|key, _| key.device() != device);
        self.state.subscribed.lock().retain(|key| key.device() != device);
        Ok(())
    }
}
