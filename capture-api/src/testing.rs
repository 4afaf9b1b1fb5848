//! Mock provider for testing.
//!
//! `MockProvider` implements [`CapabilityProvider`] without any device behind
//! it. Clones share state, so a test keeps one clone to inspect counters and
//! flip failure toggles while the event manager owns the other.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CaptureError, Result};
use crate::event::{CaptureEvent, EventSink, Value};
use crate::key::SubscriptionKey;
use crate::model::{Device, Properties};
use crate::provider::CapabilityProvider;

#[derive(Default)]
struct MockState {
    sink: Option<EventSink>,
    devices: HashMap<String, Device>,
    properties: Properties,
    values: HashMap<SubscriptionKey, Value>,
    scripted: HashMap<SubscriptionKey, VecDeque<Result<Value>>>,
    subscribe_calls: HashMap<SubscriptionKey, u32>,
    unsubscribe_calls: HashMap<SubscriptionKey, u32>,
    written: Vec<(SubscriptionKey, Value)>,
}

/// Provider stub with call counters, scripted values and failure toggles
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
    open_count: Arc<AtomicU32>,
    close_count: Arc<AtomicU32>,
    read_count: Arc<AtomicU32>,
    fail_open: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
    fail_subscribe: Arc<AtomicBool>,
    fail_unsubscribe: Arc<AtomicBool>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device so passthrough calls find it
    pub fn add_device(&self, device: Device) {
        self.state.lock().devices.insert(device.id.clone(), device);
    }

    /// Value returned by every read of the field until changed
    pub fn set_fixed_value(&self, device: &str, field: &str, value: impl Into<Value>) {
        self.state
            .lock()
            .values
            .insert(SubscriptionKey::new(device, field), value.into());
    }

    /// Queue one read result; queued results are consumed before the fixed value
    pub fn push_read(&self, device: &str, field: &str, result: Result<Value>) {
        self.state
            .lock()
            .scripted
            .entry(SubscriptionKey::new(device, field))
            .or_default()
            .push_back(result);
    }

    /// Queue several successful reads in order
    pub fn push_values<I, V>(&self, device: &str, field: &str, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        for value in values {
            self.push_read(device, field, Ok(value.into()));
        }
    }

    /// Push an event through the sink handed to `open`
    ///
    /// Returns false when the provider is not open.
    pub fn emit(&self, event: CaptureEvent) -> bool {
        let sink = self.state.lock().sink.clone();
        match sink {
            Some(sink) => {
                sink.send(event);
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_unsubscribe(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> u32 {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::SeqCst)
    }

    pub fn subscribe_count(&self, device: &str, field: &str) -> u32 {
        let key = SubscriptionKey::new(device, field);
        self.state.lock().subscribe_calls.get(&key).copied().unwrap_or(0)
    }

    pub fn unsubscribe_count(&self, device: &str, field: &str) -> u32 {
        let key = SubscriptionKey::new(device, field);
        self.state.lock().unsubscribe_calls.get(&key).copied().unwrap_or(0)
    }

    /// Values passed to `set_value`, in call order
    pub fn written_values(&self) -> Vec<(SubscriptionKey, Value)> {
        self.state.lock().written.clone()
    }

    fn with_device<T>(&self, device: &str, f: impl FnOnce(&mut Device) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        let found = state
            .devices
            .get_mut(device)
            .ok_or_else(|| CaptureError::DeviceNotFound(device.to_string()))?;
        f(found)
    }
}

fn field_not_found(device: &str, field: &str) -> CaptureError {
    CaptureError::FieldNotFound {
        device: device.to_string(),
        field: field.to_string(),
    }
}

impl CapabilityProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&mut self, sink: EventSink) -> Result<()> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CaptureError::operation_failed("mock open failure"));
        }
        self.state.lock().sink = Some(sink);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.state.lock().sink = None;
        Ok(())
    }

    fn properties(&mut self) -> Result<Properties> {
        Ok(self.state.lock().properties.clone())
    }

    fn set_properties(&mut self, properties: Properties) -> Result<()> {
        self.state.lock().properties = properties;
        Ok(())
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        self.state
            .lock()
            .properties
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn devices(&mut self) -> Result<HashMap<String, Device>> {
        Ok(self.state.lock().devices.clone())
    }

    fn label(&mut self, device: &str) -> Result<Option<String>> {
        self.with_device(device, |d| Ok(d.label.clone()))
    }

    fn set_label(&mut self, device: &str, label: Option<String>) -> Result<()> {
        self.with_device(device, |d| {
            d.label = label;
            d.customized = true;
            Ok(())
        })
    }

    fn field_label(&mut self, device: &str, field: &str) -> Result<Option<String>> {
        self.with_device(device, |d| {
            d.field(field)
                .map(|f| f.label.clone())
                .ok_or_else(|| field_not_found(device, field))
        })
    }

    fn set_field_label(&mut self, device: &str, field: &str, label: Option<String>) -> Result<()> {
        self.with_device(device, |d| {
            let f = d.field_mut(field).ok_or_else(|| field_not_found(device, field))?;
            f.label = label;
            d.customized = true;
            Ok(())
        })
    }

    fn set_device_property(&mut self, device: &str, name: &str, value: &str) -> Result<()> {
        self.with_device(device, |d| {
            d.properties
                .get_or_insert_with(HashMap::new)
                .insert(name.to_string(), value.to_string());
            d.customized = true;
            Ok(())
        })
    }

    fn set_field_property(
        &mut self,
        device: &str,
        field: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        self.with_device(device, |d| {
            let f = d.field_mut(field).ok_or_else(|| field_not_found(device, field))?;
            f.properties
                .get_or_insert_with(HashMap::new)
                .insert(name.to_string(), value.to_string());
            d.customized = true;
            Ok(())
        })
    }

    fn value(&mut self, device: &str, field: &str) -> Result<Value> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CaptureError::operation_failed(format!(
                "mock read failure for {}/{}",
                device, field
            )));
        }

        let key = SubscriptionKey::new(device, field);
        let mut state = self.state.lock();
        if let Some(result) = state.scripted.get_mut(&key).and_then(VecDeque::pop_front) {
            return result;
        }
        state
            .values
            .get(&key)
            .cloned()
            .ok_or_else(|| field_not_found(device, field))
    }

    fn set_value(&mut self, device: &str, field: &str, value: Value) -> Result<()> {
        let key = SubscriptionKey::new(device, field);
        let mut state = self.state.lock();
        state.written.push((key.clone(), value.clone()));
        state.values.insert(key, value);
        Ok(())
    }

    fn subscribe(&mut self, device: &str, field: &str) -> Result<()> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(CaptureError::operation_failed(format!(
                "mock subscribe failure for {}/{}",
                device, field
            )));
        }
        *self
            .state
            .lock()
            .subscribe_calls
            .entry(SubscriptionKey::new(device, field))
            .or_insert(0) += 1;
        Ok(())
    }

    fn unsubscribe(&mut self, device: &str, field: &str) -> Result<()> {
        *self
            .state
            .lock()
            .unsubscribe_calls
            .entry(SubscriptionKey::new(device, field))
            .or_insert(0) += 1;
        if self.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(CaptureError::operation_failed(format!(
                "mock unsubscribe failure for {}/{}",
                device, field
            )));
        }
        Ok(())
    }

    fn add(&mut self, device: Device) -> Result<String> {
        if device.id.is_empty() {
            return Err(CaptureError::InvalidArgument(
                "device id must not be empty".to_string(),
            ));
        }
        let id = device.id.clone();
        self.state.lock().devices.insert(id.clone(), device);
        Ok(id)
    }

    fn remove(&mut self, device: &str) -> Result<()> {
        self.state.lock().devices.remove(device);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scripted_reads_before_fixed_value() {
        let mut mock = MockProvider::new();
        mock.set_fixed_value("d1", "f1", "fixed");
        mock.push_values("d1", "f1", ["a", "b"]);

        assert_eq!(mock.value("d1", "f1").unwrap(), json!("a"));
        assert_eq!(mock.value("d1", "f1").unwrap(), json!("b"));
        assert_eq!(mock.value("d1", "f1").unwrap(), json!("fixed"));
        assert_eq!(mock.read_count(), 3);
    }

    #[test]
    fn test_emit_requires_open() {
        let mut mock = MockProvider::new();
        assert!(!mock.emit(CaptureEvent::device_usability("d1", true)));

        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = Arc::clone(&seen);
        mock.open(EventSink::new(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        assert!(mock.emit(CaptureEvent::device_usability("d1", true)));
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        mock.close().unwrap();
        assert!(!mock.is_open());
    }

    #[test]
    fn test_clones_share_counters() {
        let observer = MockProvider::new();
        let mut owned = observer.clone();

        owned.subscribe("d1", "f1").unwrap();
        owned.subscribe("d1", "f1").unwrap();
        owned.unsubscribe("d1", "f1").unwrap();

        assert_eq!(observer.subscribe_count("d1", "f1"), 2);
        assert_eq!(observer.unsubscribe_count("d1", "f1"), 1);
        assert_eq!(observer.subscribe_count("d1", "f2"), 0);
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let mut mock = MockProvider::new();
        assert!(mock.label("nope").unwrap_err().is_not_found());
    }
}
