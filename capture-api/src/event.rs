//! State change events and the sink providers push them into

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::key::SubscriptionKey;

/// Dynamically typed field value
pub use serde_json::Value;

/// A device or field state change reported by a provider (or synthesized by
/// the poller)
///
/// Serializes as tagged JSON, e.g.
/// `{"type":"fieldValueChanged","device":"d1","field":"f1","value":42}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CaptureEvent {
    /// A device became usable or unusable
    DeviceUsabilityChanged { device: String, usable: bool },

    /// A field within a device became usable or unusable
    FieldUsabilityChanged {
        device: String,
        field: String,
        usable: bool,
    },

    /// An observed field changed its value or its value was captured
    FieldValueChanged {
        device: String,
        field: String,
        value: Value,
    },
}

impl CaptureEvent {
    pub fn value_changed(
        device: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        CaptureEvent::FieldValueChanged {
            device: device.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn device_usability(device: impl Into<String>, usable: bool) -> Self {
        CaptureEvent::DeviceUsabilityChanged {
            device: device.into(),
            usable,
        }
    }

    pub fn field_usability(device: impl Into<String>, field: impl Into<String>, usable: bool) -> Self {
        CaptureEvent::FieldUsabilityChanged {
            device: device.into(),
            field: field.into(),
            usable,
        }
    }

    pub fn device(&self) -> &str {
        match self {
            CaptureEvent::DeviceUsabilityChanged { device, .. }
            | CaptureEvent::FieldUsabilityChanged { device, .. }
            | CaptureEvent::FieldValueChanged { device, .. } => device,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            CaptureEvent::DeviceUsabilityChanged { .. } => None,
            CaptureEvent::FieldUsabilityChanged { field, .. }
            | CaptureEvent::FieldValueChanged { field, .. } => Some(field),
        }
    }

    /// Routing key for value changes; `None` for usability events, which are
    /// broadcast rather than routed
    pub fn routing_key(&self) -> Option<SubscriptionKey> {
        match self {
            CaptureEvent::FieldValueChanged { device, field, .. } => {
                Some(SubscriptionKey::new(device.clone(), field.clone()))
            }
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            CaptureEvent::FieldValueChanged { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_usability(&self) -> bool {
        !matches!(self, CaptureEvent::FieldValueChanged { .. })
    }
}

/// Handle a provider uses to report state changes
///
/// Handed to [`CapabilityProvider::open`](crate::CapabilityProvider::open).
/// Cheap to clone and safe to use from any driver thread; pushing never blocks.
#[derive(Clone)]
pub struct EventSink {
    deliver: Arc<dyn Fn(CaptureEvent) + Send + Sync>,
}

impl EventSink {
    pub fn new(deliver: impl Fn(CaptureEvent) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Sink that discards everything
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    pub fn send(&self, event: CaptureEvent) {
        (self.deliver)(event)
    }

    pub fn value_changed(
        &self,
        device: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) {
        self.send(CaptureEvent::value_changed(device, field, value))
    }

    pub fn device_usability_changed(&self, device: impl Into<String>, usable: bool) {
        self.send(CaptureEvent::device_usability(device, usable))
    }

    pub fn field_usability_changed(
        &self,
        device: impl Into<String>,
        field: impl Into<String>,
        usable: bool,
    ) {
        self.send(CaptureEvent::field_usability(device, field, usable))
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}
