//! The capability provider contract
//!
//! A provider is the driver for one device family. Implementations are not
//! required to be safe under concurrent use: every method takes `&mut self`,
//! and the event manager serializes access behind a single lock.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::Result;
use crate::event::{EventSink, Value};
use crate::model::{Device, Properties};

/// Driver abstraction for one physical device family
///
/// All operations fail with [`CaptureError::OperationFailed`](crate::CaptureError::OperationFailed)
/// when the device or connection is unavailable, and with the not-found variants
/// for unknown ids.
///
/// `open` is called at most once before a matching `close`. Events may be pushed
/// into the sink only between the two.
pub trait CapabilityProvider: Send {
    /// Short name used in log output
    fn name(&self) -> &str {
        "provider"
    }

    /// Connect to the device family and start pushing events into `sink`
    fn open(&mut self, sink: EventSink) -> Result<()>;

    /// Disconnect; no events may be pushed afterwards
    fn close(&mut self) -> Result<()>;

    /// Provider-wide properties
    fn properties(&mut self) -> Result<Properties>;

    fn set_properties(&mut self, properties: Properties) -> Result<()>;

    fn set_property(&mut self, name: &str, value: &str) -> Result<()>;

    /// All known devices keyed by id
    fn devices(&mut self) -> Result<HashMap<String, Device>>;

    fn label(&mut self, device: &str) -> Result<Option<String>>;

    fn set_label(&mut self, device: &str, label: Option<String>) -> Result<()>;

    fn field_label(&mut self, device: &str, field: &str) -> Result<Option<String>>;

    fn set_field_label(&mut self, device: &str, field: &str, label: Option<String>) -> Result<()>;

    fn set_device_property(&mut self, device: &str, name: &str, value: &str) -> Result<()>;

    fn set_field_property(
        &mut self,
        device: &str,
        field: &str,
        name: &str,
        value: &str,
    ) -> Result<()>;

    /// Read the current value of a field
    fn value(&mut self, device: &str, field: &str) -> Result<Value>;

    fn set_value(&mut self, device: &str, field: &str, value: Value) -> Result<()>;

    /// Start pushing value changes for the field
    fn subscribe(&mut self, device: &str, field: &str) -> Result<()>;

    fn unsubscribe(&mut self, device: &str, field: &str) -> Result<()>;

    /// Register a device and return its id
    fn add(&mut self, device: Device) -> Result<String>;

    fn remove(&mut self, device: &str) -> Result<()>;
}

impl<P: CapabilityProvider + ?Sized> CapabilityProvider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn open(&mut self, sink: EventSink) -> Result<()> {
        (**self).open(sink)
    }
    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
    fn properties(&mut self) -> Result<Properties> {
        (**self).properties()
    }
    fn set_properties(&mut self, properties: Properties) -> Result<()> {
        (**self).set_properties(properties)
    }
    fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        (**self).set_property(name, value)
    }
    fn devices(&mut self) -> Result<HashMap<String, Device>> {
        (**self).devices()
    }
    fn label(&mut self, device: &str) -> Result<Option<String>> {
        (**self).label(device)
    }
    fn set_label(&mut self, device: &str, label: Option<String>) -> Result<()> {
        (**self).set_label(device, label)
    }
    fn field_label(&mut self, device: &str, field: &str) -> Result<Option<String>> {
        (**self).field_label(device, field)
    }
    fn set_field_label(&mut self, device: &str, field: &str, label: Option<String>) -> Result<()> {
        (**self).set_field_label(device, field, label)
    }
    fn set_device_property(&mut self, device: &str, name: &str, value: &str) -> Result<()> {
        (**self).set_device_property(device, name, value)
    }
    fn set_field_property(
        &mut self,
        device: &str,
        field: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        (**self).set_field_property(device, field, name, value)
    }
    fn value(&mut self, device: &str, field: &str) -> Result<Value> {
        (**self).value(device, field)
    }
    fn set_value(&mut self, device: &str, field: &str, value: Value) -> Result<()> {
        (**self).set_value(device, field, value)
    }
    fn subscribe(&mut self, device: &str, field: &str) -> Result<()> {
        (**self).subscribe(device, field)
    }
    fn unsubscribe(&mut self, device: &str, field: &str) -> Result<()> {
        (**self).unsubscribe(device, field)
    }
    fn add(&mut self, device: Device) -> Result<String> {
        (**self).add(device)
    }
    fn remove(&mut self, device: &str) -> Result<()> {
        (**self).remove(device)
    }
}

/// Anything the poll scheduler can sample field values through
///
/// Implemented by event manager sessions (shared provider path) and by a
/// provider behind a mutex (direct path).
pub trait FieldReader: Send + Sync {
    fn read_value(&self, device: &str, field: &str) -> Result<Value>;
}

impl<P: CapabilityProvider> FieldReader for Mutex<P> {
    fn read_value(&self, device: &str, field: &str) -> Result<Value> {
        self.lock().value(device, field)
    }
}

impl<R: FieldReader + ?Sized> FieldReader for std::sync::Arc<R> {
    fn read_value(&self, device: &str, field: &str) -> Result<Value> {
        (**self).read_value(device, field)
    }
}
