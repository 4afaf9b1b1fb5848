//! # Capture API
//!
//! Shared vocabulary for capture-sdk: the device model, subscription keys,
//! state change events and the [`CapabilityProvider`] contract that device
//! drivers implement.
//!
//! ## Overview
//!
//! A capability provider drives one physical device family. It is opened once,
//! pushes [`CaptureEvent`]s into the [`EventSink`] it was opened with, and
//! answers label, property and value calls by device and field id. Everything
//! above this crate (the event manager, the poller, the stream channels) only
//! talks to devices through this trait.
//!
//! ```rust
//! use capture_api::prelude::*;
//!
//! let key = SubscriptionKey::try_new("scale-1", "weight")?;
//! let event = CaptureEvent::value_changed(key.device(), key.field(), 12.5);
//! assert_eq!(event.routing_key(), Some(key));
//! # Ok::<(), CaptureError>(())
//! ```
//!
//! ## Testing
//!
//! Enable the `test-support` feature to get [`testing::MockProvider`], a
//! provider with call counters, scripted reads and failure toggles.

pub mod error;
pub mod event;
pub mod key;
pub mod model;
pub mod provider;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{BoxError, CaptureError, Result};
pub use event::{CaptureEvent, EventSink, Value};
pub use key::SubscriptionKey;
pub use model::{Device, Field, Properties};
pub use provider::{CapabilityProvider, FieldReader};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CapabilityProvider, CaptureError, CaptureEvent, Device, EventSink, Field, FieldReader,
        Properties, Result, SubscriptionKey, Value,
    };
}
