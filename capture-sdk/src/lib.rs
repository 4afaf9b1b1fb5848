//! # Capture SDK
//!
//! Lets many independent consumers observe and control capture devices
//! through one shared driver.
//!
//! ```rust,no_run
//! use capture_sdk::prelude::*;
//!
//! fn main() -> Result<(), SdkError> {
//!     let (system, provider) = CaptureSystem::with_memory_provider(CaptureConfig::default())?;
//!
//!     let stream = system.open_stream("dashboard");
//!     stream.subscribe("scale-1", "weight")?;
//!
//!     provider.push_value("scale-1", "weight", 12.5)?;
//!     if let Some(event) = stream.recv() {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Key Features
//!
//! - **One connection, many sessions**: the provider is opened for the first
//!   session and closed with the last one
//! - **Shared subscriptions**: each field is subscribed at the provider once
//! - **Polling**: fields without push support are sampled on a phase-aligned
//!   schedule with failure backoff
//! - **Streams**: consumers pull events from a bounded backlog; a consumer
//!   that falls behind is evicted instead of stalling everyone else
//! - **Report feeds**: observed changes are forwarded to a report engine
//!
//! ## Architecture
//!
//! ```text
//! capture-sdk (CaptureSystem, ReportFeed, MemoryProvider)
//!     ↓
//! capture-stream (PollScheduler, EventStream, StreamService)
//!     ↓
//! capture-event-manager (EventManager, Session)
//!     ↓
//! capture-api (CapabilityProvider, CaptureEvent)   capture-config (DeviceRegistry)
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod memory;
pub mod report;
mod system;

pub use config::CaptureConfig;
pub use error::{Result, SdkError};
pub use feed::{ReportFeed, PERIOD_PROPERTY};
pub use memory::MemoryProvider;
pub use report::{Notification, NotificationOrigin, ReportSink};
pub use system::CaptureSystem;

// Re-export the layers below
pub use capture_api::{
    BoxError, CapabilityProvider, CaptureError, CaptureEvent, Device, EventSink, Field, FieldReader,
    Properties, SubscriptionKey, Value,
};
pub use capture_config::DeviceRegistry;
pub use capture_event_manager::{EventListener, EventManager, Session};
pub use capture_stream::{
    EventStream, PollConfig, PollFailure, PollListener, PollScheduler, StreamConfig,
    StreamService,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CaptureConfig, CaptureEvent, CaptureSystem, Device, Field, MemoryProvider, Notification,
        ReportFeed, ReportSink, SdkError, Session, SubscriptionKey, Value,
    };
}
