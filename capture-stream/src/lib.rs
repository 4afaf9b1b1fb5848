//! # Capture Stream
//!
//! Field polling and consumer event streams on top of
//! [`capture_event_manager`].
//!
//! ## Polling
//!
//! A [`PollScheduler`] samples fields the provider cannot push events for.
//! Reads are phase-aligned to the scheduler's creation time, failing fields
//! back off by `min(k², 3600)` seconds, and change-only fields report a value
//! only when it differs from the previous sample.
//!
//! ```rust,ignore
//! use capture_stream::prelude::*;
//!
//! let scheduler = PollScheduler::new(PollConfig::change_only());
//! scheduler.set_field("scale-1", "weight", Duration::from_millis(500))?;
//! scheduler.start(Arc::new(session), Arc::new(listener))?;
//! ```
//!
//! ## Streams
//!
//! An [`EventStream`] buffers a session's events for a consumer that pulls
//! them. A consumer that lets more than
//! [`queue_capacity`](StreamConfig::queue_capacity) events pile up is
//! evicted rather than slowing down event dispatch.
//!
//! ```rust,ignore
//! let service = StreamService::new(Arc::new(manager));
//! let stream = service.open_stream("dashboard");
//! service.subscribe("dashboard", "scale-1", "weight")?;
//! for event in stream.iter() {
//!     println!("{:?}", event);
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod polling;

pub use config::{PollConfig, StreamConfig};
pub use error::{PollingError, PollingResult, StreamError, StreamResult};
pub use events::{EventStream, StreamHandle, StreamService};
pub use polling::{PollFailure, PollFieldStats, PollListener, PollScheduler, PollState, RetryClass};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        EventStream, PollConfig, PollFailure, PollListener, PollScheduler, PollingError,
        RetryClass, StreamConfig, StreamError, StreamService,
    };
}
