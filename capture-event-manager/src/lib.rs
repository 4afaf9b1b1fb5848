//! # Capture Event Manager
//!
//! Shares a single [`CapabilityProvider`](capture_api::CapabilityProvider)
//! between any number of independent consumers.
//!
//! ## Key Features
//!
//! - **Reference-counted connection**: the provider is opened for the first
//!   session and closed when the last session closes
//! - **Subscription de-duplication**: each (device, field) key is subscribed at
//!   the provider once, however many sessions want it
//! - **Ordered dispatch**: provider events are delivered by one worker thread in
//!   the order they were produced
//! - **Failure isolation**: a failing or panicking listener is logged and does
//!   not affect other sessions
//!
//! ## Architecture
//!
//! ```text
//! provider ──sink──▶ dispatch queue ──▶ dispatch worker
//!                                          │
//!                    value change ─────────┼──▶ sessions subscribed to the key
//!                    usability change ─────┴──▶ every live session
//! ```
//!
//! Provider calls and subscription bookkeeping share one lock. Listener lists
//! are copy-on-write, so the dispatch worker never takes that lock and a
//! listener may call back into its session.

pub mod config;
pub mod error;
pub mod listener;
pub mod manager;
pub mod registry;
pub mod session;
mod worker;

pub use config::EventManagerConfig;
pub use error::{EventManagerError, Result};
pub use listener::EventListener;
pub use manager::EventManager;
pub use registry::SessionId;
pub use session::Session;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        EventListener, EventManager, EventManagerConfig, EventManagerError, Session, SessionId,
    };
}
