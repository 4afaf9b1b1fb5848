//! # Capture Config
//!
//! Persistent device registry for capture-sdk providers.
//!
//! The registry stores the provider-wide property map and every known device
//! as one JSON document:
//!
//! ```text
//! {
//!   "properties": { "poll.default": "1000" },
//!   "devices": {
//!     "d1": { "id": "d1", "name": "Scale", "customized": true, "fields": { ... } }
//!   }
//! }
//! ```
//!
//! Saves are atomic (temp file in the same directory, then rename). A failed
//! save leaves both the file and the in-memory registry as they were.

pub mod error;
pub mod persist;
pub mod registry;

pub use error::{ConfigError, Result};
pub use persist::{read_json, write_json_atomic};
pub use registry::{DeviceRegistry, RegistryDocument};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{ConfigError, DeviceRegistry, RegistryDocument, Result};
}
