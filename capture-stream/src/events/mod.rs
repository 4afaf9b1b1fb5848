//! Event streams for external consumers
//!
//! An [`EventStream`] turns a session's callbacks into a pull sequence with
//! a bounded backlog. The [`StreamService`] keeps one stream per consumer id.

pub mod channel;
pub mod iter;
pub mod service;

pub use channel::{EventStream, StreamHandle};
pub use iter::{EventStreamIter, TimeoutIter};
pub use service::StreamService;
