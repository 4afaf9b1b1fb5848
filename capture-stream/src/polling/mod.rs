//! Periodic field sampling
//!
//! Providers that cannot push value changes for a field are sampled by a
//! [`PollScheduler`]. Each registered field keeps a [`PollState`] with its
//! phase-aligned schedule, failure count and last value; results go to a
//! [`PollListener`].

pub mod listener;
pub mod scheduler;
pub mod state;

pub use listener::{PollFailure, PollListener, RetryClass};
pub use scheduler::{PollFieldStats, PollScheduler};
pub use state::{backoff_delay, now_millis, PollState, MAX_BACKOFF_SECS, MAX_FAILURE_COUNT};
