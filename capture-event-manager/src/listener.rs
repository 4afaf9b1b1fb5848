//! Session listener trait

use capture_api::{BoxError, CaptureEvent};

/// Receives the events routed to one session
///
/// Called on the dispatch thread, one event at a time. Returning an error (or
/// panicking) is logged and does not affect other sessions.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &CaptureEvent) -> Result<(), BoxError>;
}

impl<F> EventListener for F
where
    F: Fn(&CaptureEvent) -> Result<(), BoxError> + Send + Sync,
{
    fn on_event(&self, event: &CaptureEvent) -> Result<(), BoxError> {
        self(event)
    }
}
