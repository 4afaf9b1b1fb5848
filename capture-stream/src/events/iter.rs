//! Iterator adapters over a stream's queue

use std::time::Duration;

use capture_api::CaptureEvent;
use crossbeam::channel::Receiver;

/// Blocking iterator; ends when the stream is closed and drained
pub struct EventStreamIter<'a> {
    receiver: &'a Receiver<CaptureEvent>,
}

impl<'a> EventStreamIter<'a> {
    pub(crate) fn new(receiver: &'a Receiver<CaptureEvent>) -> Self {
        Self { receiver }
    }
}

impl Iterator for EventStreamIter<'_> {
    type Item = CaptureEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

/// Iterator that gives up after `timeout` without an event
///
/// Useful for draining a stream in tests or batch jobs.
pub struct TimeoutIter<'a> {
    receiver: &'a Receiver<CaptureEvent>,
    timeout: Duration,
    received: usize,
}

impl<'a> TimeoutIter<'a> {
    pub(crate) fn new(receiver: &'a Receiver<CaptureEvent>, timeout: Duration) -> Self {
        Self {
            receiver,
            timeout,
            received: 0,
        }
    }

    /// Number of events yielded so far
    pub fn received(&self) -> usize {
        self.received
    }
}

impl Iterator for TimeoutIter<'_> {
    type Item = CaptureEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let event = self.receiver.recv_timeout(self.timeout).ok()?;
        self.received += 1;
        Some(event)
    }
}
