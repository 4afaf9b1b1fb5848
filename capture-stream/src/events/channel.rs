//! Bounded per-consumer event channel
//!
//! Each stream owns a session. The session listener pushes into an
//! unbounded queue and never blocks; once more than `capacity` events are
//! waiting the stream is evicted: its session releases every key and
//! closes, and the consumer sees the end of the stream after draining what
//! was already queued.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use capture_api::CaptureEvent;
use capture_event_manager::{EventManager, Session};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::error::{StreamError, StreamResult};
use crate::events::iter::{EventStreamIter, TimeoutIter};

struct StreamShared {
    id: String,
    capacity: usize,
    session: Mutex<Option<Session>>,
    sender: Mutex<Option<Sender<CaptureEvent>>>,
    closed: AtomicBool,
    evicted: AtomicBool,
}

impl StreamShared {
    fn push(&self, event: CaptureEvent) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let pending = {
            let sender = self.sender.lock();
            let Some(tx) = sender.as_ref() else {
                return;
            };
            if tx.send(event).is_err() {
                return;
            }
            tx.len()
        };

        if pending > self.capacity {
            tracing::warn!(
                "Stream {} has {} undelivered events (capacity {}), closing it",
                self.id,
                pending,
                self.capacity
            );
            self.shutdown(true);
        }
    }

    /// Tear the stream down; only the first caller does any work
    fn shutdown(&self, evicted: bool) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.evicted.store(evicted, Ordering::Release);

        // Dropping the only sender ends the consumer's iteration once drained
        self.sender.lock().take();

        let session = self.session.lock().take();
        if let Some(session) = session {
            session.close();
        }
        tracing::debug!("Stream {} closed", self.id);
        true
    }
}

/// Control side of a stream, shared with the [`StreamService`](crate::StreamService)
#[derive(Clone)]
pub struct StreamHandle {
    shared: Arc<StreamShared>,
}

impl StreamHandle {
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Deliver value changes of a field to this stream
    pub fn subscribe(&self, device: &str, field: &str) -> StreamResult<()> {
        let session = self.shared.session.lock();
        let session = session.as_ref().ok_or(StreamError::Closed)?;
        session.subscribe(device, field)?;
        Ok(())
    }

    pub fn unsubscribe(&self, device: &str, field: &str) -> StreamResult<()> {
        let session = self.shared.session.lock();
        let session = session.as_ref().ok_or(StreamError::Closed)?;
        session.unsubscribe(device, field)?;
        Ok(())
    }

    pub fn is_subscribed(&self, device: &str, field: &str) -> bool {
        self.shared
            .session
            .lock()
            .as_ref()
            .is_some_and(|s| s.is_subscribed(device, field))
    }

    /// Close the stream; returns false if it was already closed
    pub fn close(&self) -> bool {
        self.shared.shutdown(false)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// True when the stream was closed because its consumer fell behind
    pub fn was_evicted(&self) -> bool {
        self.shared.evicted.load(Ordering::Acquire)
    }

    /// Events queued but not yet received
    pub fn pending(&self) -> usize {
        self.shared.sender.lock().as_ref().map_or(0, Sender::len)
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("id", &self.shared.id)
            .field("closed", &self.is_closed())
            .field("evicted", &self.was_evicted())
            .finish()
    }
}

/// Consumer side of a stream
///
/// Receiving blocks until an event arrives or the stream ends. A closed or
/// evicted stream still yields the events queued before it closed.
/// Dropping the stream closes it.
///
/// # Example
///
/// ```rust,ignore
/// let stream = service.open_stream("dashboard");
/// stream.subscribe("scale-1", "weight")?;
///
/// for event in stream.iter() {
///     println!("{:?}", event);
/// }
/// // Ends when the stream is closed or evicted
/// ```
pub struct EventStream {
    handle: StreamHandle,
    receiver: Receiver<CaptureEvent>,
}

impl EventStream {
    /// Open a stream on a fresh session of `manager`
    pub fn open(manager: &EventManager, id: impl Into<String>, capacity: usize) -> Self {
        let (sender, receiver) = channel::unbounded();
        let shared = Arc::new(StreamShared {
            id: id.into(),
            capacity,
            session: Mutex::new(None),
            sender: Mutex::new(Some(sender)),
            closed: AtomicBool::new(false),
            evicted: AtomicBool::new(false),
        });

        let session = manager.create_session();
        let weak: Weak<StreamShared> = Arc::downgrade(&shared);
        session.set_listener_fn(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.push(event.clone());
            }
            Ok(())
        });
        *shared.session.lock() = Some(session);

        tracing::debug!("Stream {} opened (capacity {})", shared.id, capacity);
        Self {
            handle: StreamHandle { shared },
            receiver,
        }
    }

    pub fn handle(&self) -> &StreamHandle {
        &self.handle
    }

    pub fn id(&self) -> &str {
        self.handle.id()
    }

    pub fn subscribe(&self, device: &str, field: &str) -> StreamResult<()> {
        self.handle.subscribe(device, field)
    }

    pub fn unsubscribe(&self, device: &str, field: &str) -> StreamResult<()> {
        self.handle.unsubscribe(device, field)
    }

    pub fn close(&self) -> bool {
        self.handle.close()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    pub fn was_evicted(&self) -> bool {
        self.handle.was_evicted()
    }

    /// Events queued but not yet received
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Block until the next event; `None` once the stream has ended
    pub fn recv(&self) -> Option<CaptureEvent> {
        self.receiver.recv().ok()
    }

    /// Next queued event without blocking
    pub fn try_recv(&self) -> Option<CaptureEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next event
    ///
    /// `Ok(None)` means the stream has ended.
    pub fn recv_timeout(&self, timeout: Duration) -> StreamResult<Option<CaptureEvent>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
            Err(RecvTimeoutError::Timeout) => Err(StreamError::Timeout),
        }
    }

    /// Blocking iterator that ends with the stream
    pub fn iter(&self) -> EventStreamIter<'_> {
        EventStreamIter::new(&self.receiver)
    }

    /// Drain what is queued right now
    pub fn try_iter(&self) -> impl Iterator<Item = CaptureEvent> + '_ {
        self.receiver.try_iter()
    }

    /// Iterator that also ends when no event arrives within `timeout`
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIter<'_> {
        TimeoutIter::new(&self.receiver, timeout)
    }
}

impl Iterator for EventStream {
    type Item = CaptureEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.handle.close();
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("id", &self.id())
            .field("pending", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
