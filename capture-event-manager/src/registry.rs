//! Copy-on-write listener registry
//!
//! Two views of the live sessions:
//! - every session, for broadcasting usability events
//! - per key, the sessions subscribed to it, for routing value changes
//!
//! Both hold `Arc<Vec<..>>` snapshots. Writers build a new vector and swap it
//! in; the dispatch worker clones the `Arc` and iterates without holding any
//! lock. All writes happen under the provider lock, so the per-key list and
//! the provider subscription state always change together.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use capture_api::{CaptureEvent, SubscriptionKey};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::listener::EventListener;

/// Unique id of a session within one event manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// The part of a session the dispatch worker sees: its id and listener slot
pub(crate) struct SessionSink {
    pub(crate) id: SessionId,
    listener: Mutex<Option<Arc<dyn EventListener>>>,
    closed: AtomicBool,
}

impl SessionSink {
    pub(crate) fn new(id: SessionId) -> Self {
        Self {
            id,
            listener: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_listener(&self, listener: Option<Arc<dyn EventListener>>) {
        *self.listener.lock() = listener;
    }

    pub(crate) fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Mark closed; returns true only for the first caller
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Invoke the listener, isolating its failures
    ///
    /// The slot lock is released before the call so a listener may replace
    /// itself or close its own session.
    pub(crate) fn deliver(&self, event: &CaptureEvent) {
        if self.is_closed() {
            return;
        }
        let Some(listener) = self.listener.lock().clone() else {
            return;
        };

        match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("Listener for {} failed on {:?}: {}", self.id, event, e);
            }
            Err(_) => {
                tracing::error!("Listener for {} panicked on {:?}", self.id, event);
            }
        }
    }
}

type Snapshot = Arc<Vec<Arc<SessionSink>>>;

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    sessions: RwLock<Snapshot>,
    by_key: DashMap<SubscriptionKey, Snapshot>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the number of sessions after adding
    pub(crate) fn add_session(&self, sink: Arc<SessionSink>) -> usize {
        let mut sessions = self.sessions.write();
        let mut next = sessions.as_ref().clone();
        next.push(sink);
        let count = next.len();
        *sessions = Arc::new(next);
        count
    }

    /// Returns the number of sessions left
    pub(crate) fn remove_session(&self, id: SessionId) -> usize {
        let mut sessions = self.sessions.write();
        let next: Vec<_> = sessions.iter().filter(|s| s.id != id).cloned().collect();
        let count = next.len();
        *sessions = Arc::new(next);
        count
    }

    pub(crate) fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub(crate) fn sessions(&self) -> Snapshot {
        Arc::clone(&self.sessions.read())
    }

    /// Returns true when this is the first listener for the key
    pub(crate) fn add_key_listener(&self, key: SubscriptionKey, sink: Arc<SessionSink>) -> bool {
        match self.by_key.entry(key) {
            Entry::Occupied(mut entry) => {
                let mut next = entry.get().as_ref().clone();
                next.push(sink);
                entry.insert(Arc::new(next));
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(vec![sink]));
                true
            }
        }
    }

    /// Returns true when the session was the last listener for the key
    pub(crate) fn remove_key_listener(&self, key: &SubscriptionKey, id: SessionId) -> bool {
        match self.by_key.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let next: Vec<_> = entry.get().iter().filter(|s| s.id != id).cloned().collect();
                if next.is_empty() {
                    entry.remove();
                    true
                } else {
                    entry.insert(Arc::new(next));
                    false
                }
            }
            Entry::Vacant(_) => false,
        }
    }

    pub(crate) fn has_key_listeners(&self, key: &SubscriptionKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub(crate) fn key_listeners(&self, key: &SubscriptionKey) -> Snapshot {
        self.by_key
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .unwrap_or_default()
    }

    pub(crate) fn listener_count(&self, key: &SubscriptionKey) -> usize {
        self.by_key.get(key).map(|entry| entry.len()).unwrap_or(0)
    }

    pub(crate) fn keys(&self) -> Vec<SubscriptionKey> {
        self.by_key.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Route an event: value changes to the key's listeners, the rest to all
    pub(crate) fn dispatch(&self, event: &CaptureEvent) {
        let targets = match event.routing_key() {
            Some(key) => self.key_listeners(&key),
            None => self.sessions(),
        };
        for sink in targets.iter() {
            sink.deliver(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture_api::BoxError;
    use std::sync::atomic::AtomicUsize;

    fn counting_sink(id: u64, hits: &Arc<AtomicUsize>) -> Arc<SessionSink> {
        let sink = Arc::new(SessionSink::new(SessionId::new(id)));
        let hits = Arc::clone(hits);
        let listener = move |_: &CaptureEvent| -> Result<(), BoxError> {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        sink.set_listener(Some(Arc::new(listener)));
        sink
    }

    #[test]
    fn test_key_listener_first_and_last() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let key = SubscriptionKey::new("d1", "f1");

        assert!(registry.add_key_listener(key.clone(), counting_sink(1, &hits)));
        assert!(!registry.add_key_listener(key.clone(), counting_sink(2, &hits)));
        assert_eq!(registry.listener_count(&key), 2);

        assert!(!registry.remove_key_listener(&key, SessionId::new(1)));
        assert!(registry.remove_key_listener(&key, SessionId::new(2)));
        assert!(!registry.has_key_listeners(&key));
        assert!(!registry.remove_key_listener(&key, SessionId::new(2)));
    }

    #[test]
    fn test_snapshot_is_stable_across_mutation() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.add_session(counting_sink(1, &hits));

        let snapshot = registry.sessions();
        registry.add_session(counting_sink(2, &hits));
        registry.remove_session(SessionId::new(1));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, SessionId::new(1));
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_dispatch_routes_values_and_broadcasts_usability() {
        let registry = ListenerRegistry::new();
        let on_key = Arc::new(AtomicUsize::new(0));
        let other = Arc::new(AtomicUsize::new(0));

        let a = counting_sink(1, &on_key);
        let b = counting_sink(2, &other);
        registry.add_session(Arc::clone(&a));
        registry.add_session(Arc::clone(&b));
        registry.add_key_listener(SubscriptionKey::new("d1", "f1"), a);

        registry.dispatch(&CaptureEvent::value_changed("d1", "f1", 1));
        registry.dispatch(&CaptureEvent::value_changed("d1", "f2", 1));
        registry.dispatch(&CaptureEvent::device_usability("d1", false));

        assert_eq!(on_key.load(Ordering::SeqCst), 2);
        assert_eq!(other.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_and_panicking_listeners_are_isolated() {
        let sink = SessionSink::new(SessionId::new(1));
        let failing = |_: &CaptureEvent| -> Result<(), BoxError> { Err("boom".into()) };
        sink.set_listener(Some(Arc::new(failing)));
        sink.deliver(&CaptureEvent::device_usability("d1", true));

        let panicking = |_: &CaptureEvent| -> Result<(), BoxError> { panic!("listener bug") };
        sink.set_listener(Some(Arc::new(panicking)));
        sink.deliver(&CaptureEvent::device_usability("d1", true));
    }

    #[test]
    fn test_closed_sink_receives_nothing() {
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = counting_sink(1, &hits);
        assert!(sink.mark_closed());
        assert!(!sink.mark_closed());

        sink.deliver(&CaptureEvent::device_usability("d1", true));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
