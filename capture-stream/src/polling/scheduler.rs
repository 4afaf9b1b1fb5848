//! Poll scheduler and its worker thread
//!
//! One worker per running scheduler sleeps until the earliest field is due,
//! reads every due field through a [`FieldReader`] and reports results to a
//! [`PollListener`]. Registration changes wake the worker so it can
//! recompute its sleep.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use capture_api::{CaptureError, FieldReader, SubscriptionKey, Value};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::config::PollConfig;
use crate::error::{PollingError, PollingResult};
use crate::polling::listener::{PollFailure, PollListener, RetryClass};
use crate::polling::state::{now_millis, PollState};

struct Entry {
    key: SubscriptionKey,
    state: Mutex<PollState>,
}

type Snapshot = Arc<Vec<Arc<Entry>>>;

#[derive(Default)]
struct Control {
    running: bool,
    /// Bumped on every start so a detached worker from an earlier run exits
    generation: u64,
    wake_pending: bool,
}

struct Shared {
    entries: RwLock<Snapshot>,
    control: Mutex<Control>,
    wakeup: Condvar,
    anchor: i64,
    config: PollConfig,
}

impl Shared {
    fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.entries.read())
    }

    fn update(&self, f: impl FnOnce(&mut Vec<Arc<Entry>>)) {
        let mut entries = self.entries.write();
        let mut next = entries.as_ref().clone();
        f(&mut next);
        *entries = Arc::new(next);
    }

    fn wake(&self) {
        self.control.lock().wake_pending = true;
        self.wakeup.notify_all();
    }

    fn is_current(&self, generation: u64) -> bool {
        let control = self.control.lock();
        control.running && control.generation == generation
    }

    /// Milliseconds until the earliest polled field is due
    fn min_remaining(&self, now: i64) -> Option<i64> {
        self.snapshot()
            .iter()
            .filter_map(|entry| {
                let mut state = entry.state.lock();
                state.is_polled().then(|| state.remaining(now))
            })
            .min()
    }
}

struct WorkerHandle {
    join: JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
}

/// Periodically samples registered fields
///
/// # Example
///
/// ```rust,ignore
/// let scheduler = PollScheduler::new(PollConfig::change_only());
/// scheduler.set_field("scale-1", "weight", Duration::from_millis(500))?;
/// scheduler.start(Arc::new(session), Arc::new(my_listener))?;
/// // ...
/// scheduler.stop();
/// ```
pub struct PollScheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl PollScheduler {
    /// Create a stopped scheduler; its creation time anchors every schedule
    pub fn new(config: PollConfig) -> Self {
        Self::with_anchor(config, now_millis())
    }

    /// Create a stopped scheduler with an explicit anchor time (epoch millis)
    pub fn with_anchor(config: PollConfig, anchor: i64) -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: RwLock::new(Arc::new(Vec::new())),
                control: Mutex::new(Control::default()),
                wakeup: Condvar::new(),
                anchor,
                config,
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.shared.config
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Poll a field every `period`; a zero period removes it
    ///
    /// Re-registering replaces the schedule but keeps the last sampled value,
    /// so change-only reporting does not repeat it.
    pub fn set_field(&self, device: &str, field: &str, period: Duration) -> PollingResult<()> {
        self.set_field_with(device, field, period, self.shared.config.event_only_on_change)
    }

    /// [`set_field`](Self::set_field) with a per-field change-only setting
    pub fn set_field_with(
        &self,
        device: &str,
        field: &str,
        period: Duration,
        event_only_on_change: bool,
    ) -> PollingResult<()> {
        let key = SubscriptionKey::try_new(device, field).map_err(|e| match e {
            CaptureError::InvalidArgument(msg) => PollingError::InvalidArgument(msg),
            other => PollingError::InvalidArgument(other.to_string()),
        })?;

        if period.is_zero() {
            self.remove_field(device, field);
            return Ok(());
        }

        let mut state = PollState::new(
            key.clone(),
            period,
            event_only_on_change,
            self.shared.config.failure_backoff,
            self.shared.anchor,
            now_millis(),
        );

        self.shared.update(|entries| {
            match entries.iter().position(|e| e.key == key) {
                Some(index) => {
                    state.set_last_value(entries[index].state.lock().last_value().cloned());
                    entries[index] = Arc::new(Entry {
                        key: key.clone(),
                        state: Mutex::new(state),
                    });
                }
                None => entries.push(Arc::new(Entry {
                    key: key.clone(),
                    state: Mutex::new(state),
                })),
            }
        });

        tracing::debug!("Polling {} every {:?}", key, period);
        self.shared.wake();
        Ok(())
    }

    /// Stop polling one field; unknown fields are ignored
    pub fn remove_field(&self, device: &str, field: &str) {
        self.shared.update(|entries| {
            entries.retain(|e| !(e.key.device() == device && e.key.field() == field))
        });
    }

    /// Stop polling every field of a device
    pub fn remove_fields(&self, device: &str) {
        self.shared
            .update(|entries| entries.retain(|e| e.key.device() != device));
    }

    pub fn clear(&self) {
        self.shared.update(Vec::clear);
    }

    /// Forget a field's failures and re-anchor its schedule
    pub fn reset_failure(&self, device: &str, field: &str) {
        let now = now_millis();
        for entry in self.shared.snapshot().iter() {
            if entry.key.device() == device && entry.key.field() == field {
                let mut state = entry.state.lock();
                state.clear_failures();
                state.reset(self.shared.anchor, now);
            }
        }
        self.shared.wake();
    }

    pub fn contains(&self, device: &str, field: &str) -> bool {
        self.shared
            .snapshot()
            .iter()
            .any(|e| e.key.device() == device && e.key.field() == field)
    }

    pub fn fields(&self) -> Vec<SubscriptionKey> {
        self.shared.snapshot().iter().map(|e| e.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.shared.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current schedule and failure state of every field
    pub fn stats(&self) -> Vec<PollFieldStats> {
        let now = now_millis();
        self.shared
            .snapshot()
            .iter()
            .map(|entry| {
                let state = entry.state.lock();
                PollFieldStats {
                    key: entry.key.clone(),
                    period: state.period(),
                    next_read_in: Duration::from_millis((state.next_read_time() - now).max(0) as u64),
                    failure_count: state.failure_count(),
                    error_state: state.is_error_state(),
                    last_value: state.last_value().cloned(),
                }
            })
            .collect()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the worker; fails if it is already running
    pub fn start(
        &self,
        reader: Arc<dyn FieldReader>,
        listener: Arc<dyn PollListener>,
    ) -> PollingResult<()> {
        let mut worker = self.worker.lock();

        let generation = {
            let mut control = self.shared.control.lock();
            if control.running {
                return Err(PollingError::AlreadyRunning);
            }
            control.running = true;
            control.generation += 1;
            control.wake_pending = false;
            control.generation
        };

        let poll_worker = PollWorker {
            shared: Arc::clone(&self.shared),
            reader,
            listener,
            generation,
        };
        let (done_tx, done_rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name("capture-poll".to_string())
            .spawn(move || {
                poll_worker.run();
                let _ = done_tx.send(());
            });

        match spawned {
            Ok(join) => {
                *worker = Some(WorkerHandle { join, done_rx });
                Ok(())
            }
            Err(e) => {
                self.shared.control.lock().running = false;
                tracing::error!("Failed to spawn poll worker: {}", e);
                Err(PollingError::WorkerSpawn(e))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.control.lock().running
    }

    /// Stop the worker, waiting up to the configured grace period
    ///
    /// Idempotent. A worker still busy after the grace period is detached;
    /// it exits on its own once its current read returns.
    pub fn stop(&self) {
        {
            let mut control = self.shared.control.lock();
            control.running = false;
        }
        self.shared.wakeup.notify_all();

        let Some(handle) = self.worker.lock().take() else {
            return;
        };

        if thread::current().id() == handle.join.thread().id() {
            return;
        }

        let grace = self.shared.config.shutdown_grace;
        match handle.done_rx.recv_timeout(grace) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if handle.join.join().is_err() {
                    tracing::error!("Poll worker terminated abnormally");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!("Poll worker did not stop within {:?}, detaching it", grace);
            }
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Snapshot of one polled field
#[derive(Debug, Clone)]
pub struct PollFieldStats {
    pub key: SubscriptionKey,
    pub period: Duration,
    pub next_read_in: Duration,
    pub failure_count: u32,
    pub error_state: bool,
    pub last_value: Option<Value>,
}

impl fmt::Display for PollFieldStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} every {:?}, next in {:?}, {} failures",
            self.key, self.period, self.next_read_in, self.failure_count
        )?;
        if let Some(value) = &self.last_value {
            write!(f, ", last value {}", value)?;
        }
        Ok(())
    }
}

struct PollWorker {
    shared: Arc<Shared>,
    reader: Arc<dyn FieldReader>,
    listener: Arc<dyn PollListener>,
    generation: u64,
}

impl PollWorker {
    fn run(&self) {
        tracing::info!("Poll worker started");
        while self.wait_until_due() {
            self.read_due_fields();
        }
        tracing::info!("Poll worker stopped");
    }

    /// Sleep until a field is due or a wake-up arrives; false once stopped
    fn wait_until_due(&self) -> bool {
        let delay = self.shared.min_remaining(now_millis());

        let mut control = self.shared.control.lock();
        if !(control.running && control.generation == self.generation) {
            return false;
        }
        if !control.wake_pending && delay != Some(0) {
            match delay {
                Some(ms) => {
                    self.shared
                        .wakeup
                        .wait_for(&mut control, Duration::from_millis(ms as u64));
                }
                None => self.shared.wakeup.wait(&mut control),
            }
        }
        control.wake_pending = false;
        control.running && control.generation == self.generation
    }

    fn read_due_fields(&self) {
        let now = now_millis();
        for entry in self.shared.snapshot().iter() {
            if !entry.state.lock().is_due(now) {
                continue;
            }
            if !self.shared.is_current(self.generation) {
                return;
            }

            match self.read(&entry.key) {
                Ok(value) => {
                    let notify = {
                        let mut state = entry.state.lock();
                        let changed = state.record_success(value.clone(), now_millis());
                        !state.event_only_on_change() || changed
                    };
                    if notify {
                        self.notify_success(&entry.key, &value);
                    }
                }
                Err(error) => {
                    let (first, failure_count, next_in) = {
                        let mut state = entry.state.lock();
                        let now = now_millis();
                        let first = state.record_failure(now);
                        (first, state.failure_count(), state.next_read_time() - now)
                    };
                    if first {
                        tracing::warn!("Failed to read {}: {}", entry.key, error);
                    } else {
                        tracing::debug!("Read of {} still failing: {}", entry.key, error);
                    }

                    self.notify_failure(&PollFailure {
                        key: entry.key.clone(),
                        error,
                        failure_count,
                        retry: RetryClass::Transient {
                            next_attempt_in: Duration::from_millis(next_in.max(0) as u64),
                        },
                    });
                }
            }
        }
    }

    fn read(&self, key: &SubscriptionKey) -> capture_api::Result<Value> {
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.reader.read_value(key.device(), key.field())
        }))
        .unwrap_or_else(|_| Err(CaptureError::operation_failed(format!("read of {} panicked", key))))
    }

    fn notify_success(&self, key: &SubscriptionKey, value: &Value) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.listener.on_success(key, value))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Poll listener failed for {}: {}", key, e),
            Err(_) => tracing::error!("Poll listener panicked for {}", key),
        }
    }

    fn notify_failure(&self, failure: &PollFailure) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.listener.on_failure(failure))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Poll listener failed for {}: {}", failure.key, e),
            Err(_) => tracing::error!("Poll listener panicked for {}", failure.key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture_api::testing::MockProvider;
    use capture_api::BoxError;

    struct Recorder {
        tx: Mutex<mpsc::Sender<Result<Value, u32>>>,
    }

    impl PollListener for Recorder {
        fn on_success(&self, _key: &SubscriptionKey, value: &Value) -> Result<(), BoxError> {
            self.tx.lock().send(Ok(value.clone()))?;
            Ok(())
        }

        fn on_failure(&self, failure: &PollFailure) -> Result<(), BoxError> {
            self.tx.lock().send(Err(failure.failure_count))?;
            Ok(())
        }
    }

    fn recorder() -> (Arc<Recorder>, mpsc::Receiver<Result<Value, u32>>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Recorder { tx: Mutex::new(tx) }), rx)
    }

    #[test]
    fn test_start_twice_fails() {
        let scheduler = PollScheduler::new(PollConfig::default());
        let reader = Arc::new(parking_lot::Mutex::new(MockProvider::new()));
        let (listener, _rx) = recorder();

        scheduler.start(reader.clone(), listener.clone()).unwrap();
        assert!(matches!(
            scheduler.start(reader.clone(), listener.clone()),
            Err(PollingError::AlreadyRunning)
        ));

        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());

        // Restartable after stop
        scheduler.start(reader, listener).unwrap();
        assert!(scheduler.is_running());
    }

    #[test]
    fn test_registration_management() {
        let scheduler = PollScheduler::new(PollConfig::default());
        scheduler.set_field("d1", "f1", Duration::from_millis(100)).unwrap();
        scheduler.set_field("d1", "f2", Duration::from_millis(100)).unwrap();
        scheduler.set_field("d2", "f1", Duration::from_millis(100)).unwrap();
        assert_eq!(scheduler.len(), 3);

        scheduler.set_field("d1", "f1", Duration::ZERO).unwrap();
        assert!(!scheduler.contains("d1", "f1"));

        scheduler.remove_fields("d1");
        assert_eq!(scheduler.fields(), vec![SubscriptionKey::new("d2", "f1")]);

        scheduler.remove_field("nope", "nope");
        scheduler.clear();
        assert!(scheduler.is_empty());

        assert!(matches!(
            scheduler.set_field("", "f1", Duration::from_millis(100)),
            Err(PollingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_reregistration_keeps_last_value() {
        let mock = MockProvider::new();
        mock.set_fixed_value("d1", "f1", "A");
        let scheduler = PollScheduler::new(PollConfig::change_only());
        let (listener, rx) = recorder();

        scheduler.set_field("d1", "f1", Duration::from_millis(20)).unwrap();
        scheduler
            .start(Arc::new(parking_lot::Mutex::new(mock)), listener)
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Ok(Value::from("A")));

        scheduler.set_field("d1", "f1", Duration::from_millis(30)).unwrap();
        assert_eq!(
            scheduler.stats()[0].last_value,
            Some(Value::from("A"))
        );
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_failure_callbacks_every_time_with_count() {
        let mock = MockProvider::new();
        mock.set_fail_reads(true);
        let scheduler = PollScheduler::new(PollConfig::default().without_backoff());
        let (listener, rx) = recorder();

        scheduler.set_field("d1", "f1", Duration::from_millis(20)).unwrap();
        scheduler
            .start(Arc::new(parking_lot::Mutex::new(mock)), listener)
            .unwrap();

        for _ in 0..3 {
            // Without backoff the count stays at zero but every failure is reported
            assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Err(0));
        }
        assert!(scheduler.stats()[0].error_state);
    }

    #[test]
    fn test_reset_failure_clears_backoff() {
        let mock = MockProvider::new();
        mock.set_fail_reads(true);
        let scheduler = PollScheduler::new(PollConfig::default());
        let (listener, rx) = recorder();

        scheduler.set_field("d1", "f1", Duration::from_millis(20)).unwrap();
        scheduler
            .start(Arc::new(parking_lot::Mutex::new(mock.clone())), listener)
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Err(1));

        // Backed off by at least a second now
        assert!(scheduler.stats()[0].next_read_in > Duration::from_millis(500));

        mock.set_fail_reads(false);
        mock.set_fixed_value("d1", "f1", 7);
        scheduler.reset_failure("d1", "f1");
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Ok(Value::from(7)));
        assert_eq!(scheduler.stats()[0].failure_count, 0);
    }
}
