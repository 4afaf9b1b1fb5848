//! Feeding observed changes to a report engine
//!
//! A [`ReportFeed`] owns one session and one poll scheduler. While enabled it
//! subscribes every configured field, polls the ones that carry a
//! [`PERIOD_PROPERTY`], and forwards each change to a [`ReportSink`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use capture_api::{BoxError, CaptureError, CaptureEvent, Result, SubscriptionKey, Value};
use capture_event_manager::{EventListener, Session};
use capture_stream::{PollConfig, PollListener, PollScheduler};
use parking_lot::Mutex;

use crate::report::{Notification, NotificationOrigin, ReportSink};

/// Field property holding the poll period in milliseconds
pub const PERIOD_PROPERTY: &str = "capture.period";

struct FeedListener {
    source: String,
    sink: Arc<dyn ReportSink>,
}

impl FeedListener {
    fn forward(
        &self,
        key: &SubscriptionKey,
        value: &Value,
        origin: NotificationOrigin,
    ) -> std::result::Result<(), BoxError> {
        self.sink
            .notify(Notification::new(self.source.clone(), key, value.clone(), origin))
    }
}

impl EventListener for FeedListener {
    fn on_event(&self, event: &CaptureEvent) -> std::result::Result<(), BoxError> {
        let CaptureEvent::FieldValueChanged { device, field, value } = event else {
            return Ok(());
        };
        if device.is_empty() || field.is_empty() {
            tracing::debug!("Ignoring value change without device or field id");
            return Ok(());
        }
        let key = SubscriptionKey::new(device.clone(), field.clone());
        self.forward(&key, value, NotificationOrigin::Pushed)
    }
}

impl PollListener for FeedListener {
    fn on_success(&self, key: &SubscriptionKey, value: &Value) -> std::result::Result<(), BoxError> {
        self.forward(key, value, NotificationOrigin::Polled)
    }
}

/// Subscribes and polls a set of fields on behalf of a report engine
pub struct ReportFeed {
    listener: Arc<FeedListener>,
    session: Arc<Session>,
    poller: PollScheduler,
    keys: Mutex<BTreeSet<SubscriptionKey>>,
    enabled: Mutex<bool>,
}

impl ReportFeed {
    pub fn new(
        source_id: impl Into<String>,
        session: Session,
        sink: Arc<dyn ReportSink>,
        poll_config: PollConfig,
    ) -> Self {
        Self {
            listener: Arc::new(FeedListener {
                source: source_id.into(),
                sink,
            }),
            session: Arc::new(session),
            poller: PollScheduler::new(poll_config),
            keys: Mutex::new(BTreeSet::new()),
            enabled: Mutex::new(false),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.listener.source
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn poller(&self) -> &PollScheduler {
        &self.poller
    }

    pub fn is_enabled(&self) -> bool {
        *self.enabled.lock()
    }

    /// Configured fields, sorted
    pub fn field_subscriptions(&self) -> Vec<SubscriptionKey> {
        self.keys.lock().iter().cloned().collect()
    }

    /// Add a field; while enabled it is subscribed (and polled) right away
    ///
    /// Returns false when the field was already configured.
    pub fn add_field_subscription(&self, device: &str, field: &str) -> Result<bool> {
        let key = SubscriptionKey::try_new(device, field)?;
        let enabled = self.enabled.lock();

        if !self.keys.lock().insert(key.clone()) {
            return Ok(false);
        }
        if *enabled {
            if let Err(e) = self.session.subscribe(device, field) {
                self.keys.lock().remove(&key);
                return Err(e);
            }
            self.configure_polling(std::slice::from_ref(&key));
            self.start_polling()?;
        }
        Ok(true)
    }

    /// Remove a field; while enabled it is unsubscribed right away
    pub fn remove_field_subscription(&self, device: &str, field: &str) -> Result<bool> {
        let key = SubscriptionKey::new(device, field);
        let enabled = self.enabled.lock();

        if !self.keys.lock().remove(&key) {
            return Ok(false);
        }
        if *enabled {
            self.poller.remove_field(device, field);
            self.session.unsubscribe(device, field)?;
        }
        Ok(true)
    }

    /// Start reporting
    ///
    /// Subscribes every configured field. If any subscription fails, all of
    /// them are released again and the error is returned.
    pub fn enable(&self) -> Result<()> {
        let mut enabled = self.enabled.lock();
        if *enabled {
            return Ok(());
        }

        let keys = self.field_subscriptions();
        self.session.set_listener(self.listener.clone());

        for key in &keys {
            if let Err(e) = self.session.subscribe(key.device(), key.field()) {
                tracing::error!(
                    "Report {} could not subscribe {}, rolling back: {}",
                    self.source_id(),
                    key,
                    e
                );
                self.rollback(&keys);
                return Err(e);
            }
        }

        self.configure_polling(&keys);
        if let Err(e) = self.start_polling() {
            self.rollback(&keys);
            return Err(e);
        }

        *enabled = true;
        tracing::info!(
            "Report {} enabled: {} fields, {} polled",
            self.source_id(),
            keys.len(),
            self.poller.len()
        );
        Ok(())
    }

    /// Stop reporting; the configured fields are kept
    pub fn disable(&self) {
        let mut enabled = self.enabled.lock();
        if !*enabled {
            return;
        }
        self.rollback(&self.field_subscriptions());
        *enabled = false;
        tracing::info!("Report {} disabled", self.source_id());
    }

    /// Disable and close the session
    pub fn dispose(&self) {
        self.disable();
        self.session.close();
    }

    fn rollback(&self, keys: &[SubscriptionKey]) {
        self.poller.stop();
        self.poller.clear();
        self.session.clear_listener();
        for key in keys {
            if let Err(e) = self.session.unsubscribe(key.device(), key.field()) {
                tracing::warn!("Report {} failed to unsubscribe {}: {}", self.source_id(), key, e);
            }
        }
    }

    fn configure_polling(&self, keys: &[SubscriptionKey]) {
        let devices = match self.session.devices() {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!("Report {} cannot read poll periods: {}", self.source_id(), e);
                return;
            }
        };

        for key in keys {
            let Some(period) = devices
                .get(key.device())
                .and_then(|device| device.field(key.field()))
                .and_then(|field| field.property(PERIOD_PROPERTY))
            else {
                continue;
            };

            match period.trim().parse::<u64>() {
                Ok(0) => {}
                Ok(ms) => {
                    if let Err(e) =
                        self.poller
                            .set_field(key.device(), key.field(), Duration::from_millis(ms))
                    {
                        tracing::warn!("Report {} cannot poll {}: {}", self.source_id(), key, e);
                    }
                }
                Err(_) => tracing::warn!(
                    "Ignoring invalid {} '{}' on {}",
                    PERIOD_PROPERTY,
                    period,
                    key
                ),
            }
        }
    }

    fn start_polling(&self) -> Result<()> {
        if self.poller.is_empty() || self.poller.is_running() {
            return Ok(());
        }
        self.poller
            .start(self.session.clone(), self.listener.clone())
            .map_err(|e| CaptureError::operation_failed_with("starting poll scheduler", e))
    }
}

impl Drop for ReportFeed {
    fn drop(&mut self) {
        self.dispose();
    }
}
