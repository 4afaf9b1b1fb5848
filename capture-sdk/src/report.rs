//! The boundary to a report engine
//!
//! A report engine decides what to do with observed changes (windows,
//! cycles, repeats). This crate only tells it that something changed.

use std::fmt;

use capture_api::{BoxError, SubscriptionKey, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an observed value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationOrigin {
    /// Pushed by the provider
    Pushed,
    /// Sampled by the poll scheduler
    Polled,
}

/// One observed field change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub source: String,
    pub device: String,
    pub field: String,
    pub value: Value,
    pub timestamp: DateTime<Utc>,
    pub origin: NotificationOrigin,
}

impl Notification {
    pub fn new(
        source: impl Into<String>,
        key: &SubscriptionKey,
        value: Value,
        origin: NotificationOrigin,
    ) -> Self {
        Self {
            source: source.into(),
            device: key.device().to_string(),
            field: key.field().to_string(),
            value,
            timestamp: Utc::now(),
            origin,
        }
    }

    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.device.clone(), self.field.clone())
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}/{} = {} at {}",
            self.source,
            self.device,
            self.field,
            self.value,
            self.timestamp.to_rfc3339()
        )
    }
}

/// Receives notifications from a [`ReportFeed`](crate::ReportFeed)
///
/// Called on worker threads; errors are logged and dropped.
pub trait ReportSink: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), BoxError>;
}

impl<F> ReportSink for F
where
    F: Fn(Notification) -> Result<(), BoxError> + Send + Sync,
{
    fn notify(&self, notification: Notification) -> Result<(), BoxError> {
        self(notification)
    }
}
