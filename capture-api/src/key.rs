//! Subscription key type

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, Result};

/// Identifies a subscribable field: a (device id, field id) pair
///
/// Compared and hashed by value, so two keys built from equal strings are the
/// same key no matter where they came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
    device: String,
    field: String,
}

impl SubscriptionKey {
    /// Creates a key without validation
    pub fn new(device: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            field: field.into(),
        }
    }

    /// Creates a key, rejecting empty device or field ids
    pub fn try_new(device: impl Into<String>, field: impl Into<String>) -> Result<Self> {
        let key = Self::new(device, field);
        if key.device.is_empty() {
            return Err(CaptureError::InvalidArgument(
                "device id must not be empty".to_string(),
            ));
        }
        if key.field.is_empty() {
            return Err(CaptureError::InvalidArgument(
                "field id must not be empty".to_string(),
            ));
        }
        Ok(key)
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.field)
    }
}

impl<D: Into<String>, F: Into<String>> From<(D, F)> for SubscriptionKey {
    fn from((device, field): (D, F)) -> Self {
        SubscriptionKey::new(device, field)
    }
}
