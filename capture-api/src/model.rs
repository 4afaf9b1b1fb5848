//! Device and field model
//!
//! Plain data types shared by providers, the configuration registry and the
//! event manager. They serialize to the persisted registry document, so the
//! difference between an absent and an empty property map is preserved.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Property map attached to providers, devices and fields
pub type Properties = HashMap<String, String>;

/// A physical sensor/actuator device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Unique within a provider's device set
    pub id: String,

    pub name: String,

    /// User-assigned label overriding `name` for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default)]
    pub usable: bool,

    /// Set once a management call changed the label or a property.
    /// Only removing the device clears it.
    #[serde(default)]
    pub customized: bool,

    /// `None` and `Some(empty)` are distinct states
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,

    #[serde(default)]
    pub fields: HashMap<String, Field>,
}

impl Device {
    /// Create a device with an id and a name and nothing else
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_usable(mut self, usable: bool) -> Self {
        self.usable = usable;
        self
    }

    /// Builder-style helper adding a field keyed by its id
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.insert(field.id.clone(), field);
        self
    }

    /// Builder-style helper setting one device property
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn field(&self, field: &str) -> Option<&Field> {
        self.fields.get(field)
    }

    pub fn field_mut(&mut self, field: &str) -> Option<&mut Field> {
        self.fields.get_mut(field)
    }

    /// Label if set, otherwise the name
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.as_ref()?.get(name).map(String::as_str)
    }
}

/// A readable/writable value slot on a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
}

impl Field {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.as_ref()?.get(name).map(String::as_str)
    }
}
