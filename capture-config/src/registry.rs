//! Persisted device registry
//!
//! [`DeviceRegistry`] holds the provider-wide property map and the device map
//! as one document. Label and property changes mark the device as customized
//! and save immediately. `add` and `remove` only touch memory; callers save
//! explicitly when they are done reconciling devices.
//!
//! When a save fails the in-memory change is rolled back, so memory and disk
//! never disagree about a mutation the caller was told failed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use capture_api::{Device, Field, Properties};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::persist;

/// On-disk document: properties map plus devices map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub properties: Properties,

    #[serde(default)]
    pub devices: HashMap<String, Device>,
}

/// Device registry backed by a JSON file
pub struct DeviceRegistry {
    path: PathBuf,
    document: Mutex<RegistryDocument>,
}

impl DeviceRegistry {
    /// Empty registry that will save to `path`; nothing is read
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            document: Mutex::new(RegistryDocument::default()),
        }
    }

    /// Load the registry from `path`; a missing file yields an empty registry
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = persist::read_json::<RegistryDocument>(&path)?.unwrap_or_default();
        tracing::debug!(
            "Opened registry {} with {} devices",
            path.display(),
            document.devices.len()
        );
        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the whole document
    pub fn snapshot(&self) -> RegistryDocument {
        self.document.lock().clone()
    }

    /// Write the current document to disk
    pub fn save(&self) -> Result<()> {
        let document = self.document.lock();
        persist::write_json_atomic(&self.path, &*document)
    }

    // ========================================================================
    // Provider-wide properties
    // ========================================================================

    pub fn properties(&self) -> Properties {
        self.document.lock().properties.clone()
    }

    pub fn set_properties(&self, properties: Properties) -> Result<()> {
        self.mutate_and_save(|doc| {
            doc.properties = properties;
            Ok(())
        })
    }

    pub fn set_property(&self, name: &str, value: &str) -> Result<()> {
        check_name(name)?;
        self.mutate_and_save(|doc| {
            doc.properties.insert(name.to_string(), value.to_string());
            Ok(())
        })
    }

    // ========================================================================
    // Devices
    // ========================================================================

    pub fn devices(&self) -> HashMap<String, Device> {
        self.document.lock().devices.clone()
    }

    pub fn device(&self, device: &str) -> Option<Device> {
        self.document.lock().devices.get(device).cloned()
    }

    pub fn contains(&self, device: &str) -> bool {
        self.document.lock().devices.contains_key(device)
    }

    pub fn label(&self, device: &str) -> Result<Option<String>> {
        let document = self.document.lock();
        let found = document
            .devices
            .get(device)
            .ok_or_else(|| ConfigError::DeviceNotFound(device.to_string()))?;
        Ok(found.label.clone())
    }

    pub fn set_label(&self, device: &str, label: Option<String>) -> Result<()> {
        self.mutate_device(device, |d| {
            d.label = label;
            Ok(())
        })
    }

    pub fn field_label(&self, device: &str, field: &str) -> Result<Option<String>> {
        let document = self.document.lock();
        let found = document
            .devices
            .get(device)
            .ok_or_else(|| ConfigError::DeviceNotFound(device.to_string()))?;
        found
            .field(field)
            .map(|f| f.label.clone())
            .ok_or_else(|| ConfigError::field_not_found(device, field))
    }

    pub fn set_field_label(&self, device: &str, field: &str, label: Option<String>) -> Result<()> {
        self.mutate_field(device, field, |f| f.label = label)
    }

    pub fn set_device_property(&self, device: &str, name: &str, value: &str) -> Result<()> {
        check_name(name)?;
        self.mutate_device(device, |d| {
            d.properties
                .get_or_insert_with(HashMap::new)
                .insert(name.to_string(), value.to_string());
            Ok(())
        })
    }

    pub fn set_field_property(
        &self,
        device: &str,
        field: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        check_name(name)?;
        self.mutate_field(device, field, |f| {
            f.properties
                .get_or_insert_with(HashMap::new)
                .insert(name.to_string(), value.to_string());
        })
    }

    /// Insert or replace a device; not saved
    ///
    /// Replacing a customized device keeps the flag set.
    pub fn add(&self, mut device: Device) -> Result<()> {
        if device.id.is_empty() {
            return Err(ConfigError::InvalidArgument(
                "device id must not be empty".to_string(),
            ));
        }
        let mut document = self.document.lock();
        if let Some(previous) = document.devices.get(&device.id) {
            device.customized |= previous.customized;
        }
        tracing::debug!("Registry add {}", device.id);
        document.devices.insert(device.id.clone(), device);
        Ok(())
    }

    /// Drop a device and with it the customized flag; not saved
    pub fn remove(&self, device: &str) -> Option<Device> {
        let removed = self.document.lock().devices.remove(device);
        if removed.is_some() {
            tracing::debug!("Registry remove {}", device);
        }
        removed
    }

    /// Like [`add`](Self::add), then save; a failed save restores the
    /// previous document exactly
    pub fn add_and_save(&self, mut device: Device) -> Result<()> {
        if device.id.is_empty() {
            return Err(ConfigError::InvalidArgument(
                "device id must not be empty".to_string(),
            ));
        }
        self.mutate_and_save(|doc| {
            if let Some(previous) = doc.devices.get(&device.id) {
                device.customized |= previous.customized;
            }
            tracing::debug!("Registry add {}", device.id);
            doc.devices.insert(device.id.clone(), device);
            Ok(())
        })
    }

    /// Like [`remove`](Self::remove), then save; a failed save puts the
    /// device back untouched
    pub fn remove_and_save(&self, device: &str) -> Result<Device> {
        let mut removed = None;
        self.mutate_and_save(|doc| {
            let found = doc
                .devices
                .remove(device)
                .ok_or_else(|| ConfigError::DeviceNotFound(device.to_string()))?;
            tracing::debug!("Registry remove {}", device);
            removed = Some(found);
            Ok(())
        })?;
        removed.ok_or_else(|| ConfigError::DeviceNotFound(device.to_string()))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn mutate_device(
        &self,
        device: &str,
        f: impl FnOnce(&mut Device) -> Result<()>,
    ) -> Result<()> {
        self.mutate_and_save(|doc| {
            let found = doc
                .devices
                .get_mut(device)
                .ok_or_else(|| ConfigError::DeviceNotFound(device.to_string()))?;
            f(found)?;
            found.customized = true;
            Ok(())
        })
    }

    fn mutate_field(&self, device: &str, field: &str, f: impl FnOnce(&mut Field)) -> Result<()> {
        self.mutate_device(device, |d| {
            let found = d
                .field_mut(field)
                .ok_or_else(|| ConfigError::field_not_found(device, field))?;
            f(found);
            Ok(())
        })
    }

    /// Apply `f` and save; restore the previous document if either step fails
    fn mutate_and_save(&self, f: impl FnOnce(&mut RegistryDocument) -> Result<()>) -> Result<()> {
        let mut document = self.document.lock();
        let previous = document.clone();

        let result = f(&mut document)
            .and_then(|()| persist::write_json_atomic(&self.path, &*document));

        if let Err(e) = result {
            *document = previous;
            if matches!(e, ConfigError::Persist { .. }) {
                tracing::warn!("Rolled back registry change: {}", e);
            }
            return Err(e);
        }
        Ok(())
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ConfigError::InvalidArgument(
            "property name must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    fn scale() -> Device {
        Device::new("d1", "Scale").with_field(Field::new("weight", "Weight"))
    }

    fn registry_in(dir: &tempfile::TempDir) -> DeviceRegistry {
        let registry = DeviceRegistry::open(dir.path().join("registry.json")).unwrap();
        registry.add(scale()).unwrap();
        registry
    }

    #[test]
    fn test_missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DeviceRegistry::open(dir.path().join("absent.json")).unwrap();
        assert!(registry.devices().is_empty());
        assert!(registry.properties().is_empty());
    }

    #[test]
    fn test_set_label_marks_customized_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);

        registry.set_label("d1", Some("Dock scale".into())).unwrap();

        let reopened = DeviceRegistry::open(registry.path()).unwrap();
        let device = reopened.device("d1").unwrap();
        assert_eq!(device.label.as_deref(), Some("Dock scale"));
        assert!(device.customized);
    }

    #[test]
    fn test_add_and_remove_do_not_save() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);
        assert!(!registry.path().exists());

        registry.save().unwrap();
        registry.remove("d1");
        let reopened = DeviceRegistry::open(registry.path()).unwrap();
        assert!(reopened.contains("d1"));
    }

    #[test]
    fn test_customized_survives_replacement_but_not_removal() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);
        registry.set_device_property("d1", "port", "COM1").unwrap();

        registry.add(scale()).unwrap();
        assert!(registry.device("d1").unwrap().customized);

        registry.remove("d1");
        registry.add(scale()).unwrap();
        assert!(!registry.device("d1").unwrap().customized);
    }

    #[rstest]
    #[case("missing", "weight")]
    #[case("d1", "missing")]
    fn test_field_operations_report_not_found(#[case] device: &str, #[case] field: &str) {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);

        let err = registry.set_field_label(device, field, None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DeviceNotFound(_) | ConfigError::FieldNotFound { .. }
        ));
        assert!(registry.field_label(device, field).is_err());
    }

    #[test]
    fn test_empty_property_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);

        assert!(matches!(
            registry.set_property("", "x"),
            Err(ConfigError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.set_field_property("d1", "weight", "", "x"),
            Err(ConfigError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_failed_save_rolls_back_memory() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);
        fs::create_dir(registry.path()).unwrap();
        fs::write(registry.path().join("blocker"), b"x").unwrap();

        let err = registry.set_label("d1", Some("new".into())).unwrap_err();
        assert!(matches!(err, ConfigError::Persist { .. }));

        let device = registry.device("d1").unwrap();
        assert!(device.label.is_none());
        assert!(!device.customized);
    }

    #[test]
    fn test_failed_add_and_save_restores_previous_device() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);
        fs::create_dir(registry.path()).unwrap();
        fs::write(registry.path().join("blocker"), b"x").unwrap();

        let mut replacement = scale();
        replacement.label = Some("Bench".into());
        replacement.customized = true;
        assert!(registry.add_and_save(replacement).is_err());

        let device = registry.device("d1").unwrap();
        assert!(device.label.is_none());
        assert!(!device.customized);

        assert!(registry.remove_and_save("d1").is_err());
        assert!(registry.contains("d1"));
    }

    #[test]
    fn test_remove_and_save_persists() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);
        registry.save().unwrap();

        assert_eq!(registry.remove_and_save("d1").unwrap().id, "d1");
        assert!(registry.remove_and_save("d1").is_err());

        let reopened = DeviceRegistry::open(registry.path()).unwrap();
        assert!(!reopened.contains("d1"));
    }

    #[test]
    fn test_field_property_preserves_absent_vs_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry_in(&dir);
        assert!(registry.device("d1").unwrap().properties.is_none());

        registry
            .set_field_property("d1", "weight", "capture.period", "250")
            .unwrap();
        let device = registry.device("d1").unwrap();
        assert!(device.properties.is_none());
        assert_eq!(
            device.field("weight").unwrap().property("capture.period"),
            Some("250")
        );
    }
}
