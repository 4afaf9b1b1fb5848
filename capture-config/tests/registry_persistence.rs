use std::collections::HashMap;

use capture_api::{CaptureError, Device, Field};
use capture_config::prelude::*;
use proptest::prelude::*;

#[test]
fn document_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conf").join("registry.json");

    let registry = DeviceRegistry::open(&path).unwrap();
    registry
        .add(Device::new("d1", "Scale").with_field(Field::new("weight", "Weight")))
        .unwrap();
    registry.add(Device::new("d2", "Lamp")).unwrap();
    registry.set_property("site", "dock-3").unwrap();
    registry
        .set_field_label("d1", "weight", Some("Net weight".into()))
        .unwrap();

    let reopened = DeviceRegistry::open(&path).unwrap();
    assert_eq!(reopened.snapshot(), registry.snapshot());
    assert_eq!(reopened.properties().get("site").map(String::as_str), Some("dock-3"));
    assert!(reopened.device("d1").unwrap().customized);
    assert!(!reopened.device("d2").unwrap().customized);
}

#[test]
fn registry_errors_convert_to_capture_errors() {
    let dir = tempfile::tempdir().unwrap();
    let registry = DeviceRegistry::open(dir.path().join("registry.json")).unwrap();

    let err: CaptureError = registry.set_label("ghost", None).unwrap_err().into();
    assert!(matches!(err, CaptureError::DeviceNotFound(ref id) if id == "ghost"));
}

#[test]
fn set_properties_replaces_whole_map() {
    let dir = tempfile::tempdir().unwrap();
    let registry = DeviceRegistry::open(dir.path().join("registry.json")).unwrap();
    registry.set_property("a", "1").unwrap();

    let mut replacement = HashMap::new();
    replacement.insert("b".to_string(), "2".to_string());
    registry.set_properties(replacement.clone()).unwrap();

    assert_eq!(registry.properties(), replacement);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn customized_is_sticky_across_management_calls(
        ops in proptest::collection::vec(0u8..4, 1..12)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let registry = DeviceRegistry::open(dir.path().join("registry.json")).unwrap();
        registry
            .add(Device::new("d1", "Scale").with_field(Field::new("f1", "F1")))
            .unwrap();
        registry.set_label("d1", Some("x".into())).unwrap();

        for op in ops {
            match op {
                0 => registry.set_label("d1", None).unwrap(),
                1 => registry.set_device_property("d1", "k", "v").unwrap(),
                2 => registry.add(Device::new("d1", "Scale")).unwrap(),
                _ => registry.save().unwrap(),
            }
            prop_assert!(registry.device("d1").unwrap().customized);
        }
    }
}
