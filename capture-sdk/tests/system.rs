use std::time::Duration;

use capture_sdk::prelude::*;
use capture_sdk::DeviceRegistry;

const WAIT: Duration = Duration::from_secs(2);

fn system(dir: &tempfile::TempDir) -> (CaptureSystem, MemoryProvider) {
    let config = CaptureConfig::default().with_registry_path(dir.path().join("registry.json"));
    CaptureSystem::with_memory_provider(config).unwrap()
}

#[test]
fn stream_sees_provider_changes() {
    let dir = tempfile::tempdir().unwrap();
    let (system, provider) = system(&dir);
    let admin = system.session();
    admin
        .add(
            Device::new("scale", "Scale")
                .with_usable(true)
                .with_field(Field::new("weight", "Weight")),
        )
        .unwrap();

    let stream = system.open_stream("dashboard");
    stream.subscribe("scale", "weight").unwrap();
    provider.push_value("scale", "weight", 3).unwrap();
    provider.set_usable("scale", false).unwrap();

    let first = stream.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(first, CaptureEvent::value_changed("scale", "weight", 3));
    let second = stream.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(second, CaptureEvent::device_usability("scale", false));
}

#[test]
fn labels_persist_and_mark_customized() {
    let dir = tempfile::tempdir().unwrap();
    let (system, _provider) = system(&dir);
    let session = system.session();
    session.add(Device::new("scale", "Scale")).unwrap();
    session.set_label("scale", Some("Bench scale".into())).unwrap();

    let registry = DeviceRegistry::open(dir.path().join("registry.json")).unwrap();
    let device = registry.device("scale").unwrap();
    assert_eq!(device.label.as_deref(), Some("Bench scale"));
    assert!(device.customized);
}

#[test]
fn provider_closes_with_last_session() {
    let dir = tempfile::tempdir().unwrap();
    let (system, provider) = system(&dir);

    let a = system.session();
    let b = system.session();
    assert!(provider.is_open());
    drop(a);
    assert!(provider.is_open());
    drop(b);
    assert!(!provider.is_open());

    system.shutdown();
}
