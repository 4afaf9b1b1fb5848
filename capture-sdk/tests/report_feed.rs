use std::sync::{mpsc, Arc};
use std::time::Duration;

use capture_api::BoxError;
use capture_sdk::prelude::*;
use capture_sdk::{NotificationOrigin, PERIOD_PROPERTY};
use parking_lot::Mutex;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(3);

struct Fixture {
    system: CaptureSystem,
    provider: MemoryProvider,
    _dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = CaptureConfig::default()
        .with_source_id("test")
        .with_registry_path(dir.path().join("registry.json"));
    let (system, provider) = CaptureSystem::with_memory_provider(config).unwrap();

    let session = system.session();
    session
        .add(
            Device::new("scale", "Scale")
                .with_usable(true)
                .with_field(Field::new("weight", "Weight"))
                .with_field(Field::new("temp", "Temperature").with_property(PERIOD_PROPERTY, "20")),
        )
        .unwrap();

    Fixture {
        system,
        provider,
        _dir: dir,
    }
}

fn channel_sink() -> (Arc<dyn ReportSink>, mpsc::Receiver<Notification>) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let sink: Arc<dyn ReportSink> = Arc::new(move |n: Notification| -> Result<(), BoxError> {
        tx.lock().send(n)?;
        Ok(())
    });
    (sink, rx)
}

#[test]
fn pushed_and_polled_changes_reach_the_sink() {
    let f = fixture();
    let (sink, rx) = channel_sink();
    let feed = f.system.report_feed("cycle-7", sink);
    feed.add_field_subscription("scale", "weight").unwrap();
    feed.add_field_subscription("scale", "temp").unwrap();
    f.provider.push_value("scale", "temp", 21).unwrap();

    feed.enable().unwrap();
    assert_eq!(feed.poller().len(), 1);

    f.provider.push_value("scale", "weight", 80).unwrap();

    let mut pushed = None;
    let mut polled = None;
    while pushed.is_none() || polled.is_none() {
        let n = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(n.source, "cycle-7");
        match (n.field.as_str(), n.origin) {
            ("weight", NotificationOrigin::Pushed) => pushed = Some(n.value),
            ("temp", NotificationOrigin::Polled) => polled = Some(n.value),
            _ => {}
        }
    }
    assert_eq!(pushed, Some(Value::from(80)));
    assert_eq!(polled, Some(Value::from(21)));
}

#[test]
fn disabled_feed_is_silent() {
    let f = fixture();
    let (sink, rx) = channel_sink();
    let feed = f.system.report_feed("cycle-1", sink);
    feed.add_field_subscription("scale", "weight").unwrap();
    feed.enable().unwrap();
    feed.disable();

    f.provider.push_value("scale", "weight", 1).unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert!(!feed.poller().is_running());
}

#[test]
fn subscription_added_while_enabled_takes_effect() {
    let f = fixture();
    let (sink, rx) = channel_sink();
    let feed = f.system.report_feed("cycle-2", sink);
    feed.enable().unwrap();

    assert!(feed.add_field_subscription("scale", "weight").unwrap());
    f.provider.push_value("scale", "weight", 5).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().value, Value::from(5));

    assert!(feed.remove_field_subscription("scale", "weight").unwrap());
    assert!(f.system.manager().subscribed_keys().is_empty());
}

#[test]
fn unknown_field_rolls_back_every_subscription() {
    let f = fixture();
    let (sink, _rx) = channel_sink();
    let feed = f.system.report_feed("cycle-3", sink);
    feed.add_field_subscription("scale", "weight").unwrap();
    feed.add_field_subscription("scale", "missing").unwrap();

    let err = feed.enable().unwrap_err();
    assert!(err.is_not_found());
    assert!(!feed.is_enabled());
    assert!(f.system.manager().subscribed_keys().is_empty());
}
