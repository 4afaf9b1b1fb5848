//! Shares one in-memory provider between a stream consumer and a report feed.
//!
//! Run with `CAPTURE_LOG_MODE=development cargo run --example basic_capture`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use capture_sdk::logging::init_logging_from_env;
use capture_sdk::prelude::*;
use capture_sdk::PERIOD_PROPERTY;

fn main() -> Result<(), SdkError> {
    init_logging_from_env()?;

    let registry = std::env::temp_dir().join("capture-sdk-demo").join("registry.json");
    let config = CaptureConfig::default()
        .with_source_id("demo")
        .with_registry_path(registry);
    let (system, provider) = CaptureSystem::with_memory_provider(config)?;

    let admin = system.session();
    admin.add(
        Device::new("scale-1", "Bench scale")
            .with_usable(true)
            .with_field(Field::new("weight", "Weight"))
            .with_field(Field::new("temperature", "Temperature").with_property(PERIOD_PROPERTY, "250")),
    )?;

    let stream = system.open_stream("console");
    stream.subscribe("scale-1", "weight")?;

    let sink: Arc<dyn ReportSink> = Arc::new(|n: Notification| -> Result<(), capture_sdk::BoxError> {
        println!("report: {}", n);
        Ok(())
    });
    let feed = system.report_feed("cycle-1", sink);
    feed.add_field_subscription("scale-1", "weight")?;
    feed.add_field_subscription("scale-1", "temperature")?;
    feed.enable()?;

    let simulator = {
        let provider = provider.clone();
        thread::spawn(move || {
            for i in 0..5 {
                let _ = provider.push_value("scale-1", "weight", 10.0 + f64::from(i));
                let _ = provider.push_value("scale-1", "temperature", 20 + i / 2);
                thread::sleep(Duration::from_millis(200));
            }
        })
    };

    for event in stream.timeout_iter(Duration::from_secs(1)) {
        println!("stream: {:?}", event);
    }

    let _ = simulator.join();
    feed.dispose();
    system.shutdown();
    Ok(())
}
