//! Cross-module checks on events, keys and the device document format.

use capture_api::prelude::*;
use proptest::prelude::*;
use rstest::rstest;
use serde_json::json;

#[rstest]
#[case(CaptureEvent::device_usability("d1", true), "deviceUsabilityChanged", None)]
#[case(CaptureEvent::field_usability("d1", "f1", false), "fieldUsabilityChanged", None)]
#[case(
    CaptureEvent::value_changed("d1", "f1", 7),
    "fieldValueChanged",
    Some(SubscriptionKey::new("d1", "f1"))
)]
fn event_tag_and_routing(
    #[case] event: CaptureEvent,
    #[case] tag: &str,
    #[case] key: Option<SubscriptionKey>,
) {
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], json!(tag));
    assert_eq!(json["device"], json!("d1"));
    assert_eq!(event.routing_key(), key);
}

#[test]
fn device_document_keeps_fields_and_customized_flag() {
    let mut device = Device::new("d1", "Scale")
        .with_field(Field::new("weight", "Weight").with_property("capture.period", "500"));
    device.customized = true;
    device.label = Some("Dock scale".into());

    let text = serde_json::to_string_pretty(&device).unwrap();
    let back: Device = serde_json::from_str(&text).unwrap();

    assert_eq!(back, device);
    assert_eq!(
        back.field("weight").and_then(|f| f.property("capture.period")),
        Some("500")
    );
}

proptest! {
    #[test]
    fn value_events_route_to_their_own_key(
        device in "[a-z0-9]{1,8}",
        field in "[a-z0-9]{1,8}",
        value in any::<i64>(),
    ) {
        let event = CaptureEvent::value_changed(device.clone(), field.clone(), value);
        let key = SubscriptionKey::try_new(device.clone(), field.clone()).unwrap();

        prop_assert_eq!(event.routing_key(), Some(key));
        prop_assert_eq!(event.device(), device.as_str());

        let back: CaptureEvent =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        prop_assert_eq!(back.value(), Some(&json!(value)));
    }
}
