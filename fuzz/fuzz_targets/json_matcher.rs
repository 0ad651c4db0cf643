#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use cetrack_core::event::{CloudEventHeaders, RecordedEvent};
use cetrack_tracker::Matcher;
use cetrack_tracker::matcher::{data_contains, data_json_field, heartbeat_message};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    pointer: String,
    expected: String,
    payload: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let event = RecordedEvent::new(
        1,
        CloudEventHeaders::new("1", "/fuzz", "fuzz").with_data_content_type("application/json"),
        Bytes::from(input.payload),
    );

    let field = data_json_field(input.pointer.clone(), serde_json::Value::String(input.expected.clone()));
    let _ = field.evaluate(&event);
    let _ = data_contains(input.expected.clone()).evaluate(&event);

    // 매칭 결과와 불일치 목록은 항상 일관적
    let heartbeat = heartbeat_message(input.expected);
    assert_eq!(heartbeat.matches(&event), heartbeat.evaluate(&event).is_ok());
});
