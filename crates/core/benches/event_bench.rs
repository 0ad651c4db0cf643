//! 이벤트 레코드 벤치마크
//!
//! RecordedEvent 생성, 지연 JSON 파싱, 직렬화 성능을 측정합니다.

use bytes::Bytes;
use cetrack_core::event::{APPLICATION_JSON, CloudEventHeaders, RecordedEvent};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

fn create_headers() -> CloudEventHeaders {
    CloudEventHeaders::new(
        "550e8400-e29b-41d4-a716-446655440000",
        "https://knative.dev/eventing/test/heartbeats/#default/heartbeats",
        "dev.knative.eventing.samples.heartbeat",
    )
    .with_extension("sinkbinding", "0f7e5a2c-d2a4-4d55-9f6d-2a2a0f0e2d41")
    .with_extension("the", "42")
    .with_data_content_type(APPLICATION_JSON)
}

fn create_payload() -> Bytes {
    Bytes::from_static(br#"{"id":17,"label":"bench","msg":"msg 1234 for bench"}"#)
}

fn bench_event_creation(c: &mut Criterion) {
    let headers = create_headers();
    let payload = create_payload();

    let mut group = c.benchmark_group("event_creation");
    group.throughput(Throughput::Elements(1));
    group.bench_function("recorded_event_new", |b| {
        b.iter(|| RecordedEvent::new(black_box(1), headers.clone(), payload.clone()))
    });
    group.finish();
}

fn bench_payload_json(c: &mut Criterion) {
    let headers = create_headers();
    let payload = create_payload();

    let mut group = c.benchmark_group("payload_json");
    group.bench_function("first_parse", |b| {
        b.iter(|| {
            let event = RecordedEvent::new(1, headers.clone(), payload.clone());
            black_box(event.payload_json().is_some())
        })
    });

    let cached = RecordedEvent::new(1, headers.clone(), payload.clone());
    let _ = cached.payload_json();
    group.bench_function("cached", |b| {
        b.iter(|| black_box(cached.payload_json().is_some()))
    });
    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let event = RecordedEvent::new(1, create_headers(), create_payload());
    let encoded = serde_json::to_string(&event).unwrap();

    let mut group = c.benchmark_group("serialization");
    group.bench_function("to_json", |b| {
        b.iter(|| serde_json::to_string(black_box(&event)).unwrap())
    });
    group.bench_function("from_json", |b| {
        b.iter(|| serde_json::from_str::<RecordedEvent>(black_box(&encoded)).unwrap())
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_event_creation,
    bench_payload_json,
    bench_serialization
);
criterion_main!(benches);
