//! 트래커 시나리오 통합 테스트
//!
//! 실제 싱크 서버를 띄우고 HTTP로 이벤트를 보낸 뒤 어설션 결과를 확인합니다.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use cetrack_core::config::{SinkConfig, TrackerConfig};
use cetrack_core::event::{APPLICATION_JSON, CloudEventHeaders};
use cetrack_sink::SinkServer;
use cetrack_sink::codec::encode_binary_headers;
use cetrack_tracker::matcher::{all_of, has_extension, has_source, has_type, heartbeat_message};
use cetrack_tracker::{
    AssertionError, EmbeddedProvisioner, EventTracker, PollPolicy, StaticProvisioner,
};

fn tracker_config() -> TrackerConfig {
    TrackerConfig {
        setup_timeout_ms: 5_000,
        poll_initial_interval_ms: 20,
        poll_max_interval_ms: 200,
        default_deadline_ms: 5_000,
        ..TrackerConfig::default()
    }
}

async fn start_tracker(identity: &str) -> EventTracker {
    EventTracker::start(
        identity,
        Arc::new(EmbeddedProvisioner::default()),
        &tracker_config(),
    )
    .await
    .expect("tracker should start")
}

async fn emit(client: &reqwest::Client, url: &str, attrs: &CloudEventHeaders, body: Vec<u8>) {
    let mut request = client.post(url).body(body);
    for (name, value) in encode_binary_headers(attrs) {
        request = request.header(name, value);
    }
    let response = request.send().await.expect("emit event");
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
}

#[tokio::test]
async fn two_of_three_sources_match() {
    let tracker = start_tracker("sources").await;
    let client = reqwest::Client::new();

    for (id, source) in [("1", "A"), ("2", "A"), ("3", "B")] {
        emit(
            &client,
            tracker.url(),
            &CloudEventHeaders::new(id, source, "dev.example.ping"),
            Vec::new(),
        )
        .await;
    }

    let report = tracker
        .assert_at_least(2, has_source("A"))
        .within(Duration::from_secs(5))
        .await
        .expect("two A events were sent");
    let ids: Vec<&str> = report.matched.iter().map(|e| e.event_id()).collect();
    assert_eq!(ids, vec!["1", "2"]);

    tracker.stop().await;
}

#[tokio::test]
async fn missing_third_event_times_out_with_counts() {
    let tracker = start_tracker("short").await;
    let client = reqwest::Client::new();

    emit(&client, tracker.url(), &CloudEventHeaders::new("1", "A", "t"), Vec::new()).await;
    emit(&client, tracker.url(), &CloudEventHeaders::new("2", "A", "t"), Vec::new()).await;
    emit(&client, tracker.url(), &CloudEventHeaders::new("3", "B", "t"), Vec::new()).await;

    let err = tracker
        .assert_at_least(3, has_source("A"))
        .within(Duration::from_millis(300))
        .await
        .expect_err("only two A events exist");

    match &err {
        AssertionError::Timeout(report) => {
            assert_eq!(report.required(), 3);
            assert_eq!(report.observed, 2);
            assert_eq!(report.closest.len(), 1);
            assert_eq!(report.closest[0].event.event_id(), "3");
        }
        other => panic!("unexpected outcome: {other}"),
    }
    let text = err.to_string();
    assert!(text.contains("required: 3, observed: 2"));
    assert!(text.contains("source: expected \"A\", got \"B\""));

    tracker.stop().await;
}

#[tokio::test]
async fn concurrent_emitters_are_all_counted() {
    let tracker = start_tracker("concurrent").await;
    let client = reqwest::Client::new();
    let url = Arc::new(tracker.url().to_owned());

    let mut tasks = Vec::new();
    for emitter in 0..10 {
        let client = client.clone();
        let url = Arc::clone(&url);
        tasks.push(tokio::spawn(async move {
            for i in 0..10 {
                let attrs = CloudEventHeaders::new(
                    format!("{emitter}-{i}"),
                    "/concurrent",
                    "dev.example.ping",
                );
                emit(&client, &url, &attrs, Vec::new()).await;
            }
        }));
    }

    let report = tracker
        .assert_exact(100, has_source("/concurrent"))
        .within(Duration::from_secs(10))
        .await
        .expect("all 100 events arrive");
    assert_eq!(report.observed, 100);

    for task in tasks {
        task.await.unwrap();
    }
    let snapshot = tracker.snapshot().await;
    for (index, event) in snapshot.iter().enumerate() {
        assert_eq!(event.sequence, index as u64 + 1);
    }

    tracker.stop().await;
}

#[tokio::test]
async fn heartbeat_with_sink_binding_extension() {
    let tracker = start_tracker("heartbeats").await;
    let client = reqwest::Client::new();
    let source = "https://knative.dev/eventing/test/heartbeats/#default/hb-pod";

    let attrs = CloudEventHeaders::new("hb-1", source, "dev.knative.eventing.samples.heartbeat")
        .with_extension("sinkbinding", "0f7e5a2c")
        .with_data_content_type(APPLICATION_JSON);
    let body = serde_json::to_vec(&serde_json::json!({"id": 1, "label": "", "msg": "hello"}))
        .unwrap();
    emit(&client, tracker.url(), &attrs, body).await;

    let matcher = all_of(vec![
        has_source(source),
        has_type("dev.knative.eventing.samples.heartbeat"),
        has_extension("sinkbinding", "0f7e5a2c"),
        heartbeat_message("hello"),
    ]);
    tracker
        .assert_at_least(1, matcher)
        .within(Duration::from_secs(5))
        .await
        .expect("heartbeat recorded");

    tracker.stop().await;
}

#[tokio::test]
async fn static_sink_is_polled_over_http() {
    let config = SinkConfig {
        bind_addr: "127.0.0.1:0".to_owned(),
        ..SinkConfig::default()
    };
    let mut sink = SinkServer::bind(&config).await.unwrap().spawn();

    let tracker = EventTracker::start(
        "static",
        Arc::new(StaticProvisioner::new(sink.url())),
        &tracker_config(),
    )
    .await
    .unwrap();

    let client = reqwest::Client::new();
    let emitter_url = sink.url();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        emit(&client, &emitter_url, &CloudEventHeaders::new("s", "/static", "t"), Vec::new()).await;
    });

    tracker
        .assert_at_least(1, has_source("/static"))
        .poll_policy(PollPolicy::fixed(Duration::from_millis(25)))
        .within(Duration::from_secs(5))
        .await
        .expect("event reaches the static sink");

    // 외부 싱크는 트래커 해제 후에도 계속 동작
    tracker.stop().await;
    assert!(!sink.store().is_closed());

    sink.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn assert_not_after_unrelated_traffic() {
    let tracker = start_tracker("negative").await;
    let client = reqwest::Client::new();
    emit(&client, tracker.url(), &CloudEventHeaders::new("1", "B", "t"), Vec::new()).await;

    tracker
        .assert_not(has_source("A"))
        .await
        .expect("no A event was sent");

    tracker.stop().await;
}

#[tokio::test]
async fn independent_trackers_keep_their_own_deadlines() {
    let fast = start_tracker("parallel-fast").await;
    let slow = start_tracker("parallel-slow").await;
    let client = reqwest::Client::new();

    emit(&client, fast.url(), &CloudEventHeaders::new("1", "A", "t"), Vec::new()).await;
    // 다른 싱크로 간 이벤트는 보이지 않아야 함
    emit(&client, slow.url(), &CloudEventHeaders::new("1", "B", "t"), Vec::new()).await;

    let (satisfied, timed_out) = tokio::join!(
        fast.assert_at_least(1, has_source("A"))
            .within(Duration::from_secs(5))
            .into_future(),
        slow.assert_at_least(1, has_source("A"))
            .within(Duration::from_millis(400))
            .into_future(),
    );

    let report = satisfied.expect("A was sent to the fast sink");
    assert_eq!(report.identity, "parallel-fast");
    assert_eq!(report.observed, 1);
    // 느린 쪽 마감을 기다리지 않고 끝남
    assert!(report.elapsed < Duration::from_millis(400));

    match timed_out.expect_err("no A event on the slow sink") {
        AssertionError::Timeout(report) => {
            assert_eq!(report.identity, "parallel-slow");
            assert_eq!(report.observed, 0);
            assert!(report.elapsed >= Duration::from_millis(400));
        }
        other => panic!("unexpected outcome: {other}"),
    }

    fast.stop().await;
    slow.stop().await;
}
