//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `cetrack_`
//! - 컴포넌트명: `sink_`, `tracker_`, `assertion_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(cetrack_core::metrics::SINK_EVENTS_RECEIVED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (satisfied, timeout, read_failure, count_mismatch, unexpected_match)
pub const LABEL_RESULT: &str = "result";

/// 인코딩 모드 레이블 키 (binary, structured)
pub const LABEL_MODE: &str = "mode";

/// 거부 사유 레이블 키 (malformed, storage_unavailable)
pub const LABEL_REASON: &str = "reason";

// ─── Sink 메트릭 ────────────────────────────────────────────────────

/// Sink: 기록된 이벤트 수 (counter, label: mode)
pub const SINK_EVENTS_RECEIVED_TOTAL: &str = "cetrack_sink_events_received_total";

/// Sink: 거부된 제출 수 (counter, label: reason)
pub const SINK_EVENTS_REJECTED_TOTAL: &str = "cetrack_sink_events_rejected_total";

/// Sink: 저장소 내 이벤트 수 (gauge)
pub const SINK_STORE_SIZE: &str = "cetrack_sink_store_size";

// ─── Tracker 메트릭 ─────────────────────────────────────────────────

/// Tracker: 싱크 조회 수 (counter)
pub const TRACKER_POLLS_TOTAL: &str = "cetrack_tracker_polls_total";

/// Tracker: 싱크 조회 실패 수 (counter)
pub const TRACKER_READ_FAILURES_TOTAL: &str = "cetrack_tracker_read_failures_total";

// ─── Assertion 메트릭 ───────────────────────────────────────────────

/// Assertion: 종료된 어설션 수 (counter, label: result)
pub const ASSERTIONS_TOTAL: &str = "cetrack_assertions_total";

/// Assertion: 어설션 소요 시간 (histogram, 초)
pub const ASSERTION_DURATION_SECONDS: &str = "cetrack_assertion_duration_seconds";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 어설션 소요 시간 히스토그램 버킷 (초)
///
/// 10ms ~ 300s 범위 (이벤트 발신 워크로드의 기동 시간 포함)
pub const ASSERTION_DURATION_BUCKETS: [f64; 10] =
    [0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 120.0, 300.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `cetrack-daemon` 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        SINK_EVENTS_RECEIVED_TOTAL,
        "Total number of CloudEvents recorded by the sink"
    );
    describe_counter!(
        SINK_EVENTS_REJECTED_TOTAL,
        "Total number of submissions rejected by the sink"
    );
    describe_gauge!(SINK_STORE_SIZE, "Number of events held by the sink store");

    describe_counter!(
        TRACKER_POLLS_TOTAL,
        "Total number of snapshot fetches issued by trackers"
    );
    describe_counter!(
        TRACKER_READ_FAILURES_TOTAL,
        "Total number of failed snapshot fetches"
    );

    describe_counter!(ASSERTIONS_TOTAL, "Total number of finished assertions by result");
    describe_histogram!(
        ASSERTION_DURATION_SECONDS,
        "Time from assertion start to its terminal state in seconds"
    );
}
