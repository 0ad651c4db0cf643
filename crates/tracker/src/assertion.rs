//! 어설션 엔진 -- 마감 시간 안에 매칭 이벤트 개수를 기다리는 폴링 상태 기계
//!
//! # 상태 전이
//!
//! ```text
//! Polling ──(매칭 수 >= 최소 개수)──> Satisfied
//!    │
//!    └──(마감 시간 도달)──────────────> TimedOut
//! ```
//!
//! - 폴링 간격은 [`PollPolicy`]에 따라 늘어나며 남은 시간으로 잘립니다.
//! - 한 번 평가한 이벤트는 다시 평가하지 않습니다 (이벤트는 불변, 매처는 순수).
//! - 조회 실패는 루프 안에서 재시도합니다. 마감까지 한 번도 조회에 성공하지 못하면
//!   [`AssertionError::ReadFailure`]로 끝납니다.
//! - 마감 시간에 도달하면 진행 중인 조회는 버려집니다.
//!
//! # 사용 예시
//!
//! ```ignore
//! let report = tracker
//!     .assert_at_least(2, has_source("A"))
//!     .within(Duration::from_secs(10))
//!     .await?;
//! assert_eq!(report.matched.len(), 2);
//! ```

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use cetrack_core::config::TrackerConfig;
use cetrack_core::error::TrackerError;
use cetrack_core::event::RecordedEvent;
use cetrack_core::metrics as m;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::BoxFuture;
use crate::matcher::{BoxedMatcher, Matcher};
use crate::report::{AssertionError, AssertionReport, Candidate, Expectation};
use crate::tracker::EventTracker;

/// 가장 짧은 폴링 간격
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// 더할 수 없을 만큼 긴 마감 시간을 대신하는 값 (약 30년)
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start`부터 `timeout` 뒤의 시각. `Instant` 범위를 넘으면 먼 미래로 잘립니다.
pub(crate) fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// 폴링 간격 정책
///
/// `multiplier`가 1.0이면 고정 간격, 그보다 크면 `max_interval`까지 지수적으로 늘어납니다.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    /// 첫 간격
    pub initial_interval: Duration,
    /// 최대 간격
    pub max_interval: Duration,
    /// 증가 배수
    pub multiplier: f64,
}

impl PollPolicy {
    /// 고정 간격 정책
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
        }
    }

    /// `[tracker]` 설정의 폴링 값으로 정책을 만듭니다.
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            initial_interval: Duration::from_millis(config.poll_initial_interval_ms),
            max_interval: Duration::from_millis(config.poll_max_interval_ms),
            multiplier: config.poll_multiplier,
        }
    }

    /// `current` 다음 간격
    pub fn next_interval(&self, current: Duration) -> Duration {
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        let ceiling = self.max_interval.max(self.initial_interval);
        Duration::try_from_secs_f64(current.as_secs_f64() * multiplier)
            .unwrap_or(ceiling)
            .min(ceiling)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&TrackerConfig::default())
    }
}

/// 어설션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionState {
    /// 조회 중
    Polling,
    /// 최소 개수 도달
    Satisfied,
    /// 마감 시간 도달
    TimedOut,
}

/// 매칭 결과 기억 -- 이벤트마다 한 번만 평가합니다.
#[derive(Debug)]
struct Progress {
    matched: Vec<Arc<RecordedEvent>>,
    closest: Vec<Candidate>,
    evaluated: usize,
    last_sequence: u64,
    max_diagnostics: usize,
}

impl Progress {
    fn new(max_diagnostics: usize) -> Self {
        Self {
            matched: Vec::new(),
            closest: Vec::new(),
            evaluated: 0,
            last_sequence: 0,
            max_diagnostics,
        }
    }

    fn absorb(&mut self, matcher: &dyn Matcher, events: Vec<Arc<RecordedEvent>>) {
        for event in events {
            if event.sequence <= self.last_sequence {
                continue;
            }
            self.last_sequence = event.sequence;
            self.evaluated += 1;
            match matcher.evaluate(&event) {
                Ok(()) => self.matched.push(event),
                Err(mismatches) => self.consider(Candidate { event, mismatches }),
            }
        }
    }

    /// 불일치 수가 적은 순서로 최대 `max_diagnostics`개를 유지합니다.
    /// 같은 수끼리는 먼저 도착한 이벤트가 앞에 옵니다.
    fn consider(&mut self, candidate: Candidate) {
        let position = self
            .closest
            .iter()
            .position(|c| c.mismatches.len() > candidate.mismatches.len())
            .unwrap_or(self.closest.len());
        if position < self.max_diagnostics {
            self.closest.insert(position, candidate);
            self.closest.truncate(self.max_diagnostics);
        }
    }
}

/// 대기 중인 어설션
///
/// [`EventTracker`]의 `assert_*` 메서드로 만들고 `.await`로 실행합니다.
pub struct Assertion<'t> {
    tracker: &'t EventTracker,
    expectation: Expectation,
    matcher: BoxedMatcher,
    timeout: Duration,
    policy: PollPolicy,
    max_diagnostics: usize,
}

impl<'t> Assertion<'t> {
    pub(crate) fn new(
        tracker: &'t EventTracker,
        expectation: Expectation,
        matcher: BoxedMatcher,
    ) -> Self {
        let config = tracker.config();
        Self {
            tracker,
            expectation,
            matcher,
            timeout: config.default_deadline(),
            policy: PollPolicy::from_config(config),
            max_diagnostics: config.max_diagnostics,
        }
    }

    /// 마감 시간을 지정합니다.
    pub fn within(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 폴링 정책을 지정합니다. 간격은 [`MIN_POLL_INTERVAL`] 아래로 내려가지 않습니다.
    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 실패 보고서에 포함할 불일치 후보 수를 지정합니다.
    pub fn max_diagnostics(mut self, count: usize) -> Self {
        self.max_diagnostics = count;
        self
    }

    /// 어설션을 실행합니다.
    pub async fn run(self) -> Result<AssertionReport, AssertionError> {
        let started = Instant::now();
        let deadline = deadline_after(started, self.timeout);
        let min = self.expectation.min();
        let mut progress = Progress::new(self.max_diagnostics);
        let mut polls = 0u64;
        let mut read_failures = 0u64;
        let mut successful_reads = 0u64;
        let mut last_error: Option<TrackerError> = None;

        debug!(
            identity = %self.tracker.identity(),
            expectation = %self.expectation,
            matcher = %self.matcher.describe(),
            timeout = ?self.timeout,
            "assertion started"
        );

        // 최소 0개이고 상한이 없으면 조회할 필요가 없음
        let mut state = if min == 0 && self.expectation.max().is_none() {
            AssertionState::Satisfied
        } else {
            AssertionState::Polling
        };
        // 최소 0개이고 상한이 있으면 스냅샷 한 번으로 판정
        let single_snapshot = min == 0;
        let mut interval = self.policy.initial_interval.max(MIN_POLL_INTERVAL);

        while state == AssertionState::Polling {
            polls += 1;
            let fetch = self.tracker.refresh_since(progress.last_sequence);
            match tokio::time::timeout_at(deadline, fetch).await {
                Ok(Ok(events)) => {
                    successful_reads += 1;
                    last_error = None;
                    progress.absorb(self.matcher.as_ref(), events);
                    if single_snapshot || progress.matched.len() >= min {
                        state = AssertionState::Satisfied;
                        break;
                    }
                }
                Ok(Err(e)) => {
                    read_failures += 1;
                    debug!(identity = %self.tracker.identity(), error = %e, "poll failed, retrying");
                    last_error = Some(e);
                }
                Err(_) => {
                    state = AssertionState::TimedOut;
                    break;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                state = AssertionState::TimedOut;
                break;
            }
            tokio::time::sleep_until(deadline.min(deadline_after(now, interval))).await;
            interval = self.policy.next_interval(interval).max(MIN_POLL_INTERVAL);
        }

        let observed = progress.matched.len();
        let mut report = AssertionReport {
            identity: self.tracker.identity().to_owned(),
            matcher: self.matcher.describe(),
            expectation: self.expectation,
            observed,
            evaluated: progress.evaluated,
            matched: progress.matched,
            closest: progress.closest,
            polls,
            read_failures,
            last_error,
            elapsed: started.elapsed(),
            timeout: self.timeout,
        };

        let outcome = match state {
            AssertionState::Satisfied => {
                report.closest.clear();
                match self.expectation.max() {
                    Some(max) if observed > max => {
                        if self.expectation == Expectation::None {
                            Err(AssertionError::UnexpectedMatch(Box::new(report)))
                        } else {
                            Err(AssertionError::CountMismatch(Box::new(report)))
                        }
                    }
                    _ => {
                        if let Expectation::AtLeast(n) = self.expectation {
                            report.matched.truncate(n);
                        }
                        Ok(report)
                    }
                }
            }
            AssertionState::TimedOut if successful_reads == 0 && report.last_error.is_some() => {
                Err(AssertionError::ReadFailure(Box::new(report)))
            }
            _ => Err(AssertionError::Timeout(Box::new(report))),
        };

        record_outcome(&outcome, started);
        outcome
    }
}

fn record_outcome(outcome: &Result<AssertionReport, AssertionError>, started: Instant) {
    let result = match outcome {
        Ok(report) => {
            info!(
                identity = %report.identity,
                matched = report.observed,
                polls = report.polls,
                elapsed = ?report.elapsed,
                "assertion satisfied"
            );
            "satisfied"
        }
        Err(err) => {
            let report = err.report();
            warn!(
                identity = %report.identity,
                kind = err.kind(),
                required = report.required(),
                observed = report.observed,
                polls = report.polls,
                "assertion failed"
            );
            err.kind()
        }
    };
    metrics::counter!(m::ASSERTIONS_TOTAL, m::LABEL_RESULT => result).increment(1);
    metrics::histogram!(m::ASSERTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

impl<'t> IntoFuture for Assertion<'t> {
    type Output = Result<AssertionReport, AssertionError>;
    type IntoFuture = BoxFuture<'t, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}

impl std::fmt::Debug for Assertion<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assertion")
            .field("tracker", &self.tracker.identity())
            .field("expectation", &self.expectation)
            .field("matcher", &self.matcher.describe())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use cetrack_core::event::CloudEventHeaders;
    use cetrack_sink::EventStore;

    use super::*;
    use crate::client::{LocalSinkClient, SinkClient};
    use crate::matcher::{all_of, has_extension, has_source};

    fn config() -> TrackerConfig {
        TrackerConfig {
            poll_initial_interval_ms: 100,
            poll_max_interval_ms: 1_000,
            poll_multiplier: 2.0,
            default_deadline_ms: 5_000,
            ..TrackerConfig::default()
        }
    }

    fn local_tracker() -> (EventTracker, Arc<EventStore>) {
        let store = Arc::new(EventStore::new());
        let tracker =
            EventTracker::attach("local", LocalSinkClient::new(Arc::clone(&store)), &config());
        (tracker, store)
    }

    fn append(store: &EventStore, id: &str, source: &str) {
        store
            .append(CloudEventHeaders::new(id, source, "t"), Bytes::new())
            .unwrap();
    }

    /// 항상 실패하는 싱크
    struct BrokenSink;

    impl SinkClient for BrokenSink {
        fn target(&self) -> String {
            "broken".to_owned()
        }

        async fn list(&self, _since: u64) -> Result<Vec<Arc<RecordedEvent>>, TrackerError> {
            Err(TrackerError::ReadFailure("connection refused".to_owned()))
        }

        async fn ready(&self) -> Result<(), TrackerError> {
            Ok(())
        }
    }

    #[test]
    fn backoff_grows_until_ceiling() {
        let policy = PollPolicy {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(500),
            multiplier: 2.0,
        };
        let mut interval = policy.initial_interval;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(interval.as_millis());
            interval = policy.next_interval(interval);
        }
        assert_eq!(seen, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn fixed_policy_never_changes() {
        let policy = PollPolicy::fixed(Duration::from_millis(250));
        assert_eq!(
            policy.next_interval(Duration::from_millis(250)),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn closest_candidates_prefer_fewer_mismatches_then_arrival() {
        let store = EventStore::new();
        let matcher = all_of(vec![has_source("A"), has_extension("k", "v")]);
        // B 소스, 확장 없음 -> 불일치 2개
        store
            .append(CloudEventHeaders::new("1", "B", "t"), Bytes::new())
            .unwrap();
        // B 소스, 확장 맞음 -> 불일치 1개
        store
            .append(
                CloudEventHeaders::new("2", "B", "t").with_extension("k", "v"),
                Bytes::new(),
            )
            .unwrap();
        // A 소스, 확장 없음 -> 불일치 1개
        store
            .append(CloudEventHeaders::new("3", "A", "t"), Bytes::new())
            .unwrap();

        let mut progress = Progress::new(2);
        progress.absorb(matcher.as_ref(), store.list(0).unwrap());

        let ids: Vec<&str> = progress
            .closest
            .iter()
            .map(|c| c.event.event_id())
            .collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert_eq!(progress.evaluated, 3);
    }

    #[test]
    fn events_are_evaluated_once() {
        let store = EventStore::new();
        append(&store, "1", "A");
        append(&store, "2", "A");

        let mut progress = Progress::new(3);
        progress.absorb(has_source("A").as_ref(), store.list(0).unwrap());
        progress.absorb(has_source("A").as_ref(), store.list(0).unwrap());
        assert_eq!(progress.matched.len(), 2);
        assert_eq!(progress.evaluated, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_min_count_succeeds_without_polling() {
        let (tracker, _store) = local_tracker();
        let report = tracker.assert_at_least(0, has_source("A")).await.unwrap();
        assert_eq!(report.polls, 0);
        assert_eq!(tracker.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn satisfied_reports_first_matches() {
        let (tracker, store) = local_tracker();
        append(&store, "1", "A");
        append(&store, "2", "A");
        append(&store, "3", "B");

        let report = tracker
            .assert_at_least(2, has_source("A"))
            .within(Duration::from_secs(1))
            .await
            .unwrap();
        let ids: Vec<&str> = report.matched.iter().map(|e| e.event_id()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(report.polls, 1);
        // 저장소는 변경되지 않음
        assert_eq!(store.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_at_or_after_deadline() {
        let (tracker, store) = local_tracker();
        append(&store, "1", "A");
        append(&store, "2", "A");

        let timeout = Duration::from_secs(3);
        let started = Instant::now();
        let err = tracker
            .assert_at_least(3, has_source("A"))
            .within(timeout)
            .await
            .unwrap_err();

        assert!(started.elapsed() >= timeout);
        match err {
            AssertionError::Timeout(report) => {
                assert_eq!(report.required(), 3);
                assert_eq!(report.observed, 2);
                assert!(report.polls > 1);
            }
            other => panic!("unexpected outcome: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn late_events_are_picked_up() {
        let (tracker, store) = local_tracker();
        let writer = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            append(&writer, "late", "A");
        });

        let report = tracker
            .assert_at_least(1, has_source("A"))
            .within(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(report.matched[0].event_id(), "late");
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_read_failure_is_distinguished() {
        let tracker = EventTracker::attach("broken", BrokenSink, &config());
        let err = tracker
            .assert_at_least(1, has_source("A"))
            .within(Duration::from_secs(2))
            .await
            .unwrap_err();
        match err {
            AssertionError::ReadFailure(report) => {
                assert!(report.read_failures >= 2);
                assert!(report.to_string().contains("connection refused"));
            }
            other => panic!("unexpected outcome: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exact_fails_when_more_matched() {
        let (tracker, store) = local_tracker();
        for id in ["1", "2", "3"] {
            append(&store, id, "A");
        }

        let err = tracker
            .assert_exact(2, has_source("A"))
            .within(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AssertionError::CountMismatch(ref r) if r.observed == 3));

        let report = tracker
            .assert_exact(3, has_source("A"))
            .within(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(report.observed, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn in_range_bounds() {
        let (tracker, store) = local_tracker();
        append(&store, "1", "A");
        append(&store, "2", "A");

        assert!(
            tracker
                .assert_in_range(1, 2, has_source("A"))
                .within(Duration::from_secs(1))
                .await
                .is_ok()
        );
        assert!(matches!(
            tracker
                .assert_in_range(0, 1, has_source("A"))
                .within(Duration::from_secs(1))
                .await,
            Err(AssertionError::CountMismatch(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn assert_not_uses_single_snapshot() {
        let (tracker, store) = local_tracker();
        append(&store, "1", "B");

        let report = tracker.assert_not(has_source("A")).await.unwrap();
        assert_eq!(report.polls, 1);

        append(&store, "2", "A");
        let err = tracker.assert_not(has_source("A")).await.unwrap_err();
        assert_eq!(err.kind(), "unexpected_match");
        assert_eq!(err.report().matched[0].event_id(), "2");
    }

    #[test]
    fn deadline_after_saturates_instead_of_overflowing() {
        let start = Instant::now();
        assert_eq!(
            deadline_after(start, Duration::from_secs(1)),
            start + Duration::from_secs(1)
        );
        assert_eq!(deadline_after(start, Duration::MAX), start + FAR_FUTURE);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_deadline_is_accepted() {
        let (tracker, store) = local_tracker();
        append(&store, "1", "A");

        let report = tracker
            .assert_at_least(1, has_source("A"))
            .within(Duration::MAX)
            .await
            .unwrap();
        assert_eq!(report.observed, 1);

        let report = tracker
            .assert_at_least(1, has_source("A"))
            .within(Duration::from_secs(u64::MAX))
            .await
            .unwrap();
        assert_eq!(report.polls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_policy_is_clamped() {
        let tracker = EventTracker::attach("broken", BrokenSink, &config());
        let err = tracker
            .assert_at_least(1, has_source("A"))
            .poll_policy(PollPolicy::fixed(Duration::ZERO))
            .within(Duration::from_secs(1))
            .await
            .unwrap_err();

        // 1ms 간격이면 1초 동안 약 1000번
        let polls = err.report().polls;
        assert!(polls > 1 && polls <= 1_001, "polls = {polls}");
    }
}
