//! 이벤트 트래커 -- 테스트 실행 하나와 싱크 인스턴스 하나의 바인딩
//!
//! # 생명주기
//!
//! 1. [`EventTracker::start`]: 싱크를 프로비저닝하고 준비될 때까지 기다립니다.
//!    준비 시간 안에 도달할 수 없으면 부분적으로 만든 싱크를 해제하고
//!    `TrackerError::Provisioning`을 반환합니다.
//! 2. [`EventTracker::find`] / 어설션: 증분 커서로 새 이벤트만 가져와
//!    로컬 스냅샷 뒤에 붙입니다.
//! 3. [`EventTracker::stop`]: 싱크를 해제합니다. 여러 번 호출해도 안전하며
//!    해제 실패는 로그로만 남깁니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use cetrack_core::config::TrackerConfig;
use cetrack_core::error::TrackerError;
use cetrack_core::event::RecordedEvent;
use cetrack_core::metrics as m;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::assertion::{Assertion, PollPolicy, deadline_after};
use crate::client::{DynSinkClient, HttpSinkClient, LocalSinkClient, SinkClient};
use crate::matcher::Matcher;
use crate::provision::{DynProvisioner, SinkEndpoint};
use crate::report::Expectation;

/// 트래커가 지금까지 관측한 이벤트
#[derive(Debug, Default)]
struct Snapshot {
    events: Vec<Arc<RecordedEvent>>,
    cursor: u64,
}

/// [`EventTracker::find`] 결과
#[derive(Debug, Clone)]
pub struct FindResult {
    /// 매칭된 이벤트 (도착 순서, 최대 `min_count`개)
    pub matched: Vec<Arc<RecordedEvent>>,
    /// 매칭 개수가 `min_count` 이상인지
    pub satisfied: bool,
    /// 스냅샷의 전체 이벤트 수
    pub seen: usize,
}

/// 싱크 인스턴스 하나에 바인딩된 트래커 핸들
pub struct EventTracker {
    identity: String,
    url: String,
    client: Box<dyn DynSinkClient>,
    provisioner: Option<Arc<dyn DynProvisioner>>,
    endpoint: Mutex<Option<SinkEndpoint>>,
    snapshot: Mutex<Snapshot>,
    config: TrackerConfig,
    polls: AtomicU64,
    stopped: AtomicBool,
}

impl EventTracker {
    /// 싱크를 프로비저닝하고 준비된 트래커를 반환합니다.
    ///
    /// 프로비저닝과 준비 확인 전체에 `config.setup_timeout`이 적용됩니다.
    pub async fn start(
        identity: impl Into<String>,
        provisioner: Arc<dyn DynProvisioner>,
        config: &TrackerConfig,
    ) -> Result<Self, TrackerError> {
        let identity = identity.into();
        let setup_timeout = config.setup_timeout();
        let deadline = deadline_after(tokio::time::Instant::now(), setup_timeout);

        let endpoint =
            match tokio::time::timeout_at(deadline, provisioner.provision(&identity)).await {
                Ok(Ok(endpoint)) => endpoint,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(TrackerError::Provisioning {
                        identity,
                        reason: format!("provisioning did not finish within {setup_timeout:?}"),
                    });
                }
            };

        let url = endpoint.url().to_owned();
        let client: Box<dyn DynSinkClient> = match endpoint.store() {
            Some(store) => Box::new(LocalSinkClient::new(store)),
            None => match HttpSinkClient::new(url.clone(), config.request_timeout()) {
                Ok(client) => Box::new(client),
                Err(e) => {
                    release_quietly(provisioner.as_ref(), endpoint).await;
                    return Err(TrackerError::Provisioning {
                        identity,
                        reason: e.to_string(),
                    });
                }
            },
        };

        if let Err(reason) = wait_ready(client.as_ref(), deadline, config).await {
            warn!(identity = %identity, url = %url, %reason, "sink did not become ready");
            release_quietly(provisioner.as_ref(), endpoint).await;
            return Err(TrackerError::Provisioning { identity, reason });
        }

        info!(
            identity = %identity,
            url = %url,
            provisioner = provisioner.name(),
            "event tracker started"
        );

        Ok(Self {
            identity,
            url,
            client,
            provisioner: Some(provisioner),
            endpoint: Mutex::new(Some(endpoint)),
            snapshot: Mutex::new(Snapshot::default()),
            config: config.clone(),
            polls: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        })
    }

    /// 이미 준비된 싱크 클라이언트에 트래커를 붙입니다.
    ///
    /// 프로비저닝을 거치지 않으므로 [`stop`](Self::stop)은 싱크를 해제하지 않습니다.
    pub fn attach<C: SinkClient + 'static>(
        identity: impl Into<String>,
        client: C,
        config: &TrackerConfig,
    ) -> Self {
        let url = SinkClient::target(&client);
        Self {
            identity: identity.into(),
            url,
            client: Box::new(client),
            provisioner: None,
            endpoint: Mutex::new(None),
            snapshot: Mutex::new(Snapshot::default()),
            config: config.clone(),
            polls: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    /// 트래커 식별자
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// 발신 워크로드가 이벤트를 보낼 싱크 URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 트래커 설정
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// 지금까지 수행한 싱크 조회 횟수
    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    /// 해제되었는지 확인합니다.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// 새 이벤트를 가져와 로컬 스냅샷에 붙이고,
    /// 시퀀스 번호가 `after_sequence`보다 큰 스냅샷 구간을 반환합니다.
    ///
    /// 조회가 실패하면 스냅샷은 바뀌지 않습니다.
    pub async fn refresh_since(
        &self,
        after_sequence: u64,
    ) -> Result<Vec<Arc<RecordedEvent>>, TrackerError> {
        if self.is_stopped() {
            return Err(TrackerError::ReadFailure(format!(
                "tracker '{}' is stopped",
                self.identity
            )));
        }

        let mut snapshot = self.snapshot.lock().await;
        self.polls.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::TRACKER_POLLS_TOTAL).increment(1);

        let fresh = match self.client.list(snapshot.cursor).await {
            Ok(events) => events,
            Err(e) => {
                metrics::counter!(m::TRACKER_READ_FAILURES_TOTAL).increment(1);
                debug!(identity = %self.identity, error = %e, "snapshot fetch failed");
                return Err(e);
            }
        };

        for event in fresh {
            // 커서 이후의 이벤트만 순서대로 반영
            if event.sequence > snapshot.cursor {
                snapshot.cursor = event.sequence;
                snapshot.events.push(event);
            }
        }

        let start = snapshot
            .events
            .partition_point(|e| e.sequence <= after_sequence);
        Ok(snapshot.events[start..].to_vec())
    }

    /// 로컬 스냅샷 전체 (조회하지 않음)
    pub async fn snapshot(&self) -> Vec<Arc<RecordedEvent>> {
        self.snapshot.lock().await.events.clone()
    }

    /// 한 번 조회하여 현재 매칭되는 이벤트를 반환합니다. 대기하지 않습니다.
    pub async fn find(
        &self,
        matcher: &dyn Matcher,
        min_count: usize,
    ) -> Result<FindResult, TrackerError> {
        let events = self.refresh_since(0).await?;
        let mut matched = Vec::new();
        let mut count = 0;
        for event in &events {
            if matcher.matches(event) {
                count += 1;
                if matched.len() < min_count {
                    matched.push(Arc::clone(event));
                }
            }
        }
        Ok(FindResult {
            matched,
            satisfied: count >= min_count,
            seen: events.len(),
        })
    }

    /// 기본 폴링 정책 (`[tracker]` 설정)
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::from_config(&self.config)
    }

    /// `matcher`를 만족하는 이벤트가 `n`개 이상 기록될 때까지 기다립니다.
    pub fn assert_at_least<M: Matcher + 'static>(&self, n: usize, matcher: M) -> Assertion<'_> {
        Assertion::new(self, Expectation::AtLeast(n), Box::new(matcher))
    }

    /// 정확히 `n`개가 매칭되어야 합니다. `n`개에 도달한 시점에 더 많으면 실패합니다.
    pub fn assert_exact<M: Matcher + 'static>(&self, n: usize, matcher: M) -> Assertion<'_> {
        Assertion::new(self, Expectation::Exactly(n), Box::new(matcher))
    }

    /// `min`개 이상 `max`개 이하가 매칭되어야 합니다.
    pub fn assert_in_range<M: Matcher + 'static>(
        &self,
        min: usize,
        max: usize,
        matcher: M,
    ) -> Assertion<'_> {
        Assertion::new(self, Expectation::InRange { min, max }, Box::new(matcher))
    }

    /// 현재 기록된 이벤트 중 매칭되는 것이 없어야 합니다.
    pub fn assert_not<M: Matcher + 'static>(&self, matcher: M) -> Assertion<'_> {
        Assertion::new(self, Expectation::None, Box::new(matcher))
    }

    /// 싱크를 해제합니다.
    ///
    /// 두 번째 호출부터는 아무 일도 하지 않습니다. 해제에는
    /// `config.teardown_timeout`이 적용되며 실패는 로그로만 남깁니다.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let endpoint = self.endpoint.lock().await.take();
        let (Some(endpoint), Some(provisioner)) = (endpoint, self.provisioner.as_ref()) else {
            info!(identity = %self.identity, "event tracker detached");
            return;
        };

        let timeout = self.config.teardown_timeout();
        match tokio::time::timeout(timeout, provisioner.release(endpoint)).await {
            Ok(Ok(())) => info!(identity = %self.identity, "event tracker stopped"),
            Ok(Err(e)) => warn!(identity = %self.identity, error = %e, "teardown failed"),
            Err(_) => warn!(
                identity = %self.identity,
                ?timeout,
                "teardown did not finish in time"
            ),
        }
    }
}

impl std::fmt::Debug for EventTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventTracker")
            .field("identity", &self.identity)
            .field("url", &self.url)
            .field("client", &self.client.target())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// 싱크가 준비될 때까지 `deadline`까지 반복 확인합니다.
async fn wait_ready(
    client: &dyn DynSinkClient,
    deadline: tokio::time::Instant,
    config: &TrackerConfig,
) -> Result<(), String> {
    let interval = Duration::from_millis(config.poll_initial_interval_ms.max(1));
    let mut last_error = String::from("readiness was never checked");

    loop {
        match tokio::time::timeout_at(deadline, client.ready()).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => break,
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }
        let next = deadline_after(tokio::time::Instant::now(), interval);
        tokio::time::sleep_until(deadline.min(next)).await;
    }

    Err(format!(
        "sink at {} not ready before setup timeout: {last_error}",
        client.target()
    ))
}

async fn release_quietly(provisioner: &dyn DynProvisioner, endpoint: SinkEndpoint) {
    let identity = endpoint.identity().to_owned();
    if let Err(e) = provisioner.release(endpoint).await {
        warn!(identity = %identity, error = %e, "failed to release partially provisioned sink");
    }
}
