//! 싱크 클라이언트 -- 기록된 이벤트 스냅샷 조회
//!
//! [`SinkClient`]는 RPITIT를 사용하므로 trait object로 쓸 수 없습니다.
//! 트래커는 `BoxFuture`를 반환하는 [`DynSinkClient`]를 통해 구현을 동적으로 보관하며,
//! `SinkClient`를 구현한 타입은 자동으로 `DynSinkClient`도 구현됩니다.
//!
//! - [`LocalSinkClient`]: 같은 프로세스의 [`EventStore`]를 직접 읽습니다.
//! - [`HttpSinkClient`]: `GET /events?since=N`으로 원격 싱크를 조회합니다.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use cetrack_core::error::TrackerError;
use cetrack_core::event::RecordedEvent;
use cetrack_sink::{EventStore, EventsPage, HealthResponse};
use tracing::debug;

/// `Send` 박스 future
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 싱크 스냅샷 조회 trait
pub trait SinkClient: Send + Sync {
    /// 조회 대상 설명 (로그, 진단용)
    fn target(&self) -> String;

    /// `since`보다 큰 시퀀스 번호의 이벤트를 도착 순서대로 조회합니다.
    fn list(
        &self,
        since: u64,
    ) -> impl Future<Output = Result<Vec<Arc<RecordedEvent>>, TrackerError>> + Send;

    /// 싱크가 이벤트를 받을 준비가 되었는지 확인합니다.
    fn ready(&self) -> impl Future<Output = Result<(), TrackerError>> + Send;
}

/// dyn-compatible 싱크 클라이언트 trait
pub trait DynSinkClient: Send + Sync {
    /// 조회 대상 설명
    fn target(&self) -> String;

    /// [`SinkClient::list`]
    fn list(&self, since: u64) -> BoxFuture<'_, Result<Vec<Arc<RecordedEvent>>, TrackerError>>;

    /// [`SinkClient::ready`]
    fn ready(&self) -> BoxFuture<'_, Result<(), TrackerError>>;
}

impl<T: SinkClient> DynSinkClient for T {
    fn target(&self) -> String {
        SinkClient::target(self)
    }

    fn list(&self, since: u64) -> BoxFuture<'_, Result<Vec<Arc<RecordedEvent>>, TrackerError>> {
        Box::pin(SinkClient::list(self, since))
    }

    fn ready(&self) -> BoxFuture<'_, Result<(), TrackerError>> {
        Box::pin(SinkClient::ready(self))
    }
}

// ─── LocalSinkClient ────────────────────────────────────────────────

/// 프로세스 내부 저장소 클라이언트
#[derive(Debug, Clone)]
pub struct LocalSinkClient {
    store: Arc<EventStore>,
}

impl LocalSinkClient {
    /// 저장소를 감싸는 클라이언트를 생성합니다.
    pub fn new(store: Arc<EventStore>) -> Self {
        Self { store }
    }
}

impl SinkClient for LocalSinkClient {
    fn target(&self) -> String {
        "in-process store".to_owned()
    }

    async fn list(&self, since: u64) -> Result<Vec<Arc<RecordedEvent>>, TrackerError> {
        Ok(self.store.list(since)?)
    }

    async fn ready(&self) -> Result<(), TrackerError> {
        if self.store.is_closed() {
            Err(TrackerError::ReadFailure(
                "in-process store is closed".to_owned(),
            ))
        } else {
            Ok(())
        }
    }
}

// ─── HttpSinkClient ─────────────────────────────────────────────────

/// 원격 싱크 HTTP 클라이언트
#[derive(Debug, Clone)]
pub struct HttpSinkClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpSinkClient {
    /// `base_url`(예: `http://127.0.0.1:8080`)의 싱크를 조회하는 클라이언트를 생성합니다.
    ///
    /// `request_timeout`은 요청 하나에 적용됩니다.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, TrackerError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TrackerError::ReadFailure(format!("failed to build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            http,
        })
    }

    /// 싱크 기본 URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T, TrackerError> {
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| TrackerError::ReadFailure(format!("GET {url}: {e}")))?;
        response
            .json::<T>()
            .await
            .map_err(|e| TrackerError::ReadFailure(format!("GET {url}: invalid response: {e}")))
    }
}

impl SinkClient for HttpSinkClient {
    fn target(&self) -> String {
        self.base_url.clone()
    }

    async fn list(&self, since: u64) -> Result<Vec<Arc<RecordedEvent>>, TrackerError> {
        let page: EventsPage = self
            .get_json(format!("{}/events?since={since}", self.base_url))
            .await?;
        debug!(
            target_url = %self.base_url,
            since,
            received = page.events.len(),
            last_sequence = page.last_sequence,
            "fetched events page"
        );
        Ok(page.events)
    }

    async fn ready(&self) -> Result<(), TrackerError> {
        let health: HealthResponse = self
            .get_json(format!("{}/healthz", self.base_url))
            .await?;
        if health.accepting {
            Ok(())
        } else {
            Err(TrackerError::ReadFailure(format!(
                "sink at {} is not accepting events",
                self.base_url
            )))
        }
    }
}
