//! 이벤트 싱크 HTTP 서버
//!
//! # 엔드포인트
//!
//! | 메서드 | 경로 | 설명 |
//! |--------|------|------|
//! | `POST` | `/` | CloudEvent 제출 (binary / structured), 202 + `{"sequence": n}` |
//! | `GET` | `/events?since=N` | `N` 이후 이벤트 조회, `{"events": [...], "last_sequence": n}` |
//! | `GET` | `/healthz` | 준비 상태 `{"status": "ok", "recorded": n, "accepting": bool}` |
//!
//! 잘못된 요청은 400, 저장소가 쓰기를 받을 수 없으면 503,
//! 본문 크기 제한 초과는 413으로 응답하며 거부된 제출은 기록되지 않습니다.
//!
//! # 종료
//!
//! [`SinkServer::spawn`]이 반환하는 [`SinkHandle`]로 서버를 멈춥니다.
//! 종료 시 저장소를 먼저 닫아 새 제출을 거부하고,
//! 제한 시간 안에 서버 태스크가 끝나지 않으면 강제로 중단합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use cetrack_core::config::SinkConfig;
use cetrack_core::event::RecordedEvent;
use cetrack_core::metrics as m;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::SinkError;
use crate::store::EventStore;

/// 제출 성공 응답
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// 부여된 시퀀스 번호
    pub sequence: u64,
}

/// `GET /events` 응답
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsPage {
    /// `since` 이후 이벤트 (도착 순서)
    pub events: Vec<Arc<RecordedEvent>>,
    /// 응답 시점의 마지막 시퀀스 번호
    pub last_sequence: u64,
}

/// `GET /healthz` 응답
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 항상 "ok"
    pub status: String,
    /// 기록된 이벤트 수
    pub recorded: u64,
    /// 새 제출을 받는 중인지
    pub accepting: bool,
}

/// 에러 응답 본문
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 에러 메시지
    pub error: String,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    since: u64,
}

impl IntoResponse for SinkError {
    fn into_response(self) -> Response {
        let status = match &self {
            SinkError::Malformed(_)
            | SinkError::MissingAttributes(_)
            | SinkError::UnsupportedMode(_) => StatusCode::BAD_REQUEST,
            SinkError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            SinkError::Bind { .. } | SinkError::Shutdown(_) | SinkError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// 싱크 라우터를 생성합니다.
///
/// 테스트에서 리스너 없이 라우터만 구동할 때도 사용합니다.
pub fn router(store: Arc<EventStore>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", post(submit_event))
        .route("/events", get(list_events))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(store)
}

async fn submit_event(
    State(store): State<Arc<EventStore>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<SubmitResponse>), SinkError> {
    let decoded = match codec::decode(&headers, body) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!(error = %e, "rejected malformed submission");
            metrics::counter!(m::SINK_EVENTS_REJECTED_TOTAL, m::LABEL_REASON => "malformed")
                .increment(1);
            return Err(e);
        }
    };

    let mode = decoded.mode;
    let event = match store.append(decoded.headers, decoded.payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "rejected submission, store unavailable");
            metrics::counter!(
                m::SINK_EVENTS_REJECTED_TOTAL,
                m::LABEL_REASON => "storage_unavailable"
            )
            .increment(1);
            return Err(e.into());
        }
    };

    debug!(
        sequence = event.sequence,
        id = %event.event_id(),
        source = %event.source(),
        %mode,
        "recorded event"
    );
    metrics::counter!(m::SINK_EVENTS_RECEIVED_TOTAL, m::LABEL_MODE => mode.as_str()).increment(1);

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            sequence: event.sequence,
        }),
    ))
}

async fn list_events(
    State(store): State<Arc<EventStore>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<EventsPage>, SinkError> {
    let events = store.list(query.since)?;
    // 커서는 반환한 이벤트 기준
    let last_sequence = events
        .last()
        .map(|e| e.sequence)
        .unwrap_or_else(|| query.since.min(store.last_sequence()));
    Ok(Json(EventsPage {
        events,
        last_sequence,
    }))
}

async fn healthz(State(store): State<Arc<EventStore>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_owned(),
        recorded: store.last_sequence(),
        accepting: !store.is_closed(),
    })
}

/// 바인드된 싱크 서버
///
/// [`bind`](Self::bind)로 리스너를 열고 [`spawn`](Self::spawn)으로 백그라운드에서 실행합니다.
pub struct SinkServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    store: Arc<EventStore>,
    max_body_bytes: usize,
}

impl SinkServer {
    /// 설정의 주소에 리스너를 바인드합니다. 포트 0이면 임의 포트를 사용합니다.
    pub async fn bind(config: &SinkConfig) -> Result<Self, SinkError> {
        let listener =
            TcpListener::bind(&config.bind_addr)
                .await
                .map_err(|e| SinkError::Bind {
                    addr: config.bind_addr.clone(),
                    reason: e.to_string(),
                })?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, max_events = config.max_events, "event sink bound");

        Ok(Self {
            listener,
            local_addr,
            store: Arc::new(EventStore::with_capacity(config.max_events)),
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// 외부에서 만든 저장소를 사용합니다.
    pub fn with_store(mut self, store: Arc<EventStore>) -> Self {
        self.store = store;
        self
    }

    /// 실제 바인드된 주소
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 저장소 핸들
    pub fn store(&self) -> Arc<EventStore> {
        Arc::clone(&self.store)
    }

    /// 취소 토큰이 취소될 때까지 요청을 처리합니다.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SinkError> {
        let app = router(Arc::clone(&self.store), self.max_body_bytes);
        let addr = self.local_addr;

        info!(%addr, "event sink serving");
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;
        info!(%addr, "event sink stopped");
        Ok(())
    }

    /// 서버를 백그라운드 태스크로 실행하고 핸들을 반환합니다.
    pub fn spawn(self) -> SinkHandle {
        let cancel = CancellationToken::new();
        let addr = self.local_addr;
        let store = self.store();
        let task = tokio::spawn(self.run(cancel.clone()));

        SinkHandle {
            addr,
            store,
            cancel,
            task: Some(task),
        }
    }
}

/// 실행 중인 싱크 서버 핸들
///
/// 핸들이 drop되면 서버에 취소 신호를 보냅니다.
pub struct SinkHandle {
    addr: SocketAddr,
    store: Arc<EventStore>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<(), SinkError>>>,
}

impl SinkHandle {
    /// 서버 주소
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// 서버 기본 URL (`http://host:port`)
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// 저장소 핸들
    pub fn store(&self) -> Arc<EventStore> {
        Arc::clone(&self.store)
    }

    /// 종료 신호를 받았는지 확인합니다.
    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 서버를 종료합니다. 두 번째 호출부터는 아무 일도 하지 않습니다.
    ///
    /// 저장소를 닫고 취소 신호를 보낸 뒤 `timeout` 동안 서버 태스크를 기다립니다.
    /// 시간 안에 끝나지 않으면 태스크를 중단하고 [`SinkError::Shutdown`]을 반환합니다.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<(), SinkError> {
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };

        self.store.close();
        self.cancel.cancel();

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(SinkError::Shutdown(format!(
                "sink task failed: {join_err}"
            ))),
            Err(_) => {
                warn!(addr = %self.addr, ?timeout, "event sink did not stop in time, aborting");
                task.abort();
                Err(SinkError::Shutdown(format!(
                    "sink at {} did not stop within {:?}",
                    self.addr, timeout
                )))
            }
        }
    }
}

impl Drop for SinkHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use cetrack_core::event::CloudEventHeaders;

    use super::*;

    fn test_config() -> SinkConfig {
        SinkConfig {
            bind_addr: "127.0.0.1:0".to_owned(),
            ..SinkConfig::default()
        }
    }

    #[tokio::test]
    async fn bind_to_ephemeral_port() {
        let server = SinkServer::bind(&test_config()).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = SinkConfig {
            bind_addr: taken.local_addr().unwrap().to_string(),
            ..SinkConfig::default()
        };
        let err = SinkServer::bind(&config).await.err().unwrap();
        assert!(matches!(err, SinkError::Bind { .. }));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_closes_store() {
        let server = SinkServer::bind(&test_config()).await.unwrap();
        let mut handle = server.spawn();
        handle
            .store()
            .append(CloudEventHeaders::new("a", "/s", "t"), Bytes::new())
            .unwrap();

        handle.shutdown(Duration::from_secs(5)).await.unwrap();
        handle.shutdown(Duration::from_secs(5)).await.unwrap();

        assert!(handle.is_stopping());
        assert!(handle.store().is_closed());
        assert_eq!(handle.store().len(), 1);
    }

    #[test]
    fn storage_error_maps_to_503() {
        let err = SinkError::Storage(cetrack_core::error::StorageError::Unavailable(
            "full".to_owned(),
        ));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn malformed_maps_to_400() {
        let err = SinkError::MissingAttributes(vec!["id"]);
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
