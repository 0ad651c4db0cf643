//! 싱크 프로비저닝 -- 트래커가 사용할 싱크 인스턴스 확보와 해제
//!
//! [`Provisioner`]는 식별자 하나에 대해 도달 가능한 싱크를 마련하고
//! [`SinkEndpoint`]를 돌려줍니다. 준비 상태 확인은 트래커가 수행합니다.
//!
//! - [`EmbeddedProvisioner`]: 식별자마다 프로세스 내부에 `SinkServer`를 띄웁니다.
//! - [`StaticProvisioner`]: 이미 실행 중인 외부 싱크(예: `cetrack-daemon`)를 가리킵니다.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cetrack_core::config::SinkConfig;
use cetrack_core::error::TrackerError;
use cetrack_sink::{EventStore, SinkHandle, SinkServer};
use tracing::{debug, info};

use crate::client::BoxFuture;

/// 프로비저닝된 싱크 인스턴스
pub struct SinkEndpoint {
    identity: String,
    url: String,
    store: Option<Arc<EventStore>>,
    server: Option<SinkHandle>,
}

impl SinkEndpoint {
    /// 외부에서 관리되는 원격 싱크 엔드포인트
    pub fn remote(identity: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            url: url.into(),
            store: None,
            server: None,
        }
    }

    /// 엔드포인트 식별자
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// 싱크 기본 URL. 발신 워크로드가 이벤트를 보낼 주소입니다.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 프로세스 내부 저장소 (있으면 HTTP 없이 직접 조회)
    pub fn store(&self) -> Option<Arc<EventStore>> {
        self.store.clone()
    }
}

impl std::fmt::Debug for SinkEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkEndpoint")
            .field("identity", &self.identity)
            .field("url", &self.url)
            .field("embedded", &self.server.is_some())
            .finish()
    }
}

/// 싱크 프로비저닝 trait
pub trait Provisioner: Send + Sync {
    /// 프로비저너 이름
    fn name(&self) -> &str;

    /// `identity`에 대한 싱크를 마련합니다.
    fn provision(
        &self,
        identity: &str,
    ) -> impl Future<Output = Result<SinkEndpoint, TrackerError>> + Send;

    /// 마련한 싱크를 해제합니다.
    fn release(&self, endpoint: SinkEndpoint)
    -> impl Future<Output = Result<(), TrackerError>> + Send;
}

/// dyn-compatible 프로비저너 trait
pub trait DynProvisioner: Send + Sync {
    /// 프로비저너 이름
    fn name(&self) -> &str;

    /// [`Provisioner::provision`]
    fn provision<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Result<SinkEndpoint, TrackerError>>;

    /// [`Provisioner::release`]
    fn release(&self, endpoint: SinkEndpoint) -> BoxFuture<'_, Result<(), TrackerError>>;
}

impl<T: Provisioner> DynProvisioner for T {
    fn name(&self) -> &str {
        Provisioner::name(self)
    }

    fn provision<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Result<SinkEndpoint, TrackerError>> {
        Box::pin(Provisioner::provision(self, identity))
    }

    fn release(&self, endpoint: SinkEndpoint) -> BoxFuture<'_, Result<(), TrackerError>> {
        Box::pin(Provisioner::release(self, endpoint))
    }
}

// ─── EmbeddedProvisioner ────────────────────────────────────────────

/// 프로세스 내부 싱크 프로비저너
///
/// 식별자마다 `127.0.0.1:0`에 새 `SinkServer`를 띄웁니다.
#[derive(Debug, Clone)]
pub struct EmbeddedProvisioner {
    sink: SinkConfig,
    shutdown_timeout: Duration,
    http_reads: bool,
}

impl Default for EmbeddedProvisioner {
    fn default() -> Self {
        Self::new(SinkConfig {
            bind_addr: "127.0.0.1:0".to_owned(),
            ..SinkConfig::default()
        })
    }
}

impl EmbeddedProvisioner {
    /// 싱크 설정으로 프로비저너를 생성합니다.
    pub fn new(sink: SinkConfig) -> Self {
        Self {
            sink,
            shutdown_timeout: Duration::from_secs(10),
            http_reads: false,
        }
    }

    /// 서버 종료 대기 시간을 설정합니다.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// 저장소를 직접 읽지 않고 HTTP로 조회하게 합니다.
    pub fn with_http_reads(mut self, enabled: bool) -> Self {
        self.http_reads = enabled;
        self
    }
}

impl Provisioner for EmbeddedProvisioner {
    fn name(&self) -> &str {
        "embedded"
    }

    async fn provision(&self, identity: &str) -> Result<SinkEndpoint, TrackerError> {
        let server = SinkServer::bind(&self.sink)
            .await
            .map_err(|e| TrackerError::Provisioning {
                identity: identity.to_owned(),
                reason: e.to_string(),
            })?;
        let handle = server.spawn();

        info!(identity, url = %handle.url(), "embedded sink started");

        Ok(SinkEndpoint {
            identity: identity.to_owned(),
            url: handle.url(),
            store: (!self.http_reads).then(|| handle.store()),
            server: Some(handle),
        })
    }

    async fn release(&self, mut endpoint: SinkEndpoint) -> Result<(), TrackerError> {
        let Some(mut handle) = endpoint.server.take() else {
            return Ok(());
        };
        handle
            .shutdown(self.shutdown_timeout)
            .await
            .map_err(|e| TrackerError::Teardown {
                identity: endpoint.identity.clone(),
                reason: e.to_string(),
            })?;
        info!(identity = %endpoint.identity, "embedded sink stopped");
        Ok(())
    }
}

// ─── StaticProvisioner ──────────────────────────────────────────────

/// 외부 싱크 프로비저너
///
/// 싱크의 수명은 외부에서 관리하므로 해제는 아무 일도 하지 않습니다.
#[derive(Debug, Clone)]
pub struct StaticProvisioner {
    url: String,
}

impl StaticProvisioner {
    /// 고정 URL의 싱크를 사용합니다.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Provisioner for StaticProvisioner {
    fn name(&self) -> &str {
        "static"
    }

    async fn provision(&self, identity: &str) -> Result<SinkEndpoint, TrackerError> {
        let url = reqwest::Url::parse(&self.url).map_err(|e| TrackerError::Provisioning {
            identity: identity.to_owned(),
            reason: format!("invalid sink url '{}': {e}", self.url),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TrackerError::Provisioning {
                identity: identity.to_owned(),
                reason: format!("unsupported sink url scheme '{}'", url.scheme()),
            });
        }
        debug!(identity, url = %self.url, "using static sink");
        Ok(SinkEndpoint::remote(
            identity,
            self.url.trim_end_matches('/'),
        ))
    }

    async fn release(&self, endpoint: SinkEndpoint) -> Result<(), TrackerError> {
        debug!(identity = %endpoint.identity, "static sink left running");
        Ok(())
    }
}
