//! cetrack 공통 크레이트
//!
//! 싱크와 트래커가 공유하는 이벤트 레코드, 에러 분류, 설정, 메트릭 이름을 정의합니다.
//!
//! - [`event`]: [`RecordedEvent`], [`CloudEventHeaders`]
//! - [`error`]: [`CetrackError`]와 도메인별 에러
//! - [`config`]: `cetrack.toml` 로딩 및 검증
//! - [`metrics`]: Prometheus 메트릭 이름 상수

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;

// --- 주요 타입 re-export ---

// 에러
pub use error::{CetrackError, ConfigError, StorageError, TrackerError};

// 설정
pub use config::CetrackConfig;

// 이벤트
pub use event::{CloudEventHeaders, RecordedEvent};
