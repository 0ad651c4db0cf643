//! 이벤트 싱크 에러 타입
//!
//! [`SinkError`]는 CloudEvents 디코딩, 저장소 쓰기, 서버 바인드 과정의 에러를 표현합니다.
//! `From<SinkError> for CetrackError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use cetrack_core::error::{CetrackError, StorageError};

/// 이벤트 싱크 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 요청을 CloudEvent로 해석할 수 없음
    #[error("malformed event: {0}")]
    Malformed(String),

    /// 필수 속성 누락
    #[error("missing required attributes: {}", .0.join(", "))]
    MissingAttributes(Vec<&'static str>),

    /// 지원하지 않는 content mode (batch 등)
    #[error("unsupported content mode: {0}")]
    UnsupportedMode(String),

    /// 저장소가 쓰기를 받을 수 없음
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// 리스너 바인드 실패
    #[error("bind error: {addr}: {reason}")]
    Bind {
        /// 바인드 주소
        addr: String,
        /// 실패 사유
        reason: String,
    },

    /// 서버 태스크 종료 실패
    #[error("shutdown error: {0}")]
    Shutdown(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    /// 발신자 잘못으로 거부된 요청인지 확인합니다.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Malformed(_) | Self::MissingAttributes(_) | Self::UnsupportedMode(_)
        )
    }
}

impl From<SinkError> for CetrackError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Storage(e) => CetrackError::Storage(e),
            SinkError::Io(e) => CetrackError::Io(e),
            other => CetrackError::Io(std::io::Error::other(other.to_string())),
        }
    }
}
