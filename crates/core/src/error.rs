//! 에러 타입 -- 도메인별 에러 정의
//!
//! 분류:
//! - [`ConfigError`]: 설정 로딩/검증 실패
//! - [`StorageError`]: 싱크 저장소가 쓰기/읽기를 받을 수 없음 (일시적, 재시도 대상)
//! - [`TrackerError`]: 싱크 프로비저닝, 조회, 해제 실패
//!
//! 어설션 타임아웃은 진단 정보를 포함해야 하므로 `cetrack-tracker`의
//! `AssertionError`에서 별도로 정의합니다.

/// cetrack 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum CetrackError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 트래커 에러
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 저장소 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// 저장소가 쓰기를 받을 수 없음 (닫힘, 용량 초과, 잠금 손상)
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// 트래커 에러
#[derive(Debug, Clone, thiserror::Error)]
pub enum TrackerError {
    /// 싱크를 준비하지 못함 -- 어설션 전에 테스트를 중단시킵니다
    #[error("provisioning failed for '{identity}': {reason}")]
    Provisioning { identity: String, reason: String },

    /// 폴링 중 조회 실패 (일시적)
    #[error("read failure: {0}")]
    ReadFailure(String),

    /// 해제 실패 (로그만 남김)
    #[error("teardown failed for '{identity}': {reason}")]
    Teardown { identity: String, reason: String },
}

impl TrackerError {
    /// 재시도로 회복될 수 있는 에러인지 확인합니다.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ReadFailure(_))
    }
}

impl From<StorageError> for TrackerError {
    fn from(err: StorageError) -> Self {
        TrackerError::ReadFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_converts_to_read_failure() {
        let err: TrackerError = StorageError::Unavailable("store closed".to_owned()).into();
        assert!(matches!(err, TrackerError::ReadFailure(ref msg) if msg.contains("store closed")));
        assert!(err.is_transient());
    }

    #[test]
    fn provisioning_is_not_transient() {
        let err = TrackerError::Provisioning {
            identity: "recorder".to_owned(),
            reason: "sink not ready".to_owned(),
        };
        assert!(!err.is_transient());
        let msg = err.to_string();
        assert!(msg.contains("recorder"));
        assert!(msg.contains("sink not ready"));
    }

    #[test]
    fn top_level_wraps_domain_errors() {
        let err: CetrackError = ConfigError::InvalidValue {
            field: "tracker.poll_multiplier".to_owned(),
            reason: "must be >= 1.0".to_owned(),
        }
        .into();
        assert!(err.to_string().starts_with("config error"));
        assert!(err.to_string().contains("poll_multiplier"));
    }
}
