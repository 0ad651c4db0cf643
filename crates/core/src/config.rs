//! 설정 관리 -- cetrack.toml 파싱 및 런타임 설정
//!
//! [`CetrackConfig`]는 싱크, 트래커, 메트릭 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`CETRACK_SINK_BIND_ADDR=0.0.0.0:8080` 형식)
//! 3. 설정 파일 (`cetrack.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), cetrack_core::error::CetrackError> {
//! use cetrack_core::config::CetrackConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = CetrackConfig::load("cetrack.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = CetrackConfig::parse("[tracker]\ndefault_deadline_ms = 60000")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CetrackError, ConfigError};

/// cetrack 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CetrackConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 이벤트 싱크 설정
    #[serde(default)]
    pub sink: SinkConfig,
    /// 트래커/어설션 설정
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl CetrackConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CetrackError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, CetrackError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CetrackError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                CetrackError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, CetrackError> {
        toml::from_str(toml_str).map_err(|e| {
            CetrackError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `CETRACK_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "CETRACK_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "CETRACK_GENERAL_LOG_FORMAT");

        // Sink
        override_string(&mut self.sink.bind_addr, "CETRACK_SINK_BIND_ADDR");
        override_usize(
            &mut self.sink.max_body_bytes,
            "CETRACK_SINK_MAX_BODY_BYTES",
        );
        override_usize(&mut self.sink.max_events, "CETRACK_SINK_MAX_EVENTS");

        // Tracker
        override_u64(
            &mut self.tracker.setup_timeout_ms,
            "CETRACK_TRACKER_SETUP_TIMEOUT_MS",
        );
        override_u64(
            &mut self.tracker.teardown_timeout_ms,
            "CETRACK_TRACKER_TEARDOWN_TIMEOUT_MS",
        );
        override_u64(
            &mut self.tracker.request_timeout_ms,
            "CETRACK_TRACKER_REQUEST_TIMEOUT_MS",
        );
        override_u64(
            &mut self.tracker.poll_initial_interval_ms,
            "CETRACK_TRACKER_POLL_INITIAL_INTERVAL_MS",
        );
        override_u64(
            &mut self.tracker.poll_max_interval_ms,
            "CETRACK_TRACKER_POLL_MAX_INTERVAL_MS",
        );
        override_f64(
            &mut self.tracker.poll_multiplier,
            "CETRACK_TRACKER_POLL_MULTIPLIER",
        );
        override_u64(
            &mut self.tracker.default_deadline_ms,
            "CETRACK_TRACKER_DEFAULT_DEADLINE_MS",
        );
        override_usize(
            &mut self.tracker.max_diagnostics,
            "CETRACK_TRACKER_MAX_DIAGNOSTICS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "CETRACK_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "CETRACK_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "CETRACK_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CetrackError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.sink.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(invalid(
                "sink.bind_addr",
                format!("'{}' is not a socket address", self.sink.bind_addr),
            ));
        }

        if self.sink.max_body_bytes == 0 {
            return Err(invalid("sink.max_body_bytes", "must be greater than 0"));
        }

        if self.sink.max_events == 0 {
            return Err(invalid("sink.max_events", "must be greater than 0"));
        }

        let tracker = &self.tracker;
        for (field, value) in [
            ("tracker.setup_timeout_ms", tracker.setup_timeout_ms),
            ("tracker.teardown_timeout_ms", tracker.teardown_timeout_ms),
            ("tracker.request_timeout_ms", tracker.request_timeout_ms),
            ("tracker.poll_initial_interval_ms", tracker.poll_initial_interval_ms),
            ("tracker.default_deadline_ms", tracker.default_deadline_ms),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than 0"));
            }
        }

        if tracker.poll_max_interval_ms < tracker.poll_initial_interval_ms {
            return Err(invalid(
                "tracker.poll_max_interval_ms",
                "must be >= poll_initial_interval_ms",
            ));
        }

        if !tracker.poll_multiplier.is_finite() || tracker.poll_multiplier < 1.0 {
            return Err(invalid("tracker.poll_multiplier", "must be a finite value >= 1.0"));
        }

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid(
                "metrics.endpoint",
                "only '/metrics' is currently supported",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> CetrackError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 이벤트 싱크 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// HTTP 수신 주소 (포트 0이면 임의 포트)
    pub bind_addr: String,
    /// 요청 본문 최대 크기 (바이트)
    pub max_body_bytes: usize,
    /// 저장소 최대 이벤트 수 (초과 시 쓰기 거부)
    pub max_events: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_owned(),
            max_body_bytes: 1024 * 1024, // 1MB
            max_events: 100_000,
        }
    }
}

/// 트래커 및 어설션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// 싱크 준비 대기 한도 (밀리초)
    pub setup_timeout_ms: u64,
    /// 싱크 해제 대기 한도 (밀리초)
    pub teardown_timeout_ms: u64,
    /// 싱크 조회 요청 타임아웃 (밀리초)
    pub request_timeout_ms: u64,
    /// 첫 폴링 간격 (밀리초)
    pub poll_initial_interval_ms: u64,
    /// 최대 폴링 간격 (밀리초)
    pub poll_max_interval_ms: u64,
    /// 폴링 간격 증가 배수 (1.0이면 고정 간격)
    pub poll_multiplier: f64,
    /// 어설션 기본 마감 시간 (밀리초)
    pub default_deadline_ms: u64,
    /// 실패 리포트에 포함할 최대 근접 후보 수
    pub max_diagnostics: usize,
}

impl TrackerConfig {
    pub fn setup_timeout(&self) -> Duration {
        Duration::from_millis(self.setup_timeout_ms)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.default_deadline_ms)
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            setup_timeout_ms: 30_000,
            teardown_timeout_ms: 10_000,
            request_timeout_ms: 5_000,
            poll_initial_interval_ms: 100,
            poll_max_interval_ms: 2_000,
            poll_multiplier: 2.0,
            default_deadline_ms: 120_000,
            max_diagnostics: 3,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse {type_name} from env var, ignoring"
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_f64(target: &mut f64, env_key: &str) {
    override_parsed(target, env_key, "f64");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = CetrackConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.sink.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.tracker.max_diagnostics, 3);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        CetrackConfig::default().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = CetrackConfig::parse("").unwrap();
        assert_eq!(config.tracker.poll_initial_interval_ms, 100);
        assert_eq!(config.sink.max_events, 100_000);
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[sink]
bind_addr = "127.0.0.1:0"

[tracker]
poll_multiplier = 1.0
"#;
        let config = CetrackConfig::parse(toml).unwrap();
        assert_eq!(config.sink.bind_addr, "127.0.0.1:0");
        // 나머지는 기본값 유지
        assert_eq!(config.sink.max_body_bytes, 1024 * 1024);
        assert_eq!(config.tracker.poll_multiplier, 1.0);
        assert_eq!(config.tracker.default_deadline_ms, 120_000);
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = CetrackConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            CetrackError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = CetrackConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_bad_bind_addr() {
        let mut config = CetrackConfig::default();
        config.sink.bind_addr = "localhost".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sink.bind_addr"));
    }

    #[test]
    fn validate_rejects_zero_deadline() {
        let mut config = CetrackConfig::default();
        config.tracker.default_deadline_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("default_deadline_ms"));
    }

    #[test]
    fn validate_rejects_max_interval_below_initial() {
        let mut config = CetrackConfig::default();
        config.tracker.poll_initial_interval_ms = 500;
        config.tracker.poll_max_interval_ms = 100;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll_max_interval_ms"));
    }

    #[test]
    fn validate_rejects_shrinking_multiplier() {
        let mut config = CetrackConfig::default();
        config.tracker.poll_multiplier = 0.5;
        assert!(config.validate().is_err());
        config.tracker.poll_multiplier = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn tracker_durations() {
        let tracker = TrackerConfig::default();
        assert_eq!(tracker.setup_timeout(), Duration::from_secs(30));
        assert_eq!(tracker.default_deadline(), Duration::from_secs(120));
    }

    #[test]
    #[serial]
    fn env_override_u64() {
        let mut config = CetrackConfig::default();
        // SAFETY: serial 테스트로 실행되어 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("CETRACK_TRACKER_DEFAULT_DEADLINE_MS", "2500") };
        config.apply_env_overrides();
        unsafe { std::env::remove_var("CETRACK_TRACKER_DEFAULT_DEADLINE_MS") };
        assert_eq!(config.tracker.default_deadline_ms, 2500);
    }

    #[test]
    #[serial]
    fn env_override_invalid_keeps_original() {
        let mut val = 7u64;
        // SAFETY: serial 테스트로 실행되어 환경변수 조작이 다른 테스트와 겹치지 않습니다.
        unsafe { std::env::set_var("TEST_CETRACK_U64_BAD", "seven") };
        override_u64(&mut val, "TEST_CETRACK_U64_BAD");
        unsafe { std::env::remove_var("TEST_CETRACK_U64_BAD") };
        assert_eq!(val, 7);
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_CETRACK_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = CetrackConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = CetrackConfig::parse(&toml_str).unwrap();
        assert_eq!(config.sink.bind_addr, parsed.sink.bind_addr);
        assert_eq!(config.tracker.poll_multiplier, parsed.tracker.poll_multiplier);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = CetrackConfig::from_file("/nonexistent/path/cetrack.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CetrackError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
