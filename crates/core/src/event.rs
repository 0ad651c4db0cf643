//! 기록된 이벤트 -- 싱크가 수신한 CloudEvent의 불변 레코드
//!
//! [`CloudEventHeaders`]는 매칭에 필요한 CloudEvents 컨텍스트 속성을 담고,
//! [`RecordedEvent`]는 싱크 저장소가 도착 순서대로 부여한 시퀀스 번호와
//! 수신 시각, 원시 페이로드를 함께 보관합니다.
//!
//! 페이로드 JSON 파싱은 처음 요청될 때 한 번만 수행되고 캐싱됩니다.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 지원하는 CloudEvents 스펙 버전
pub const SPEC_VERSION_V1: &str = "1.0";

/// JSON 페이로드 content type
pub const APPLICATION_JSON: &str = "application/json";

/// CloudEvents 컨텍스트 속성
///
/// 필수 속성은 `id`, `source`, `type`, `specversion` 이고,
/// 선택 속성과 확장 속성은 수신한 그대로 보존됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudEventHeaders {
    /// 이벤트 ID (발신자 기준 고유)
    pub id: String,
    /// 소스 URI
    pub source: String,
    /// 이벤트 타입
    #[serde(rename = "type")]
    pub ty: String,
    /// 스펙 버전
    pub specversion: String,
    /// subject 속성
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// time 속성 (발신자가 보낸 문자열 그대로)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// 페이로드 content type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacontenttype: Option<String>,
    /// dataschema 속성
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataschema: Option<String>,
    /// 확장 속성 (이름은 소문자)
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,
}

impl CloudEventHeaders {
    /// 필수 속성으로 헤더를 생성합니다. specversion은 1.0으로 설정됩니다.
    pub fn new(id: impl Into<String>, source: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            ty: ty.into(),
            specversion: SPEC_VERSION_V1.to_owned(),
            ..Self::default()
        }
    }

    /// 확장 속성을 추가합니다.
    pub fn with_extension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// subject를 설정합니다.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// 페이로드 content type을 설정합니다.
    pub fn with_data_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.datacontenttype = Some(content_type.into());
        self
    }

    /// 확장 속성 값을 조회합니다.
    pub fn extension(&self, name: &str) -> Option<&str> {
        self.extensions.get(name).map(String::as_str)
    }

    /// 비어있는 필수 속성 이름 목록을 반환합니다.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.id.is_empty() {
            missing.push("id");
        }
        if self.source.is_empty() {
            missing.push("source");
        }
        if self.ty.is_empty() {
            missing.push("type");
        }
        if self.specversion.is_empty() {
            missing.push("specversion");
        }
        missing
    }
}

/// 싱크가 기록한 이벤트
///
/// 저장소에 추가된 뒤에는 절대 변경되지 않습니다.
/// 시퀀스 번호는 저장소 단위로 1부터 순차 증가합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// 도착 순서 시퀀스 번호
    pub sequence: u64,
    /// 싱크 수신 시각
    pub received_at: DateTime<Utc>,
    /// CloudEvents 컨텍스트 속성
    pub headers: CloudEventHeaders,
    /// 원시 페이로드
    #[serde(with = "payload_base64")]
    pub payload: Bytes,
    #[serde(skip)]
    parsed: OnceLock<Option<serde_json::Value>>,
}

impl RecordedEvent {
    /// 현재 시각을 수신 시각으로 하는 레코드를 생성합니다.
    pub fn new(sequence: u64, headers: CloudEventHeaders, payload: Bytes) -> Self {
        Self::at(sequence, Utc::now(), headers, payload)
    }

    /// 수신 시각을 지정하여 레코드를 생성합니다.
    pub fn at(
        sequence: u64,
        received_at: DateTime<Utc>,
        headers: CloudEventHeaders,
        payload: Bytes,
    ) -> Self {
        Self {
            sequence,
            received_at,
            headers,
            payload,
            parsed: OnceLock::new(),
        }
    }

    /// 소스 URI
    pub fn source(&self) -> &str {
        &self.headers.source
    }

    /// 이벤트 타입
    pub fn event_type(&self) -> &str {
        &self.headers.ty
    }

    /// 발신자가 부여한 이벤트 ID
    pub fn event_id(&self) -> &str {
        &self.headers.id
    }

    /// 확장 속성 값
    pub fn extension(&self, name: &str) -> Option<&str> {
        self.headers.extension(name)
    }

    /// 페이로드를 UTF-8 문자열로 반환합니다 (유효하지 않으면 `None`).
    pub fn payload_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// 페이로드를 JSON으로 파싱한 결과를 반환합니다.
    ///
    /// 첫 호출에서만 파싱하며 이후에는 캐시를 반환합니다.
    /// JSON이 아니면 `None`.
    pub fn payload_json(&self) -> Option<&serde_json::Value> {
        self.parsed
            .get_or_init(|| serde_json::from_slice(&self.payload).ok())
            .as_ref()
    }
}

impl PartialEq for RecordedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
            && self.received_at == other.received_at
            && self.headers == other.headers
            && self.payload == other.payload
    }
}

impl Eq for RecordedEvent {}

impl fmt::Display for RecordedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecordedEvent[#{}] id={} source={} type={} payload={}B",
            self.sequence,
            self.headers.id,
            self.headers.source,
            self.headers.ty,
            self.payload.len(),
        )
    }
}

mod payload_base64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_headers() -> CloudEventHeaders {
        CloudEventHeaders::new("evt-1", "https://example.com/heartbeats", "dev.example.ping")
            .with_extension("SinkBinding", "secret-42")
            .with_data_content_type(APPLICATION_JSON)
    }

    #[test]
    fn new_headers_default_to_v1() {
        let headers = CloudEventHeaders::new("a", "b", "c");
        assert_eq!(headers.specversion, SPEC_VERSION_V1);
        assert!(headers.missing_required().is_empty());
    }

    #[test]
    fn missing_required_lists_empty_fields() {
        let headers = CloudEventHeaders {
            id: "x".to_owned(),
            ..CloudEventHeaders::default()
        };
        assert_eq!(
            headers.missing_required(),
            vec!["source", "type", "specversion"]
        );
    }

    #[test]
    fn extension_names_are_lowercased() {
        let headers = sample_headers();
        assert_eq!(headers.extension("sinkbinding"), Some("secret-42"));
        assert_eq!(headers.extension("SinkBinding"), None);
    }

    #[test]
    fn payload_json_is_parsed_lazily() {
        let event = RecordedEvent::new(
            1,
            sample_headers(),
            Bytes::from_static(br#"{"msg":"hello","id":3}"#),
        );
        let json = event.payload_json().expect("payload is json");
        assert_eq!(json["msg"], "hello");
        // 두 번째 호출은 캐시된 같은 값을 반환
        assert!(std::ptr::eq(json, event.payload_json().unwrap()));
    }

    #[test]
    fn payload_json_none_for_binary() {
        let event = RecordedEvent::new(1, sample_headers(), Bytes::from_static(&[0xff, 0x00]));
        assert!(event.payload_json().is_none());
        assert!(event.payload_text().is_none());
    }

    #[test]
    fn serde_roundtrip_preserves_payload_bytes() {
        let event = RecordedEvent::new(7, sample_headers(), Bytes::from_static(&[0, 1, 2, 254]));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"dev.example.ping\""));
        let decoded: RecordedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn display_contains_sequence_and_source() {
        let event = RecordedEvent::new(12, sample_headers(), Bytes::new());
        let text = event.to_string();
        assert!(text.contains("#12"));
        assert!(text.contains("https://example.com/heartbeats"));
    }
}
