//! CloudEvents HTTP 프로토콜 바인딩
//!
//! 두 가지 content mode를 지원합니다.
//!
//! - **binary**: 컨텍스트 속성은 `ce-` 접두어 헤더, `Content-Type`은 `datacontenttype`,
//!   본문은 그대로 페이로드가 됩니다.
//! - **structured**: `Content-Type: application/cloudevents+json` 본문 하나에
//!   속성과 `data`(또는 `data_base64`)가 함께 담깁니다.
//!
//! 발신 측(CLI heartbeats 등)이 쓰는 인코딩 함수도 함께 제공하여
//! 수신과 송신이 같은 규칙을 공유하도록 합니다.

use std::fmt;

use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use cetrack_core::event::CloudEventHeaders;
use serde_json::{Map, Value};

use crate::error::SinkError;

/// structured mode content type
pub const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";

/// batch mode content type 접두어 (미지원)
const BATCH_CONTENT_TYPE_PREFIX: &str = "application/cloudevents-batch";

/// binary mode 헤더 접두어
pub const BINARY_HEADER_PREFIX: &str = "ce-";

/// 요청이 사용한 인코딩 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMode {
    /// 헤더 + 원시 본문
    Binary,
    /// JSON 봉투
    Structured,
}

impl ContentMode {
    /// 메트릭 레이블 값
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Structured => "structured",
        }
    }
}

impl fmt::Display for ContentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 디코딩 결과
#[derive(Debug, Clone)]
pub struct DecodedEvent {
    /// 컨텍스트 속성
    pub headers: CloudEventHeaders,
    /// 페이로드
    pub payload: Bytes,
    /// 사용된 content mode
    pub mode: ContentMode,
}

/// HTTP 요청 헤더와 본문을 CloudEvent로 디코딩합니다.
///
/// 필수 속성(`id`, `source`, `type`, `specversion`)이 없으면
/// [`SinkError::MissingAttributes`]를 반환합니다.
pub fn decode(headers: &HeaderMap, body: Bytes) -> Result<DecodedEvent, SinkError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase());

    let decoded = match content_type.as_deref() {
        Some(ct) if ct.starts_with(BATCH_CONTENT_TYPE_PREFIX) => {
            return Err(SinkError::UnsupportedMode("batch".to_owned()));
        }
        Some(ct) if ct.starts_with(STRUCTURED_CONTENT_TYPE) => {
            let (headers, payload) = decode_structured(&body)?;
            DecodedEvent {
                headers,
                payload,
                mode: ContentMode::Structured,
            }
        }
        _ => DecodedEvent {
            headers: decode_binary_headers(headers)?,
            payload: body,
            mode: ContentMode::Binary,
        },
    };

    let missing = decoded.headers.missing_required();
    if !missing.is_empty() {
        return Err(SinkError::MissingAttributes(missing));
    }
    Ok(decoded)
}

/// binary mode: `ce-*` 헤더에서 속성을 읽습니다.
fn decode_binary_headers(headers: &HeaderMap) -> Result<CloudEventHeaders, SinkError> {
    let mut attrs = CloudEventHeaders::default();

    for (name, value) in headers {
        let Some(attr) = name.as_str().strip_prefix(BINARY_HEADER_PREFIX) else {
            continue;
        };
        let value = value
            .to_str()
            .map_err(|_| SinkError::Malformed(format!("header '{name}' is not valid text")))?;
        set_attribute(&mut attrs, attr, value.to_owned());
    }

    // Content-Type이 있을 때만 ce-datacontenttype보다 우선합니다.
    if let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        attrs.datacontenttype = Some(content_type.to_owned());
    }

    Ok(attrs)
}

/// structured mode: JSON 봉투에서 속성과 페이로드를 읽습니다.
fn decode_structured(body: &[u8]) -> Result<(CloudEventHeaders, Bytes), SinkError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| SinkError::Malformed(format!("invalid structured event: {e}")))?;
    let Value::Object(object) = value else {
        return Err(SinkError::Malformed(
            "structured event must be a JSON object".to_owned(),
        ));
    };

    let mut attrs = CloudEventHeaders::default();
    let mut data = None;
    let mut data_base64 = None;

    for (key, value) in object {
        match key.as_str() {
            "data" => data = Some(value),
            "data_base64" => data_base64 = Some(value),
            _ => set_attribute(&mut attrs, &key.to_ascii_lowercase(), attribute_text(value)),
        }
    }

    let payload = match (data, data_base64) {
        (Some(_), Some(_)) => {
            return Err(SinkError::Malformed(
                "structured event carries both data and data_base64".to_owned(),
            ));
        }
        (None, Some(Value::String(encoded))) => STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(|e| SinkError::Malformed(format!("invalid data_base64: {e}")))?,
        (None, Some(_)) => {
            return Err(SinkError::Malformed(
                "data_base64 must be a string".to_owned(),
            ));
        }
        (Some(data), None) => structured_data_bytes(data, attrs.datacontenttype.as_deref())?,
        (None, None) => Bytes::new(),
    };

    Ok((attrs, payload))
}

/// `data` 멤버를 페이로드 바이트로 변환합니다.
///
/// JSON content type이 아닌데 문자열이면 문자열 자체가 페이로드입니다.
/// 그 외에는 JSON 직렬화 결과를 페이로드로 씁니다.
fn structured_data_bytes(data: Value, content_type: Option<&str>) -> Result<Bytes, SinkError> {
    match data {
        Value::String(text) if !is_json_content_type(content_type) => Ok(Bytes::from(text)),
        other => serde_json::to_vec(&other)
            .map(Bytes::from)
            .map_err(|e| SinkError::Malformed(format!("unserializable data: {e}"))),
    }
}

/// content type이 없거나 JSON 계열이면 true
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        None => true,
        Some(ct) => {
            let essence = ct.split(';').next().unwrap_or_default().trim();
            essence.eq_ignore_ascii_case("application/json")
                || essence.eq_ignore_ascii_case("text/json")
                || essence.to_ascii_lowercase().ends_with("+json")
        }
    }
}

fn attribute_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn set_attribute(attrs: &mut CloudEventHeaders, name: &str, value: String) {
    match name {
        "id" => attrs.id = value,
        "source" => attrs.source = value,
        "type" => attrs.ty = value,
        "specversion" => attrs.specversion = value,
        "subject" => attrs.subject = Some(value),
        "time" => attrs.time = Some(value),
        "datacontenttype" => attrs.datacontenttype = Some(value),
        "dataschema" => attrs.dataschema = Some(value),
        ext => {
            attrs.extensions.insert(ext.to_ascii_lowercase(), value);
        }
    }
}

// ─── 인코딩 ──────────────────────────────────────────────────────────

/// binary mode 요청 헤더 목록을 만듭니다.
///
/// `datacontenttype`은 `Content-Type` 헤더로 내보냅니다.
pub fn encode_binary_headers(attrs: &CloudEventHeaders) -> Vec<(String, String)> {
    let mut out = vec![
        ("ce-id".to_owned(), attrs.id.clone()),
        ("ce-source".to_owned(), attrs.source.clone()),
        ("ce-type".to_owned(), attrs.ty.clone()),
        ("ce-specversion".to_owned(), attrs.specversion.clone()),
    ];
    let optional = [
        ("ce-subject", &attrs.subject),
        ("ce-time", &attrs.time),
        ("ce-dataschema", &attrs.dataschema),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            out.push((name.to_owned(), value.clone()));
        }
    }
    for (name, value) in &attrs.extensions {
        out.push((format!("{BINARY_HEADER_PREFIX}{name}"), value.clone()));
    }
    if let Some(ct) = &attrs.datacontenttype {
        out.push((CONTENT_TYPE.as_str().to_owned(), ct.clone()));
    }
    out
}

/// structured mode JSON 봉투를 만듭니다.
///
/// JSON content type이고 페이로드가 유효한 JSON이면 `data`에 그대로 넣고,
/// UTF-8 텍스트면 문자열로, 그 외에는 `data_base64`로 담습니다.
pub fn encode_structured(attrs: &CloudEventHeaders, payload: &[u8]) -> Value {
    let mut object = Map::new();
    object.insert("id".to_owned(), Value::String(attrs.id.clone()));
    object.insert("source".to_owned(), Value::String(attrs.source.clone()));
    object.insert("type".to_owned(), Value::String(attrs.ty.clone()));
    object.insert(
        "specversion".to_owned(),
        Value::String(attrs.specversion.clone()),
    );
    let optional = [
        ("subject", &attrs.subject),
        ("time", &attrs.time),
        ("datacontenttype", &attrs.datacontenttype),
        ("dataschema", &attrs.dataschema),
    ];
    for (name, value) in optional {
        if let Some(value) = value {
            object.insert(name.to_owned(), Value::String(value.clone()));
        }
    }
    for (name, value) in &attrs.extensions {
        object.insert(name.clone(), Value::String(value.clone()));
    }

    if !payload.is_empty() {
        let json_payload = is_json_content_type(attrs.datacontenttype.as_deref())
            .then(|| serde_json::from_slice::<Value>(payload).ok())
            .flatten();
        match (json_payload, std::str::from_utf8(payload)) {
            (Some(json), _) => {
                object.insert("data".to_owned(), json);
            }
            (None, Ok(text)) if !is_json_content_type(attrs.datacontenttype.as_deref()) => {
                object.insert("data".to_owned(), Value::String(text.to_owned()));
            }
            _ => {
                object.insert(
                    "data_base64".to_owned(),
                    Value::String(STANDARD.encode(payload)),
                );
            }
        }
    }

    Value::Object(object)
}
