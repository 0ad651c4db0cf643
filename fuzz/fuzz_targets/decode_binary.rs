#![no_main]

use arbitrary::Arbitrary;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use cetrack_sink::codec;

/// 퍼저용 binary mode 요청
#[derive(Arbitrary, Debug)]
struct FuzzRequest {
    /// 헤더 목록 (유효하지 않은 이름/값은 건너뜀)
    headers: Vec<(String, String)>,
    /// `ce-` 필수 헤더를 채울지 여부
    with_required: bool,
    body: Vec<u8>,
}

fuzz_target!(|input: FuzzRequest| {
    let mut headers = HeaderMap::new();
    if input.with_required {
        for (name, value) in [
            ("ce-id", "1"),
            ("ce-source", "/fuzz"),
            ("ce-type", "fuzz"),
            ("ce-specversion", "1.0"),
        ] {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
    }
    for (name, value) in input.headers.iter().take(32) {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            continue;
        };
        headers.append(name, value);
    }

    if let Ok(decoded) = codec::decode(&headers, Bytes::from(input.body)) {
        assert!(decoded.headers.missing_required().is_empty());
        // 확장 속성 이름은 항상 소문자
        assert!(decoded
            .headers
            .extensions
            .keys()
            .all(|k| !k.chars().any(|c| c.is_ascii_uppercase())));
    }
});
