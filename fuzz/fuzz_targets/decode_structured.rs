#![no_main]

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue};
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

use cetrack_sink::codec::{self, STRUCTURED_CONTENT_TYPE};

fn structured_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(STRUCTURED_CONTENT_TYPE));
    headers
}

fuzz_target!(|data: &[u8]| {
    let headers = structured_headers();
    let Ok(decoded) = codec::decode(&headers, Bytes::copy_from_slice(data)) else {
        return;
    };

    // 디코딩에 성공했으면 필수 속성이 모두 있어야 함
    assert!(decoded.headers.missing_required().is_empty());

    // 재인코딩 후 다시 디코딩해도 필수 속성은 유지
    let envelope = codec::encode_structured(&decoded.headers, &decoded.payload);
    let Ok(body) = serde_json::to_vec(&envelope) else {
        return;
    };
    let again = codec::decode(&headers, Bytes::from(body)).expect("re-encoded event must decode");
    assert_eq!(again.headers.id, decoded.headers.id);
    assert_eq!(again.headers.source, decoded.headers.source);
    assert_eq!(again.headers.ty, decoded.headers.ty);
    assert_eq!(again.headers.specversion, decoded.headers.specversion);
});
