//! 이벤트 매처 -- 기록된 이벤트 하나에 대한 조합 가능한 조건
//!
//! [`Matcher`]는 부작용 없는 순수 조건입니다. 평가에 실패하면
//! 진단용 [`Mismatch`] 목록(필드, 기대값, 실제값)을 돌려줍니다.
//!
//! 매처는 [`BoxedMatcher`] 값으로 조합합니다.
//!
//! ```ignore
//! use cetrack_tracker::matcher::{all_of, has_extension, has_source, heartbeat_message};
//!
//! let matcher = all_of(vec![
//!     has_source("https://knative.dev/eventing/test/heartbeats/#ns/hb"),
//!     has_extension("sinkbinding", "secret"),
//!     heartbeat_message("hello"),
//! ]);
//! ```

use std::fmt;

use bytes::Bytes;
use cetrack_core::event::{APPLICATION_JSON, RecordedEvent};
use regex::Regex;
use serde_json::Value;

/// 단일 조건 불일치
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// 비교한 필드 (예: `source`, `extension sinkbinding`, `data/msg`)
    pub field: String,
    /// 기대값
    pub expected: String,
    /// 실제값
    pub actual: String,
}

impl Mismatch {
    /// 새 불일치를 생성합니다.
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, got {}",
            self.field, self.expected, self.actual
        )
    }
}

/// 평가 결과. 실패 시 불일치 목록을 담습니다.
pub type MatchResult = Result<(), Vec<Mismatch>>;

/// 기록된 이벤트 하나에 대한 조건
///
/// 구현은 부작용이 없어야 합니다. 같은 이벤트에 대해 항상 같은 결과를 내야
/// 어설션 엔진이 양성 결과를 재평가 없이 기억할 수 있습니다.
pub trait Matcher: Send + Sync {
    /// 사람이 읽을 수 있는 조건 설명
    fn describe(&self) -> String;

    /// 이벤트를 평가합니다.
    fn evaluate(&self, event: &RecordedEvent) -> MatchResult;

    /// 이벤트가 조건을 만족하는지 확인합니다.
    fn matches(&self, event: &RecordedEvent) -> bool {
        self.evaluate(event).is_ok()
    }
}

/// 소유권으로 조합되는 매처 값
pub type BoxedMatcher = Box<dyn Matcher>;

impl<M: Matcher + ?Sized> Matcher for Box<M> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn evaluate(&self, event: &RecordedEvent) -> MatchResult {
        (**self).evaluate(event)
    }
}

const ABSENT: &str = "<absent>";

fn quoted(value: Option<&str>) -> String {
    value.map_or_else(|| ABSENT.to_owned(), |v| format!("{v:?}"))
}

// ─── 속성 매처 ──────────────────────────────────────────────────────

type Extract = fn(&RecordedEvent) -> Option<&str>;

/// 컨텍스트 속성 동등 비교
struct AttributeEquals {
    field: &'static str,
    expected: String,
    extract: Extract,
}

impl Matcher for AttributeEquals {
    fn describe(&self) -> String {
        format!("{} == {:?}", self.field, self.expected)
    }

    fn evaluate(&self, event: &RecordedEvent) -> MatchResult {
        let actual = (self.extract)(event);
        if actual == Some(self.expected.as_str()) {
            Ok(())
        } else {
            Err(vec![Mismatch::new(
                self.field,
                format!("{:?}", self.expected),
                quoted(actual),
            )])
        }
    }
}

fn attribute(field: &'static str, expected: impl Into<String>, extract: Extract) -> BoxedMatcher {
    Box::new(AttributeEquals {
        field,
        expected: expected.into(),
        extract,
    })
}

/// 소스 URI가 같은 이벤트
pub fn has_source(source: impl Into<String>) -> BoxedMatcher {
    attribute("source", source, |e| Some(e.source()))
}

/// 이벤트 타입이 같은 이벤트
pub fn has_type(ty: impl Into<String>) -> BoxedMatcher {
    attribute("type", ty, |e| Some(e.event_type()))
}

/// 발신자 이벤트 ID가 같은 이벤트
pub fn has_id(id: impl Into<String>) -> BoxedMatcher {
    attribute("id", id, |e| Some(e.event_id()))
}

/// subject가 같은 이벤트
pub fn has_subject(subject: impl Into<String>) -> BoxedMatcher {
    attribute("subject", subject, |e| e.headers.subject.as_deref())
}

/// datacontenttype이 같은 이벤트
pub fn has_data_content_type(content_type: impl Into<String>) -> BoxedMatcher {
    attribute("datacontenttype", content_type, |e| {
        e.headers.datacontenttype.as_deref()
    })
}

/// 확장 속성 이름과 값이 모두 같은 이벤트
struct HasExtension {
    name: String,
    value: String,
}

impl Matcher for HasExtension {
    fn describe(&self) -> String {
        format!("extension {} == {:?}", self.name, self.value)
    }

    fn evaluate(&self, event: &RecordedEvent) -> MatchResult {
        let actual = event.extension(&self.name);
        if actual == Some(self.value.as_str()) {
            Ok(())
        } else {
            Err(vec![Mismatch::new(
                format!("extension {}", self.name),
                format!("{:?}", self.value),
                quoted(actual),
            )])
        }
    }
}

/// 확장 속성 `name`이 `value`인 이벤트. 이름은 대소문자를 구분하지 않습니다.
pub fn has_extension(name: impl Into<String>, value: impl Into<String>) -> BoxedMatcher {
    Box::new(HasExtension {
        name: name.into().to_ascii_lowercase(),
        value: value.into(),
    })
}

struct HasExtensionKey(String);

impl Matcher for HasExtensionKey {
    fn describe(&self) -> String {
        format!("has extension {}", self.0)
    }

    fn evaluate(&self, event: &RecordedEvent) -> MatchResult {
        match event.extension(&self.0) {
            Some(_) => Ok(()),
            None => Err(vec![Mismatch::new(
                format!("extension {}", self.0),
                "present",
                ABSENT,
            )]),
        }
    }
}

/// 확장 속성 `name`이 존재하는 이벤트
pub fn has_extension_key(name: impl Into<String>) -> BoxedMatcher {
    Box::new(HasExtensionKey(name.into().to_ascii_lowercase()))
}

// ─── 페이로드 매처 ──────────────────────────────────────────────────

/// 진단 출력용 페이로드 요약 (최대 64자)
fn payload_preview(payload: &[u8]) -> String {
    const MAX_PREVIEW: usize = 64;
    match std::str::from_utf8(payload) {
        Ok(text) if text.chars().count() > MAX_PREVIEW => {
            let head: String = text.chars().take(MAX_PREVIEW).collect();
            format!("{head:?}...")
        }
        Ok(text) => format!("{text:?}"),
        Err(_) => format!("<{} bytes binary>", payload.len()),
    }
}

struct DataEquals(Bytes);

impl Matcher for DataEquals {
    fn describe(&self) -> String {
        format!("data == {}", payload_preview(&self.0))
    }

    fn evaluate(&self, event: &RecordedEvent) -> MatchResult {
        if event.payload == self.0 {
            Ok(())
        } else {
            Err(vec![Mismatch::new(
                "data",
                payload_preview(&self.0),
                payload_preview(&event.payload),
            )])
        }
    }
}

/// 페이로드가 바이트 단위로 같은 이벤트
pub fn data_equals(payload: impl Into<Bytes>) -> BoxedMatcher {
    Box::new(DataEquals(payload.into()))
}

struct DataContains(String);

impl Matcher for DataContains {
    fn describe(&self) -> String {
        format!("data contains {:?}", self.0)
    }

    fn evaluate(&self, event: &RecordedEvent) -> MatchResult {
        match event.payload_text() {
            Some(text) if text.contains(&self.0) => Ok(()),
            _ => Err(vec![Mismatch::new(
                "data",
                format!("text containing {:?}", self.0),
                payload_preview(&event.payload),
            )]),
        }
    }
}

/// 페이로드 텍스트에 `needle`이 포함된 이벤트
pub fn data_contains(needle: impl Into<String>) -> BoxedMatcher {
    Box::new(DataContains(needle.into()))
}

struct DataMatches(Regex);

impl Matcher for DataMatches {
    fn describe(&self) -> String {
        format!("data =~ /{}/", self.0.as_str())
    }

    fn evaluate(&self, event: &RecordedEvent) -> MatchResult {
        match event.payload_text() {
            Some(text) if self.0.is_match(text) => Ok(()),
            _ => Err(vec![Mismatch::new(
                "data",
                format!("text matching /{}/", self.0.as_str()),
                payload_preview(&event.payload),
            )]),
        }
    }
}

/// 페이로드 텍스트가 정규식에 매칭되는 이벤트
pub fn data_matches(pattern: Regex) -> BoxedMatcher {
    Box::new(DataMatches(pattern))
}

struct DataJsonField {
    pointer: String,
    expected: Value,
}

impl Matcher for DataJsonField {
    fn describe(&self) -> String {
        format!("data{} == {}", self.pointer, self.expected)
    }

    fn evaluate(&self, event: &RecordedEvent) -> MatchResult {
        let actual = event.payload_json().and_then(|json| json.pointer(&self.pointer));
        if actual == Some(&self.expected) {
            return Ok(());
        }
        let actual = match (event.payload_json(), actual) {
            (None, _) => "<non-json payload>".to_owned(),
            (Some(_), None) => ABSENT.to_owned(),
            (Some(_), Some(value)) => value.to_string(),
        };
        Err(vec![Mismatch::new(
            format!("data{}", self.pointer),
            self.expected.to_string(),
            actual,
        )])
    }
}

/// JSON 페이로드의 `pointer`(RFC 6901) 위치 값이 `expected`인 이벤트
pub fn data_json_field(pointer: impl Into<String>, expected: impl Into<Value>) -> BoxedMatcher {
    Box::new(DataJsonField {
        pointer: pointer.into(),
        expected: expected.into(),
    })
}

struct DataJsonSubset(Value);

impl Matcher for DataJsonSubset {
    fn describe(&self) -> String {
        format!("data contains json {}", self.0)
    }

    fn evaluate(&self, event: &RecordedEvent) -> MatchResult {
        let Some(actual) = event.payload_json() else {
            return Err(vec![Mismatch::new(
                "data",
                self.0.to_string(),
                "<non-json payload>",
            )]);
        };
        let mut mismatches = Vec::new();
        json_subset(&self.0, actual, String::new(), &mut mismatches);
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(mismatches)
        }
    }
}

/// `expected`의 모든 객체 필드가 `actual`에 같은 값으로 있는지 재귀적으로 비교합니다.
/// 배열과 스칼라는 완전히 같아야 합니다.
fn json_subset(expected: &Value, actual: &Value, path: String, out: &mut Vec<Mismatch>) {
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => {
            for (key, exp_value) in exp {
                let child = format!("{path}/{key}");
                match act.get(key) {
                    Some(act_value) => json_subset(exp_value, act_value, child, out),
                    None => out.push(Mismatch::new(
                        format!("data{child}"),
                        exp_value.to_string(),
                        ABSENT,
                    )),
                }
            }
        }
        _ if expected == actual => {}
        _ => out.push(Mismatch::new(
            format!("data{path}"),
            expected.to_string(),
            actual.to_string(),
        )),
    }
}

/// JSON 페이로드가 `expected` 구조를 포함하는 이벤트
pub fn data_json_subset(expected: Value) -> BoxedMatcher {
    Box::new(DataJsonSubset(expected))
}

/// heartbeats 발신자 페이로드: JSON content type이고 `msg` 필드가 `msg`인 이벤트
pub fn heartbeat_message(msg: impl Into<String>) -> BoxedMatcher {
    all_of(vec![
        has_data_content_type(APPLICATION_JSON),
        data_json_field("/msg", Value::String(msg.into())),
    ])
}

// ─── 조합 매처 ──────────────────────────────────────────────────────

/// AND 결합. 모든 하위 매처를 평가하여 불일치를 순서대로 모읍니다.
struct AllOf(Vec<BoxedMatcher>);

impl Matcher for AllOf {
    fn describe(&self) -> String {
        let parts: Vec<String> = self.0.iter().map(|m| m.describe()).collect();
        format!("all_of({})", parts.join(", "))
    }

    fn evaluate(&self, event: &RecordedEvent) -> MatchResult {
        let mismatches: Vec<Mismatch> = self
            .0
            .iter()
            .filter_map(|m| m.evaluate(event).err())
            .flatten()
            .collect();
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(mismatches)
        }
    }
}

/// 모든 하위 매처를 만족하는 이벤트. 비어있으면 모든 이벤트에 매칭됩니다.
pub fn all_of(matchers: Vec<BoxedMatcher>) -> BoxedMatcher {
    Box::new(AllOf(matchers))
}

/// [`all_of`]의 별칭
pub fn match_event(matchers: Vec<BoxedMatcher>) -> BoxedMatcher {
    all_of(matchers)
}

/// 모든 이벤트에 매칭
pub fn any_event() -> BoxedMatcher {
    all_of(Vec::new())
}

struct AnyOf(Vec<BoxedMatcher>);

impl Matcher for AnyOf {
    fn describe(&self) -> String {
        let parts: Vec<String> = self.0.iter().map(|m| m.describe()).collect();
        format!("any_of({})", parts.join(", "))
    }

    fn evaluate(&self, event: &RecordedEvent) -> MatchResult {
        let mut mismatches = Vec::new();
        for matcher in &self.0 {
            match matcher.evaluate(event) {
                Ok(()) => return Ok(()),
                Err(found) => mismatches.extend(found),
            }
        }
        if mismatches.is_empty() {
            // 하위 매처가 없는 any_of는 아무것도 만족하지 않음
            mismatches.push(Mismatch::new("any_of", "at least one matcher", "none"));
        }
        Err(mismatches)
    }
}

/// 하위 매처 중 하나라도 만족하는 이벤트
pub fn any_of(matchers: Vec<BoxedMatcher>) -> BoxedMatcher {
    Box::new(AnyOf(matchers))
}

struct Not(BoxedMatcher);

impl Matcher for Not {
    fn describe(&self) -> String {
        format!("not({})", self.0.describe())
    }

    fn evaluate(&self, event: &RecordedEvent) -> MatchResult {
        match self.0.evaluate(event) {
            Ok(()) => Err(vec![Mismatch::new(
                "not",
                format!("no match for {}", self.0.describe()),
                "matched",
            )]),
            Err(_) => Ok(()),
        }
    }
}

/// 하위 매처를 만족하지 않는 이벤트
pub fn not(matcher: BoxedMatcher) -> BoxedMatcher {
    Box::new(Not(matcher))
}

type Predicate = Box<dyn Fn(&RecordedEvent) -> bool + Send + Sync>;

struct FnMatcher {
    description: String,
    predicate: Predicate,
}

impl Matcher for FnMatcher {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn evaluate(&self, event: &RecordedEvent) -> MatchResult {
        if (self.predicate)(event) {
            Ok(())
        } else {
            Err(vec![Mismatch::new(
                "predicate",
                self.description.clone(),
                "false",
            )])
        }
    }
}

/// 사용자 정의 조건
pub fn from_fn<F>(description: impl Into<String>, predicate: F) -> BoxedMatcher
where
    F: Fn(&RecordedEvent) -> bool + Send + Sync + 'static,
{
    Box::new(FnMatcher {
        description: description.into(),
        predicate: Box::new(predicate),
    })
}
