//! 어설션 결과 보고서
//!
//! [`AssertionReport`]는 성공과 실패 모두에서 반환되며, `Display` 구현이
//! 필요 개수, 관측 개수, 가장 가까운 불일치 후보 진단을 사람이 읽을 수 있게 출력합니다.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cetrack_core::error::TrackerError;
use cetrack_core::event::RecordedEvent;

use crate::matcher::Mismatch;

/// 어설션이 기대하는 매칭 개수
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// 최소 `n`개
    AtLeast(usize),
    /// 정확히 `n`개
    Exactly(usize),
    /// `min` 이상 `max` 이하
    InRange {
        /// 최소 개수
        min: usize,
        /// 최대 개수
        max: usize,
    },
    /// 하나도 없어야 함
    None,
}

impl Expectation {
    /// 대기 종료 조건이 되는 최소 개수
    pub fn min(&self) -> usize {
        match self {
            Self::AtLeast(n) | Self::Exactly(n) => *n,
            Self::InRange { min, .. } => *min,
            Self::None => 0,
        }
    }

    /// 허용되는 최대 개수 (제한 없으면 `None`)
    pub fn max(&self) -> Option<usize> {
        match self {
            Self::AtLeast(_) => None,
            Self::Exactly(n) => Some(*n),
            Self::InRange { max, .. } => Some(*max),
            Self::None => Some(0),
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtLeast(n) => write!(f, "at least {n}"),
            Self::Exactly(n) => write!(f, "exactly {n}"),
            Self::InRange { min, max } => write!(f, "between {min} and {max}"),
            Self::None => f.write_str("none"),
        }
    }
}

/// 매처를 만족하지 못한 이벤트와 그 불일치 목록
#[derive(Debug, Clone)]
pub struct Candidate {
    /// 후보 이벤트
    pub event: Arc<RecordedEvent>,
    /// 불일치 목록
    pub mismatches: Vec<Mismatch>,
}

/// 어설션 보고서
#[derive(Debug, Clone)]
pub struct AssertionReport {
    /// 트래커 식별자
    pub identity: String,
    /// 매처 설명
    pub matcher: String,
    /// 기대 개수
    pub expectation: Expectation,
    /// 종료 시점에 관측된 매칭 개수
    pub observed: usize,
    /// 평가한 전체 이벤트 수
    pub evaluated: usize,
    /// 매칭된 이벤트 (도착 순서)
    pub matched: Vec<Arc<RecordedEvent>>,
    /// 가장 가까운 불일치 후보 (불일치 수 오름차순, 같으면 도착 순서)
    pub closest: Vec<Candidate>,
    /// 수행한 조회 횟수
    pub polls: u64,
    /// 실패한 조회 횟수
    pub read_failures: u64,
    /// 마지막 조회 실패
    pub last_error: Option<TrackerError>,
    /// 소요 시간
    pub elapsed: Duration,
    /// 대기 한도
    pub timeout: Duration,
}

impl AssertionReport {
    /// 필요 개수
    pub fn required(&self) -> usize {
        self.expectation.min()
    }
}

impl fmt::Display for AssertionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "tracker '{}': expected {} event(s) matching {}",
            self.identity, self.expectation, self.matcher
        )?;
        writeln!(
            f,
            "  required: {}, observed: {}, evaluated: {} event(s) in {} poll(s) over {:?} (timeout {:?})",
            self.required(),
            self.observed,
            self.evaluated,
            self.polls,
            self.elapsed,
            self.timeout
        )?;
        if let Some(err) = &self.last_error {
            writeln!(
                f,
                "  read failures: {}, last error: {err}",
                self.read_failures
            )?;
        }
        if !self.matched.is_empty() {
            writeln!(f, "  matched:")?;
            for event in &self.matched {
                writeln!(f, "    - {event}")?;
            }
        }
        if !self.closest.is_empty() {
            writeln!(f, "  closest non-matching events:")?;
            for candidate in &self.closest {
                writeln!(f, "    - {}", candidate.event)?;
                for mismatch in &candidate.mismatches {
                    writeln!(f, "        {mismatch}")?;
                }
            }
        }
        Ok(())
    }
}

/// 어설션 실패
///
/// 각 변형의 `Display`는 전체 진단 보고서를 포함합니다.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AssertionError {
    /// 제한 시간 안에 필요 개수를 관측하지 못함
    #[error("assertion timed out\n{0}")]
    Timeout(Box<AssertionReport>),

    /// 제한 시간 내내 싱크 조회가 실패함
    #[error("sink could not be read before the deadline\n{0}")]
    ReadFailure(Box<AssertionReport>),

    /// 최소 개수는 채웠지만 최대 개수를 넘음
    #[error("too many matching events\n{0}")]
    CountMismatch(Box<AssertionReport>),

    /// 매칭되면 안 되는 이벤트가 기록됨
    #[error("unexpected matching event\n{0}")]
    UnexpectedMatch(Box<AssertionReport>),
}

impl AssertionError {
    /// 실패 보고서
    pub fn report(&self) -> &AssertionReport {
        match self {
            Self::Timeout(r) | Self::ReadFailure(r) | Self::CountMismatch(r) | Self::UnexpectedMatch(r) => r,
        }
    }

    /// 메트릭 레이블 값
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::ReadFailure(_) => "read_failure",
            Self::CountMismatch(_) => "count_mismatch",
            Self::UnexpectedMatch(_) => "unexpected_match",
        }
    }
}
