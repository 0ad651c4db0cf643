//! # cetrack-tracker
//!
//! 싱크에 기록된 CloudEvents를 조회하고, 마감 시간 안에 기대한 이벤트가
//! 도착했는지 판정하는 트래커와 어설션 엔진입니다.
//!
//! # 구성
//!
//! - [`matcher`]: 이벤트 조건 ([`Matcher`]) 과 조합 함수
//! - [`client`]: 싱크 스냅샷 조회 ([`LocalSinkClient`], [`HttpSinkClient`])
//! - [`provision`]: 싱크 확보/해제 ([`EmbeddedProvisioner`], [`StaticProvisioner`])
//! - [`tracker`]: 싱크 하나에 바인딩된 [`EventTracker`]
//! - [`assertion`]: 폴링 상태 기계와 [`PollPolicy`]
//! - [`report`]: [`AssertionReport`]와 [`AssertionError`]
//!
//! # 사용 예시
//!
//! ```ignore
//! use std::sync::Arc;
//! use cetrack_tracker::{EmbeddedProvisioner, EventTracker, matcher::has_source};
//!
//! let tracker = EventTracker::start("recorder", Arc::new(EmbeddedProvisioner::default()), &config).await?;
//! // tracker.url() 로 이벤트를 보내는 워크로드 실행
//! tracker.assert_at_least(1, has_source("/my/emitter")).await?;
//! tracker.stop().await;
//! ```

pub mod assertion;
pub mod client;
pub mod matcher;
pub mod provision;
pub mod report;
pub mod tracker;

pub use assertion::{Assertion, AssertionState, MIN_POLL_INTERVAL, PollPolicy};
pub use client::{DynSinkClient, HttpSinkClient, LocalSinkClient, SinkClient};
pub use matcher::{BoxedMatcher, Matcher, Mismatch};
pub use provision::{
    DynProvisioner, EmbeddedProvisioner, Provisioner, SinkEndpoint, StaticProvisioner,
};
pub use report::{AssertionError, AssertionReport, Candidate, Expectation};
pub use tracker::{EventTracker, FindResult};
