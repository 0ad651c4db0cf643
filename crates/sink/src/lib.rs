//! # cetrack-sink
//!
//! CloudEvents를 HTTP로 수신하여 도착 순서대로 기록하는 이벤트 싱크입니다.
//!
//! # 구성
//!
//! - [`codec`]: binary / structured content mode 디코딩과 인코딩
//! - [`store`]: 추가 전용, 순서 보존 [`EventStore`]
//! - [`server`]: axum 기반 HTTP 서버 [`SinkServer`]와 종료 핸들 [`SinkHandle`]
//!
//! # 사용 예시
//!
//! ```ignore
//! use cetrack_core::config::SinkConfig;
//! use cetrack_sink::SinkServer;
//!
//! let config = SinkConfig { bind_addr: "127.0.0.1:0".into(), ..SinkConfig::default() };
//! let mut handle = SinkServer::bind(&config).await?.spawn();
//! println!("sink listening on {}", handle.url());
//! handle.shutdown(std::time::Duration::from_secs(5)).await?;
//! ```

pub mod codec;
pub mod error;
pub mod server;
pub mod store;

pub use codec::{ContentMode, DecodedEvent};
pub use error::SinkError;
pub use server::{EventsPage, HealthResponse, SinkHandle, SinkServer, SubmitResponse, router};
pub use store::EventStore;
