//! 이벤트 저장소 -- 추가 전용, 도착 순서 보존
//!
//! [`EventStore`]는 싱크가 수신한 이벤트를 도착 순서대로 보관합니다.
//!
//! # 불변 조건
//! - 시퀀스 번호는 1부터 시작하여 빈틈 없이 1씩 증가합니다.
//! - 한 번 추가된 이벤트는 변경되거나 제거되지 않습니다.
//! - `list(since)`는 항상 시퀀스 오름차순의 연속 구간을 반환합니다.
//! - 용량이 차거나 저장소가 닫히면 새 제출을 거부하며, 기존 이벤트를 밀어내지 않습니다.
//!
//! 시퀀스 번호 부여와 벡터 추가가 같은 쓰기 잠금 안에서 일어나므로
//! 동시 제출 간에도 번호 순서와 저장 순서가 일치합니다.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use cetrack_core::error::StorageError;
use cetrack_core::event::{CloudEventHeaders, RecordedEvent};
use cetrack_core::metrics as m;
use chrono::Utc;

/// 기본 최대 이벤트 수
pub const DEFAULT_MAX_EVENTS: usize = 100_000;

#[derive(Debug, Default)]
struct StoreInner {
    events: Vec<Arc<RecordedEvent>>,
    closed: bool,
}

/// 추가 전용 이벤트 저장소
///
/// 여러 요청 핸들러와 트래커가 `Arc<EventStore>`로 공유합니다.
#[derive(Debug)]
pub struct EventStore {
    inner: RwLock<StoreInner>,
    capacity: usize,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVENTS)
    }
}

impl EventStore {
    /// 기본 용량의 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 최대 이벤트 수를 지정하여 저장소를 생성합니다.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            capacity,
        }
    }

    /// 이벤트를 추가하고 시퀀스 번호가 부여된 레코드를 반환합니다.
    ///
    /// # Errors
    ///
    /// 저장소가 닫혔거나 가득 찼으면 [`StorageError::Unavailable`]을 반환합니다.
    pub fn append(
        &self,
        headers: CloudEventHeaders,
        payload: Bytes,
    ) -> Result<Arc<RecordedEvent>, StorageError> {
        let mut inner = self.write()?;

        if inner.closed {
            return Err(StorageError::Unavailable("store is closed".to_owned()));
        }
        if inner.events.len() >= self.capacity {
            return Err(StorageError::Unavailable(format!(
                "store is full ({} events)",
                self.capacity
            )));
        }

        let sequence = inner.events.len() as u64 + 1;
        let event = Arc::new(RecordedEvent::at(sequence, Utc::now(), headers, payload));
        inner.events.push(Arc::clone(&event));
        metrics::gauge!(m::SINK_STORE_SIZE).set(inner.events.len() as f64);

        Ok(event)
    }

    /// `since`보다 큰 시퀀스 번호를 가진 이벤트를 도착 순서대로 반환합니다.
    ///
    /// `since = 0`이면 전체 스냅샷입니다. 닫힌 저장소도 읽을 수 있습니다.
    pub fn list(&self, since: u64) -> Result<Vec<Arc<RecordedEvent>>, StorageError> {
        let inner = self.read()?;
        // 시퀀스 n 은 인덱스 n-1 에 있으므로 since 는 곧 시작 인덱스
        let start = usize::try_from(since)
            .unwrap_or(usize::MAX)
            .min(inner.events.len());
        Ok(inner.events[start..].to_vec())
    }

    /// 시퀀스 번호로 이벤트를 조회합니다.
    pub fn get(&self, sequence: u64) -> Option<Arc<RecordedEvent>> {
        let index = usize::try_from(sequence.checked_sub(1)?).ok()?;
        self.read().ok()?.events.get(index).cloned()
    }

    /// 저장된 이벤트 수
    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.events.len()).unwrap_or(0)
    }

    /// 저장소가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 마지막으로 부여된 시퀀스 번호 (비어있으면 0)
    pub fn last_sequence(&self) -> u64 {
        self.len() as u64
    }

    /// 최대 이벤트 수
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 이후의 쓰기를 거부합니다. 이미 닫혀 있으면 아무 일도 하지 않습니다.
    pub fn close(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.closed = true;
        }
    }

    /// 쓰기를 거부하는 상태인지 확인합니다.
    pub fn is_closed(&self) -> bool {
        self.read().map(|inner| inner.closed).unwrap_or(true)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreInner>, StorageError> {
        self.inner
            .read()
            .map_err(|_| StorageError::Unavailable("store lock poisoned".to_owned()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreInner>, StorageError> {
        self.inner
            .write()
            .map_err(|_| StorageError::Unavailable("store lock poisoned".to_owned()))
    }
}
