//! History 모듈 - 생성(gpt) 모드 대화 기록
//!
//! 교환 1건당 레코드 1건을 추가(append)만 합니다. 수정/삭제는 없습니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ============================================================================
// Types
// ============================================================================

/// 기록된 대화 교환
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatExchange {
    /// 사용자가 보낸 원문 (대소문자 그대로)
    pub user_input: String,
    /// 봇 응답
    pub bot_response: String,
    /// 생성 시각 (Recorder가 부여)
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// HistoryLog Trait
// ============================================================================

/// 추가 전용 대화 로그
///
/// 쓰기 직렬화는 구현체가 책임집니다.
pub trait HistoryLog: Send + Sync {
    fn append(&self, exchange: &ChatExchange) -> Result<(), StoreError>;
}

// ============================================================================
// HistoryRecorder
// ============================================================================

/// 대화 기록기
pub struct HistoryRecorder<'a> {
    log: &'a dyn HistoryLog,
}

impl<'a> HistoryRecorder<'a> {
    pub fn new(log: &'a dyn HistoryLog) -> Self {
        Self { log }
    }

    /// 교환 1건 기록
    ///
    /// 실패는 호출자에게 돌려주며, 호출자는 경고로만 처리합니다.
    pub fn record(&self, user_input: &str, bot_response: &str) -> Result<ChatExchange, StoreError> {
        let exchange = ChatExchange {
            user_input: user_input.to_string(),
            bot_response: bot_response.to_string(),
            timestamp: Utc::now(),
        };

        self.log.append(&exchange)?;
        tracing::debug!("Recorded chat exchange at {}", exchange.timestamp);

        Ok(exchange)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryLog {
        entries: Mutex<Vec<ChatExchange>>,
    }

    impl HistoryLog for MemoryLog {
        fn append(&self, exchange: &ChatExchange) -> Result<(), StoreError> {
            self.entries
                .lock()
                .map_err(|e| StoreError::Lock(e.to_string()))?
                .push(exchange.clone());
            Ok(())
        }
    }

    struct BrokenLog;

    impl HistoryLog for BrokenLog {
        fn append(&self, _exchange: &ChatExchange) -> Result<(), StoreError> {
            Err(StoreError::Persist("disk full".to_string()))
        }
    }

    #[test]
    fn test_record_appends_one_entry() {
        let log = MemoryLog::default();
        let recorder = HistoryRecorder::new(&log);

        let before = Utc::now();
        let exchange = recorder.record("What Is The Fee?", "It is 1000.").unwrap();

        assert_eq!(exchange.user_input, "What Is The Fee?");
        assert_eq!(exchange.bot_response, "It is 1000.");
        assert!(exchange.timestamp >= before);

        let entries = log.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0], exchange);
    }

    #[test]
    fn test_record_is_not_idempotent() {
        let log = MemoryLog::default();
        let recorder = HistoryRecorder::new(&log);

        recorder.record("hi", "hello").unwrap();
        recorder.record("hi", "hello").unwrap();

        assert_eq!(log.entries.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_record_surfaces_store_error() {
        let recorder = HistoryRecorder::new(&BrokenLog);
        let err = recorder.record("hi", "hello").unwrap_err();
        assert_eq!(err, StoreError::Persist("disk full".to_string()));
    }
}
