//! Dispatcher - 모드별 응답 경로 선택
//!
//! `Received → Routed(FAQ|GPT) → Answered`
//!
//! - `faq`: 코퍼스 퍼지 매칭 + 임계값 정책. 기록하지 않음
//! - `gpt`: 완성 게이트웨이 호출. 게이트웨이 에러도 텍스트 응답으로 변환
//! - 그 외 모드: `DispatchError::InvalidMode` (게이트웨이 호출/기록 없음)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::faq::{best_match, FaqCorpus};
use crate::gateway::CompletionGateway;
use crate::history::{HistoryLog, HistoryRecorder};

/// FAQ 답변 채택 임계값 (0 ~ 100)
pub const DEFAULT_MATCH_THRESHOLD: f64 = 40.0;

/// 임계값 미달 시 응답
pub const NO_MATCH_RESPONSE: &str = "No match found. Try switching to GPT mode.";

// ============================================================================
// Types
// ============================================================================

/// 응답 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Faq,
    Gpt,
}

impl FromStr for Mode {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "faq" => Ok(Mode::Faq),
            "gpt" => Ok(Mode::Gpt),
            _ => Err(DispatchError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Faq => write!(f, "faq"),
            Mode::Gpt => write!(f, "gpt"),
        }
    }
}

/// 디스패치 요청
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// 원문 (빈 문자열 허용)
    pub message: String,
    /// `faq` | `gpt` (대소문자 무시)
    pub mode: String,
}

impl DispatchRequest {
    pub fn new(message: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            mode: mode.into(),
        }
    }
}

/// 응답이 만들어진 경로
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// 임계값 이상 FAQ 답변
    FaqMatched { score: f64 },
    /// 임계값 미달
    FaqNoMatch { score: f64 },
    /// 코퍼스 조회 실패
    FaqUnavailable,
    /// 완성 성공
    Completed,
    /// 게이트웨이 에러를 텍스트로 반환
    CompletionFailed,
}

/// 최종 응답 (`{"response": "..."}`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(skip)]
    pub outcome: Outcome,
}

/// 디스패치 정책
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchPolicy {
    /// 이 값 이상이면 FAQ 답변 채택
    pub threshold: f64,
    /// 게이트웨이 에러 응답도 기록할지 여부
    pub record_failed_completions: bool,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            record_failed_completions: true,
        }
    }
}

impl DispatchPolicy {
    /// 임계값 판정 (경계값 포함)
    pub fn accepts(&self, score: f64) -> bool {
        score >= self.threshold
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// 요청 1건마다 독립적으로 동작하는 디스패처
///
/// 공유 상태는 코퍼스와 기록 저장소뿐이며, 동기화는 저장소가 담당합니다.
pub struct Dispatcher<'a> {
    corpus: &'a dyn FaqCorpus,
    recorder: HistoryRecorder<'a>,
    gateway: &'a dyn CompletionGateway,
    policy: DispatchPolicy,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        corpus: &'a dyn FaqCorpus,
        history: &'a dyn HistoryLog,
        gateway: &'a dyn CompletionGateway,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            corpus,
            recorder: HistoryRecorder::new(history),
            gateway,
            policy,
        }
    }

    /// 요청 처리
    ///
    /// 잘못된 모드만 에러로 반환하고, 나머지 실패는 모두 텍스트 응답입니다.
    pub async fn dispatch(&self, request: &DispatchRequest) -> Result<ChatReply, DispatchError> {
        let mode: Mode = request.mode.parse().map_err(|e| {
            tracing::warn!("Rejected request: {}", e);
            e
        })?;

        tracing::info!("Routing request to {} ({} chars)", mode, request.message.len());

        let reply = match mode {
            Mode::Faq => self.answer_from_faq(&request.message),
            Mode::Gpt => self.answer_from_gateway(&request.message).await,
        };

        tracing::debug!("Answered: {:?}", reply.outcome);
        Ok(reply)
    }

    fn answer_from_faq(&self, message: &str) -> ChatReply {
        let corpus = match self.corpus.list_all() {
            Ok(corpus) => corpus,
            Err(e) => {
                tracing::warn!("FAQ corpus unavailable: {}", e);
                return ChatReply {
                    response: format!("FAQ lookup failed: {}", e),
                    outcome: Outcome::FaqUnavailable,
                };
            }
        };

        let result = best_match(message, &corpus);

        match result.candidate {
            Some(candidate) if self.policy.accepts(result.score) => ChatReply {
                response: candidate.answer,
                outcome: Outcome::FaqMatched {
                    score: result.score,
                },
            },
            _ => ChatReply {
                response: NO_MATCH_RESPONSE.to_string(),
                outcome: Outcome::FaqNoMatch {
                    score: result.score,
                },
            },
        }
    }

    async fn answer_from_gateway(&self, message: &str) -> ChatReply {
        let reply = match self.gateway.complete(message.trim()).await {
            Ok(text) => ChatReply {
                response: text,
                outcome: Outcome::Completed,
            },
            Err(e) => {
                tracing::warn!("Gateway '{}' failed: {}", self.gateway.name(), e);
                ChatReply {
                    response: e.to_string(),
                    outcome: Outcome::CompletionFailed,
                }
            }
        };

        let should_record =
            reply.outcome == Outcome::Completed || self.policy.record_failed_completions;

        if should_record {
            // 기록 실패는 응답을 막지 않음
            if let Err(e) = self.recorder.record(message, &reply.response) {
                tracing::warn!("Failed to record chat history: {}", e);
            }
        }

        reply
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::error::{GatewayError, StoreError};
    use crate::faq::{FaqEntry, FaqStore, NewFaq};
    use crate::history::ChatExchange;
    use crate::similarity::partial_ratio;

    // ------------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------------

    struct FakeCorpus(Vec<FaqEntry>);

    impl FaqCorpus for FakeCorpus {
        fn list_all(&self) -> Result<Vec<FaqEntry>, StoreError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenCorpus;

    impl FaqCorpus for BrokenCorpus {
        fn list_all(&self) -> Result<Vec<FaqEntry>, StoreError> {
            Err(StoreError::Read("database is locked".to_string()))
        }
    }

    #[derive(Default)]
    struct MemoryLog(Mutex<Vec<ChatExchange>>);

    impl MemoryLog {
        fn len(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    impl HistoryLog for MemoryLog {
        fn append(&self, exchange: &ChatExchange) -> Result<(), StoreError> {
            self.0.lock().unwrap().push(exchange.clone());
            Ok(())
        }
    }

    struct FailingLog;

    impl HistoryLog for FailingLog {
        fn append(&self, _exchange: &ChatExchange) -> Result<(), StoreError> {
            Err(StoreError::Persist("read-only database".to_string()))
        }
    }

    struct FakeGateway {
        reply: Result<String, GatewayError>,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeGateway {
        fn replying(reply: Result<String, GatewayError>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionGateway for FakeGateway {
        async fn complete(&self, prompt: &str) -> Result<String, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone()
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn library_corpus() -> FakeCorpus {
        FakeCorpus(vec![FaqEntry {
            id: 1,
            question: "What are the library hours?".to_string(),
            answer: "9am–9pm".to_string(),
        }])
    }

    // ------------------------------------------------------------------------
    // Mode
    // ------------------------------------------------------------------------

    #[test]
    fn test_mode_parsing() {
        assert_eq!("faq".parse::<Mode>().unwrap(), Mode::Faq);
        assert_eq!("GPT".parse::<Mode>().unwrap(), Mode::Gpt);
        assert_eq!(" Faq ".parse::<Mode>().unwrap(), Mode::Faq);
        assert_eq!(
            "xyz".parse::<Mode>().unwrap_err(),
            DispatchError::InvalidMode("xyz".to_string())
        );
        assert!("".parse::<Mode>().is_err());
    }

    #[test]
    fn test_mode_display_round_trips() {
        for mode in [Mode::Faq, Mode::Gpt] {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_threshold_boundary() {
        let policy = DispatchPolicy::default();
        assert!(policy.accepts(40.0));
        assert!(!policy.accepts(39.0));
        assert!(!policy.accepts(39.999));
        assert!(policy.accepts(100.0));
    }

    #[test]
    fn test_reply_serializes_response_only() {
        let reply = ChatReply {
            response: "hello".to_string(),
            outcome: Outcome::Completed,
        };
        assert_eq!(
            serde_json::to_string(&reply).unwrap(),
            r#"{"response":"hello"}"#
        );
    }

    // ------------------------------------------------------------------------
    // FAQ route
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_faq_scenario_library_hours() {
        let corpus = library_corpus();
        let log = MemoryLog::default();
        let gateway = FakeGateway::replying(Ok("unused".to_string()));
        let dispatcher = Dispatcher::new(&corpus, &log, &gateway, DispatchPolicy::default());

        let reply = dispatcher
            .dispatch(&DispatchRequest::new("library hours", "faq"))
            .await
            .unwrap();

        assert_eq!(reply.response, "9am–9pm");
        assert!(matches!(reply.outcome, Outcome::FaqMatched { score } if score >= 40.0));
        assert_eq!(gateway.calls(), 0);
        assert_eq!(log.len(), 0);
    }

    #[tokio::test]
    async fn test_faq_empty_corpus_returns_no_match() {
        let corpus = FakeCorpus(vec![]);
        let log = MemoryLog::default();
        let gateway = FakeGateway::replying(Ok("unused".to_string()));
        let dispatcher = Dispatcher::new(&corpus, &log, &gateway, DispatchPolicy::default());

        let reply = dispatcher
            .dispatch(&DispatchRequest::new("anything at all", "FAQ"))
            .await
            .unwrap();

        assert_eq!(reply.response, NO_MATCH_RESPONSE);
        assert_eq!(reply.outcome, Outcome::FaqNoMatch { score: 0.0 });
        assert_eq!(log.len(), 0);
    }

    #[tokio::test]
    async fn test_faq_threshold_is_inclusive() {
        let corpus = library_corpus();
        let log = MemoryLog::default();
        let gateway = FakeGateway::replying(Ok("unused".to_string()));

        let query = "libary hoursz";
        let score = partial_ratio(query, "what are the library hours?");
        assert!(score > 0.0 && score < 100.0);

        let at = DispatchPolicy {
            threshold: score,
            ..Default::default()
        };
        let reply = Dispatcher::new(&corpus, &log, &gateway, at)
            .dispatch(&DispatchRequest::new(query, "faq"))
            .await
            .unwrap();
        assert_eq!(reply.response, "9am–9pm");

        let above = DispatchPolicy {
            threshold: score + 1.0,
            ..Default::default()
        };
        let reply = Dispatcher::new(&corpus, &log, &gateway, above)
            .dispatch(&DispatchRequest::new(query, "faq"))
            .await
            .unwrap();
        assert_eq!(reply.response, NO_MATCH_RESPONSE);
    }

    #[tokio::test]
    async fn test_faq_corpus_failure_is_soft() {
        let log = MemoryLog::default();
        let gateway = FakeGateway::replying(Ok("unused".to_string()));
        let dispatcher = Dispatcher::new(&BrokenCorpus, &log, &gateway, DispatchPolicy::default());

        let reply = dispatcher
            .dispatch(&DispatchRequest::new("library hours", "faq"))
            .await
            .unwrap();

        assert_eq!(reply.outcome, Outcome::FaqUnavailable);
        assert!(reply.response.contains("database is locked"));
        assert_eq!(log.len(), 0);
    }

    // ------------------------------------------------------------------------
    // GPT route
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_gpt_success_records_once() {
        let corpus = library_corpus();
        let log = MemoryLog::default();
        let gateway = FakeGateway::replying(Ok("Admissions open in May.".to_string()));
        let dispatcher = Dispatcher::new(&corpus, &log, &gateway, DispatchPolicy::default());

        let reply = dispatcher
            .dispatch(&DispatchRequest::new("  When Do Admissions Open? ", "gpt"))
            .await
            .unwrap();

        assert_eq!(reply.response, "Admissions open in May.");
        assert_eq!(reply.outcome, Outcome::Completed);
        assert_eq!(gateway.calls(), 1);
        assert_eq!(
            gateway.prompts.lock().unwrap()[0],
            "When Do Admissions Open?"
        );

        let entries = log.0.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_input, "  When Do Admissions Open? ");
        assert_eq!(entries[0].bot_response, "Admissions open in May.");
    }

    #[tokio::test]
    async fn test_gpt_remote_failure_is_text_and_recorded() {
        let corpus = library_corpus();
        let log = MemoryLog::default();
        let gateway = FakeGateway::replying(Err(GatewayError::RemoteRejected(
            "500 Internal Server Error".to_string(),
        )));
        let dispatcher = Dispatcher::new(&corpus, &log, &gateway, DispatchPolicy::default());

        let reply = dispatcher
            .dispatch(&DispatchRequest::new("hello", "gpt"))
            .await
            .unwrap();

        assert_eq!(reply.outcome, Outcome::CompletionFailed);
        assert_eq!(reply.response, "OpenRouter error: 500 Internal Server Error");
        assert_eq!(log.len(), 1);
        assert_eq!(log.0.lock().unwrap()[0].bot_response, reply.response);
    }

    #[tokio::test]
    async fn test_gpt_failure_not_recorded_when_disabled() {
        let corpus = library_corpus();
        let log = MemoryLog::default();
        let gateway = FakeGateway::replying(Err(GatewayError::Unconfigured));
        let policy = DispatchPolicy {
            record_failed_completions: false,
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(&corpus, &log, &gateway, policy);

        let reply = dispatcher
            .dispatch(&DispatchRequest::new("hello", "gpt"))
            .await
            .unwrap();

        assert_eq!(reply.response, "OpenRouter API key not set");
        assert_eq!(log.len(), 0);
    }

    #[tokio::test]
    async fn test_gpt_history_failure_does_not_withhold_reply() {
        let corpus = library_corpus();
        let gateway = FakeGateway::replying(Ok("Still answered.".to_string()));
        let dispatcher =
            Dispatcher::new(&corpus, &FailingLog, &gateway, DispatchPolicy::default());

        let reply = dispatcher
            .dispatch(&DispatchRequest::new("hello", "gpt"))
            .await
            .unwrap();

        assert_eq!(reply.response, "Still answered.");
        assert_eq!(reply.outcome, Outcome::Completed);
    }

    // ------------------------------------------------------------------------
    // Invalid mode
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_invalid_mode_has_no_side_effects() {
        let corpus = library_corpus();
        let log = MemoryLog::default();
        let gateway = FakeGateway::replying(Ok("unused".to_string()));
        let dispatcher = Dispatcher::new(&corpus, &log, &gateway, DispatchPolicy::default());

        let err = dispatcher
            .dispatch(&DispatchRequest::new("library hours", "xyz"))
            .await
            .unwrap_err();

        assert_eq!(err, DispatchError::InvalidMode("xyz".to_string()));
        assert_eq!(gateway.calls(), 0);
        assert_eq!(log.len(), 0);
    }

    // ------------------------------------------------------------------------
    // With the SQLite store
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_store_backed_dispatch_counts_history() {
        let dir = TempDir::new().unwrap();
        let store = FaqStore::open(&dir.path().join("chat.db")).unwrap();
        store
            .add_faq(NewFaq {
                question: "What are the library hours?".to_string(),
                answer: "9am–9pm".to_string(),
            })
            .unwrap();

        let gateway = FakeGateway::replying(Ok("Generated answer".to_string()));
        let dispatcher = Dispatcher::new(&store, &store, &gateway, DispatchPolicy::default());

        let faq_reply = dispatcher
            .dispatch(&DispatchRequest::new("LIBRARY HOURS", "faq"))
            .await
            .unwrap();
        assert_eq!(faq_reply.response, "9am–9pm");
        assert_eq!(store.stats().unwrap().history_count, 0);

        let first = DispatchRequest::new("first", "gpt");
        let second = DispatchRequest::new("second", "gpt");
        let (a, b) = tokio::join!(
            dispatcher.dispatch(&first),
            dispatcher.dispatch(&second),
        );
        assert_eq!(a.unwrap().response, "Generated answer");
        assert_eq!(b.unwrap().response, "Generated answer");

        assert_eq!(store.stats().unwrap().history_count, 2);
        assert_eq!(gateway.calls(), 2);
    }
}
