//! campus-chat - 대학 FAQ 챗봇 엔진
//!
//! 사용자 질문을 FAQ 코퍼스와 퍼지 매칭하거나(faq),
//! OpenRouter chat completions로 전달(gpt)하여 답변합니다.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod faq;
pub mod gateway;
pub mod history;
pub mod similarity;

// Re-exports
pub use config::{ChatConfig, GatewayConfig};
pub use dispatch::{
    ChatReply, DispatchPolicy, DispatchRequest, Dispatcher, Mode, Outcome,
    DEFAULT_MATCH_THRESHOLD, NO_MATCH_RESPONSE,
};
pub use error::{DispatchError, GatewayError, StoreError};
pub use faq::{best_match, FaqCorpus, FaqEntry, FaqStore, MatchResult, NewFaq, StoreStats};
pub use gateway::{CompletionGateway, OpenRouterGateway};
pub use history::{ChatExchange, HistoryLog, HistoryRecorder};
pub use similarity::partial_ratio;
