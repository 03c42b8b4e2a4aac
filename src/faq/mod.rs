//! FAQ 모듈 - 질문/답변 코퍼스와 퍼지 매칭
//!
//! - Store: rusqlite 기반 FAQ + 대화 기록 저장소
//! - Matcher: partial ratio로 코퍼스 전체를 스캔해 최고 점수 1건 선택

mod matcher;
mod store;

// Re-exports
pub use matcher::{best_match, normalize_text, MatchResult};
pub use store::{default_db_path, get_data_dir, FaqCorpus, FaqEntry, FaqStore, NewFaq, StoreStats};
