//! Matcher - 코퍼스 전체 스캔 후 최고 점수 FAQ 선택

use crate::similarity::partial_ratio;

use super::store::FaqEntry;

/// 매칭 결과 (저장하지 않음)
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// 최고 점수 후보 (코퍼스가 비어 있으면 None)
    pub candidate: Option<FaqEntry>,
    /// 0 ~ 100, 높을수록 유사
    pub score: f64,
}

impl MatchResult {
    fn empty() -> Self {
        Self {
            candidate: None,
            score: 0.0,
        }
    }
}

/// 비교용 정규화 (trim + 소문자)
///
/// 저장된 질문은 비교할 때만 변환하고 원본은 건드리지 않습니다.
pub fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// 쿼리에 가장 가까운 FAQ 1건
///
/// 조기 종료 없이 전체를 스캔하며, 동점이면 먼저 나온 엔트리를 유지합니다.
pub fn best_match(query: &str, corpus: &[FaqEntry]) -> MatchResult {
    let query = normalize_text(query);
    let mut result = MatchResult::empty();

    for entry in corpus {
        let score = partial_ratio(&query, &normalize_text(&entry.question));
        if score > result.score {
            result = MatchResult {
                candidate: Some(entry.clone()),
                score,
            };
        }
    }

    tracing::debug!(
        "Best match score {:.1} (candidate id={:?}, corpus size={})",
        result.score,
        result.candidate.as_ref().map(|c| c.id),
        corpus.len()
    );

    result
}

// ============================================================================
// Tests
// ============================================================================
