//! 유사도 모듈 - 부분 문자열 허용 퍼지 스코어
//!
//! 짧은 문자열을 긴 문자열 위에서 슬라이딩하며 가장 잘 정렬되는 구간의
//! indel 유사도 (`2 * LCS / (|a| + |b|)`)를 0 ~ 100 스케일로 반환합니다.
//!
//! ref: https://rapidfuzz.github.io/RapidFuzz/Usage/fuzz.html#partial-ratio

/// 최대 스코어 (완전 포함)
pub const MAX_SCORE: f64 = 100.0;

/// 부분 일치 유사도 (partial ratio)
///
/// - 대소문자 무시 (양쪽 모두 소문자로 변환)
/// - 어느 한쪽이 빈 문자열이면 0
/// - 짧은 쪽(needle)이 긴 쪽(haystack)에 그대로 포함되면 100
///
/// 후보 구간:
/// 1. haystack의 길이 `m` 윈도우 전체
/// 2. 양 끝에 걸치는 길이 `k < m` 의 접두사/접미사
///
/// 각 구간의 indel 유사도 중 최댓값을 반환합니다.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (needle, haystack) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    let m = needle.len();
    let n = haystack.len();

    let mut row = vec![0usize; m + 1];
    let mut best = 0.0_f64;

    // 전체 길이 윈도우
    for start in 0..=(n - m) {
        best = best.max(window_score(needle, &haystack[start..start + m], &mut row));
        if best >= MAX_SCORE {
            return MAX_SCORE;
        }
    }

    // 양 끝에 걸친 부분 정렬
    for k in 1..m {
        best = best
            .max(window_score(needle, &haystack[..k], &mut row))
            .max(window_score(needle, &haystack[n - k..], &mut row));
    }

    best.clamp(0.0, MAX_SCORE)
}

/// 윈도우 하나의 0 ~ 100 스코어
fn window_score(needle: &[char], window: &[char], row: &mut [usize]) -> f64 {
    let total = needle.len() + window.len();
    if total == 0 {
        return 0.0;
    }
    let common = lcs_len(needle, window, row);
    (2 * common) as f64 * MAX_SCORE / total as f64
}

/// 최장 공통 부분열 길이
///
/// `row`는 `needle.len() + 1` 크기의 작업 버퍼 (호출마다 초기화)
fn lcs_len(needle: &[char], window: &[char], row: &mut [usize]) -> usize {
    row.iter_mut().for_each(|v| *v = 0);

    for &w in window {
        // row[j] = LCS(needle[..j], 현재까지의 window)
        let mut diag = 0;
        for (j, &c) in needle.iter().enumerate() {
            let up = row[j + 1];
            row[j + 1] = if c == w {
                diag + 1
            } else {
                up.max(row[j])
            };
            diag = up;
        }
    }

    row[needle.len()]
}

// ============================================================================
// Tests
// ============================================================================
