//! 에러 타입
//!
//! 코어 경계(게이트웨이, 저장소, 디스패처)에서 쓰이는 `thiserror` 기반 에러입니다.
//! 저장소 내부와 CLI는 `anyhow::Result`를 그대로 사용합니다.

use thiserror::Error;

/// 외부 완성(completion) 서비스 호출 실패
///
/// `Display` 문자열은 그대로 사용자 응답으로 쓰입니다.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// API 키 미설정 (호출 전 검사)
    #[error("OpenRouter API key not set")]
    Unconfigured,

    /// 연결 실패, 타임아웃 등 전송 계층 오류
    #[error("Request error: {0}")]
    Transport(String),

    /// 원격 서비스가 비정상 상태 코드를 반환
    #[error("OpenRouter error: {0}")]
    RemoteRejected(String),

    /// 성공 응답이지만 `choices[0].message.content`가 없음
    #[error("OpenRouter error: unexpected response: {0}")]
    MalformedResponse(String),
}

/// 저장소 실패 (경고 등급, 치명적이지 않음)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Failed to persist: {0}")]
    Persist(String),

    #[error("Failed to read: {0}")]
    Read(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

/// 디스패치 요청 거부
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// `faq` | `gpt` 이외의 모드
    #[error("Invalid mode '{0}': expected 'faq' or 'gpt'")]
    InvalidMode(String),
}
