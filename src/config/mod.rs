//! 설정 모듈
//!
//! 시작 시 환경변수에서 한 번만 읽어 `ChatConfig`를 만들고,
//! 이후에는 참조로 전달합니다. 요청 처리 중에는 환경변수를 읽지 않습니다.
//!
//! | 환경변수 | 기본값 |
//! |---|---|
//! | `OPENROUTER_API_KEY` | (없음) |
//! | `OPENROUTER_MODEL` | `meta-llama/llama-3.3-8b-instruct:free` |
//! | `OPENROUTER_BASE_URL` | `https://openrouter.ai/api/v1` |
//! | `OPENROUTER_TIMEOUT_SECS` | `30` |
//! | `CAMPUS_CHAT_THRESHOLD` | `40` |
//! | `CAMPUS_CHAT_DB` | `~/.campus-chat/campus_chat.db` |

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::dispatch::DispatchPolicy;

/// OpenRouter API 기본 주소
/// ref: https://openrouter.ai/docs/api-reference/chat-completion
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// 기본 모델 (무료 티어)
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-8b-instruct:free";

/// 완성 호출 타임아웃 (초)
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// 시스템 프롬프트
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant for answering college-related queries. Be concise and accurate.";

// ============================================================================
// GatewayConfig
// ============================================================================

/// 완성 게이트웨이 설정
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bearer 토큰 (None이면 미설정)
    pub api_key: Option<String>,
    pub model: String,
    /// `{base_url}/chat/completions` 로 POST
    pub base_url: String,
    /// 단일 호출 타임아웃 (항상 적용)
    pub timeout: Duration,
    pub system_prompt: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl GatewayConfig {
    /// API 키 설정 여부
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// chat completions 엔드포인트
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base URL: {}", self.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Base URL must use http or https: {}", self.base_url);
        }
        if self.model.trim().is_empty() {
            bail!("Model name must not be empty");
        }
        if self.timeout.is_zero() {
            bail!("Timeout must be greater than zero");
        }
        Ok(())
    }
}

// ============================================================================
// ChatConfig
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Default)]
pub struct ChatConfig {
    pub gateway: GatewayConfig,
    pub policy: DispatchPolicy,
    /// None이면 기본 데이터 디렉토리 사용
    pub db_path: Option<PathBuf>,
}

impl ChatConfig {
    /// 프로세스 환경변수에서 생성 (시작 시 1회)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 생성
    ///
    /// 빈 문자열은 미설정으로 취급합니다. 숫자 파싱 실패는 에러입니다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = Self::default();

        config.gateway.api_key = get("OPENROUTER_API_KEY").map(|k| k.trim().to_string());
        if let Some(model) = get("OPENROUTER_MODEL") {
            config.gateway.model = model.trim().to_string();
        }
        if let Some(base_url) = get("OPENROUTER_BASE_URL") {
            config.gateway.base_url = base_url.trim().to_string();
        }
        if let Some(secs) = get("OPENROUTER_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid OPENROUTER_TIMEOUT_SECS: {}", secs))?;
            config.gateway.timeout = Duration::from_secs(secs);
        }
        if let Some(threshold) = get("CAMPUS_CHAT_THRESHOLD") {
            config.policy.threshold = threshold
                .trim()
                .parse()
                .with_context(|| format!("Invalid CAMPUS_CHAT_THRESHOLD: {}", threshold))?;
        }
        config.db_path = get("CAMPUS_CHAT_DB").map(PathBuf::from);

        config.validate()?;

        if config.gateway.has_api_key() {
            tracing::debug!("OPENROUTER_API_KEY loaded");
        } else {
            tracing::warn!("OPENROUTER_API_KEY is not set; gpt mode will be unavailable");
        }

        Ok(config)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        self.gateway.validate()?;
        if !(0.0..=100.0).contains(&self.policy.threshold) {
            bail!(
                "Threshold must be within 0..=100, got {}",
                self.policy.threshold
            );
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
