//! 완성 게이트웨이 모듈 - OpenRouter chat completions
//!
//! 시스템 메시지 + 사용자 메시지 2건으로 고정된 요청을 한 번만 보냅니다.
//!
//! - 타임아웃은 항상 적용 (기본 30초)
//! - 자동 재시도 없음: 재시도가 필요하면 호출자가 정책으로 결정
//! - 결과는 `Result<String, GatewayError>`로 정규화
//!
//! ref: https://openrouter.ai/docs/api-reference/chat-completion

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// 에러 메시지에 포함할 응답 본문 최대 길이 (문자)
const SNIPPET_CHARS: usize = 200;

// ============================================================================
// CompletionGateway Trait
// ============================================================================

/// 완성 게이트웨이 트레이트
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// 프롬프트 1건에 대한 완성 텍스트 (trim 적용)
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError>;

    /// 게이트웨이 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenRouterGateway
// ============================================================================

/// OpenRouter 게이트웨이
#[derive(Debug)]
pub struct OpenRouterGateway {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    url: String,
    system_prompt: String,
    timeout: Duration,
}

impl OpenRouterGateway {
    /// 설정으로 생성
    ///
    /// API 키가 없어도 생성은 성공합니다. 키 검사는 호출 시점에 합니다.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("campus-chat/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        tracing::info!(
            "Using OpenRouter gateway (model: {}, timeout: {:?})",
            config.model,
            config.timeout
        );

        Ok(Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            url: config.completions_url(),
            system_prompt: config.system_prompt.clone(),
            timeout: config.timeout,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Transport(format!("timed out after {:?}", self.timeout))
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl CompletionGateway for OpenRouterGateway {
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError> {
        let api_key = self.api_key.as_deref().ok_or(GatewayError::Unconfigured)?;

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: false,
        };

        tracing::debug!(
            "POST {} (model: {}, prompt_len: {})",
            self.url,
            self.model,
            prompt.len()
        );
        let started = Instant::now();

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let detail = rejection_detail(status, &body);
            tracing::error!(
                "Completion request rejected after {}ms: {}",
                started.elapsed().as_millis(),
                detail
            );
            return Err(GatewayError::RemoteRejected(detail));
        }

        let content = parse_completion(&body)?;

        tracing::info!(
            "Chat completion finished in {}ms ({} chars)",
            started.elapsed().as_millis(),
            content.len()
        );

        Ok(content)
    }

    fn name(&self) -> &str {
        "openrouter"
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// `/chat/completions` 요청 본문 (non-streaming)
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// 성공 응답 (`choices[0].message.content`만 사용)
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageOut>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: Option<String>,
}

/// OpenRouter 에러 응답
#[derive(Debug, Deserialize)]
struct OpenRouterError {
    error: OpenRouterErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenRouterErrorDetail {
    message: String,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 성공 본문에서 완성 텍스트 추출
fn parse_completion(body: &str) -> Result<String, GatewayError> {
    let malformed = || GatewayError::MalformedResponse(snippet(body));

    let parsed: ChatCompletionResponse = serde_json::from_str(body).map_err(|_| malformed())?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(malformed)
}

/// 비정상 상태 코드의 설명 (`error.message`가 있으면 사용)
fn rejection_detail(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<OpenRouterError>(body) {
        Ok(err) => format!("{}: {}", status, err.error.message),
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => format!("{}: {}", status, snippet(body)),
    }
}

/// 본문 자르기 (UTF-8 안전)
fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= SNIPPET_CHARS {
        trimmed.to_string()
    } else {
        let truncated: String = trimmed.chars().take(SNIPPET_CHARS).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
