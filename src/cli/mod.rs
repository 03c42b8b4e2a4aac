//! CLI 모듈
//!
//! campus-chat CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::ChatConfig;
use crate::dispatch::{DispatchRequest, Dispatcher, Outcome};
use crate::faq::{default_db_path, FaqStore, NewFaq};
use crate::gateway::OpenRouterGateway;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "campus-chat")]
#[command(version, about = "College FAQ chatbot - fuzzy FAQ matching + OpenRouter", long_about = None)]
pub struct Cli {
    /// DB 파일 경로 (기본: ~/.campus-chat/campus_chat.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 질문에 답변 (faq | gpt)
    Chat {
        /// 사용자 메시지
        message: String,

        /// 응답 모드
        #[arg(short, long, default_value = "faq")]
        mode: String,

        /// FAQ 채택 임계값 (0 ~ 100)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// 사용할 모델
        #[arg(long)]
        model: Option<String>,

        /// `{"response": ...}` JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// FAQ 1건 추가
    AddFaq {
        #[arg(short, long)]
        question: String,

        #[arg(short, long)]
        answer: String,
    },

    /// JSON 파일에서 FAQ 일괄 추가 (`[{"question": ..., "answer": ...}]`)
    Import {
        /// JSON 파일 경로
        file: PathBuf,
    },

    /// 저장된 FAQ 목록
    List,

    /// 질문 키워드 검색
    Search {
        /// 검색어
        query: String,
    },

    /// 최근 대화 기록 (gpt 모드)
    History {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = ChatConfig::from_env().context("설정 로드 실패")?;
    if cli.db.is_some() {
        config.db_path = cli.db;
    }

    match cli.command {
        Commands::Chat {
            message,
            mode,
            threshold,
            model,
            json,
        } => {
            if let Some(threshold) = threshold {
                config.policy.threshold = threshold;
            }
            if let Some(model) = model {
                config.gateway.model = model;
            }
            config.validate()?;
            cmd_chat(&config, &message, &mode, json).await
        }
        Commands::AddFaq { question, answer } => cmd_add_faq(&config, question, answer),
        Commands::Import { file } => cmd_import(&config, &file),
        Commands::List => cmd_list(&config),
        Commands::Search { query } => cmd_search(&config, &query),
        Commands::History { limit } => cmd_history(&config, limit),
        Commands::Status => cmd_status(&config),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn open_store(config: &ChatConfig) -> Result<FaqStore> {
    let store = match config.db_path {
        Some(ref path) => FaqStore::open(path),
        None => FaqStore::open_default(),
    };
    store.context("FaqStore 열기 실패")
}

/// 대화 명령어 (chat)
async fn cmd_chat(config: &ChatConfig, message: &str, mode: &str, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let gateway = OpenRouterGateway::new(&config.gateway)?;
    let dispatcher = Dispatcher::new(&store, &store, &gateway, config.policy);

    let reply = dispatcher
        .dispatch(&DispatchRequest::new(message, mode))
        .await?;

    if json {
        println!("{}", serde_json::to_string(&reply)?);
        return Ok(());
    }

    match reply.outcome {
        Outcome::FaqMatched { score } | Outcome::FaqNoMatch { score } => {
            println!("[FAQ] [점수: {:.1}]", score);
        }
        Outcome::Completed => println!("[GPT] {}", config.gateway.model),
        Outcome::FaqUnavailable | Outcome::CompletionFailed => println!("[!] 오류"),
    }
    println!("{}", reply.response);

    Ok(())
}

/// FAQ 추가 명령어 (add-faq)
fn cmd_add_faq(config: &ChatConfig, question: String, answer: String) -> Result<()> {
    let store = open_store(config)?;
    let id = store
        .add_faq(NewFaq { question, answer })
        .context("FAQ 추가 실패")?;

    println!("[OK] FAQ가 추가되었습니다 (ID: {})", id);
    Ok(())
}

/// 일괄 추가 명령어 (import)
fn cmd_import(config: &ChatConfig, file: &Path) -> Result<()> {
    let faqs = read_faq_file(file)?;
    if faqs.is_empty() {
        println!("[!] 추가할 FAQ가 없습니다.");
        return Ok(());
    }

    let store = open_store(config)?;
    let count = store.add_faqs(faqs).context("FAQ 일괄 추가 실패")?;

    println!("[OK] {} 건의 FAQ가 추가되었습니다", count);
    Ok(())
}

/// 목록 명령어 (list)
fn cmd_list(config: &ChatConfig) -> Result<()> {
    let store = open_store(config)?;
    let faqs = store.list_faqs().context("FAQ 목록 조회 실패")?;

    if faqs.is_empty() {
        println!("[!] 저장된 FAQ가 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 FAQ ({} 건):\n", faqs.len());
    for faq in faqs {
        println!("  #{:<4} Q: {}", faq.id, faq.question);
        println!("        A: {}", truncate_text(&faq.answer, 80));
    }

    Ok(())
}

/// 검색 명령어 (search)
fn cmd_search(config: &ChatConfig, query: &str) -> Result<()> {
    let store = open_store(config)?;
    let faqs = store.search_faqs(query).context("검색 실패")?;

    if faqs.is_empty() {
        println!("[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("[OK] 검색 결과 ({} 건):\n", faqs.len());
    for (i, faq) in faqs.iter().enumerate() {
        println!("{}. {}", i + 1, faq.question);
        println!("   {}", truncate_text(&faq.answer, 200));
    }

    Ok(())
}

/// 기록 명령어 (history)
fn cmd_history(config: &ChatConfig, limit: usize) -> Result<()> {
    let store = open_store(config)?;
    let history = store.list_history(limit).context("대화 기록 조회 실패")?;

    if history.is_empty() {
        println!("[!] 대화 기록이 없습니다.");
        return Ok(());
    }

    for exchange in history {
        println!("[{}]", exchange.timestamp.format("%Y-%m-%d %H:%M:%S"));
        println!("  > {}", truncate_text(&exchange.user_input, 120));
        println!("  < {}", truncate_text(&exchange.bot_response, 200));
    }

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(config: &ChatConfig) -> Result<()> {
    println!("campus-chat v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] DB 경로: {}", db_location(config).display());
    println!("[*] 모델: {}", config.gateway.model);
    println!("[*] 임계값: {}", config.policy.threshold);

    if config.gateway.has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export OPENROUTER_API_KEY=your-key");
    }

    match open_store(config).and_then(|store| store.stats()) {
        Ok(stats) => {
            println!("[OK] DB: {}", stats.db_path.display());
            println!("[OK] 저장된 FAQ: {} 건", stats.faq_count);
            println!("[OK] 대화 기록: {} 건", stats.history_count);
        }
        Err(e) => println!("[!] 통계 조회 실패: {:#}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 사용할 DB 파일 (`--db` / `CAMPUS_CHAT_DB` 우선)
fn db_location(config: &ChatConfig) -> PathBuf {
    config.db_path.clone().unwrap_or_else(default_db_path)
}

/// FAQ JSON 파일 읽기
fn read_faq_file(path: &Path) -> Result<Vec<NewFaq>> {
    if !path.is_file() {
        bail!("파일을 찾을 수 없습니다: {}", path.display());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read FAQ file: {:?}", path))?;
    let faqs: Vec<NewFaq> =
        serde_json::from_str(&raw).context("FAQ JSON 파싱 실패 (question/answer 배열 필요)")?;

    Ok(faqs)
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
