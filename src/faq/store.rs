//! FAQ Store - rusqlite 기반 동기 저장소
//!
//! FAQ 코퍼스(faqs)와 생성 모드 대화 기록(chat_history)을 저장합니다.
//! 저장 위치: ~/.campus-chat/campus_chat.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::history::{ChatExchange, HistoryLog};

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.campus-chat/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".campus-chat")
}

/// 기본 DB 파일 경로
pub fn default_db_path() -> PathBuf {
    get_data_dir().join("campus_chat.db")
}

// ============================================================================
// Types
// ============================================================================

/// 저장된 FAQ 엔트리
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    pub id: i64,
    pub question: String,
    pub answer: String,
}

/// 새 FAQ 입력용 구조체
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFaq {
    pub question: String,
    pub answer: String,
}

impl NewFaq {
    fn validate(&self) -> Result<()> {
        if self.question.trim().is_empty() {
            bail!("FAQ question must not be empty");
        }
        if self.answer.trim().is_empty() {
            bail!("FAQ answer must not be empty");
        }
        Ok(())
    }
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub faq_count: usize,
    pub history_count: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// FaqCorpus Trait
// ============================================================================

/// 읽기 전용 FAQ 코퍼스
///
/// 매 호출마다 저장소를 다시 읽으므로 재시작 없이 추가분이 반영됩니다.
pub trait FaqCorpus: Send + Sync {
    /// 키(id) 순서의 전체 목록
    fn list_all(&self) -> Result<Vec<FaqEntry>, StoreError>;
}

// ============================================================================
// FaqStore
// ============================================================================

/// FAQ Store - 동기 저장소
pub struct FaqStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl FaqStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 기본 위치에서 열기 (~/.campus-chat/campus_chat.db)
    pub fn open_default() -> Result<Self> {
        Self::open(&default_db_path())
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 연결 잠금 (poisoned이면 `StoreError::Lock`)
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS faqs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                answer TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_input TEXT NOT NULL,
                bot_response TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chat_history_timestamp
                ON chat_history(timestamp);
            "#,
        )
        .context("Failed to create tables")?;

        tracing::debug!("FAQ store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// FAQ 1건 추가
    pub fn add_faq(&self, faq: NewFaq) -> Result<i64> {
        faq.validate()?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO faqs (question, answer) VALUES (?1, ?2)",
            params![faq.question, faq.answer],
        )
        .context("Failed to insert FAQ")?;

        let id = conn.last_insert_rowid();
        tracing::info!("Added FAQ: {} (id={})", faq.question, id);

        Ok(id)
    }

    /// FAQ 일괄 추가 (단일 트랜잭션)
    ///
    /// 하나라도 유효하지 않으면 아무것도 저장하지 않습니다.
    pub fn add_faqs(&self, faqs: Vec<NewFaq>) -> Result<usize> {
        for (i, faq) in faqs.iter().enumerate() {
            faq.validate().with_context(|| format!("Invalid FAQ at index {}", i))?;
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction().context("Failed to begin transaction")?;
        {
            let mut stmt = tx.prepare("INSERT INTO faqs (question, answer) VALUES (?1, ?2)")?;
            for faq in &faqs {
                stmt.execute(params![faq.question, faq.answer])
                    .context("Failed to insert FAQ")?;
            }
        }
        tx.commit().context("Failed to commit FAQs")?;

        tracing::info!("Added {} FAQs", faqs.len());
        Ok(faqs.len())
    }

    /// ID로 FAQ 조회
    pub fn get_faq(&self, id: i64) -> Result<Option<FaqEntry>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare("SELECT id, question, answer FROM faqs WHERE id = ?1")?;
        let faq = stmt
            .query_row(params![id], row_to_faq)
            .optional()
            .context("Failed to read FAQ")?;

        Ok(faq)
    }

    /// 전체 FAQ 목록 (id 순)
    pub fn list_faqs(&self) -> Result<Vec<FaqEntry>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare("SELECT id, question, answer FROM faqs ORDER BY id")?;
        let faqs = stmt
            .query_map([], row_to_faq)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read FAQs")?;

        Ok(faqs)
    }

    /// 질문 부분 문자열 검색 (대소문자 무시)
    pub fn search_faqs(&self, keyword: &str) -> Result<Vec<FaqEntry>> {
        let conn = self.lock()?;

        let pattern = format!("%{}%", keyword.trim().to_lowercase());

        let mut stmt = conn.prepare(
            "SELECT id, question, answer FROM faqs
             WHERE LOWER(question) LIKE ?1
             ORDER BY id",
        )?;
        let faqs = stmt
            .query_map(params![pattern], row_to_faq)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to search FAQs")?;

        Ok(faqs)
    }

    /// 대화 기록 1건 추가
    pub fn append_exchange(&self, exchange: &ChatExchange) -> Result<i64> {
        let conn = self.lock()?;

        // 고정 폭(마이크로초) 포맷이어야 문자열 정렬이 시간순과 일치
        let timestamp = exchange
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Micros, true);

        conn.execute(
            "INSERT INTO chat_history (user_input, bot_response, timestamp) VALUES (?1, ?2, ?3)",
            params![exchange.user_input, exchange.bot_response, timestamp],
        )
        .context("Failed to insert chat exchange")?;

        Ok(conn.last_insert_rowid())
    }

    /// 최근 대화 기록 (최신순)
    pub fn list_history(&self, limit: usize) -> Result<Vec<ChatExchange>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT user_input, bot_response, timestamp FROM chat_history
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;

        let history = stmt
            .query_map(params![limit as i64], |row| {
                Ok(ChatExchange {
                    user_input: row.get(0)?,
                    bot_response: row.get(1)?,
                    timestamp: parse_datetime(row.get::<_, String>(2)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read chat history")?;

        Ok(history)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let faq_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM faqs", [], |row| row.get(0))
            .context("Failed to count FAQs")?;

        let history_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chat_history", [], |row| row.get(0))
            .context("Failed to count chat history")?;

        Ok(StoreStats {
            faq_count: faq_count as usize,
            history_count: history_count as usize,
            db_path: self.db_path.clone(),
        })
    }
}

impl FaqCorpus for FaqStore {
    fn list_all(&self) -> Result<Vec<FaqEntry>, StoreError> {
        self.list_faqs()
            .map_err(|e| to_store_error(e, StoreError::Read))
    }
}

impl HistoryLog for FaqStore {
    fn append(&self, exchange: &ChatExchange) -> Result<(), StoreError> {
        self.append_exchange(exchange)
            .map(|_| ())
            .map_err(|e| to_store_error(e, StoreError::Persist))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 잠금 실패는 그대로, 나머지는 `fallback`으로 감싸기
fn to_store_error(err: anyhow::Error, fallback: fn(String) -> StoreError) -> StoreError {
    match err.downcast::<StoreError>() {
        Ok(store_err) => store_err,
        Err(err) => fallback(format!("{:#}", err)),
    }
}

fn row_to_faq(row: &Row<'_>) -> rusqlite::Result<FaqEntry> {
    Ok(FaqEntry {
        id: row.get(0)?,
        question: row.get(1)?,
        answer: row.get(2)?,
    })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================
