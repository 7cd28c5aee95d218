//! Per-user conversation state.
//!
//! Sessions live in Redis under `session:{user_id}` with a TTL backstop;
//! when Redis is not configured or unreachable the store degrades to a
//! process-local map (state is lost on restart, which is acceptable).
//!
//! Messages from one user are handled strictly in arrival order: every
//! handler acquires that user's mutex from [`UserLocks`] before touching
//! the session.

pub mod context;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::core::config;
use crate::core::error::AppResult;
use context::ContextAnswers;

/// Шаг диалога. Всегда ровно один из фиксированного набора.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Нет активного диалога
    Idle,
    /// Ожидаем согласие с условиями и подтверждение 18+
    AwaitingConsent,
    /// Ожидаем документ с результатами анализов
    AwaitingUpload,
    /// Последовательный сбор клинического контекста, i - номер вопроса
    AwaitingContext(usize),
    /// Квота зарезервирована, идёт структурирование
    Processing,
    /// Отчёт показан, доступны уточняющие вопросы и сравнение
    ReportReady,
    /// Ожидаем текст уточняющего вопроса
    AwaitingFollowUp,
}

/// Эфемерное состояние диалога одного пользователя.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub state: SessionState,
    /// Текст, извлечённый из загруженного документа
    pub extracted_text: Option<String>,
    /// Собранные ответы на вопросы контекста
    pub context: ContextAnswers,
    /// Анализ, к которому относятся уточняющие вопросы/сравнение
    pub current_analysis_id: Option<i64>,
    /// Метка последней активности для idle-таймаута
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            extracted_text: None,
            context: ContextAnswers::default(),
            current_analysis_id: None,
            updated_at: Utc::now(),
        }
    }

    /// Сбрасывает незавершённые данные, сохраняя ссылку на последний отчёт
    pub fn reset(&mut self) {
        let keep = self.current_analysis_id;
        *self = Session::idle();
        self.current_analysis_id = keep;
    }

    /// Истёк ли idle-таймаут на момент `now`
    pub fn is_stale(&self, now: DateTime<Utc>, idle_timeout_secs: i64) -> bool {
        self.state != SessionState::Idle && (now - self.updated_at).num_seconds() > idle_timeout_secs
    }
}

/// Session storage: Redis when available, process memory otherwise.
pub enum SessionStore {
    Redis(ConnectionManager),
    Memory(Mutex<HashMap<i64, Session>>),
}

impl SessionStore {
    /// Connect to Redis; fall back to an in-memory map on any failure.
    pub async fn connect(redis_url: Option<&str>) -> Self {
        if let Some(url) = redis_url {
            match redis::Client::open(url) {
                Ok(client) => match ConnectionManager::new(client).await {
                    Ok(manager) => {
                        log::info!("✅ Session store: Redis at {}", url);
                        return SessionStore::Redis(manager);
                    }
                    Err(e) => log::warn!("Redis unreachable ({}), falling back to memory: {}", url, e),
                },
                Err(e) => log::warn!("Invalid REDIS_URL ({}): {}", url, e),
            }
        } else {
            log::warn!("REDIS_URL not set, sessions held in process memory");
        }
        SessionStore::Memory(Mutex::new(HashMap::new()))
    }

    fn key(user_id: i64) -> String {
        format!("session:{}", user_id)
    }

    /// Load a user's session. Missing or stale sessions come back as Idle.
    pub async fn load(&self, user_id: i64) -> AppResult<Session> {
        let session = match self {
            SessionStore::Redis(manager) => {
                let mut conn = manager.clone();
                let raw: Option<String> = conn.get(Self::key(user_id)).await?;
                match raw {
                    Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                        log::warn!("Corrupt session for user {}, resetting: {}", user_id, e);
                        Session::idle()
                    }),
                    None => Session::idle(),
                }
            }
            SessionStore::Memory(map) => map.lock().await.get(&user_id).cloned().unwrap_or_else(Session::idle),
        };

        if session.is_stale(Utc::now(), *config::session::IDLE_TIMEOUT_SECS) {
            log::info!("Session for user {} idle past timeout, resetting", user_id);
            let mut fresh = Session::idle();
            fresh.current_analysis_id = session.current_analysis_id;
            self.save(user_id, &fresh).await?;
            return Ok(fresh);
        }

        Ok(session)
    }

    /// Persist a session, refreshing its activity timestamp.
    pub async fn save(&self, user_id: i64, session: &Session) -> AppResult<()> {
        let mut stamped = session.clone();
        stamped.updated_at = Utc::now();

        match self {
            SessionStore::Redis(manager) => {
                let mut conn = manager.clone();
                let json = serde_json::to_string(&stamped)?;
                let _: () = conn
                    .set_ex(Self::key(user_id), json, config::session::REDIS_TTL_SECS)
                    .await?;
            }
            SessionStore::Memory(map) => {
                map.lock().await.insert(user_id, stamped);
            }
        }
        Ok(())
    }

    /// Drop a user's session entirely.
    pub async fn clear(&self, user_id: i64) -> AppResult<()> {
        match self {
            SessionStore::Redis(manager) => {
                let mut conn = manager.clone();
                let _: () = conn.del(Self::key(user_id)).await?;
            }
            SessionStore::Memory(map) => {
                map.lock().await.remove(&user_id);
            }
        }
        Ok(())
    }
}

/// Per-user mutexes serializing message handling for one user.
#[derive(Default)]
pub struct UserLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    /// Get (or create) the lock for a user. Callers hold the guard for
    /// the whole message-handling span.
    pub fn for_user(&self, user_id: i64) -> Arc<Mutex<()>> {
        self.locks.entry(user_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_state_roundtrips_through_json() {
        let mut session = Session::idle();
        session.state = SessionState::AwaitingContext(3);
        session.extracted_text = Some("Hemoglobin 142 g/L".to_string());

        let json = serde_json::to_string(&session).unwrap();
        let back: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(back.state, SessionState::AwaitingContext(3));
        assert_eq!(back.extracted_text.as_deref(), Some("Hemoglobin 142 g/L"));
    }

    #[test]
    fn test_staleness() {
        let mut session = Session::idle();
        session.state = SessionState::AwaitingUpload;
        session.updated_at = Utc::now() - chrono::Duration::seconds(2000);
        assert!(session.is_stale(Utc::now(), 1800));
        assert!(!session.is_stale(Utc::now(), 3600));

        // Idle sessions never count as stale
        session.state = SessionState::Idle;
        assert!(!session.is_stale(Utc::now(), 1800));
    }

    #[test]
    fn test_reset_keeps_last_report_reference() {
        let mut session = Session::idle();
        session.state = SessionState::ReportReady;
        session.current_analysis_id = Some(7);
        session.extracted_text = Some("text".to_string());

        session.reset();
        assert_eq!(session.state, SessionState::Idle);
        assert_eq!(session.current_analysis_id, Some(7));
        assert_eq!(session.extracted_text, None);
    }

    #[tokio::test]
    async fn test_memory_store_load_save_clear() {
        let store = SessionStore::Memory(Mutex::new(HashMap::new()));

        let loaded = store.load(5).await.unwrap();
        assert_eq!(loaded.state, SessionState::Idle);

        let mut session = Session::idle();
        session.state = SessionState::AwaitingUpload;
        store.save(5, &session).await.unwrap();
        assert_eq!(store.load(5).await.unwrap().state, SessionState::AwaitingUpload);

        store.clear(5).await.unwrap();
        assert_eq!(store.load(5).await.unwrap().state, SessionState::Idle);
    }
}
