use chrono::{DateTime, Duration, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Result};

use crate::core::subscription::Plan;

/// Структура, представляющая пользователя в базе данных.
pub struct User {
    /// Telegram ID пользователя
    pub telegram_id: i64,
    /// Имя пользователя (username) в Telegram, если доступно
    pub username: Option<String>,
    /// Статус подписки: "none", "active", "expired"
    pub subscription_status: String,
    /// Дата истечения подписки (None, если подписки не было)
    pub subscription_expires_at: Option<DateTime<Utc>>,
    /// Лимит анализов по плану (-1 = безлимит)
    pub total_requests: i64,
    /// Бонусные анализы (реферальная программа)
    pub bonus_requests: i64,
    /// Использованные анализы в текущем периоде
    pub used_requests: i64,
    /// Принял ли пользователь условия и подтвердил возраст 18+
    pub terms_accepted: bool,
    /// Кто пригласил пользователя (deep link /start ref_<id>)
    pub referrer_id: Option<i64>,
}

/// Сохранённый результат одного анализа.
pub struct AnalysisRecord {
    pub id: i64,
    pub user_id: i64,
    /// Структурированные показатели в виде JSON-документа
    pub structured_json: String,
    /// Сгенерированный текст отчёта
    pub report_text: String,
    pub created_at: DateTime<Utc>,
}

/// Уточняющий вопрос к анализу (не более двух на анализ).
pub struct FollowUp {
    pub id: i64,
    pub analysis_id: i64,
    pub ordinal: i64,
    pub question: String,
    pub answer: String,
}

/// Платёж в YooKassa.
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: String,
    pub amount_rub: i64,
    /// ID транзакции на стороне провайдера (уникален)
    pub provider_payment_id: Option<String>,
    /// "pending", "succeeded", "canceled"
    pub status: String,
}

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections, enables
/// foreign keys on every connection, and runs schema migrations.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;"));
    let pool = Pool::builder().max_size(10).build(manager)?;

    let conn = pool.get()?;
    if let Err(e) = init_schema(&conn) {
        log::warn!("Failed to initialize schema: {}", e);
    }
    if let Err(e) = migrate_schema(&conn) {
        log::warn!("Failed to migrate schema: {}", e);
    }

    Ok(pool)
}

/// Get a connection from the pool
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Create all tables if they do not exist yet
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            telegram_id INTEGER PRIMARY KEY,
            username TEXT,
            subscription_status TEXT NOT NULL DEFAULT 'none',
            subscription_expires_at TEXT,
            total_requests INTEGER NOT NULL DEFAULT 0,
            bonus_requests INTEGER NOT NULL DEFAULT 0,
            used_requests INTEGER NOT NULL DEFAULT 0,
            terms_accepted INTEGER NOT NULL DEFAULT 0,
            referrer_id INTEGER,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS analyses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(telegram_id),
            structured_json TEXT NOT NULL,
            report_text TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_analyses_user ON analyses(user_id, created_at);
        CREATE TABLE IF NOT EXISTS follow_ups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            analysis_id INTEGER NOT NULL REFERENCES analyses(id) ON DELETE CASCADE,
            ordinal INTEGER NOT NULL,
            question TEXT NOT NULL,
            answer TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            plan_id TEXT NOT NULL,
            amount_rub INTEGER NOT NULL,
            provider_payment_id TEXT UNIQUE,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS referrals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            referrer_id INTEGER NOT NULL,
            referee_id INTEGER NOT NULL,
            payment_id TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );",
    )
}

/// Migrate database schema to ensure all required columns exist
/// This function safely adds missing columns to existing tables
pub fn migrate_schema(conn: &Connection) -> Result<()> {
    let table_exists: bool = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='users'",
        [],
        |row| Ok(row.get::<_, i32>(0)? > 0),
    )?;

    if !table_exists {
        return Ok(());
    }

    let mut stmt = conn.prepare("PRAGMA table_info(users)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }

    if !columns.contains(&"bonus_requests".to_string()) {
        log::info!("Adding missing column: bonus_requests to users table");
        if let Err(e) = conn.execute("ALTER TABLE users ADD COLUMN bonus_requests INTEGER NOT NULL DEFAULT 0", []) {
            log::warn!("Failed to add bonus_requests column: {}", e);
        }
    }

    if !columns.contains(&"terms_accepted".to_string()) {
        log::info!("Adding missing column: terms_accepted to users table");
        if let Err(e) = conn.execute("ALTER TABLE users ADD COLUMN terms_accepted INTEGER NOT NULL DEFAULT 0", []) {
            log::warn!("Failed to add terms_accepted column: {}", e);
        }
    }

    if !columns.contains(&"referrer_id".to_string()) {
        log::info!("Adding missing column: referrer_id to users table");
        if let Err(e) = conn.execute("ALTER TABLE users ADD COLUMN referrer_id INTEGER DEFAULT NULL", []) {
            log::warn!("Failed to add referrer_id column: {}", e);
        }
    }

    Ok(())
}

fn parse_ts(idx: usize, raw: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn map_user(row: &rusqlite::Row<'_>) -> Result<User> {
    let expires_raw: Option<String> = row.get(3)?;
    let expires = match expires_raw {
        Some(raw) => Some(parse_ts(3, raw)?),
        None => None,
    };
    Ok(User {
        telegram_id: row.get(0)?,
        username: row.get(1)?,
        subscription_status: row.get(2)?,
        subscription_expires_at: expires,
        total_requests: row.get(4)?,
        bonus_requests: row.get(5)?,
        used_requests: row.get(6)?,
        terms_accepted: row.get::<_, i64>(7)? != 0,
        referrer_id: row.get(8)?,
    })
}

const USER_COLUMNS: &str = "telegram_id, username, subscription_status, subscription_expires_at, \
                            total_requests, bonus_requests, used_requests, terms_accepted, referrer_id";

/// Получает пользователя по Telegram ID
pub fn get_user(conn: &Connection, telegram_id: i64) -> Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE telegram_id = ?1", USER_COLUMNS),
        params![telegram_id],
        map_user,
    )
    .optional()
}

/// Создаёт пользователя при первом контакте
pub fn create_user(conn: &Connection, telegram_id: i64, username: Option<String>, referrer_id: Option<i64>) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO users (telegram_id, username, referrer_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![telegram_id, username, referrer_id, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Фиксирует согласие с условиями и подтверждение возраста (один раз на пользователя)
pub fn set_terms_accepted(conn: &Connection, telegram_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET terms_accepted = 1 WHERE telegram_id = ?1",
        params![telegram_id],
    )?;
    Ok(())
}

/// Атомарно резервирует одну единицу квоты.
///
/// Единственный UPDATE с условием: подписка активна, срок не истёк и
/// остаток положителен (или план безлимитный). 0 затронутых строк
/// означает отказ; гонка двух одновременных запросов невозможна, потому
/// что SQLite выполняет UPDATE эксклюзивно.
pub fn reserve_request(conn: &Connection, telegram_id: i64, now: DateTime<Utc>) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE users SET used_requests = used_requests + 1
         WHERE telegram_id = ?1
           AND subscription_status = 'active'
           AND subscription_expires_at > ?2
           AND (total_requests < 0 OR used_requests < total_requests + bonus_requests)",
        params![telegram_id, now.to_rfc3339()],
    )?;
    Ok(affected == 1)
}

/// Возвращает зарезервированную единицу квоты (структурирование не удалось)
pub fn release_request(conn: &Connection, telegram_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET used_requests = MAX(used_requests - 1, 0) WHERE telegram_id = ?1",
        params![telegram_id],
    )?;
    Ok(())
}

/// Активирует или продлевает подписку после успешной оплаты.
///
/// Активная подписка продлевается от текущей даты окончания, и лимит
/// анализов добавляется к остатку. Неактивная начинается заново: счётчик
/// использованных сбрасывается, бонусные анализы сохраняются.
pub fn activate_subscription(conn: &Connection, telegram_id: i64, plan: &Plan, now: DateTime<Utc>) -> Result<()> {
    let user = get_user(conn, telegram_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;

    let currently_active = user.subscription_status == "active"
        && user.subscription_expires_at.map(|e| e > now).unwrap_or(false);

    let base = if currently_active {
        user.subscription_expires_at.unwrap_or(now)
    } else {
        now
    };
    let new_expires = base + Duration::days(plan.duration_days);

    let (new_total, new_used) = match plan.analyses {
        None => (-1, 0),
        Some(n) if currently_active && user.total_requests >= 0 => (user.total_requests + n, user.used_requests),
        Some(n) => (n, 0),
    };

    conn.execute(
        "UPDATE users SET subscription_status = 'active',
                          subscription_expires_at = ?2,
                          total_requests = ?3,
                          used_requests = ?4
         WHERE telegram_id = ?1",
        params![telegram_id, new_expires.to_rfc3339(), new_total, new_used],
    )?;
    Ok(())
}

/// Полностью снимает подписку (админская команда)
pub fn deactivate_subscription(conn: &Connection, telegram_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET subscription_status = 'none',
                          subscription_expires_at = NULL,
                          total_requests = 0,
                          used_requests = 0
         WHERE telegram_id = ?1",
        params![telegram_id],
    )?;
    Ok(())
}

/// Помечает просроченные подписки как expired. Корректность квоты от
/// этого не зависит (срок пересчитывается на чтении), sweep лишь держит
/// статус в БД честным.
pub fn expire_old_subscriptions(conn: &Connection, now: DateTime<Utc>) -> Result<usize> {
    conn.execute(
        "UPDATE users SET subscription_status = 'expired'
         WHERE subscription_status = 'active' AND subscription_expires_at <= ?1",
        params![now.to_rfc3339()],
    )
}

/// Начисляет бонусные анализы (реферальная программа)
pub fn add_bonus_requests(conn: &Connection, telegram_id: i64, amount: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET bonus_requests = bonus_requests + ?2 WHERE telegram_id = ?1",
        params![telegram_id, amount],
    )?;
    Ok(())
}

/// Общее число пользователей (админская статистика)
pub fn count_users(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
}

fn map_analysis(row: &rusqlite::Row<'_>) -> Result<AnalysisRecord> {
    let created_raw: String = row.get(4)?;
    Ok(AnalysisRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        structured_json: row.get(2)?,
        report_text: row.get(3)?,
        created_at: parse_ts(4, created_raw)?,
    })
}

/// Сохраняет результат анализа, возвращает его id
pub fn insert_analysis(conn: &Connection, user_id: i64, structured_json: &str, report_text: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO analyses (user_id, structured_json, report_text, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, structured_json, report_text, Utc::now().to_rfc3339()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Получает анализ по id (только принадлежащий пользователю)
pub fn get_analysis(conn: &Connection, analysis_id: i64, user_id: i64) -> Result<Option<AnalysisRecord>> {
    conn.query_row(
        "SELECT id, user_id, structured_json, report_text, created_at
         FROM analyses WHERE id = ?1 AND user_id = ?2",
        params![analysis_id, user_id],
        map_analysis,
    )
    .optional()
}

/// Последние анализы пользователя, новые первыми
pub fn get_recent_analyses(conn: &Connection, user_id: i64, limit: i64) -> Result<Vec<AnalysisRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, structured_json, report_text, created_at
         FROM analyses WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit], map_analysis)?;
    rows.collect()
}

/// Число сохранённых анализов пользователя
pub fn count_analyses(conn: &Connection, user_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM analyses WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )
}

/// Добавляет уточняющий вопрос, если лимит в два вопроса ещё не исчерпан.
///
/// Лимит навешивается тем же INSERT ... SELECT: при исчерпании вставка
/// не происходит и возвращается false.
pub fn insert_follow_up(conn: &Connection, analysis_id: i64, question: &str, answer: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT INTO follow_ups (analysis_id, ordinal, question, answer, created_at)
         SELECT ?1, COUNT(*), ?2, ?3, ?4 FROM follow_ups WHERE analysis_id = ?1
         HAVING COUNT(*) < ?5",
        params![
            analysis_id,
            question,
            answer,
            Utc::now().to_rfc3339(),
            crate::core::config::limits::MAX_FOLLOW_UPS
        ],
    )?;
    Ok(affected == 1)
}

/// Число уточняющих вопросов к анализу
pub fn count_follow_ups(conn: &Connection, analysis_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM follow_ups WHERE analysis_id = ?1",
        params![analysis_id],
        |row| row.get(0),
    )
}

/// Создаёт платёж в статусе pending, возвращает его внутренний id
pub fn create_payment_row(conn: &Connection, user_id: i64, plan_id: &str, amount_rub: i64) -> Result<i64> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO payments (user_id, plan_id, amount_rub, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'pending', ?4, ?4)",
        params![user_id, plan_id, amount_rub, now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Привязывает ID транзакции провайдера к платежу
pub fn set_provider_payment_id(conn: &Connection, payment_id: i64, provider_payment_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE payments SET provider_payment_id = ?2, updated_at = ?3 WHERE id = ?1",
        params![payment_id, provider_payment_id, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn map_payment(row: &rusqlite::Row<'_>) -> Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        plan_id: row.get(2)?,
        amount_rub: row.get(3)?,
        provider_payment_id: row.get(4)?,
        status: row.get(5)?,
    })
}

/// Ищет платёж по ID транзакции провайдера
pub fn get_payment_by_provider_id(conn: &Connection, provider_payment_id: &str) -> Result<Option<Payment>> {
    conn.query_row(
        "SELECT id, user_id, plan_id, amount_rub, provider_payment_id, status
         FROM payments WHERE provider_payment_id = ?1",
        params![provider_payment_id],
        map_payment,
    )
    .optional()
}

/// Переводит платёж из pending в терминальный статус.
///
/// Условие `status = 'pending'` делает переход одноразовым: повторная
/// доставка того же webhook не затронет ни одной строки, и эффекты
/// (активация подписки, бонусы) не применятся второй раз.
pub fn finalize_payment_if_pending(conn: &Connection, provider_payment_id: &str, new_status: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE payments SET status = ?2, updated_at = ?3
         WHERE provider_payment_id = ?1 AND status = 'pending'",
        params![provider_payment_id, new_status, Utc::now().to_rfc3339()],
    )?;
    Ok(affected == 1)
}

/// Записывает реферальное начисление, ключ уникален по payment_id.
/// Возвращает false, если бонус за этот платёж уже начислялся.
pub fn record_referral(conn: &Connection, referrer_id: i64, referee_id: i64, payment_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO referrals (referrer_id, referee_id, payment_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![referrer_id, referee_id, payment_id, Utc::now().to_rfc3339()],
    )?;
    Ok(affected == 1)
}
