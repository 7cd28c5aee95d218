use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Configuration constants for the bot
/// Bot token
/// Read from BOT_TOKEN or TELOXIDE_TOKEN environment variable
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| {
    env::var("BOT_TOKEN")
        .or_else(|_| env::var("TELOXIDE_TOKEN"))
        .unwrap_or_else(|_| String::new())
});

/// Database file path
/// Read from DATABASE_PATH environment variable
/// Default: pulse.sqlite
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "pulse.sqlite".to_string()));

/// Log file path
/// Read from LOG_FILE_PATH environment variable
/// Default: pulse.log
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "pulse.log".to_string()));

/// Redis connection URL for session state
/// Read from REDIS_URL environment variable
/// If unset or unreachable, sessions fall back to process memory
pub static REDIS_URL: Lazy<Option<String>> = Lazy::new(|| env::var("REDIS_URL").ok());

/// URL of the document extraction service
/// Read from EXTRACTOR_URL environment variable
/// Default: http://127.0.0.1:8090/extract
pub static EXTRACTOR_URL: Lazy<String> =
    Lazy::new(|| env::var("EXTRACTOR_URL").unwrap_or_else(|_| "http://127.0.0.1:8090/extract".to_string()));

/// OpenAI-compatible API key for structuring and report generation
pub static OPENAI_API_KEY: Lazy<String> = Lazy::new(|| env::var("OPENAI_API_KEY").unwrap_or_else(|_| String::new()));

/// Chat completions base URL (override for compatible providers)
pub static OPENAI_BASE_URL: Lazy<String> =
    Lazy::new(|| env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string()));

/// Model used for structuring and reports
/// Default: gpt-4o-mini
pub static OPENAI_MODEL: Lazy<String> =
    Lazy::new(|| env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()));

/// YooKassa shop credentials
pub static YOOKASSA_SHOP_ID: Lazy<String> =
    Lazy::new(|| env::var("YOOKASSA_SHOP_ID").unwrap_or_else(|_| String::new()));
pub static YOOKASSA_SECRET_KEY: Lazy<String> =
    Lazy::new(|| env::var("YOOKASSA_SECRET_KEY").unwrap_or_else(|_| String::new()));

/// URL the user is returned to after completing a payment
pub static YOOKASSA_RETURN_URL: Lazy<String> =
    Lazy::new(|| env::var("YOOKASSA_RETURN_URL").unwrap_or_else(|_| "https://t.me".to_string()));

/// Port for the payment webhook / health HTTP server
/// Read from WEBHOOK_PORT environment variable
/// Default: 8080
pub static WEBHOOK_PORT: Lazy<u16> = Lazy::new(|| {
    env::var("WEBHOOK_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080)
});

/// Admin chat id for privileged commands and failure notifications
/// Read from ADMIN_CHAT_ID environment variable
pub static ADMIN_CHAT_ID: Lazy<Option<i64>> = Lazy::new(|| env::var("ADMIN_CHAT_ID").ok().and_then(|v| v.parse().ok()));

/// Retention policy configuration
pub mod retention {
    use super::Duration;

    /// Analyses older than this many days are deleted regardless of count
    pub const RETENTION_DAYS: i64 = 60;

    /// Maximum analyses retained per user (oldest beyond this are evicted)
    pub const MAX_STORED_ANALYSES: i64 = 3;

    /// Interval between sweeper runs (in seconds)
    pub const SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

    /// Sweep interval duration
    pub fn sweep_interval() -> Duration {
        Duration::from_secs(SWEEP_INTERVAL_SECS)
    }
}

/// Session storage configuration
pub mod session {
    use once_cell::sync::Lazy;

    /// Redis TTL for session keys (in seconds). Backstop for abandoned
    /// sessions; the idle timeout below is the primary mechanism.
    pub const REDIS_TTL_SECS: u64 = 3600;

    /// Idle timeout after which a session is reset on next interaction.
    /// Read from SESSION_IDLE_TIMEOUT_SECS, default 1800.
    pub static IDLE_TIMEOUT_SECS: Lazy<i64> = Lazy::new(|| {
        std::env::var("SESSION_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1800)
    });
}

/// Business limits
pub mod limits {
    /// Maximum follow-up questions per analysis
    pub const MAX_FOLLOW_UPS: i64 = 2;

    /// Maximum prior analyses selectable for comparison
    pub const MAX_COMPARE_WITH: usize = 2;

    /// Bonus analyses credited to a referrer per referee payment
    pub const BONUS_PER_REFERRAL: i64 = 5;

    /// Telegram message length budget before a report is chunked
    pub const MESSAGE_CHUNK_CHARS: usize = 4000;
}

/// Network timeouts
pub mod network {
    use super::Duration;

    /// Timeout for Telegram API requests (in seconds)
    pub const TELEGRAM_TIMEOUT_SECS: u64 = 60;

    /// Timeout for extractor requests (in seconds)
    pub const EXTRACTOR_TIMEOUT_SECS: u64 = 90;

    /// Timeout for LLM requests (in seconds)
    pub const LLM_TIMEOUT_SECS: u64 = 120;

    /// Telegram client timeout duration
    pub fn timeout() -> Duration {
        Duration::from_secs(TELEGRAM_TIMEOUT_SECS)
    }

    /// Extractor client timeout duration
    pub fn extractor_timeout() -> Duration {
        Duration::from_secs(EXTRACTOR_TIMEOUT_SECS)
    }

    /// LLM client timeout duration
    pub fn llm_timeout() -> Duration {
        Duration::from_secs(LLM_TIMEOUT_SECS)
    }
}
