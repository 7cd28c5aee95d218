//! Logging initialization
//!
//! Console + file logging via simplelog's CombinedLogger.

use anyhow::Result;
use simplelog::*;
use std::fs::File;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to initialize logger
pub fn init_logger(log_file_path: &str) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(
            LevelFilter::Info,
            Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Info, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs service configuration at application startup
///
/// Flags missing credentials early instead of failing on first use.
pub fn log_startup_configuration() {
    use crate::core::config;

    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("🩺 Pulse configuration check");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if config::BOT_TOKEN.is_empty() {
        log::error!("❌ BOT_TOKEN: not set - the bot cannot start");
    } else {
        log::info!("✅ BOT_TOKEN: set");
    }

    if config::OPENAI_API_KEY.is_empty() {
        log::warn!("⚠️  OPENAI_API_KEY: not set - analyses will fail");
    } else {
        log::info!("✅ OPENAI_API_KEY: set (model: {})", config::OPENAI_MODEL.as_str());
    }

    if config::YOOKASSA_SHOP_ID.is_empty() || config::YOOKASSA_SECRET_KEY.is_empty() {
        log::warn!("⚠️  YooKassa credentials not set - payments disabled");
    } else {
        log::info!("✅ YooKassa: shop {}", config::YOOKASSA_SHOP_ID.as_str());
    }

    match config::REDIS_URL.as_deref() {
        Some(url) => log::info!("✅ REDIS_URL: {}", url),
        None => log::warn!("⚠️  REDIS_URL: not set - sessions held in process memory"),
    }

    log::info!("📄 Database: {}", config::DATABASE_PATH.as_str());
    log::info!("🌐 Webhook port: {}", *config::WEBHOOK_PORT);
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
