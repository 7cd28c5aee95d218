use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use teloxide::prelude::*;

use pulsebot::core::{config, init_logger, logging::log_startup_configuration};
use pulsebot::extract::HttpExtractor;
use pulsebot::llm::OpenAiStructurer;
use pulsebot::payments::webhook::start_webhook_server;
use pulsebot::payments::PaymentService;
use pulsebot::session::{SessionStore, UserLocks};
use pulsebot::storage::{create_pool, retention};
use pulsebot::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps};

/// Main entry point for the Telegram bot
///
/// # Errors
/// Returns an error if initialization fails (logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present
    let _ = dotenv();

    // Initialize logger (console + file)
    init_logger(&config::LOG_FILE_PATH)?;

    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("🚀 Starting Pulse bot");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log_startup_configuration();

    // Database pool (schema created and migrated on startup)
    let db_pool = Arc::new(create_pool(&config::DATABASE_PATH)?);
    log::info!("💾 Database ready at {}", *config::DATABASE_PATH);

    // Session store: Redis when configured, in-memory otherwise
    let sessions = Arc::new(SessionStore::connect(config::REDIS_URL.as_deref()).await);
    let locks = Arc::new(UserLocks::new());

    let extractor = Arc::new(HttpExtractor::from_env()?);
    let llm = Arc::new(OpenAiStructurer::from_env()?);
    let payments = Arc::new(PaymentService::from_env()?);
    if !payments.is_configured() {
        log::warn!("⚠️ YooKassa credentials missing, payments are disabled");
    }

    // Payment webhook server
    let webhook_db = Arc::clone(&db_pool);
    let webhook_port = *config::WEBHOOK_PORT;
    tokio::spawn(async move {
        if let Err(e) = start_webhook_server(webhook_port, webhook_db).await {
            log::error!("Webhook server failed: {}", e);
        }
    });

    // Daily retention sweep + subscription expiry
    retention::start_scheduler(Arc::clone(&db_pool));

    let bot = create_bot()?;
    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to set bot commands: {}", e);
    }

    let handler_deps = HandlerDeps::new(db_pool, sessions, locks, extractor, llm, payments);
    let handler = schema(handler_deps);

    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("✅ Bot is up, starting long polling");
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    Dispatcher::builder(bot, handler)
        .dependencies(DependencyMap::new())
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("Dispatcher shutdown gracefully");
    Ok(())
}
