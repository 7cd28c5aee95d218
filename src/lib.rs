//! Pulsebot - Telegram bot that analyzes lab-result documents
//!
//! The bot accepts a PDF or photo of lab results, extracts the text,
//! collects clinical context in a short questionnaire, asks an LLM for a
//! structured record plus a narrative report, and stores the result.
//! Access is gated by paid subscription plans with per-plan quotas;
//! payments arrive through an idempotent YooKassa webhook.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging, subscription plans
//! - `storage`: SQLite pool, schema, retention sweeper
//! - `session`: per-user conversation state machine (Redis + fallback)
//! - `extract`: document text extraction
//! - `llm`: structuring and report generation
//! - `payments`: payment creation and webhook reconciliation
//! - `telegram`: bot wiring and handlers

pub mod core;
pub mod extract;
pub mod llm;
pub mod payments;
pub mod session;
pub mod storage;
pub mod telegram;

// Re-export commonly used types for convenience
pub use core::{config, AppError, AppResult};
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
pub use telegram::{create_bot, schema, Bot, HandlerDeps};
