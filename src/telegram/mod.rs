//! Telegram bot integration and handlers

pub mod bot;
pub mod handlers;
pub mod menu;
pub mod sending;
pub mod texts;

/// Bot type used across handlers
pub type Bot = teloxide::Bot;

// Re-exports for convenience
pub use bot::{create_bot, setup_bot_commands, Command};
pub use handlers::{schema, HandlerDeps, HandlerError};
