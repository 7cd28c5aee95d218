//! Core utilities: configuration, errors, logging, subscription plans

pub mod config;
pub mod error;
pub mod logging;
pub mod subscription;

// Re-exports for convenience
pub use error::{AppError, AppResult};
pub use logging::init_logger;
