//! Database pool, schema, and retention functionality

pub mod db;
pub mod retention;

// Re-exports for convenience
pub use db::{create_pool, get_connection, DbConnection, DbPool};
