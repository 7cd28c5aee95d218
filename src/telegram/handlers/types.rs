//! Handler types, dependencies, and user management helpers

use std::sync::Arc;

use teloxide::types::Message;

use crate::extract::DocumentExtractor;
use crate::llm::Structurer;
use crate::payments::PaymentService;
use crate::session::{SessionStore, UserLocks};
use crate::storage::db::{self, create_user, get_user};
use crate::storage::{get_connection, DbPool};

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub db_pool: Arc<DbPool>,
    pub sessions: Arc<SessionStore>,
    pub locks: Arc<UserLocks>,
    pub extractor: Arc<dyn DocumentExtractor>,
    pub llm: Arc<dyn Structurer>,
    pub payments: Arc<PaymentService>,
}

impl HandlerDeps {
    pub fn new(
        db_pool: Arc<DbPool>,
        sessions: Arc<SessionStore>,
        locks: Arc<UserLocks>,
        extractor: Arc<dyn DocumentExtractor>,
        llm: Arc<dyn Structurer>,
        payments: Arc<PaymentService>,
    ) -> Self {
        Self {
            db_pool,
            sessions,
            locks,
            extractor,
            llm,
            payments,
        }
    }
}

/// Ensures a user exists in the database, creating them on first contact.
///
/// `referrer_id` is only honored at creation time (deep link on /start);
/// existing users keep their original referrer.
pub fn ensure_user_exists(db_pool: &Arc<DbPool>, msg: &Message, referrer_id: Option<i64>) -> Result<db::User, HandlerError> {
    let conn = get_connection(db_pool)?;
    let chat_id = msg.chat.id.0;

    if let Some(user) = get_user(&conn, chat_id)? {
        return Ok(user);
    }

    let username = msg.from.as_ref().and_then(|u| u.username.clone());
    // A user cannot refer themselves
    let referrer = referrer_id.filter(|r| *r != chat_id);
    create_user(&conn, chat_id, username, referrer)?;
    log::info!("👤 New user {} (referrer: {:?})", chat_id, referrer);

    get_user(&conn, chat_id)?.ok_or_else(|| "user vanished right after creation".into())
}
