//! Command handler implementations (/start, /help, /cancel, admin tools)

use teloxide::prelude::*;
use teloxide::types::Message;

use super::types::{ensure_user_exists, HandlerDeps, HandlerError};
use crate::core::config;
use crate::core::subscription::plan_by_id;
use crate::session::SessionState;
use crate::storage::db;
use crate::storage::get_connection;
use crate::telegram::{menu, texts, Bot};

/// Deep-link payload of /start: `ref_<id>` carries the referrer.
fn parse_referrer(text: &str) -> Option<i64> {
    text.strip_prefix("/start")?
        .trim()
        .strip_prefix("ref_")?
        .parse()
        .ok()
}

/// Handle /start command: register the user, gate on consent, show the menu
pub(super) async fn handle_start_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let chat_id = msg.chat.id;
    let referrer = msg.text().and_then(parse_referrer);
    let user = ensure_user_exists(&deps.db_pool, msg, referrer)?;

    bot.send_message(chat_id, texts::WELCOME).await?;

    if !user.terms_accepted {
        let mut session = deps.sessions.load(chat_id.0).await?;
        session.state = SessionState::AwaitingConsent;
        deps.sessions.save(chat_id.0, &session).await?;
        bot.send_message(chat_id, texts::CONSENT_PROMPT)
            .reply_markup(menu::consent_keyboard())
            .await?;
        return Ok(());
    }

    bot.send_message(chat_id, texts::MAIN_MENU)
        .reply_markup(menu::main_menu_keyboard())
        .await?;
    Ok(())
}

/// Handle /help command
pub(super) async fn handle_help_command(bot: &Bot, msg: &Message) -> Result<(), HandlerError> {
    bot.send_message(msg.chat.id, texts::HELP)
        .reply_markup(menu::main_menu_keyboard())
        .await?;
    Ok(())
}

/// Handle /cancel command: reset the session from any state
pub(super) async fn handle_cancel_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let chat_id = msg.chat.id;
    let mut session = deps.sessions.load(chat_id.0).await?;
    session.reset();
    deps.sessions.save(chat_id.0, &session).await?;
    bot.send_message(chat_id, texts::CANCELED)
        .reply_markup(menu::main_menu_keyboard())
        .await?;
    Ok(())
}

/// Consent gate: true if the user may proceed, otherwise re-prompts consent.
pub(super) async fn require_consent(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<bool, HandlerError> {
    let user = ensure_user_exists(&deps.db_pool, msg, None)?;
    if user.terms_accepted {
        return Ok(true);
    }

    let chat_id = msg.chat.id;
    let mut session = deps.sessions.load(chat_id.0).await?;
    session.state = SessionState::AwaitingConsent;
    deps.sessions.save(chat_id.0, &session).await?;
    bot.send_message(chat_id, texts::CONSENT_PROMPT)
        .reply_markup(menu::consent_keyboard())
        .await?;
    Ok(false)
}

pub(super) fn is_admin(user_id: i64) -> bool {
    config::ADMIN_CHAT_ID.map(|admin| admin == user_id).unwrap_or(false)
}

/// Handle /grant admin command: `/grant <user_id> <plan_id>`
pub(super) async fn handle_grant_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let chat_id = msg.chat.id;
    if !is_admin(chat_id.0) {
        return Ok(());
    }

    let text = msg.text().unwrap_or_default();
    let mut parts = text.split_whitespace().skip(1);
    let (Some(target), Some(plan_id)) = (parts.next(), parts.next()) else {
        bot.send_message(chat_id, "Использование: /grant <user_id> <plan_id>").await?;
        return Ok(());
    };

    let Ok(target_id) = target.parse::<i64>() else {
        bot.send_message(chat_id, "user_id должен быть числом").await?;
        return Ok(());
    };
    let Some(plan) = plan_by_id(plan_id) else {
        bot.send_message(chat_id, "Неизвестный план. Доступны: 1month, 3months, 6months, 12months")
            .await?;
        return Ok(());
    };

    {
        let conn = get_connection(&deps.db_pool)?;
        db::create_user(&conn, target_id, None, None)?;
        db::activate_subscription(&conn, target_id, plan, chrono::Utc::now())?;
    }
    log::info!("🛠 Admin granted plan {} to user {}", plan.id, target_id);
    bot.send_message(chat_id, format!("Выдан план {} пользователю {}", plan.id, target_id))
        .await?;
    Ok(())
}

/// Handle /revoke admin command: `/revoke <user_id>`
pub(super) async fn handle_revoke_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let chat_id = msg.chat.id;
    if !is_admin(chat_id.0) {
        return Ok(());
    }

    let text = msg.text().unwrap_or_default();
    let Some(target_id) = text.split_whitespace().nth(1).and_then(|s| s.parse::<i64>().ok()) else {
        bot.send_message(chat_id, "Использование: /revoke <user_id>").await?;
        return Ok(());
    };

    {
        let conn = get_connection(&deps.db_pool)?;
        db::deactivate_subscription(&conn, target_id)?;
    }
    log::info!("🛠 Admin revoked subscription of user {}", target_id);
    bot.send_message(chat_id, format!("Подписка пользователя {} снята", target_id))
        .await?;
    Ok(())
}

/// Handle /users admin command: total user count
pub(super) async fn handle_users_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> Result<(), HandlerError> {
    let chat_id = msg.chat.id;
    if !is_admin(chat_id.0) {
        return Ok(());
    }

    let count = {
        let conn = get_connection(&deps.db_pool)?;
        db::count_users(&conn)?
    };
    bot.send_message(chat_id, format!("Всего пользователей: {}", count))
        .await?;
    Ok(())
}
