//! Callback query routing for inline keyboard buttons

use teloxide::prelude::*;

use super::flow;
use super::types::{HandlerDeps, HandlerError};
use crate::core::subscription::plan_by_id;
use crate::session::SessionState;
use crate::storage::db;
use crate::storage::get_connection;
use crate::telegram::{menu, texts, Bot};

/// Consent gate for button presses: true if the user may proceed.
async fn consent_accepted(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps) -> Result<bool, HandlerError> {
    let user = {
        let conn = get_connection(&deps.db_pool)?;
        db::get_user(&conn, chat_id.0)?
    };

    if user.map(|u| u.terms_accepted).unwrap_or(false) {
        return Ok(true);
    }

    let mut session = deps.sessions.load(chat_id.0).await?;
    session.state = SessionState::AwaitingConsent;
    deps.sessions.save(chat_id.0, &session).await?;
    bot.send_message(chat_id, texts::CONSENT_PROMPT)
        .reply_markup(menu::consent_keyboard())
        .await?;
    Ok(false)
}

async fn handle_consent_accept(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps) -> Result<(), HandlerError> {
    {
        let conn = get_connection(&deps.db_pool)?;
        db::create_user(&conn, chat_id.0, None, None)?;
        db::set_terms_accepted(&conn, chat_id.0)?;
    }
    log::info!("✅ User {} accepted the terms", chat_id.0);

    let mut session = deps.sessions.load(chat_id.0).await?;
    session.reset();
    deps.sessions.save(chat_id.0, &session).await?;

    bot.send_message(chat_id, texts::MAIN_MENU)
        .reply_markup(menu::main_menu_keyboard())
        .await?;
    Ok(())
}

async fn handle_buy(bot: &Bot, chat_id: ChatId, deps: &HandlerDeps, plan_id: &str) -> Result<(), HandlerError> {
    let Some(plan) = plan_by_id(plan_id) else {
        bot.send_message(chat_id, texts::PAYMENTS_DISABLED).await?;
        return Ok(());
    };

    if !deps.payments.is_configured() {
        bot.send_message(chat_id, texts::PAYMENTS_DISABLED).await?;
        return Ok(());
    }

    {
        let conn = get_connection(&deps.db_pool)?;
        db::create_user(&conn, chat_id.0, None, None)?;
    }

    match deps.payments.create_payment(&deps.db_pool, chat_id.0, plan).await {
        Ok(url) => {
            let text = format!(
                "💳 {} — {} ₽.\n\nОплатите по ссылке, подписка включится автоматически:\n{}",
                plan.title, plan.price_rub, url
            );
            bot.send_message(chat_id, text).await?;
        }
        Err(e) => {
            log::error!("Payment creation failed for user {}: {}", chat_id.0, e);
            bot.send_message(chat_id, texts::PAYMENTS_DISABLED).await?;
        }
    }
    Ok(())
}

/// Route a callback query by its data payload.
///
/// Runs under the per-user lock so button presses cannot interleave with
/// message handlers for the same user.
pub(super) async fn handle_callback(bot: &Bot, q: &CallbackQuery, deps: &HandlerDeps) -> Result<(), HandlerError> {
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    // The bot works in private chats, so the sender is the chat
    let chat_id = ChatId(i64::try_from(q.from.id.0).unwrap_or(0));
    if chat_id.0 == 0 {
        return Ok(());
    }

    log::debug!("Callback '{}' from user {}", data, chat_id.0);

    match data {
        "consent:yes" => handle_consent_accept(bot, chat_id, deps).await?,
        "consent:no" => {
            bot.send_message(chat_id, texts::CONSENT_DECLINED)
                .reply_markup(menu::consent_keyboard())
                .await?;
        }
        "menu:new" => {
            if consent_accepted(bot, chat_id, deps).await? {
                flow::start_new_analysis(bot, chat_id, deps).await?;
            }
        }
        "menu:list" => flow::show_analyses_list(bot, chat_id, deps).await?,
        "menu:compare" => flow::run_compare(bot, chat_id, deps).await?,
        "menu:plan" => flow::show_subscription_status(bot, chat_id, deps).await?,
        "menu:help" => {
            bot.send_message(chat_id, texts::HELP)
                .reply_markup(menu::main_menu_keyboard())
                .await?;
        }
        "menu:main" => {
            bot.send_message(chat_id, texts::MAIN_MENU)
                .reply_markup(menu::main_menu_keyboard())
                .await?;
        }
        "report:followup" => flow::prompt_follow_up(bot, chat_id, deps).await?,
        other => {
            if let Some(raw_id) = other.strip_prefix("open:") {
                match raw_id.parse::<i64>() {
                    Ok(analysis_id) => flow::open_analysis(bot, chat_id, deps, analysis_id).await?,
                    Err(_) => log::warn!("Malformed open callback from user {}: {}", chat_id.0, other),
                }
            } else if let Some(plan_id) = other.strip_prefix("buy:") {
                handle_buy(bot, chat_id, deps, plan_id).await?;
            } else {
                log::warn!("Unknown callback from user {}: {}", chat_id.0, other);
            }
        }
    }
    Ok(())
}
