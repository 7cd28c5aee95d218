//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;

use super::commands::{
    handle_cancel_command, handle_grant_command, handle_help_command, handle_revoke_command, handle_start_command,
    handle_users_command, require_consent,
};
use super::flow;
use super::types::{HandlerDeps, HandlerError};
use crate::telegram::bot::Command;
use crate::telegram::{texts, Bot};

/// Creates the main dispatcher schema for the Telegram bot.
///
/// Returns a handler tree for teloxide's Dispatcher. The same schema is
/// used in production and in integration tests.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_grant = deps.clone();
    let deps_revoke = deps.clone();
    let deps_users = deps.clone();
    let deps_commands = deps.clone();
    let deps_upload = deps.clone();
    let deps_text = deps.clone();
    let deps_callback = deps.clone();

    dptree::entry()
        // Hidden admin commands (not in Command enum)
        .branch(grant_handler(deps_grant))
        .branch(revoke_handler(deps_revoke))
        .branch(users_handler(deps_users))
        // Command handler
        .branch(command_handler(deps_commands))
        // Document and photo uploads
        .branch(upload_handler(deps_upload))
        // Plain text (questionnaire answers, follow-up questions)
        .branch(text_handler(deps_text))
        // Callback query handler
        .branch(callback_handler(deps_callback))
}

/// Handler for /grant admin command (hidden, not in Command enum)
fn grant_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().map(|text| text.starts_with("/grant")).unwrap_or(false))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                if let Err(e) = handle_grant_command(&bot, &msg, &deps).await {
                    log::error!("❌ /grant handler failed: {}", e);
                    let _ = bot.send_message(msg.chat.id, texts::DB_ERROR).await;
                }
                Ok(())
            }
        })
}

/// Handler for /revoke admin command (hidden, not in Command enum)
fn revoke_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().map(|text| text.starts_with("/revoke")).unwrap_or(false))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                if let Err(e) = handle_revoke_command(&bot, &msg, &deps).await {
                    log::error!("❌ /revoke handler failed: {}", e);
                    let _ = bot.send_message(msg.chat.id, texts::DB_ERROR).await;
                }
                Ok(())
            }
        })
}

/// Handler for /users admin command (hidden, not in Command enum)
fn users_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().map(|text| text.starts_with("/users")).unwrap_or(false))
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                if let Err(e) = handle_users_command(&bot, &msg, &deps).await {
                    log::error!("❌ /users handler failed: {}", e);
                }
                Ok(())
            }
        })
}

/// Handler for bot commands (/start, /analyze, /plan, etc.)
fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                log::info!("🎯 Received command: {:?} from chat {}", cmd, msg.chat.id);

                let lock = deps.locks.for_user(msg.chat.id.0);
                let _guard = lock.lock().await;

                match cmd {
                    Command::Start => {
                        handle_start_command(&bot, &msg, &deps).await?;
                    }
                    Command::Analyze => {
                        if require_consent(&bot, &msg, &deps).await? {
                            flow::start_new_analysis(&bot, msg.chat.id, &deps).await?;
                        }
                    }
                    Command::Analyses => {
                        flow::show_analyses_list(&bot, msg.chat.id, &deps).await?;
                    }
                    Command::Plan => {
                        flow::show_subscription_status(&bot, msg.chat.id, &deps).await?;
                    }
                    Command::Help => {
                        handle_help_command(&bot, &msg).await?;
                    }
                    Command::Cancel => {
                        handle_cancel_command(&bot, &msg, &deps).await?;
                    }
                }
                Ok(())
            }
        },
    ))
}

/// Handler for document and photo uploads
fn upload_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.document().is_some() || msg.photo().is_some())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let lock = deps.locks.for_user(msg.chat.id.0);
                let _guard = lock.lock().await;

                if let Err(e) = flow::handle_upload(&bot, &msg, &deps).await {
                    log::error!("❌ Upload handler failed for chat {}: {}", msg.chat.id, e);
                    let _ = bot.send_message(msg.chat.id, texts::DB_ERROR).await;
                }
                Ok(())
            }
        })
}

/// Handler for plain text messages, routed by session state
fn text_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.text().is_some())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                let lock = deps.locks.for_user(msg.chat.id.0);
                let _guard = lock.lock().await;

                if let Err(e) = flow::handle_text(&bot, &msg, &deps).await {
                    log::error!("❌ Text handler failed for chat {}: {}", msg.chat.id, e);
                    let _ = bot.send_message(msg.chat.id, texts::DB_ERROR).await;
                }
                Ok(())
            }
        })
}

/// Handler for callback queries (inline keyboard buttons)
fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    use super::callbacks::handle_callback;

    Update::filter_callback_query().endpoint(move |bot: Bot, q: CallbackQuery| {
        let deps = deps.clone();
        async move {
            let user_id = i64::try_from(q.from.id.0).unwrap_or(0);
            let lock = deps.locks.for_user(user_id);
            let _guard = lock.lock().await;

            if let Err(e) = handle_callback(&bot, &q, &deps).await {
                log::error!("❌ Callback handler failed for user {}: {}", user_id, e);
            }
            Ok(())
        }
    })
}
