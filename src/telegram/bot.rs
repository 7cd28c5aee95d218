//! Bot initialization and command definitions

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::core::config;
use crate::telegram::Bot;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Я умею:")]
pub enum Command {
    #[command(description = "главное меню")]
    Start,
    #[command(description = "загрузить анализы на разбор")]
    Analyze,
    #[command(description = "мои сохранённые анализы")]
    Analyses,
    #[command(description = "подписка и тарифы")]
    Plan,
    #[command(description = "как пользоваться ботом")]
    Help,
    #[command(description = "отменить текущий шаг")]
    Cancel,
}

/// Creates a Bot instance with a request timeout
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Failed to create bot
pub fn create_bot() -> anyhow::Result<Bot> {
    let token = config::BOT_TOKEN.clone();
    if token.is_empty() {
        return Err(anyhow::anyhow!("BOT_TOKEN environment variable not set"));
    }
    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;
    Ok(Bot::with_client(token, client))
}

/// Sets up bot commands in Telegram UI
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    use teloxide::types::BotCommand;

    bot.set_my_commands(vec![
        BotCommand::new("start", "главное меню"),
        BotCommand::new("analyze", "загрузить анализы на разбор"),
        BotCommand::new("analyses", "мои сохранённые анализы"),
        BotCommand::new("plan", "подписка и тарифы"),
        BotCommand::new("help", "как пользоваться ботом"),
        BotCommand::new("cancel", "отменить текущий шаг"),
    ])
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_descriptions() {
        let commands = Command::descriptions();
        let command_list = format!("{}", commands);

        assert!(command_list.contains("Я умею"));
        assert!(command_list.contains("start"));
        assert!(command_list.contains("analyze"));
        assert!(command_list.contains("cancel"));
    }
}
