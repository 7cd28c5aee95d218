//! Chunked delivery for reports longer than one Telegram message.

use teloxide::prelude::*;
use teloxide::types::InlineKeyboardMarkup;

use crate::core::config;
use crate::telegram::Bot;

/// Split a long text on line boundaries into Telegram-sized chunks.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        // A single line longer than the budget gets hard-split
        if line_len > max_chars {
            let mut piece = String::new();
            for ch in line.chars() {
                piece.push(ch);
                if piece.chars().count() == max_chars {
                    chunks.push(std::mem::take(&mut piece));
                }
            }
            if !piece.is_empty() {
                current = piece;
                current_len = current.chars().count();
            }
        } else {
            current.push_str(line);
            current_len += line_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Send a report that may exceed one Telegram message. The keyboard is
/// attached to the last chunk only.
pub async fn send_chunked(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    keyboard: Option<InlineKeyboardMarkup>,
) -> ResponseResult<()> {
    let chunks = split_into_chunks(text, config::limits::MESSAGE_CHUNK_CHARS);
    let last = chunks.len() - 1;
    for (i, chunk) in chunks.iter().enumerate() {
        let kb = if i == last { keyboard.clone() } else { None };
        let mut req = bot.send_message(chat_id, chunk.clone());
        if let Some(kb) = kb {
            req = req.reply_markup(kb);
        }
        req.await?;
    }
    Ok(())
}
