//! Inline keyboards for the conversation screens.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::core::subscription::PLANS;
use crate::storage::db::AnalysisRecord;

/// Экран подтверждения условий
pub fn consent_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("✅ Подтверждаю", "consent:yes"),
        InlineKeyboardButton::callback("❌ Нет", "consent:no"),
    ]])
}

/// Главное меню
pub fn main_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback("🧪 Новый анализ", "menu:new")],
        vec![
            InlineKeyboardButton::callback("📂 Мои анализы", "menu:list"),
            InlineKeyboardButton::callback("📈 Сравнить", "menu:compare"),
        ],
        vec![
            InlineKeyboardButton::callback("💳 Подписка", "menu:plan"),
            InlineKeyboardButton::callback("ℹ️ Помощь", "menu:help"),
        ],
    ])
}

/// Кнопки под готовым отчётом
pub fn report_keyboard(follow_ups_left: i64) -> InlineKeyboardMarkup {
    let mut rows = Vec::new();
    if follow_ups_left > 0 {
        rows.push(vec![InlineKeyboardButton::callback(
            format!("❓ Задать вопрос (осталось {})", follow_ups_left),
            "report:followup",
        )]);
    }
    rows.push(vec![
        InlineKeyboardButton::callback("📈 Сравнить с прошлыми", "menu:compare"),
        InlineKeyboardButton::callback("🧪 Новый анализ", "menu:new"),
    ]);
    rows.push(vec![InlineKeyboardButton::callback("🏠 Меню", "menu:main")]);
    InlineKeyboardMarkup::new(rows)
}

/// Список сохранённых анализов
pub fn analyses_keyboard(analyses: &[AnalysisRecord]) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = analyses
        .iter()
        .map(|a| {
            vec![InlineKeyboardButton::callback(
                format!("📄 Разбор от {}", a.created_at.format("%d.%m.%Y")),
                format!("open:{}", a.id),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("🏠 Меню", "menu:main")]);
    InlineKeyboardMarkup::new(rows)
}

/// Экран тарифов
pub fn plans_keyboard() -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = PLANS
        .iter()
        .map(|p| {
            let analyses = match p.analyses {
                Some(n) => format!("{} разборов", n),
                None => "безлимит".to_string(),
            };
            vec![InlineKeyboardButton::callback(
                format!("{} — {} ₽ ({})", p.title, p.price_rub, analyses),
                format!("buy:{}", p.id),
            )]
        })
        .collect();
    rows.push(vec![InlineKeyboardButton::callback("🏠 Меню", "menu:main")]);
    InlineKeyboardMarkup::new(rows)
}
