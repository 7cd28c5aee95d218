//! Subscription plan catalog and quota decisions.
//!
//! The DB side (atomic reserve/release, activation writes) lives in
//! `storage::db`; this module holds the plan definitions and the pure
//! "may this user analyze now?" logic recomputed on every read.

use chrono::{DateTime, Utc};

use crate::storage::db::User;

/// Тарифный план подписки
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    /// Идентификатор плана (попадает в metadata платежа)
    pub id: &'static str,
    /// Название для экрана тарифов
    pub title: &'static str,
    /// Длительность подписки в днях
    pub duration_days: i64,
    /// Цена в рублях
    pub price_rub: u32,
    /// Количество анализов (None = безлимит)
    pub analyses: Option<i64>,
}

/// Фиксированный каталог из четырех планов
pub const PLANS: [Plan; 4] = [
    Plan {
        id: "1month",
        title: "1 месяц",
        duration_days: 30,
        price_rub: 299,
        analyses: Some(3),
    },
    Plan {
        id: "3months",
        title: "3 месяца",
        duration_days: 90,
        price_rub: 799,
        analyses: Some(15),
    },
    Plan {
        id: "6months",
        title: "6 месяцев",
        duration_days: 180,
        price_rub: 1399,
        analyses: None,
    },
    Plan {
        id: "12months",
        title: "12 месяцев",
        duration_days: 365,
        price_rub: 2499,
        analyses: None,
    },
];

/// Ищет план по идентификатору из metadata платежа
pub fn plan_by_id(id: &str) -> Option<&'static Plan> {
    PLANS.iter().find(|p| p.id == id)
}

/// Проверяет, активна ли подписка пользователя на момент `now`.
///
/// Статус в БД может отставать от реальности (sweep ещё не прошёл),
/// поэтому срок всегда пересчитывается по expires_at.
pub fn is_active(user: &User, now: DateTime<Utc>) -> bool {
    if user.subscription_status != "active" {
        return false;
    }
    match user.subscription_expires_at {
        Some(expires) => expires > now,
        None => false,
    }
}

/// Остаток анализов с учётом бонусных. Отрицательный остаток невозможен
/// по контракту reserve_request, но на чтении всё равно прижимаем к нулю.
pub fn remaining_analyses(user: &User) -> i64 {
    (user.total_requests + user.bonus_requests - user.used_requests).max(0)
}

/// Признак безлимитного плана: total_requests хранится как -1
pub fn is_unlimited(user: &User) -> bool {
    user.total_requests < 0
}

/// Отвечает на вопрос "может ли пользователь запустить анализ сейчас"
pub fn can_analyze(user: &User, now: DateTime<Utc>) -> bool {
    if !is_active(user, now) {
        return false;
    }
    is_unlimited(user) || remaining_analyses(user) > 0
}
