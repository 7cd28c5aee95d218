//! Payments: YooKassa payment creation and webhook reconciliation.

pub mod webhook;

use uuid::Uuid;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::core::subscription::Plan;
use crate::storage::db;
use crate::storage::DbPool;

/// Client for creating YooKassa payments.
pub struct PaymentService {
    client: reqwest::Client,
    base_url: String,
    shop_id: String,
    secret_key: String,
    return_url: String,
}

impl PaymentService {
    pub fn new(base_url: String, shop_id: String, secret_key: String, return_url: String) -> AppResult<Self> {
        let client = reqwest::Client::builder().timeout(config::network::timeout()).build()?;
        Ok(Self {
            client,
            base_url,
            shop_id,
            secret_key,
            return_url,
        })
    }

    pub fn from_env() -> AppResult<Self> {
        Self::new(
            "https://api.yookassa.ru/v3".to_string(),
            config::YOOKASSA_SHOP_ID.clone(),
            config::YOOKASSA_SECRET_KEY.clone(),
            config::YOOKASSA_RETURN_URL.clone(),
        )
    }

    pub fn is_configured(&self) -> bool {
        !self.shop_id.is_empty() && !self.secret_key.is_empty()
    }

    /// Создаёт платёж: строка pending в БД, затем запрос к YooKassa с
    /// уникальным Idempotence-Key. Возвращает ссылку на оплату.
    pub async fn create_payment(&self, db_pool: &DbPool, user_id: i64, plan: &Plan) -> AppResult<String> {
        let payment_row_id = {
            let conn = crate::storage::get_connection(db_pool)?;
            db::create_payment_row(&conn, user_id, plan.id, plan.price_rub as i64)?
        };

        let body = serde_json::json!({
            "amount": {"value": format!("{}.00", plan.price_rub), "currency": "RUB"},
            "capture": true,
            "confirmation": {"type": "redirect", "return_url": self.return_url},
            "description": format!("Подписка Pulse: {}", plan.title),
            "metadata": {"user_id": user_id, "plan_id": plan.id},
        });

        let response = self
            .client
            .post(format!("{}/payments", self.base_url))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::HttpStatus(response.status()));
        }

        let payload: serde_json::Value = response.json().await?;

        let provider_id = payload["id"]
            .as_str()
            .ok_or_else(|| AppError::Validation("payment response missing id".to_string()))?;
        let confirmation_url = payload["confirmation"]["confirmation_url"]
            .as_str()
            .ok_or_else(|| AppError::Validation("payment response missing confirmation_url".to_string()))?;

        {
            let conn = crate::storage::get_connection(db_pool)?;
            db::set_provider_payment_id(&conn, payment_row_id, provider_id)?;
        }

        log::info!(
            "💳 Payment created: user {}, plan {}, provider id {}",
            user_id,
            plan.id,
            provider_id
        );

        Ok(confirmation_url.to_string())
    }
}
