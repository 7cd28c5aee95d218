//! Payment webhook reconciliation.
//!
//! The provider retries any non-2xx response, so the HTTP surface
//! acknowledges every syntactically valid payload with 200 and
//! application-level problems are only logged. Idempotency rests on the
//! persistence layer: the UNIQUE provider id plus the one-shot
//! pending-to-terminal UPDATE in `storage::db::finalize_payment_if_pending`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::core::config;
use crate::core::subscription::plan_by_id;
use crate::storage::db::{self, DbPool};
use crate::storage::get_connection;

/// Распознанное событие провайдера.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    Succeeded { provider_payment_id: String },
    Canceled { provider_payment_id: String },
    Other { event: String },
}

impl WebhookEvent {
    /// Parse `{event, object: {id, ...}}`. Returns None when the payload
    /// is valid JSON but not shaped like a payment notification.
    pub fn parse(payload: &serde_json::Value) -> Option<Self> {
        let event = payload.get("event")?.as_str()?;
        match event {
            "payment.succeeded" | "payment.canceled" => {
                let id = payload.get("object")?.get("id")?.as_str()?.to_string();
                if event == "payment.succeeded" {
                    Some(WebhookEvent::Succeeded { provider_payment_id: id })
                } else {
                    Some(WebhookEvent::Canceled { provider_payment_id: id })
                }
            }
            other => Some(WebhookEvent::Other {
                event: other.to_string(),
            }),
        }
    }
}

/// Итог применения события к БД.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Переход применён, эффекты (активация/бонус) выполнены
    Applied,
    /// Платёж уже в терминальном статусе, событие повторное
    AlreadyFinal,
    /// Платёж с таким ID провайдера не найден
    Unknown,
    /// Нерелевантный тип события
    Ignored,
}

/// Apply one webhook event. Never fails the acknowledgment path: DB
/// errors bubble up to the caller which logs and still returns 200.
///
/// Финализация платежа и её эффекты (активация, реферальный бонус)
/// идут одной транзакцией: если активация упала, статус откатывается
/// в pending и следующий retry провайдера доводит дело до конца.
pub fn handle_event(conn: &mut rusqlite::Connection, event: &WebhookEvent) -> rusqlite::Result<ReconcileOutcome> {
    let (provider_id, new_status) = match event {
        WebhookEvent::Succeeded { provider_payment_id } => (provider_payment_id, "succeeded"),
        WebhookEvent::Canceled { provider_payment_id } => (provider_payment_id, "canceled"),
        WebhookEvent::Other { event } => {
            log::info!("Webhook event '{}' ignored", event);
            return Ok(ReconcileOutcome::Ignored);
        }
    };

    let tx = conn.transaction()?;

    let payment = match db::get_payment_by_provider_id(&tx, provider_id)? {
        Some(p) => p,
        None => {
            log::warn!("Webhook for unknown payment {}", provider_id);
            return Ok(ReconcileOutcome::Unknown);
        }
    };

    if payment.status != "pending" {
        log::info!("Payment {} already {}, webhook replay ignored", provider_id, payment.status);
        return Ok(ReconcileOutcome::AlreadyFinal);
    }

    // The conditional UPDATE is the actual idempotency gate: under
    // concurrent deliveries only one caller sees `true` here.
    if !db::finalize_payment_if_pending(&tx, provider_id, new_status)? {
        return Ok(ReconcileOutcome::AlreadyFinal);
    }

    if new_status == "succeeded" {
        apply_successful_payment(&tx, &payment, provider_id)?;
    } else {
        log::info!("💸 Payment {} canceled (user {})", provider_id, payment.user_id);
    }

    tx.commit()?;
    Ok(ReconcileOutcome::Applied)
}

fn apply_successful_payment(conn: &rusqlite::Connection, payment: &db::Payment, provider_id: &str) -> rusqlite::Result<()> {
    let Some(plan) = plan_by_id(&payment.plan_id) else {
        log::error!(
            "Payment {} references unknown plan '{}', subscription not activated",
            provider_id,
            payment.plan_id
        );
        return Ok(());
    };

    db::activate_subscription(conn, payment.user_id, plan, Utc::now())?;
    log::info!(
        "✅ Payment {} succeeded: user {} activated on {} until +{}d",
        provider_id,
        payment.user_id,
        plan.id,
        plan.duration_days
    );

    // Referral bonus, once per payment id
    if let Some(user) = db::get_user(conn, payment.user_id)? {
        if let Some(referrer_id) = user.referrer_id {
            if db::record_referral(conn, referrer_id, payment.user_id, provider_id)? {
                db::add_bonus_requests(conn, referrer_id, config::limits::BONUS_PER_REFERRAL)?;
                log::info!(
                    "🎁 Referral bonus: +{} analyses to user {} for payment {}",
                    config::limits::BONUS_PER_REFERRAL,
                    referrer_id,
                    provider_id
                );
            }
        }
    }

    Ok(())
}

/// Shared state for the webhook server.
#[derive(Clone)]
struct WebState {
    db: Arc<DbPool>,
}

/// Start the webhook / health HTTP server.
pub async fn start_webhook_server(port: u16, db: Arc<DbPool>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let state = WebState { db };

    let app = Router::new()
        .route("/webhook/yookassa", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    log::info!("Starting webhook server on http://{}", addr);
    log::info!("  /webhook/yookassa - Payment notifications");
    log::info!("  /health           - Health check");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// POST /webhook/yookassa — always 200 once the JSON parses (the Json
/// extractor rejects malformed bodies with 400 before we get here).
async fn webhook_handler(State(state): State<WebState>, Json(payload): Json<serde_json::Value>) -> impl IntoResponse {
    let Some(event) = WebhookEvent::parse(&payload) else {
        log::warn!("Webhook payload not shaped like a payment notification: {}", payload);
        return (StatusCode::OK, Json(json!({"status": "ok"})));
    };

    match get_connection(&state.db) {
        Ok(mut conn) => {
            if let Err(e) = handle_event(&mut conn, &event) {
                log::error!("Webhook reconciliation failed: {}", e);
            }
        }
        Err(e) => log::error!("Webhook could not get DB connection: {}", e),
    }

    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// GET /health — simple health check.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
