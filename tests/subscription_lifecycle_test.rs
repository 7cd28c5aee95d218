//! Integration tests for the payment-to-analysis lifecycle
//!
//! Covers the path a paying user actually takes: pending payment,
//! webhook reconciliation, quota consumption down to the paywall,
//! referral bonus, and subscription expiry.
//!
//! Run with: cargo test --test subscription_lifecycle_test

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;

use pulsebot::core::subscription::{self, plan_by_id};
use pulsebot::payments::webhook::{handle_event, ReconcileOutcome, WebhookEvent};
use pulsebot::storage::db;
use pulsebot::storage::{create_pool, get_connection, DbPool};

fn temp_pool() -> (tempfile::TempDir, DbPool) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.sqlite");
    let pool = create_pool(db_path.to_str().unwrap()).unwrap();
    (dir, pool)
}

fn succeeded(provider_id: &str) -> WebhookEvent {
    WebhookEvent::Succeeded {
        provider_payment_id: provider_id.to_string(),
    }
}

#[test]
fn test_payment_activates_plan_and_quota_runs_down_to_paywall() {
    let (_dir, pool) = temp_pool();
    let mut conn = get_connection(&pool).unwrap();
    let plan = plan_by_id("1month").unwrap();

    db::create_user(&conn, 100, Some("alice".to_string()), None).unwrap();

    // No subscription yet: the very first reservation is denied
    assert!(!db::reserve_request(&conn, 100, Utc::now()).unwrap());

    let row_id = db::create_payment_row(&conn, 100, plan.id, plan.price_rub as i64).unwrap();
    db::set_provider_payment_id(&conn, row_id, "tx_lifecycle").unwrap();

    assert_eq!(
        handle_event(&mut conn, &succeeded("tx_lifecycle")).unwrap(),
        ReconcileOutcome::Applied
    );

    let user = db::get_user(&conn, 100).unwrap().unwrap();
    assert!(subscription::is_active(&user, Utc::now()));
    assert_eq!(user.total_requests, 3);

    // Exactly three reservations succeed, the fourth hits the paywall
    for _ in 0..3 {
        assert!(db::reserve_request(&conn, 100, Utc::now()).unwrap());
    }
    assert!(!db::reserve_request(&conn, 100, Utc::now()).unwrap());

    // A released unit (failed analysis) becomes available again
    db::release_request(&conn, 100).unwrap();
    assert!(db::reserve_request(&conn, 100, Utc::now()).unwrap());
    assert!(!db::reserve_request(&conn, 100, Utc::now()).unwrap());
}

#[test]
fn test_webhook_replay_is_idempotent() {
    let (_dir, pool) = temp_pool();
    let mut conn = get_connection(&pool).unwrap();
    let plan = plan_by_id("1month").unwrap();

    db::create_user(&conn, 200, None, None).unwrap();
    let row_id = db::create_payment_row(&conn, 200, plan.id, plan.price_rub as i64).unwrap();
    db::set_provider_payment_id(&conn, row_id, "tx_replay").unwrap();

    assert_eq!(
        handle_event(&mut conn, &succeeded("tx_replay")).unwrap(),
        ReconcileOutcome::Applied
    );
    let after_first = db::get_user(&conn, 200).unwrap().unwrap();

    // The provider retries delivery; the second application is a no-op
    assert_eq!(
        handle_event(&mut conn, &succeeded("tx_replay")).unwrap(),
        ReconcileOutcome::AlreadyFinal
    );
    let after_second = db::get_user(&conn, 200).unwrap().unwrap();

    assert_eq!(after_first.subscription_expires_at, after_second.subscription_expires_at);
    assert_eq!(after_first.total_requests, after_second.total_requests);
}

#[test]
fn test_referral_bonus_granted_once_per_payment() {
    let (_dir, pool) = temp_pool();
    let mut conn = get_connection(&pool).unwrap();
    let plan = plan_by_id("3months").unwrap();

    db::create_user(&conn, 300, None, None).unwrap();
    db::create_user(&conn, 301, None, Some(300)).unwrap();

    let row_id = db::create_payment_row(&conn, 301, plan.id, plan.price_rub as i64).unwrap();
    db::set_provider_payment_id(&conn, row_id, "tx_ref").unwrap();

    assert_eq!(handle_event(&mut conn, &succeeded("tx_ref")).unwrap(), ReconcileOutcome::Applied);
    assert_eq!(
        handle_event(&mut conn, &succeeded("tx_ref")).unwrap(),
        ReconcileOutcome::AlreadyFinal
    );

    let referrer = db::get_user(&conn, 300).unwrap().unwrap();
    assert_eq!(referrer.bonus_requests, 5);
}

#[test]
fn test_canceled_payment_leaves_subscription_untouched() {
    let (_dir, pool) = temp_pool();
    let mut conn = get_connection(&pool).unwrap();
    let plan = plan_by_id("1month").unwrap();

    db::create_user(&conn, 400, None, None).unwrap();
    let row_id = db::create_payment_row(&conn, 400, plan.id, plan.price_rub as i64).unwrap();
    db::set_provider_payment_id(&conn, row_id, "tx_cancel").unwrap();

    let event = WebhookEvent::Canceled {
        provider_payment_id: "tx_cancel".to_string(),
    };
    assert_eq!(handle_event(&mut conn, &event).unwrap(), ReconcileOutcome::Applied);

    let user = db::get_user(&conn, 400).unwrap().unwrap();
    assert!(!subscription::is_active(&user, Utc::now()));
    assert!(!db::reserve_request(&conn, 400, Utc::now()).unwrap());

    // A success event after cancellation must not resurrect the payment
    assert_eq!(
        handle_event(&mut conn, &succeeded("tx_cancel")).unwrap(),
        ReconcileOutcome::AlreadyFinal
    );
}

#[test]
fn test_unknown_payment_is_reported_not_applied() {
    let (_dir, pool) = temp_pool();
    let mut conn = get_connection(&pool).unwrap();

    assert_eq!(
        handle_event(&mut conn, &succeeded("tx_ghost")).unwrap(),
        ReconcileOutcome::Unknown
    );
}

#[test]
fn test_expired_subscription_denies_quota_even_with_unused_units() {
    let (_dir, pool) = temp_pool();
    let conn = get_connection(&pool).unwrap();
    let plan = plan_by_id("1month").unwrap();

    db::create_user(&conn, 500, None, None).unwrap();
    // Activate in the past so the window is already closed
    let long_ago = Utc::now() - Duration::days(plan.duration_days + 10);
    db::activate_subscription(&conn, 500, plan, long_ago).unwrap();

    assert!(!db::reserve_request(&conn, 500, Utc::now()).unwrap());

    let flipped = db::expire_old_subscriptions(&conn, Utc::now()).unwrap();
    assert_eq!(flipped, 1);
    let user = db::get_user(&conn, 500).unwrap().unwrap();
    assert_eq!(user.subscription_status, "expired");
}

#[test]
fn test_completed_analysis_leaves_two_of_three_remaining() {
    let (_dir, pool) = temp_pool();
    let conn = get_connection(&pool).unwrap();
    let plan = plan_by_id("1month").unwrap();

    db::create_user(&conn, 700, None, None).unwrap();
    db::activate_subscription(&conn, 700, plan, Utc::now()).unwrap();

    // The happy path: reserve, structure, persist
    assert!(db::reserve_request(&conn, 700, Utc::now()).unwrap());
    let analysis_id = db::insert_analysis(&conn, 700, r#"{"analytes":[]}"#, "отчёт").unwrap();
    assert!(db::get_analysis(&conn, analysis_id, 700).unwrap().is_some());

    let user = db::get_user(&conn, 700).unwrap().unwrap();
    assert_eq!(subscription::remaining_analyses(&user), 2);
}

#[test]
fn test_unlimited_plan_never_hits_the_paywall() {
    let (_dir, pool) = temp_pool();
    let conn = get_connection(&pool).unwrap();
    let plan = plan_by_id("6months").unwrap();

    db::create_user(&conn, 600, None, None).unwrap();
    db::activate_subscription(&conn, 600, plan, Utc::now()).unwrap();

    for _ in 0..50 {
        assert!(db::reserve_request(&conn, 600, Utc::now()).unwrap());
    }
}
