//! Retention sweeper: enforces the 60-day window and the per-user cap.
//!
//! Runs as a `tokio::spawn`ed daily task. The same tick also flips stale
//! subscription rows to `expired`. A failure on one user is logged and
//! does not abort the rest of the sweep.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::time::interval;

use crate::core::config;
use crate::storage::db::DbPool;
use crate::storage::get_connection;

/// Outcome of one sweep cycle, for the summary log line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub expired_deleted: usize,
    pub capped_deleted: usize,
    pub users_failed: usize,
    pub subscriptions_expired: usize,
}

/// Start the retention scheduler background task.
pub fn start_scheduler(db_pool: Arc<DbPool>) {
    tokio::spawn(async move {
        let mut ticker = interval(config::retention::sweep_interval());

        log::info!(
            "Retention sweeper started (interval: {}s, window: {} days, cap: {})",
            config::retention::SWEEP_INTERVAL_SECS,
            config::retention::RETENTION_DAYS,
            config::retention::MAX_STORED_ANALYSES,
        );

        loop {
            ticker.tick().await;

            match run_sweep_cycle(&db_pool) {
                Ok(stats) => log::info!(
                    "🧹 Sweep done: {} expired, {} over cap, {} subscriptions lapsed, {} user(s) failed",
                    stats.expired_deleted,
                    stats.capped_deleted,
                    stats.subscriptions_expired,
                    stats.users_failed,
                ),
                Err(e) => log::error!("Sweep cycle failed: {}", e),
            }
        }
    });
}

/// Run one full sweep cycle against the pool.
pub fn run_sweep_cycle(db_pool: &Arc<DbPool>) -> Result<SweepStats, String> {
    let conn = get_connection(db_pool).map_err(|e| format!("DB connection error: {}", e))?;
    sweep_once(&conn, Utc::now())
}

/// Apply both retention rules and the expiry sweep at a given instant.
pub fn sweep_once(conn: &Connection, now: DateTime<Utc>) -> Result<SweepStats, String> {
    let mut stats = SweepStats::default();

    let user_ids = users_with_analyses(conn).map_err(|e| format!("Failed to list users: {}", e))?;

    for user_id in user_ids {
        match sweep_user(conn, user_id, now) {
            Ok((expired, capped)) => {
                stats.expired_deleted += expired;
                stats.capped_deleted += capped;
            }
            Err(e) => {
                stats.users_failed += 1;
                log::warn!("Retention sweep failed for user {}: {}", user_id, e);
            }
        }
    }

    match crate::storage::db::expire_old_subscriptions(conn, now) {
        Ok(n) => stats.subscriptions_expired = n,
        Err(e) => log::warn!("Subscription expiry sweep failed: {}", e),
    }

    Ok(stats)
}

fn users_with_analyses(conn: &Connection) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT DISTINCT user_id FROM analyses")?;
    let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    rows.collect()
}

/// Delete a user's analyses that are past the window or beyond the cap.
/// Follow-ups go with their parent via ON DELETE CASCADE.
fn sweep_user(conn: &Connection, user_id: i64, now: DateTime<Utc>) -> rusqlite::Result<(usize, usize)> {
    let cutoff = now - Duration::days(config::retention::RETENTION_DAYS);

    let expired = conn.execute(
        "DELETE FROM analyses WHERE user_id = ?1 AND created_at < ?2",
        params![user_id, cutoff.to_rfc3339()],
    )?;

    let capped = conn.execute(
        "DELETE FROM analyses WHERE user_id = ?1 AND id NOT IN (
             SELECT id FROM analyses WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2
         )",
        params![user_id, config::retention::MAX_STORED_ANALYSES],
    )?;

    Ok((expired, capped))
}
