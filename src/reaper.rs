use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{now_ms, Engine};
use crate::model::Ms;

const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that expires unpaid reservations and sends deadline reminders.
pub async fn run_sweeper(engine: Arc<Engine>, every: Duration, reminder_lead: Duration) {
    let lead = Ms::try_from(reminder_lead.as_millis()).unwrap_or(Ms::MAX);
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        sweep_once(&engine, now_ms(), lead).await;
    }
}

/// One sweeper pass: expire, then remind. Returns (expired, reminded).
pub async fn sweep_once(engine: &Engine, now: Ms, lead: Ms) -> (usize, usize) {
    let expired = engine.run_expiration_sweep(now).await.len();
    let reminded = engine.remind_approaching_deadlines(now, lead).await.len();
    if expired > 0 || reminded > 0 {
        info!("sweep: {expired} expired, {reminded} reminded");
    } else {
        debug!("sweep: nothing to do");
    }
    (expired, reminded)
}

/// Background task that compacts the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&engine, threshold).await;
    }
}

pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => true,
        Err(e) => {
            warn!("WAL compaction after {appends} appends failed: {e}");
            false
        }
    }
}
