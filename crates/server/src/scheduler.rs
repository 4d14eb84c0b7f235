use crate::AppState;
use chrono::Timelike;
use std::time::Duration;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Spawn the daily log-retention sweep: deletes rows older than the
/// configured retention window at the configured hour. Runs as a single
/// background task off the request path.
pub fn spawn_log_cleanup(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let retention_days = state.config.log_retention_days;
        let cleanup_hour = state.config.log_cleanup_hour;
        tracing::info!(
            retention_days,
            cleanup_hour,
            "log retention sweeper started"
        );

        loop {
            tokio::time::sleep(until_next_run(cleanup_hour)).await;
            match state.repos.logs.cleanup_old_logs(retention_days).await {
                Ok(deleted) => {
                    tracing::info!(deleted, retention_days, "log cleanup completed");
                }
                Err(e) => {
                    tracing::error!("log cleanup failed: {e}");
                }
            }
        }
    })
}

/// Time until the next occurrence of `hour:00` UTC.
fn until_next_run(hour: u32) -> Duration {
    let now = chrono::Utc::now();
    let seconds_of_day = now.time().num_seconds_from_midnight() as u64;
    let target = hour as u64 * 3600;
    let wait = if target > seconds_of_day {
        target - seconds_of_day
    } else {
        SECS_PER_DAY - seconds_of_day + target
    };
    Duration::from_secs(wait)
}
