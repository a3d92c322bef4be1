// Retention worker: prunes minute, hour and day tables past their TTL. Month rows are kept.
// Runs on a configurable schedule (cron expression or fixed interval).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::IndicatorRepo;
use crate::indicator::{Downsampling, TimeBucket};

/// Upper bound for the day-based TTL keys (hours for minute rows scale with it).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub minute_retention_hours: u32,
    pub hour_retention_days: u32,
    pub day_retention_days: u32,
    /// Optional cron expression (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub prune_schedule: Option<String>,
    /// Prune every N seconds when prune_schedule is not set.
    pub prune_interval_secs: u64,
}

impl RetentionConfig {
    /// How long rows of `downsampling` are kept; `None` keeps them forever.
    pub fn ttl(&self, downsampling: Downsampling) -> Option<TimeDelta> {
        match downsampling {
            Downsampling::Minute => Some(TimeDelta::hours(i64::from(self.minute_retention_hours))),
            Downsampling::Hour => Some(TimeDelta::days(i64::from(self.hour_retention_days))),
            Downsampling::Day => Some(TimeDelta::days(i64::from(self.day_retention_days))),
            Downsampling::Month => None,
        }
    }
}

/// Bucket value below which rows of `downsampling` are expired at `now`.
/// `None` when `now - ttl` falls outside the representable calendar.
pub fn cutoff_bucket(now: DateTime<Utc>, ttl: TimeDelta, downsampling: Downsampling) -> Option<i64> {
    now.checked_sub_signed(ttl)
        .map(|at| TimeBucket::from_datetime(at, downsampling).value())
}

/// One prune pass over every granularity with a TTL. Returns rows deleted.
#[instrument(skip(repo, config), fields(operation = "prune_expired"))]
pub async fn prune_expired(
    repo: &IndicatorRepo,
    config: &RetentionConfig,
    now: DateTime<Utc>,
) -> anyhow::Result<u64> {
    let mut deleted = 0;
    for downsampling in Downsampling::ALL {
        let Some(ttl) = config.ttl(downsampling) else {
            continue;
        };
        let Some(cutoff) = cutoff_bucket(now, ttl, downsampling) else {
            warn!(?downsampling, "retention cutoff out of range; skipping");
            continue;
        };
        deleted += repo.prune(downsampling, cutoff).await?;
    }
    Ok(deleted)
}

/// Prunes, then vacuums when anything was deleted so the file shrinks.
pub async fn retention_pass(
    repo: &IndicatorRepo,
    config: &RetentionConfig,
    now: DateTime<Utc>,
) -> anyhow::Result<u64> {
    let deleted = prune_expired(repo, config, now).await?;
    if deleted > 0 {
        repo.vacuum().await?;
    }
    Ok(deleted)
}

/// Spawns the retention worker. Stops on shutdown.
pub fn spawn(
    repo: Arc<IndicatorRepo>,
    config: RetentionConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let schedule = match config.prune_schedule.as_deref().map(cron::Schedule::from_str) {
            None => None,
            Some(Ok(schedule)) => Some(schedule),
            Some(Err(e)) => {
                warn!(error = %e, "invalid prune_schedule; pruning will not run");
                return;
            }
        };
        let interval = Duration::from_secs(config.prune_interval_secs.max(1));
        loop {
            let delay = match &schedule {
                Some(schedule) => next_cron_delay(schedule),
                None => interval,
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    match retention_pass(&repo, &config, Utc::now()).await {
                        Ok(deleted) => info!(rows_deleted = deleted, "retention prune complete"),
                        Err(e) => warn!(error = %e, "retention prune failed"),
                    }
                }
                _ = shutdown_rx.changed() => {
                    break;
                }
            }
        }
        debug!("Retention worker shutting down");
    })
}

/// Time until the next cron firing in local time; an hour when the schedule has none left.
fn next_cron_delay(schedule: &cron::Schedule) -> Duration {
    let now = chrono::Local::now();
    match schedule.after(&now).next() {
        Some(next) => (next - now).to_std().unwrap_or(Duration::from_secs(1)),
        None => Duration::from_secs(3600),
    }
}
