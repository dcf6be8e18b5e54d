//! Periodic background jobs: the daily refresh that absorbs directory
//! changes no targeted reschedule saw, and the claim-retention cleanup.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::scheduler::BirthdayScheduler;
use crate::timezone::tz_from_offset;
use crate::traits::ClaimStore;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Seconds until the next `hour`:00 wall clock in the given offset.
/// Never less than a minute, so a refresh can't spin at the boundary.
fn secs_until_hour(now: DateTime<Utc>, hour: u32, tz_hours: i32) -> u64 {
    let local = now.with_timezone(&tz_from_offset(tz_hours));
    let target_time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let mut target = local.date_naive().and_time(target_time);
    if target <= local.naive_local() {
        target += chrono::Duration::days(1);
    }
    (target - local.naive_local()).num_seconds().max(60) as u64
}

/// Once per day at `hour` local, rebuild with the last horizon.
pub fn spawn_daily_refresh(
    scheduler: Arc<BirthdayScheduler>,
    hour: u32,
    tz_hours: i32,
) -> JoinHandle<()> {
    info!(hour, tz_hours, "daily refresh scheduled");
    tokio::spawn(async move {
        loop {
            let wait = secs_until_hour(Utc::now(), hour, tz_hours);
            tokio::time::sleep(Duration::from_secs(wait)).await;
            match scheduler.rebuild(scheduler.last_horizon()).await {
                Ok(counts) => info!(
                    scheduled = counts.scheduled,
                    caught_up = counts.caught_up,
                    "daily refresh complete"
                ),
                Err(e) => error!("daily refresh failed: {}", e),
            }
        }
    })
}

/// Once per day, drop delivery records older than the retention window to
/// bound storage growth. Runs once at startup too.
pub fn spawn_claim_cleanup(claims: Arc<dyn ClaimStore>, retention_days: i64) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let cutoff = Utc::now() - chrono::Duration::days(retention_days);
            match claims.purge_claims_before(cutoff).await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "claim retention cleanup"),
                Err(e) => warn!("claim cleanup failed: {}", e),
            }
            tokio::time::sleep(DAY).await;
        }
    })
}
