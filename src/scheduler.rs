//! Background jobs: the nightly coverage-cache refresh and the periodic
//! reminder scan.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Africa::Casablanca;
use cron::Schedule;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::pipeline::coverage;
use crate::pipeline::reminders::ReminderPipeline;

/// 02:00 every night, local time. Coverage queries served during the day
/// then hit a snapshot no older than the previous night.
const COVERAGE_REFRESH_CRON: &str = "0 0 2 * * * *";

/// Recompute and cache coverage for the whole schedule.
pub fn refresh_coverage_cache(db: &Database) -> usize {
    coverage::refresh_all(db)
}

/// Sleep-until-due loop for the nightly coverage refresh.
pub async fn coverage_refresh_loop(db: Arc<Database>) {
    let schedule = match Schedule::from_str(COVERAGE_REFRESH_CRON) {
        Ok(s) => s,
        Err(e) => {
            error!("Invalid refresh schedule: {e}");
            return;
        }
    };

    loop {
        let now = Utc::now().with_timezone(&Casablanca);
        let Some(next) = schedule.after(&now).next() else {
            warn!("No future occurrence for the coverage refresh, stopping");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        info!("Next coverage refresh at {next}");
        tokio::time::sleep(wait).await;
        refresh_coverage_cache(&db);
    }
}

/// Periodic reminder scan at a fixed interval. Disabled when the interval
/// is zero.
pub async fn reminder_scan_loop(pipeline: Arc<ReminderPipeline>, interval_minutes: u32) {
    if interval_minutes == 0 {
        info!("Periodic reminder scan disabled");
        return;
    }
    let interval = std::time::Duration::from_secs(u64::from(interval_minutes) * 60);
    loop {
        tokio::time::sleep(interval).await;
        let today = Utc::now().with_timezone(&Casablanca).date_naive();
        pipeline.run(today).await;
    }
}

/// Run both background loops until the process is stopped.
pub async fn run(db: Arc<Database>, pipeline: Arc<ReminderPipeline>, scan_interval_minutes: u32) {
    tokio::join!(
        coverage_refresh_loop(db),
        reminder_scan_loop(pipeline, scan_interval_minutes),
    );
}
