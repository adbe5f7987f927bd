//! Due-window selection for reminders.
//!
//! A record is eligible when it is incomplete, remindable, never reminded,
//! and due within the rolling `[today - window, today]` interval. The lower
//! bound keeps long-stale records from flooding delivery after downtime.

use chrono::{Duration, NaiveDate};

use crate::db::{Database, DueVaccination};

/// All eligible records as of `today`.
pub fn eligible(db: &Database, today: NaiveDate, window_days: i64) -> Vec<DueVaccination> {
    db.due_vaccinations(today - Duration::days(window_days), today)
}

/// Eligible records for a single child, used right after registration so
/// already-due doses are reminded without waiting for the next scan.
pub fn eligible_for_child(
    db: &Database,
    child_id: i64,
    today: NaiveDate,
    window_days: i64,
) -> Vec<DueVaccination> {
    db.due_vaccinations_for_child(child_id, today - Duration::days(window_days), today)
}
