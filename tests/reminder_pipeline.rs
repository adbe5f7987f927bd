//! Offline end-to-end test of the reminder pipeline.
//!
//! Uses an empty configuration, so every external channel (text generation,
//! voice, email, SMS) is disabled: the pipeline runs on fallback templates
//! and records skipped deliveries, which is exactly the degraded mode a
//! fresh deployment starts in.

use std::sync::Arc;

use chrono::NaiveDate;

use vaccibot::config::Config;
use vaccibot::db::Database;
use vaccibot::pipeline::coverage::{self, CoverageColor, CoverageQuery};
use vaccibot::pipeline::delivery::DeliveryOutcome;
use vaccibot::pipeline::eligibility;
use vaccibot::pipeline::reminders::ReminderPipeline;
use vaccibot::schedule;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn offline_config(dir: &std::path::Path) -> Config {
    let path = dir.join("config.json");
    std::fs::write(&path, format!("{{\"data_dir\": {:?}}}", dir)).unwrap();
    Config::load(&path).unwrap()
}

#[tokio::test]
async fn full_pipeline_offline() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());

    let db = Arc::new(Database::new());
    let (regions, templates, _) = schedule::seed_reference(&db);
    assert_eq!(regions, 12);
    assert_eq!(templates, 25);

    // A family in region 1, child born 2026-04-10 with the full schedule.
    let parent = db.add_parent(
        "Khadija",
        Some("khadija@example.com"),
        Some("+212600000001"),
        Some("ar"),
        Some(1),
    );
    let child = db.register_child(parent, "Adam", date(2026, 4, 10), None);

    // Birth doses fall inside a 7-day window ending on the birthdate.
    let due = eligibility::eligible(&db, date(2026, 4, 10), config.reminder_window_days);
    assert!(!due.is_empty());
    assert!(due.iter().all(|r| r.due_date == date(2026, 4, 10)));

    let pipeline = ReminderPipeline::new(Arc::clone(&db), &config);
    let outcomes = pipeline.run(date(2026, 4, 10)).await;
    assert_eq!(outcomes.len(), due.len());

    for outcome in &outcomes {
        // All channels disabled: template text, no audio, skipped fan-out.
        assert!(!outcome.generated_text);
        assert!(!outcome.audio_saved);
        assert_eq!(outcome.email, DeliveryOutcome::Skipped);
        assert_eq!(outcome.sms, DeliveryOutcome::Skipped);

        let state = db.sent_state(outcome.vaccination_id).unwrap();
        assert!(state.reminder_sent);
        assert!(!state.voice_sent);
        assert!(state.audio_path.is_none());
        assert_eq!(state.email_delivery.as_deref(), Some("skipped"));
        assert_eq!(state.sms_delivery.as_deref(), Some("skipped"));
    }

    // Committed records never reappear.
    let rerun = pipeline.run(date(2026, 4, 10)).await;
    assert!(rerun.is_empty());

    // Later doses become eligible as their window arrives. The 8-week
    // visit falls 56 days after birth.
    let next_window = pipeline.run(date(2026, 6, 5)).await;
    assert!(!next_window.is_empty());
    assert!(next_window.iter().all(|o| o.vaccine_name.ends_with("-1")));

    // Mark one still-pending dose completed and check it feeds coverage,
    // attributed to the parent's region since the child has none of its own.
    let pending = db
        .due_vaccinations_for_child(child, date(2020, 1, 1), date(2040, 1, 1))
        .into_iter()
        .next()
        .unwrap();
    let vaccine = pending.vaccine_name.clone();
    db.mark_completed(pending.id, "2026-06-11 10:30:00");

    let report = coverage::coverage(&db, &vaccine, &CoverageQuery::default());
    let region1 = &report.regions[0];
    assert_eq!(region1.registered_children, 1);
    assert_eq!(region1.vaccinated, 1);
    assert_eq!(region1.coverage_rate, 1.0);
    assert_eq!(region1.color, CoverageColor::Green);
    // The other regions have no data.
    assert!(report.regions[1..].iter().all(|r| r.no_data));
}

#[tokio::test]
async fn per_child_trigger_scopes_and_commits() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());

    let db = Arc::new(Database::new());
    schedule::seed_reference(&db);

    let parent = db.add_parent("Nadia", None, None, Some("fr"), Some(2));
    let first = db.register_child(parent, "Lina", date(2026, 7, 1), Some(2));
    let second = db.register_child(parent, "Rayan", date(2026, 7, 1), Some(2));

    let pipeline = ReminderPipeline::new(Arc::clone(&db), &config);
    let outcomes = pipeline.run_for_child(first, date(2026, 7, 1)).await;
    assert!(!outcomes.is_empty());
    assert!(outcomes.iter().all(|o| o.child_name == "Lina"));

    // The sibling's records are untouched.
    let sibling = eligibility::eligible_for_child(&db, second, date(2026, 7, 1), 7);
    assert_eq!(sibling.len(), outcomes.len());
}
