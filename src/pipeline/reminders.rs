//! Reminder orchestration: select eligible records, generate content,
//! synthesize and store audio, deliver over email and SMS, then commit
//! the send state.
//!
//! The commit is strictly last. A record is marked only after every
//! delivery attempt resolved, so a crash mid-batch leaves unprocessed
//! records eligible for the next scan with no double send of committed
//! ones.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::{Database, DueVaccination};
use crate::pipeline::content::{TextGenerator, TextSource};
use crate::pipeline::delivery::{DeliveryOutcome, Mailer, SmsSender};
use crate::pipeline::eligibility;
use crate::pipeline::voice::{AudioStore, VoiceSynthesizer};

/// What happened to one record during a pipeline run.
#[derive(Debug)]
pub struct ReminderOutcome {
    pub vaccination_id: i64,
    pub child_name: String,
    pub vaccine_name: String,
    pub generated_text: bool,
    pub audio_saved: bool,
    pub email: DeliveryOutcome,
    pub sms: DeliveryOutcome,
}

/// The reminder pipeline with all its channels wired up.
pub struct ReminderPipeline {
    db: Arc<Database>,
    text: Arc<TextGenerator>,
    voice: Arc<VoiceSynthesizer>,
    store: Arc<AudioStore>,
    mailer: Arc<Mailer>,
    sms: Arc<SmsSender>,
    window_days: i64,
}

impl ReminderPipeline {
    pub fn new(db: Arc<Database>, config: &Config) -> Self {
        Self {
            db,
            text: Arc::new(TextGenerator::from_config(config)),
            voice: Arc::new(VoiceSynthesizer::from_config(config)),
            store: Arc::new(AudioStore::new(config.media_dir.clone())),
            mailer: Arc::new(Mailer::from_config(config)),
            sms: Arc::new(SmsSender::from_config(config)),
            window_days: config.reminder_window_days,
        }
    }

    /// Process every eligible record as of `today`. Records are handled
    /// concurrently; a failure in one never aborts the others.
    pub async fn run(&self, today: NaiveDate) -> Vec<ReminderOutcome> {
        let records = eligibility::eligible(&self.db, today, self.window_days);
        info!("Reminder scan: {} eligible record(s) in the {}-day window", records.len(), self.window_days);
        self.process(records, today).await
    }

    /// Same pipeline, restricted to one child. Used by the on-demand
    /// per-child trigger.
    pub async fn run_for_child(&self, child_id: i64, today: NaiveDate) -> Vec<ReminderOutcome> {
        let records = eligibility::eligible_for_child(&self.db, child_id, today, self.window_days);
        info!("Reminder scan for child {child_id}: {} eligible record(s)", records.len());
        self.process(records, today).await
    }

    async fn process(&self, records: Vec<DueVaccination>, today: NaiveDate) -> Vec<ReminderOutcome> {
        let mut tasks = JoinSet::new();
        for record in records {
            let db = Arc::clone(&self.db);
            let text = Arc::clone(&self.text);
            let voice = Arc::clone(&self.voice);
            let store = Arc::clone(&self.store);
            let mailer = Arc::clone(&self.mailer);
            let sms = Arc::clone(&self.sms);
            tasks.spawn(async move {
                process_record(&db, &text, &voice, &store, &mailer, &sms, record, today).await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => {}
                Err(e) => error!("Reminder task panicked: {e}"),
            }
        }
        outcomes.sort_by_key(|o| o.vaccination_id);

        let sent_email = outcomes.iter().filter(|o| o.email == DeliveryOutcome::Sent).count();
        let sent_sms = outcomes.iter().filter(|o| o.sms == DeliveryOutcome::Sent).count();
        info!(
            "Reminder run finished: {} record(s) committed, {} email(s), {} SMS",
            outcomes.len(),
            sent_email,
            sent_sms
        );
        outcomes
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_record(
    db: &Database,
    text: &TextGenerator,
    voice: &VoiceSynthesizer,
    store: &AudioStore,
    mailer: &Mailer,
    sms: &SmsSender,
    record: DueVaccination,
    today: NaiveDate,
) -> Option<ReminderOutcome> {
    let reminder = text
        .reminder_text(&record.child_name, &record.vaccine_name, record.due_date, record.language)
        .await;

    // Voice is best-effort; a synthesis or store failure downgrades the
    // reminder to text-only instead of dropping it.
    let audio_name = match voice.synthesize(&reminder.text, record.language).await {
        Some(bytes) => match store.save(record.id, today, &bytes) {
            Ok(name) => Some((name, bytes)),
            Err(e) => {
                warn!("Audio store failed for record {}: {e}", record.id);
                None
            }
        },
        None => None,
    };

    let email = mailer
        .send_reminder(
            record.parent_email.as_deref(),
            &record.child_name,
            &record.vaccine_name,
            &reminder.text,
            audio_name.as_ref().map(|(_, bytes)| bytes.as_slice()),
        )
        .await;
    let sms_outcome = sms.send_reminder(record.parent_phone.as_deref(), &reminder.text).await;

    if let Err(e) = db.mark_reminder_sent(
        record.id,
        audio_name.as_ref().map(|(name, _)| name.as_str()),
        email.as_str(),
        sms_outcome.as_str(),
    ) {
        // Uncommitted means the next scan will retry this record.
        error!("{e}");
        return None;
    }

    Some(ReminderOutcome {
        vaccination_id: record.id,
        child_name: record.child_name,
        vaccine_name: record.vaccine_name,
        generated_text: matches!(reminder.source, TextSource::Generated),
        audio_saved: audio_name.is_some(),
        email,
        sms: sms_outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::schedule;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn offline_pipeline(db: Arc<Database>, dir: &std::path::Path) -> ReminderPipeline {
        let path = dir.join("config.json");
        std::fs::write(&path, format!("{{\"data_dir\": {:?}}}", dir)).unwrap();
        let config = Config::load(&path).unwrap();
        ReminderPipeline::new(db, &config)
    }

    #[tokio::test]
    async fn test_run_commits_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::new());
        schedule::seed_reference(&db);

        let parent = db.add_parent("Fatima", Some("f@example.com"), None, Some("fr"), None);
        db.register_child(parent, "Yasmine", date(2026, 3, 1), None);

        let pipeline = offline_pipeline(Arc::clone(&db), dir.path());
        // Birth doses due on the birthdate itself.
        let outcomes = pipeline.run(date(2026, 3, 1)).await;
        assert!(!outcomes.is_empty());
        for outcome in &outcomes {
            // Offline config: template text, no audio, channels skipped.
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

        // A second run over the same window selects nothing.
        let rerun = pipeline.run(date(2026, 3, 1)).await;
        assert!(rerun.is_empty());
    }

    #[tokio::test]
    async fn test_run_for_child_scopes_to_that_child() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::new());
        schedule::seed_reference(&db);

        let parent = db.add_parent("Omar", None, None, None, None);
        let child_a = db.register_child(parent, "A", date(2026, 3, 1), None);
        let child_b = db.register_child(parent, "B", date(2026, 3, 1), None);

        let pipeline = offline_pipeline(Arc::clone(&db), dir.path());
        let outcomes = pipeline.run_for_child(child_a, date(2026, 3, 1)).await;
        assert!(!outcomes.is_empty());
        assert!(outcomes.iter().all(|o| o.child_name == "A"));

        // Child B is untouched and still eligible.
        let remaining = pipeline.run_for_child(child_b, date(2026, 3, 1)).await;
        assert!(!remaining.is_empty());
    }
}
