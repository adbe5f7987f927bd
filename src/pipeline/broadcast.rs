//! Regional Telegram broadcasts of coverage signals, with an append-only
//! audit log.
//!
//! Broadcasts run strictly sequentially with a configurable pause between
//! sends. Regions without a usable chat id are reported as skipped and
//! produce no audit row.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use teloxide::prelude::*;
use tracing::{info, warn};

use crate::db::Database;
use crate::language::Language;
use crate::pipeline::coverage::RegionCoverage;

/// Tone of the broadcast message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStyle {
    /// Neutral coverage summary.
    Summary,
    /// Call to action for lagging regions.
    Urgent,
}

impl MessageStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "summary" => Some(Self::Summary),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// Strip everything except digits and the minus sign, then parse.
/// Channel ids arrive hand-entered ("ID: -100123...", with spaces, etc).
pub fn sanitize_chat_id(raw: &str) -> Option<i64> {
    static FILTER: OnceLock<Regex> = OnceLock::new();
    let filter = FILTER.get_or_init(|| Regex::new(r"[^\d-]").unwrap());
    let cleaned = filter.replace_all(raw, "");
    cleaned.parse().ok()
}

/// Render the broadcast text for one region.
pub fn render_message(
    style: MessageStyle,
    language: Language,
    vaccine_name: &str,
    coverage: &RegionCoverage,
) -> String {
    let pct = coverage.coverage_rate * 100.0;
    let region = &coverage.region_name;

    match (style, language) {
        (MessageStyle::Summary, Language::Fr) => format!(
            "📊 Couverture vaccinale — {region}\n\
             Vaccin {vaccine_name} : {pct:.1}% des enfants enregistrés ({}/{}).\n\
             Pensez à vérifier le carnet de vaccination de votre enfant.",
            coverage.vaccinated, coverage.registered_children
        ),
        (MessageStyle::Summary, Language::Ar) => format!(
            "📊 التغطية اللقاحية — {region}\n\
             لقاح {vaccine_name}: {pct:.1}% من الأطفال المسجلين ({}/{}).\n\
             المرجو التحقق من دفتر تلقيح طفلكم.",
            coverage.vaccinated, coverage.registered_children
        ),
        (MessageStyle::Summary, Language::En) => format!(
            "📊 Vaccination coverage — {region}\n\
             {vaccine_name}: {pct:.1}% of registered children ({}/{}).\n\
             Please check your child's vaccination record.",
            coverage.vaccinated, coverage.registered_children
        ),
        (MessageStyle::Urgent, Language::Fr) => format!(
            "⚠️ Rappel important — {region}\n\
             La couverture du vaccin {vaccine_name} n'est que de {pct:.1}%.\n\
             Si votre enfant n'a pas encore reçu ce vaccin, rendez-vous au \
             centre de santé le plus proche."
        ),
        (MessageStyle::Urgent, Language::Ar) => format!(
            "⚠️ تذكير مهم — {region}\n\
             نسبة التغطية بلقاح {vaccine_name} لا تتجاوز {pct:.1}%.\n\
             إذا لم يتلق طفلكم هذا اللقاح بعد، المرجو التوجه إلى أقرب مركز صحي."
        ),
        (MessageStyle::Urgent, Language::En) => format!(
            "⚠️ Important reminder — {region}\n\
             Coverage for {vaccine_name} is only {pct:.1}%.\n\
             If your child has not received this vaccine yet, please visit \
             the nearest health center."
        ),
    }
}

/// Result for one region of a broadcast run.
#[derive(Debug)]
pub struct BroadcastResult {
    pub region_id: i64,
    pub region_name: String,
    pub sent: bool,
    /// Reason a region was skipped or failed, for the caller's report.
    pub detail: Option<String>,
}

/// Preview of what a broadcast would send, without sending.
#[derive(Debug)]
pub struct BroadcastPreview {
    pub region_id: i64,
    pub region_name: String,
    pub sendable: bool,
    pub text: String,
}

/// Telegram broadcast client wrapping a bot.
pub struct BroadcastClient {
    bot: Bot,
    delay: Duration,
}

impl BroadcastClient {
    pub fn new(token: &str, delay_ms: u64) -> Self {
        Self { bot: Bot::new(token), delay: Duration::from_millis(delay_ms) }
    }

    /// Render per-region messages without sending anything.
    pub fn preview(
        &self,
        db: &Database,
        vaccine_name: &str,
        style: MessageStyle,
        language: Language,
        report: &[RegionCoverage],
    ) -> Vec<BroadcastPreview> {
        report
            .iter()
            .map(|cov| {
                let sendable = db
                    .region(cov.region_id)
                    .and_then(|r| r.telegram_chat_id)
                    .as_deref()
                    .and_then(sanitize_chat_id)
                    .is_some();
                BroadcastPreview {
                    region_id: cov.region_id,
                    region_name: cov.region_name.clone(),
                    sendable,
                    text: render_message(style, language, vaccine_name, cov),
                }
            })
            .collect()
    }

    /// Send the coverage signal to every region with a configured chat.
    /// Sequential on purpose, with a pause between sends, so a run over
    /// all regions never trips Telegram's rate limits.
    pub async fn broadcast(
        &self,
        db: &Database,
        vaccine_name: &str,
        style: MessageStyle,
        language: Language,
        report: &[RegionCoverage],
    ) -> Vec<BroadcastResult> {
        let mut results = Vec::with_capacity(report.len());
        let mut first = true;

        for cov in report {
            let chat_id = db
                .region(cov.region_id)
                .and_then(|r| r.telegram_chat_id)
                .as_deref()
                .and_then(sanitize_chat_id);

            let Some(chat_id) = chat_id else {
                // No audit row: nothing was attempted against Telegram.
                results.push(BroadcastResult {
                    region_id: cov.region_id,
                    region_name: cov.region_name.clone(),
                    sent: false,
                    detail: Some("no usable telegram chat id".to_string()),
                });
                continue;
            };

            if !first {
                tokio::time::sleep(self.delay).await;
            }
            first = false;

            let text = render_message(style, language, vaccine_name, cov);
            match self.bot.send_message(ChatId(chat_id), text.as_str()).await {
                Ok(message) => {
                    info!("Broadcast sent to region {} (chat {chat_id})", cov.region_name);
                    let payload = serde_json::to_string(&message).unwrap_or_default();
                    db.log_broadcast(cov.region_id, vaccine_name, &text, true, &payload);
                    results.push(BroadcastResult {
                        region_id: cov.region_id,
                        region_name: cov.region_name.clone(),
                        sent: true,
                        detail: None,
                    });
                }
                Err(e) => {
                    warn!("Broadcast to region {} failed: {e}", cov.region_name);
                    db.log_broadcast(cov.region_id, vaccine_name, &text, false, &e.to_string());
                    results.push(BroadcastResult {
                        region_id: cov.region_id,
                        region_name: cov.region_name.clone(),
                        sent: false,
                        detail: Some(e.to_string()),
                    });
                }
            }
        }

        let sent = results.iter().filter(|r| r.sent).count();
        info!("Broadcast finished: {sent}/{} region(s) reached", results.len());
        results
    }
}
