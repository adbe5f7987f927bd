//! Persistent SQLite store for the vaccination record keeping and the
//! reminder/broadcast pipeline.
//!
//! Region attribution follows one precedence rule everywhere: the child's
//! own region wins, the parent's region is the fallback. Both the coverage
//! aggregator and the reminder pipeline go through the same SQL fragment so
//! the two can never disagree.

use chrono::{Duration, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::language::Language;

/// Region attribution: child's own region, else the parent's region.
/// Shared by every query that groups children by region.
const REGION_MATCH: &str = "(c.region_id = ?1 OR (c.region_id IS NULL AND p.region_id = ?1))";

/// A vaccination record joined with the contact data the pipeline needs.
#[derive(Debug, Clone)]
pub struct DueVaccination {
    pub id: i64,
    pub child_id: i64,
    pub child_name: String,
    pub vaccine_name: String,
    pub due_date: NaiveDate,
    pub parent_email: Option<String>,
    pub parent_phone: Option<String>,
    pub language: Language,
}

/// Fixed reference row for one region.
#[derive(Debug, Clone)]
pub struct Region {
    pub id: i64,
    pub name: String,
    pub population: i64,
    pub estimated_annual_births: i64,
    pub telegram_chat_id: Option<String>,
}

/// A voice reminder visible to a parent (record with stored audio).
#[derive(Debug, Clone)]
pub struct VoiceNotification {
    pub vaccination_id: i64,
    pub child_id: i64,
    pub child_name: String,
    pub vaccine_name: String,
    pub period_label: String,
    pub due_date: Option<NaiveDate>,
    pub audio_path: String,
}

/// Persisted send-state flags for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct SentState {
    pub reminder_sent: bool,
    pub voice_sent: bool,
    pub audio_path: Option<String>,
    pub email_delivery: Option<String>,
    pub sms_delivery: Option<String>,
}

/// Persistent SQLite store.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create a new in-memory database.
    pub fn new() -> Self {
        let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema();
        db
    }

    /// Create a database at the given path.
    pub fn with_path(path: std::path::PathBuf) -> Self {
        let conn = Connection::open(&path).expect("Failed to open database");
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema();
        db
    }

    /// Open from file, creating schema if needed.
    pub fn load_or_new(path: &Path) -> Self {
        let conn = Connection::open(path).expect("Failed to open database");
        let db = Self { conn: Mutex::new(conn) };
        db.init_schema();

        let (children, records) = db.get_counts();
        info!("Loaded database from {:?} ({} children, {} vaccination records)", path, children, records);

        db
    }

    fn init_schema(&self) {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS regions (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                population INTEGER NOT NULL,
                estimated_annual_births INTEGER NOT NULL,
                telegram_chat_id TEXT
            );

            CREATE TABLE IF NOT EXISTS parents (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT,
                phone_number TEXT,
                preferred_language TEXT,
                region_id INTEGER REFERENCES regions(id)
            );

            CREATE TABLE IF NOT EXISTS children (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER NOT NULL REFERENCES parents(id),
                name TEXT NOT NULL,
                birthdate TEXT NOT NULL,
                region_id INTEGER REFERENCES regions(id)
            );

            CREATE TABLE IF NOT EXISTS vaccine_templates (
                id INTEGER PRIMARY KEY,
                period_label TEXT NOT NULL,
                vaccine_name TEXT NOT NULL,
                vaccine_group TEXT NOT NULL DEFAULT '',
                offset_days INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS child_vaccinations (
                id INTEGER PRIMARY KEY,
                child_id INTEGER NOT NULL REFERENCES children(id),
                vaccine_name TEXT NOT NULL,
                vaccine_group TEXT NOT NULL DEFAULT '',
                period_label TEXT NOT NULL,
                due_date TEXT,
                completed INTEGER NOT NULL DEFAULT 0,
                completed_at TEXT,
                remindable INTEGER NOT NULL DEFAULT 1,
                reminder_sent INTEGER NOT NULL DEFAULT 0,
                voice_sent INTEGER NOT NULL DEFAULT 0,
                reminder_audio_path TEXT,
                email_delivery TEXT,
                sms_delivery TEXT
            );

            CREATE TABLE IF NOT EXISTS national_stock (
                id INTEGER PRIMARY KEY,
                vaccine_name TEXT NOT NULL UNIQUE,
                current_stock INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS coverage_reports (
                id INTEGER PRIMARY KEY,
                vaccine_name TEXT NOT NULL,
                calculated_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS broadcast_logs (
                id INTEGER PRIMARY KEY,
                region_id INTEGER NOT NULL REFERENCES regions(id),
                vaccine_name TEXT NOT NULL,
                text TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                status TEXT NOT NULL,
                response_payload TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_vaccinations_due ON child_vaccinations(due_date, reminder_sent);
            CREATE INDEX IF NOT EXISTS idx_vaccinations_child ON child_vaccinations(child_id);
            CREATE INDEX IF NOT EXISTS idx_vaccinations_name ON child_vaccinations(vaccine_name);
            CREATE INDEX IF NOT EXISTS idx_coverage_reports ON coverage_reports(vaccine_name, calculated_at);
            CREATE INDEX IF NOT EXISTS idx_broadcast_logs_region ON broadcast_logs(region_id);
        "#).expect("Failed to initialize database schema");
    }

    fn get_counts(&self) -> (usize, usize) {
        let conn = self.conn.lock().unwrap();
        let children: i64 = conn
            .query_row("SELECT COUNT(*) FROM children", [], |row| row.get(0))
            .unwrap_or(0);
        let records: i64 = conn
            .query_row("SELECT COUNT(*) FROM child_vaccinations", [], |row| row.get(0))
            .unwrap_or(0);
        (children as usize, records as usize)
    }

    fn now_text() -> String {
        Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    // ==================== REFERENCE DATA ====================

    pub fn add_region(&self, name: &str, population: i64, estimated_annual_births: i64) -> i64 {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO regions (name, population, estimated_annual_births) VALUES (?1, ?2, ?3)",
            params![name, population, estimated_annual_births],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to insert region: {e}");
            0
        });
        conn.last_insert_rowid()
    }

    pub fn set_region_chat(&self, region_id: i64, chat_id: Option<&str>) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE regions SET telegram_chat_id = ?2 WHERE id = ?1",
            params![region_id, chat_id],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to update region chat id: {e}");
            0
        });
    }

    pub fn region_count(&self) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM regions", [], |row| row.get::<_, i64>(0))
            .unwrap_or(0) as usize
    }

    pub fn regions(&self) -> Vec<Region> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT id, name, population, estimated_annual_births, telegram_chat_id FROM regions ORDER BY id")
            .unwrap();
        let rows = stmt
            .query_map([], |row| {
                Ok(Region {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    population: row.get(2)?,
                    estimated_annual_births: row.get(3)?,
                    telegram_chat_id: row.get(4)?,
                })
            })
            .unwrap();
        rows.flatten().collect()
    }

    pub fn region(&self, region_id: i64) -> Option<Region> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, population, estimated_annual_births, telegram_chat_id FROM regions WHERE id = ?1",
            params![region_id],
            |row| {
                Ok(Region {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    population: row.get(2)?,
                    estimated_annual_births: row.get(3)?,
                    telegram_chat_id: row.get(4)?,
                })
            },
        )
        .optional()
        .unwrap_or(None)
    }

    pub fn add_vaccine_template(
        &self,
        period_label: &str,
        vaccine_name: &str,
        vaccine_group: &str,
        offset_days: i64,
    ) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO vaccine_templates (period_label, vaccine_name, vaccine_group, offset_days) VALUES (?1, ?2, ?3, ?4)",
            params![period_label, vaccine_name, vaccine_group, offset_days],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to insert vaccine template: {e}");
            0
        });
    }

    pub fn template_count(&self) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM vaccine_templates", [], |row| row.get::<_, i64>(0))
            .unwrap_or(0) as usize
    }

    pub fn vaccine_exists(&self, vaccine_name: &str) -> bool {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT 1 FROM vaccine_templates WHERE vaccine_name = ?1 LIMIT 1",
            params![vaccine_name],
            |_| Ok(()),
        )
        .optional()
        .unwrap_or(None)
        .is_some()
    }

    pub fn distinct_vaccines(&self) -> Vec<String> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT DISTINCT vaccine_name FROM vaccine_templates ORDER BY vaccine_name")
            .unwrap();
        let rows = stmt.query_map([], |row| row.get::<_, String>(0)).unwrap();
        rows.flatten().collect()
    }

    // ==================== STOCK ====================

    /// Ensure one stock row per vaccine exists (0 on-hand). Returns rows inserted.
    pub fn ensure_stock_row(&self, vaccine_name: &str) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO national_stock (vaccine_name, current_stock, updated_at) VALUES (?1, 0, ?2)",
            params![vaccine_name, Self::now_text()],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to insert stock row: {e}");
            0
        })
    }

    pub fn set_stock(&self, vaccine_name: &str, current_stock: i64) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO national_stock (vaccine_name, current_stock, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(vaccine_name) DO UPDATE SET current_stock = ?2, updated_at = ?3",
            params![vaccine_name, current_stock, Self::now_text()],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to set stock: {e}");
            0
        });
    }

    /// National on-hand quantity; None when no stock row exists (data-quality flag).
    pub fn stock(&self, vaccine_name: &str) -> Option<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT current_stock FROM national_stock WHERE vaccine_name = ?1",
            params![vaccine_name],
            |row| row.get(0),
        )
        .optional()
        .unwrap_or(None)
    }

    // ==================== FAMILIES & RECORDS ====================

    pub fn add_parent(
        &self,
        name: &str,
        email: Option<&str>,
        phone_number: Option<&str>,
        preferred_language: Option<&str>,
        region_id: Option<i64>,
    ) -> i64 {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO parents (name, email, phone_number, preferred_language, region_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, email, phone_number, preferred_language, region_id],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to insert parent: {e}");
            0
        });
        conn.last_insert_rowid()
    }

    /// Register a child and bulk-create one vaccination row per schedule
    /// template, due date = birthdate + template offset.
    pub fn register_child(
        &self,
        parent_id: i64,
        name: &str,
        birthdate: NaiveDate,
        region_id: Option<i64>,
    ) -> i64 {
        let child_id = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO children (parent_id, name, birthdate, region_id) VALUES (?1, ?2, ?3, ?4)",
                params![parent_id, name, birthdate.to_string(), region_id],
            )
            .unwrap_or_else(|e| {
                warn!("Failed to insert child: {e}");
                0
            });
            conn.last_insert_rowid()
        };

        let templates: Vec<(String, String, String, i64)> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn
                .prepare("SELECT period_label, vaccine_name, vaccine_group, offset_days FROM vaccine_templates ORDER BY offset_days, id")
                .unwrap();
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })
                .unwrap();
            rows.flatten().collect()
        };

        for (period_label, vaccine_name, vaccine_group, offset_days) in templates {
            let due = birthdate + Duration::days(offset_days);
            self.add_vaccination(child_id, &vaccine_name, &vaccine_group, &period_label, Some(due));
        }

        child_id
    }

    /// Insert a single vaccination record.
    pub fn add_vaccination(
        &self,
        child_id: i64,
        vaccine_name: &str,
        vaccine_group: &str,
        period_label: &str,
        due_date: Option<NaiveDate>,
    ) -> i64 {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO child_vaccinations (child_id, vaccine_name, vaccine_group, period_label, due_date) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![child_id, vaccine_name, vaccine_group, period_label, due_date.map(|d| d.to_string())],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to insert vaccination: {e}");
            0
        });
        conn.last_insert_rowid()
    }

    /// Parent marks a dose complete.
    pub fn mark_completed(&self, vaccination_id: i64, completed_at: &str) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE child_vaccinations SET completed = 1, completed_at = ?2 WHERE id = ?1",
            params![vaccination_id, completed_at],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to mark vaccination completed: {e}");
            0
        });
    }

    // ==================== ELIGIBILITY & SEND STATE ====================

    const DUE_SELECT: &'static str =
        "SELECT v.id, v.child_id, c.name, v.vaccine_name, v.due_date,
                p.email, p.phone_number, p.preferred_language
         FROM child_vaccinations v
         JOIN children c ON v.child_id = c.id
         JOIN parents p ON c.parent_id = p.id
         WHERE v.completed = 0 AND v.remindable = 1 AND v.reminder_sent = 0
           AND v.due_date IS NOT NULL AND v.due_date >= ?1 AND v.due_date <= ?2";

    /// Records due within `[from, to]` that have never been reminded.
    pub fn due_vaccinations(&self, from: NaiveDate, to: NaiveDate) -> Vec<DueVaccination> {
        let sql = format!("{} ORDER BY v.due_date, v.id", Self::DUE_SELECT);
        self.query_due(&sql, params![from.to_string(), to.to_string()])
    }

    /// Same window filter, restricted to one child.
    pub fn due_vaccinations_for_child(
        &self,
        child_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<DueVaccination> {
        let sql = format!("{} AND v.child_id = ?3 ORDER BY v.due_date, v.id", Self::DUE_SELECT);
        self.query_due(&sql, params![from.to_string(), to.to_string(), child_id])
    }

    fn query_due(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Vec<DueVaccination> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql).unwrap();
        let rows = stmt
            .query_map(args, |row| {
                let due: String = row.get(4)?;
                Ok(DueVaccination {
                    id: row.get(0)?,
                    child_id: row.get(1)?,
                    child_name: row.get(2)?,
                    vaccine_name: row.get(3)?,
                    due_date: due.parse().unwrap_or_default(),
                    parent_email: row.get(5)?,
                    parent_phone: row.get(6)?,
                    language: Language::parse(row.get::<_, Option<String>>(7)?.as_deref()),
                })
            })
            .unwrap();
        rows.flatten().collect()
    }

    /// Commit the send-state ledger for one record. `reminder_sent` is set
    /// unconditionally; `voice_sent` follows directly from the presence of an
    /// audio reference so the two can never disagree.
    pub fn mark_reminder_sent(
        &self,
        vaccination_id: i64,
        audio_path: Option<&str>,
        email_delivery: &str,
        sms_delivery: &str,
    ) -> Result<(), String> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE child_vaccinations
             SET reminder_sent = 1, voice_sent = ?2, reminder_audio_path = ?3,
                 email_delivery = ?4, sms_delivery = ?5
             WHERE id = ?1",
            params![vaccination_id, audio_path.is_some(), audio_path, email_delivery, sms_delivery],
        )
        .map_err(|e| format!("Failed to commit send state for record {vaccination_id}: {e}"))?;
        Ok(())
    }

    pub fn sent_state(&self, vaccination_id: i64) -> Option<SentState> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT reminder_sent, voice_sent, reminder_audio_path, email_delivery, sms_delivery
             FROM child_vaccinations WHERE id = ?1",
            params![vaccination_id],
            |row| {
                Ok(SentState {
                    reminder_sent: row.get(0)?,
                    voice_sent: row.get(1)?,
                    audio_path: row.get(2)?,
                    email_delivery: row.get(3)?,
                    sms_delivery: row.get(4)?,
                })
            },
        )
        .optional()
        .unwrap_or(None)
    }

    // ==================== AUDIO & NOTIFICATIONS ====================

    pub fn audio_reference(&self, vaccination_id: i64) -> Option<String> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT reminder_audio_path FROM child_vaccinations WHERE id = ?1",
            params![vaccination_id],
            |row| row.get(0),
        )
        .optional()
        .unwrap_or(None)
        .flatten()
    }

    pub fn clear_audio_reference(&self, vaccination_id: i64) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE child_vaccinations SET reminder_audio_path = NULL WHERE id = ?1",
            params![vaccination_id],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to clear audio reference: {e}");
            0
        });
    }

    /// Voice reminders for a parent's children, newest first.
    pub fn voice_notifications(&self, parent_id: i64, limit: usize) -> Vec<VoiceNotification> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT v.id, v.child_id, c.name, v.vaccine_name, v.period_label, v.due_date, v.reminder_audio_path
                 FROM child_vaccinations v
                 JOIN children c ON v.child_id = c.id
                 WHERE c.parent_id = ?1 AND v.reminder_audio_path IS NOT NULL
                 ORDER BY v.id DESC LIMIT ?2",
            )
            .unwrap();
        let rows = stmt
            .query_map(params![parent_id, limit as i64], |row| {
                Ok(VoiceNotification {
                    vaccination_id: row.get(0)?,
                    child_id: row.get(1)?,
                    child_name: row.get(2)?,
                    vaccine_name: row.get(3)?,
                    period_label: row.get(4)?,
                    due_date: row.get::<_, Option<String>>(5)?.and_then(|d| d.parse().ok()),
                    audio_path: row.get(6)?,
                })
            })
            .unwrap();
        rows.flatten().collect()
    }

    /// A parent's voice notification for one record; None if the record does
    /// not belong to the parent or carries no audio.
    pub fn voice_notification(&self, vaccination_id: i64, parent_id: i64) -> Option<VoiceNotification> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT v.id, v.child_id, c.name, v.vaccine_name, v.period_label, v.due_date, v.reminder_audio_path
             FROM child_vaccinations v
             JOIN children c ON v.child_id = c.id
             WHERE v.id = ?1 AND c.parent_id = ?2 AND v.reminder_audio_path IS NOT NULL",
            params![vaccination_id, parent_id],
            |row| {
                Ok(VoiceNotification {
                    vaccination_id: row.get(0)?,
                    child_id: row.get(1)?,
                    child_name: row.get(2)?,
                    vaccine_name: row.get(3)?,
                    period_label: row.get(4)?,
                    due_date: row.get::<_, Option<String>>(5)?.and_then(|d| d.parse().ok()),
                    audio_path: row.get(6)?,
                })
            },
        )
        .optional()
        .unwrap_or(None)
    }

    // ==================== COVERAGE AGGREGATION ====================

    /// Children attributable to a region (child's region, else parent's).
    pub fn registered_children(&self, region_id: i64) -> i64 {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT COUNT(*) FROM children c LEFT JOIN parents p ON c.parent_id = p.id WHERE {}",
            REGION_MATCH
        );
        conn.query_row(&sql, params![region_id], |row| row.get(0))
            .unwrap_or(0)
    }

    /// Completed doses of a vaccine among a region's children, optionally
    /// bounded by completion date (inclusive, whole days).
    pub fn vaccinated_count(
        &self,
        region_id: i64,
        vaccine_name: &str,
        date_from: Option<NaiveDate>,
        date_to: Option<NaiveDate>,
    ) -> i64 {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT COUNT(*) FROM child_vaccinations v
             JOIN children c ON v.child_id = c.id
             LEFT JOIN parents p ON c.parent_id = p.id
             WHERE v.vaccine_name = ?2 AND v.completed = 1 AND {}",
            REGION_MATCH
        );
        if date_from.is_some() {
            sql.push_str(" AND v.completed_at >= ?3");
        }
        if date_to.is_some() {
            sql.push_str(if date_from.is_some() {
                " AND v.completed_at <= ?4"
            } else {
                " AND v.completed_at <= ?3"
            });
        }

        let from_text = date_from.map(|d| format!("{d} 00:00:00"));
        let to_text = date_to.map(|d| format!("{d} 23:59:59"));
        let result = match (&from_text, &to_text) {
            (Some(f), Some(t)) => {
                conn.query_row(&sql, params![region_id, vaccine_name, f, t], |row| row.get(0))
            }
            (Some(f), None) => {
                conn.query_row(&sql, params![region_id, vaccine_name, f], |row| row.get(0))
            }
            (None, Some(t)) => {
                conn.query_row(&sql, params![region_id, vaccine_name, t], |row| row.get(0))
            }
            (None, None) => conn.query_row(&sql, params![region_id, vaccine_name], |row| row.get(0)),
        };
        result.unwrap_or(0)
    }

    // ==================== SNAPSHOTS & AUDIT LOG ====================

    /// Append a coverage snapshot (history is preserved, never overwritten).
    pub fn cache_coverage_snapshot(&self, vaccine_name: &str, payload: &str) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO coverage_reports (vaccine_name, calculated_at, payload) VALUES (?1, ?2, ?3)",
            params![vaccine_name, Self::now_text(), payload],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to cache coverage snapshot: {e}");
            0
        });
    }

    /// Newest snapshot payload for a vaccine, if any.
    pub fn latest_coverage_snapshot(&self, vaccine_name: &str) -> Option<String> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT payload FROM coverage_reports WHERE vaccine_name = ?1
             ORDER BY calculated_at DESC, id DESC LIMIT 1",
            params![vaccine_name],
            |row| row.get(0),
        )
        .optional()
        .unwrap_or(None)
    }

    /// Append one broadcast audit entry. Never mutated or deleted.
    pub fn log_broadcast(
        &self,
        region_id: i64,
        vaccine_name: &str,
        text: &str,
        success: bool,
        response_payload: &str,
    ) {
        let conn = self.conn.lock().unwrap();
        let status = if success { "success" } else { "failure" };
        conn.execute(
            "INSERT INTO broadcast_logs (region_id, vaccine_name, text, sent_at, status, response_payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![region_id, vaccine_name, text, Self::now_text(), status, response_payload],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to log broadcast: {e}");
            0
        });
    }

    pub fn broadcast_log_count(&self, region_id: i64) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM broadcast_logs WHERE region_id = ?1",
            params![region_id],
            |row| row.get::<_, i64>(0),
        )
        .unwrap_or(0) as usize
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seeded_db() -> Database {
        let db = Database::new();
        db.add_vaccine_template("Naissance", "HB1", "Hépatite B (HB)", 0);
        db.add_vaccine_template("8 sem (~2 mois)", "Penta-1", "Pentavalent (DTC-Hib-HB)", 56);
        db
    }

    #[test]
    fn test_register_child_creates_schedule() {
        let db = seeded_db();
        let parent = db.add_parent("Amina", Some("amina@example.com"), None, Some("fr"), None);
        let child = db.register_child(parent, "Yassine", date(2026, 1, 1), None);

        let due = db.due_vaccinations_for_child(child, date(2026, 1, 1), date(2026, 12, 31));
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].vaccine_name, "HB1");
        assert_eq!(due[0].due_date, date(2026, 1, 1));
        assert_eq!(due[1].vaccine_name, "Penta-1");
        assert_eq!(due[1].due_date, date(2026, 2, 26));
    }

    #[test]
    fn test_due_window_excludes_sent_and_completed() {
        let db = seeded_db();
        let parent = db.add_parent("Sara", None, None, None, None);
        let child = db.register_child(parent, "Nour", date(2026, 1, 1), None);

        let due = db.due_vaccinations(date(2026, 1, 1), date(2026, 1, 7));
        assert_eq!(due.len(), 1);
        let record = due[0].id;

        db.mark_reminder_sent(record, None, "skipped", "skipped").unwrap();
        assert!(db.due_vaccinations(date(2026, 1, 1), date(2026, 1, 7)).is_empty());

        // Completed records drop out even before any reminder.
        let extra = db.add_vaccination(child, "BCG", "BCG (Tuberculose)", "Naissance", Some(date(2026, 1, 2)));
        db.mark_completed(extra, "2026-01-02 10:00:00");
        assert!(db.due_vaccinations(date(2026, 1, 1), date(2026, 1, 7)).is_empty());
    }

    #[test]
    fn test_language_falls_back_to_french() {
        let db = seeded_db();
        let parent = db.add_parent("Omar", None, None, Some("zz"), None);
        db.register_child(parent, "Lina", date(2026, 1, 1), None);
        let due = db.due_vaccinations(date(2026, 1, 1), date(2026, 1, 1));
        assert_eq!(due[0].language, Language::Fr);
    }

    #[test]
    fn test_mark_reminder_sent_couples_voice_to_audio() {
        let db = seeded_db();
        let parent = db.add_parent("Khadija", None, None, None, None);
        let child = db.register_child(parent, "Adam", date(2026, 1, 1), None);
        let due = db.due_vaccinations_for_child(child, date(2026, 1, 1), date(2026, 1, 1));
        let record = due[0].id;

        db.mark_reminder_sent(record, Some("vac_1_20260101.mp3"), "sent", "failed").unwrap();
        let state = db.sent_state(record).unwrap();
        assert!(state.reminder_sent);
        assert!(state.voice_sent);
        assert_eq!(state.audio_path.as_deref(), Some("vac_1_20260101.mp3"));
        assert_eq!(state.email_delivery.as_deref(), Some("sent"));
        assert_eq!(state.sms_delivery.as_deref(), Some("failed"));
    }

    #[test]
    fn test_region_attribution_child_overrides_parent() {
        let db = seeded_db();
        let north = db.add_region("North", 1_000_000, 10_000);
        let south = db.add_region("South", 2_000_000, 20_000);

        let parent = db.add_parent("Parent", None, None, None, Some(north));
        // Child without own region counts under the parent's region.
        db.register_child(parent, "A", date(2026, 1, 1), None);
        // Child with own region wins over the parent's.
        db.register_child(parent, "B", date(2026, 1, 1), Some(south));

        assert_eq!(db.registered_children(north), 1);
        assert_eq!(db.registered_children(south), 1);
    }

    #[test]
    fn test_vaccinated_count_with_date_range() {
        let db = seeded_db();
        let region = db.add_region("North", 1_000_000, 10_000);
        let parent = db.add_parent("Parent", None, None, None, Some(region));
        let child = db.register_child(parent, "A", date(2026, 1, 1), None);

        let due = db.due_vaccinations_for_child(child, date(2026, 1, 1), date(2026, 12, 31));
        db.mark_completed(due[0].id, "2026-01-05 09:00:00");
        db.mark_completed(due[1].id, "2026-03-01 09:00:00");

        assert_eq!(db.vaccinated_count(region, "HB1", None, None), 1);
        assert_eq!(db.vaccinated_count(region, "Penta-1", None, None), 1);
        assert_eq!(
            db.vaccinated_count(region, "Penta-1", Some(date(2026, 1, 1)), Some(date(2026, 1, 31))),
            0
        );
        assert_eq!(
            db.vaccinated_count(region, "Penta-1", Some(date(2026, 3, 1)), Some(date(2026, 3, 1))),
            1
        );
    }

    #[test]
    fn test_stock_roundtrip() {
        let db = seeded_db();
        assert_eq!(db.stock("HB1"), None);
        db.ensure_stock_row("HB1");
        assert_eq!(db.stock("HB1"), Some(0));
        db.set_stock("HB1", 50_000);
        assert_eq!(db.stock("HB1"), Some(50_000));
    }

    #[test]
    fn test_coverage_snapshot_newest_first() {
        let db = seeded_db();
        assert!(db.latest_coverage_snapshot("HB1").is_none());
        db.cache_coverage_snapshot("HB1", "[1]");
        db.cache_coverage_snapshot("HB1", "[2]");
        assert_eq!(db.latest_coverage_snapshot("HB1").as_deref(), Some("[2]"));
    }

    #[test]
    fn test_voice_notifications_listing_and_ownership() {
        let db = seeded_db();
        let parent = db.add_parent("Parent", None, None, None, None);
        let other = db.add_parent("Other", None, None, None, None);
        let child = db.register_child(parent, "A", date(2026, 1, 1), None);
        let due = db.due_vaccinations_for_child(child, date(2026, 1, 1), date(2026, 12, 31));
        db.mark_reminder_sent(due[0].id, Some("vac_a.mp3"), "skipped", "skipped").unwrap();

        let list = db.voice_notifications(parent, 50);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].audio_path, "vac_a.mp3");

        assert!(db.voice_notification(due[0].id, parent).is_some());
        assert!(db.voice_notification(due[0].id, other).is_none());

        db.clear_audio_reference(due[0].id);
        assert!(db.voice_notifications(parent, 50).is_empty());
    }

    #[test]
    fn test_broadcast_log_append() {
        let db = seeded_db();
        let region = db.add_region("North", 1, 1);
        assert_eq!(db.broadcast_log_count(region), 0);
        db.log_broadcast(region, "HB1", "hello", true, "{\"ok\":true}");
        db.log_broadcast(region, "HB1", "hello again", false, "{\"ok\":false}");
        assert_eq!(db.broadcast_log_count(region), 2);
    }
}
