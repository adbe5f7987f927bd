use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::language::Language;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    /// Directory for state files (database, media, logs). Defaults to ".".
    data_dir: Option<String>,
    /// Path to the SQLite database. Defaults to <data_dir>/vaccines.db.
    database_path: Option<String>,
    /// Directory for generated reminder audio. Defaults to <data_dir>/reminder_media.
    media_dir: Option<String>,
    /// Rolling window in days for due-date eligibility.
    #[serde(default = "default_reminder_window_days")]
    reminder_window_days: i64,
    /// Interval in minutes for scheduled reminder scans (0 = disabled).
    #[serde(default)]
    scan_interval_minutes: u32,

    /// Minimax API key for reminder text generation (empty = fallback templates only).
    #[serde(default)]
    minimax_api_key: String,
    #[serde(default = "default_minimax_base_url")]
    minimax_base_url: String,
    #[serde(default = "default_minimax_model")]
    minimax_model: String,

    /// ElevenLabs API key for voice synthesis.
    #[serde(default)]
    elevenlabs_api_key: String,
    /// Master switch for voice generation.
    #[serde(default)]
    reminder_send_voice: bool,
    /// Per-language voice overrides, keys "ar" | "fr" | "en".
    #[serde(default)]
    voice_ids: HashMap<String, String>,
    #[serde(default = "default_voice_id")]
    default_voice_id: String,

    #[serde(default)]
    email_reminders_enabled: bool,
    #[serde(default)]
    smtp_host: String,
    #[serde(default = "default_smtp_port")]
    smtp_port: u16,
    #[serde(default)]
    smtp_user: String,
    #[serde(default)]
    smtp_password: String,
    smtp_from: Option<String>,

    #[serde(default)]
    twilio_sms_enabled: bool,
    #[serde(default)]
    twilio_account_sid: String,
    #[serde(default)]
    twilio_auth_token: String,
    #[serde(default)]
    twilio_phone_number: String,

    /// Bot token for regional broadcasts (broadcast disabled if unset).
    telegram_bot_token: Option<String>,
    /// Pause between consecutive broadcast sends, to respect rate limits.
    #[serde(default = "default_broadcast_delay_ms")]
    broadcast_delay_ms: u64,
}

fn default_reminder_window_days() -> i64 {
    7
}

fn default_minimax_base_url() -> String {
    "https://api.minimax.io".to_string()
}

fn default_minimax_model() -> String {
    "M2-her".to_string()
}

fn default_voice_id() -> String {
    // ElevenLabs "Rachel", the stock multilingual voice.
    "21m00Tcm4TlvDq8ikWAM".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_broadcast_delay_ms() -> u64 {
    500
}

pub struct Config {
    /// Directory for state files (database, media, logs).
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub media_dir: PathBuf,
    pub reminder_window_days: i64,
    /// Interval in minutes for scheduled reminder scans (0 = disabled).
    pub scan_interval_minutes: u32,

    pub minimax_api_key: String,
    pub minimax_base_url: String,
    pub minimax_model: String,

    pub elevenlabs_api_key: String,
    pub reminder_send_voice: bool,
    /// Explicit per-language voice mapping; `default_voice_id` fills the gaps.
    pub voice_ids: HashMap<Language, String>,
    pub default_voice_id: String,

    pub email_reminders_enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    pub smtp_from: Option<String>,

    pub twilio_sms_enabled: bool,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,

    pub telegram_bot_token: Option<String>,
    pub broadcast_delay_ms: u64,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.reminder_window_days < 1 {
            return Err(ConfigError::Validation(
                "reminder_window_days must be at least 1".into(),
            ));
        }

        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        if let Some(ref token) = file.telegram_bot_token {
            let parts: Vec<&str> = token.split(':').collect();
            if parts.len() != 2 || parts[0].parse::<u64>().is_err() || parts[1].is_empty() {
                return Err(ConfigError::Validation(
                    "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
                ));
            }
        }

        // Voice overrides use a closed key set so a typo never silently
        // resolves to "no override".
        let mut voice_ids = HashMap::new();
        for (key, voice) in file.voice_ids {
            let lang = Language::ALL
                .iter()
                .copied()
                .find(|l| l.code() == key.trim().to_lowercase())
                .ok_or_else(|| {
                    ConfigError::Validation(format!(
                        "voice_ids key '{}' is not a supported language (ar/fr/en)",
                        key
                    ))
                })?;
            voice_ids.insert(lang, voice);
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let database_path = file
            .database_path
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("vaccines.db"));
        let media_dir = file
            .media_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("reminder_media"));

        Ok(Self {
            data_dir,
            database_path,
            media_dir,
            reminder_window_days: file.reminder_window_days,
            scan_interval_minutes: file.scan_interval_minutes,
            minimax_api_key: file.minimax_api_key,
            minimax_base_url: file.minimax_base_url,
            minimax_model: file.minimax_model,
            elevenlabs_api_key: file.elevenlabs_api_key,
            reminder_send_voice: file.reminder_send_voice,
            voice_ids,
            default_voice_id: file.default_voice_id,
            email_reminders_enabled: file.email_reminders_enabled,
            smtp_host: file.smtp_host,
            smtp_port: file.smtp_port,
            smtp_user: file.smtp_user,
            smtp_password: file.smtp_password,
            smtp_from: file.smtp_from,
            twilio_sms_enabled: file.twilio_sms_enabled,
            twilio_account_sid: file.twilio_account_sid,
            twilio_auth_token: file.twilio_auth_token,
            twilio_phone_number: file.twilio_phone_number,
            telegram_bot_token: file.telegram_bot_token,
            broadcast_delay_ms: file.broadcast_delay_ms,
        })
    }

    pub fn voice_enabled(&self) -> bool {
        self.reminder_send_voice && !self.elevenlabs_api_key.is_empty()
    }

    pub fn email_enabled(&self) -> bool {
        self.email_reminders_enabled && !self.smtp_host.is_empty() && !self.smtp_user.is_empty()
    }

    pub fn sms_enabled(&self) -> bool {
        self.twilio_sms_enabled
            && !self.twilio_account_sid.is_empty()
            && !self.twilio_auth_token.is_empty()
            && !self.twilio_phone_number.is_empty()
    }
}
