//! Voice synthesis via ElevenLabs and the on-disk audio store.
//!
//! Voice is an enhancement: disabled configuration or a failed synthesis
//! yields "no audio", never an error for the record being processed.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::language::Language;

const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// Client for the ElevenLabs speech-synthesis API.
pub struct VoiceSynthesizer {
    enabled: bool,
    api_key: String,
    voices: HashMap<Language, String>,
    default_voice: String,
    client: reqwest::Client,
}

impl VoiceSynthesizer {
    pub fn new(
        enabled: bool,
        api_key: String,
        voices: HashMap<Language, String>,
        default_voice: String,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        Self { enabled, api_key, voices, default_voice, client }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.voice_enabled(),
            config.elevenlabs_api_key.clone(),
            config.voice_ids.clone(),
            config.default_voice_id.clone(),
        )
    }

    /// Voice identity for a language: explicit mapping or the global default.
    fn voice_id(&self, language: Language) -> &str {
        self.voices
            .get(&language)
            .map(String::as_str)
            .unwrap_or(&self.default_voice)
    }

    /// Synthesize MP3 audio for the reminder text. Returns None when voice
    /// is disabled or the service fails; the reminder proceeds without audio.
    pub async fn synthesize(&self, text: &str, language: Language) -> Option<Vec<u8>> {
        if !self.enabled || self.api_key.is_empty() {
            debug!("Voice synthesis disabled, skipping");
            return None;
        }

        let voice_id = self.voice_id(language);
        let url = format!("{}/{}", ELEVENLABS_API_URL, voice_id);

        let response = match self
            .client
            .post(&url)
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Voice synthesis request failed: {e}");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Voice synthesis error {}", response.status());
            return None;
        }

        match response.bytes().await {
            Ok(bytes) => {
                info!("Synthesized {} bytes of audio (voice {})", bytes.len(), voice_id);
                Some(bytes.to_vec())
            }
            Err(e) => {
                warn!("Failed to read audio response: {e}");
                None
            }
        }
    }
}

/// Outcome of an audio lookup.
#[derive(Debug)]
pub enum AudioError {
    /// No audio reference for the record, or the file is gone.
    NotFound,
    Io(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "reminder audio not found"),
            Self::Io(e) => write!(f, "audio store error: {e}"),
        }
    }
}

impl std::error::Error for AudioError {}

/// On-disk store for generated reminder audio, created on demand.
pub struct AudioStore {
    root: PathBuf,
}

impl AudioStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Persist audio for a record. The name is deterministic in the record
    /// id and the date, so reruns on different days never collide while a
    /// same-day rerun overwrites (a sent record is not reprocessed anyway).
    pub fn save(&self, vaccination_id: i64, on: NaiveDate, audio: &[u8]) -> Result<String, String> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| format!("Failed to create media dir {:?}: {e}", self.root))?;
        let name = format!("vac_{}_{}.mp3", vaccination_id, on.format("%Y%m%d"));
        std::fs::write(self.root.join(&name), audio)
            .map_err(|e| format!("Failed to write audio {name}: {e}"))?;
        Ok(name)
    }

    /// Read stored audio by its file name.
    pub fn load(&self, name: &str) -> Result<Vec<u8>, AudioError> {
        let path = self.root.join(name);
        if !path.exists() {
            return Err(AudioError::NotFound);
        }
        std::fs::read(&path).map_err(|e| AudioError::Io(e.to_string()))
    }

    /// Best-effort removal of a stored file.
    pub fn delete(&self, name: &str) {
        let path = self.root.join(name);
        if let Err(e) = std::fs::remove_file(&path)
            && path.exists()
        {
            warn!("Failed to delete audio {name}: {e}");
        }
    }
}

/// Retrieve the stored reminder audio for a record, for playback surfaces.
pub fn reminder_audio(
    db: &Database,
    store: &AudioStore,
    vaccination_id: i64,
) -> Result<Vec<u8>, AudioError> {
    let name = db.audio_reference(vaccination_id).ok_or(AudioError::NotFound)?;
    store.load(&name)
}

/// Delete a parent's voice notification: clears the audio reference and
/// removes the underlying file. The record itself is kept.
pub fn delete_notification(
    db: &Database,
    store: &AudioStore,
    vaccination_id: i64,
    parent_id: i64,
) -> Result<(), AudioError> {
    let notification = db
        .voice_notification(vaccination_id, parent_id)
        .ok_or(AudioError::NotFound)?;
    store.delete(&notification.audio_path);
    db.clear_audio_reference(vaccination_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_save_and_load_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::new(dir.path().join("media"));
        let audio = vec![0x49u8, 0x44, 0x33, 0x04, 0x00];

        let name = store.save(42, date(2026, 1, 14), &audio).unwrap();
        assert_eq!(name, "vac_42_20260114.mp3");
        assert_eq!(store.load(&name).unwrap(), audio);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::new(dir.path().to_path_buf());
        assert!(matches!(store.load("vac_1_20260101.mp3"), Err(AudioError::NotFound)));
    }

    #[test]
    fn test_names_differ_across_days() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::new(dir.path().to_path_buf());
        let a = store.save(1, date(2026, 1, 1), b"a").unwrap();
        let b = store.save(1, date(2026, 1, 2), b"b").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.load(&a).unwrap(), b"a");
        assert_eq!(store.load(&b).unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_disabled_synthesizer_skips() {
        let synth = VoiceSynthesizer::new(false, "key".into(), HashMap::new(), "v".into());
        assert!(synth.synthesize("hello", Language::Fr).await.is_none());

        let synth = VoiceSynthesizer::new(true, String::new(), HashMap::new(), "v".into());
        assert!(synth.synthesize("hello", Language::Fr).await.is_none());
    }

    #[test]
    fn test_voice_id_mapping_with_default() {
        let mut voices = HashMap::new();
        voices.insert(Language::Ar, "arabic-voice".to_string());
        let synth = VoiceSynthesizer::new(true, "k".into(), voices, "default-voice".into());
        assert_eq!(synth.voice_id(Language::Ar), "arabic-voice");
        assert_eq!(synth.voice_id(Language::En), "default-voice");
    }

    #[test]
    fn test_reminder_audio_and_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let store = AudioStore::new(dir.path().to_path_buf());
        let db = Database::new();
        let parent = db.add_parent("Parent", None, None, None, None);
        let child = db.register_child(parent, "A", date(2026, 1, 1), None);
        let record = db.add_vaccination(child, "HB1", "", "Naissance", Some(date(2026, 1, 1)));

        // No reference yet.
        assert!(matches!(reminder_audio(&db, &store, record), Err(AudioError::NotFound)));

        let name = store.save(record, date(2026, 1, 1), b"mp3-bytes").unwrap();
        db.mark_reminder_sent(record, Some(&name), "skipped", "skipped").unwrap();
        assert_eq!(reminder_audio(&db, &store, record).unwrap(), b"mp3-bytes");

        // Only the owning parent may delete.
        let stranger = db.add_parent("Stranger", None, None, None, None);
        assert!(delete_notification(&db, &store, record, stranger).is_err());

        delete_notification(&db, &store, record, parent).unwrap();
        assert!(db.audio_reference(record).is_none());
        assert!(matches!(store.load(&name), Err(AudioError::NotFound)));
    }
}
