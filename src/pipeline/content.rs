//! Reminder text generation via the Minimax chat-completion API, with a
//! deterministic per-language template fallback.
//!
//! The fallback is total: whatever the external service does (absent
//! credential, transport error, provider error, empty body), the caller
//! always gets non-empty text, tagged with how it was produced.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::language::Language;

/// Why the template was used instead of the generated text.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    /// No API key configured; the call was never attempted.
    NoCredential,
    /// The HTTP request itself failed (connect, timeout, non-2xx).
    Transport(String),
    /// The provider answered with a non-zero status code.
    Provider(String),
    /// The response carried no usable text.
    EmptyResponse,
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCredential => write!(f, "no credential configured"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Provider(e) => write!(f, "provider error: {e}"),
            Self::EmptyResponse => write!(f, "empty response"),
        }
    }
}

/// How the reminder text was produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TextSource {
    Generated,
    Fallback(FallbackReason),
}

/// A reminder sentence plus its provenance, so operators can tell
/// "degraded" from "nominal" without log scraping.
#[derive(Debug, Clone)]
pub struct ReminderText {
    pub text: String,
    pub source: TextSource,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    base_resp: Option<BaseResp>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct BaseResp {
    status_code: i64,
    status_msg: Option<String>,
}

/// Client for the Minimax text-generation API.
pub struct TextGenerator {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl TextGenerator {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        Self { api_key, base_url, model, client }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.minimax_api_key.clone(),
            config.minimax_base_url.clone(),
            config.minimax_model.clone(),
        )
    }

    /// Produce the reminder sentence for one record. Never fails.
    pub async fn reminder_text(
        &self,
        child_name: &str,
        vaccine_name: &str,
        due_date: NaiveDate,
        language: Language,
    ) -> ReminderText {
        let date_text = language.format_date(due_date);

        if self.api_key.is_empty() {
            debug!("Text generation disabled, using {} template", language.code());
            return ReminderText {
                text: fallback_template(language, child_name, vaccine_name, &date_text),
                source: TextSource::Fallback(FallbackReason::NoCredential),
            };
        }

        match self.generate(child_name, vaccine_name, &date_text, language).await {
            Ok(text) => {
                info!("Generated {} reminder for {}", language.code(), child_name);
                ReminderText { text, source: TextSource::Generated }
            }
            Err(reason) => {
                warn!("Text generation failed ({reason}), using {} template", language.code());
                ReminderText {
                    text: fallback_template(language, child_name, vaccine_name, &date_text),
                    source: TextSource::Fallback(reason),
                }
            }
        }
    }

    async fn generate(
        &self,
        child_name: &str,
        vaccine_name: &str,
        date_text: &str,
        language: Language,
    ) -> Result<String, FallbackReason> {
        let prompt = format!(
            "Write a short, polite, friendly reminder for a parent that their child \
             {child_name} needs the vaccine '{vaccine_name}' (due date: {date_text}). \
             One or two sentences only."
        );

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system_instruction(language) },
                ChatMessage { role: "user", content: &prompt },
            ],
        };

        let url = format!(
            "{}/v1/text/chatcompletion_v2",
            self.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| FallbackReason::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FallbackReason::Transport(format!("{status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| FallbackReason::Transport(format!("invalid response body: {e}")))?;

        if let Some(base) = parsed.base_resp
            && base.status_code != 0
        {
            return Err(FallbackReason::Provider(
                base.status_msg.unwrap_or_else(|| format!("status_code {}", base.status_code)),
            ));
        }

        let text = parsed
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
            .map(str::trim)
            .unwrap_or("");

        if text.is_empty() {
            return Err(FallbackReason::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

fn system_instruction(language: Language) -> &'static str {
    match language {
        Language::Ar => {
            "You write very short reminders in Arabic for parents about child vaccines. \
             Do not use any other language."
        }
        Language::Fr => {
            "You write very short reminders in French for parents about child vaccines. \
             Do not use any other language."
        }
        Language::En => "You write very short reminders in English for parents about child vaccines.",
    }
}

/// Fixed, fully formed template per language. Guaranteed non-empty.
pub fn fallback_template(
    language: Language,
    child_name: &str,
    vaccine_name: &str,
    date_text: &str,
) -> String {
    match language {
        Language::Ar => format!(
            "تذكير: طفلكم {child_name} يحتاج إلى لقاح {vaccine_name} بتاريخ {date_text}. شكرا لكم."
        ),
        Language::Fr => format!(
            "Rappel : votre enfant {child_name} doit recevoir le vaccin {vaccine_name} le {date_text}. Merci."
        ),
        Language::En => format!(
            "Reminder: your child {child_name} is due for the {vaccine_name} vaccine on {date_text}. Thank you."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn no_credential_generator() -> TextGenerator {
        TextGenerator::new(String::new(), "https://api.minimax.io".into(), "M2-her".into())
    }

    #[tokio::test]
    async fn test_no_credential_falls_back_immediately() {
        let generator = no_credential_generator();
        let result = generator
            .reminder_text("Yassine", "Penta-1", date(2026, 2, 26), Language::Fr)
            .await;
        assert_eq!(result.source, TextSource::Fallback(FallbackReason::NoCredential));
        assert!(result.text.contains("Yassine"));
        assert!(result.text.contains("Penta-1"));
        assert!(result.text.contains("26 février 2026"));
    }

    #[tokio::test]
    async fn test_arabic_fallback_is_arabic() {
        let generator = no_credential_generator();
        let result = generator
            .reminder_text("آدم", "BCG", date(2026, 1, 14), Language::Ar)
            .await;
        assert!(result.text.contains("تذكير"));
        assert!(result.text.contains("14 يناير 2026"));
    }

    #[test]
    fn test_fallback_templates_never_empty() {
        for language in Language::ALL {
            let text = fallback_template(language, "A", "HB1", "1 x 2026");
            assert!(!text.is_empty());
            assert!(text.contains("HB1"));
        }
    }

    #[tokio::test]
    async fn test_transport_failure_falls_back() {
        // Port 9 on localhost refuses connections; the transport error must
        // collapse to the template, never an error.
        let generator = TextGenerator::new(
            "key".into(),
            "http://127.0.0.1:9".into(),
            "M2-her".into(),
        );
        let result = generator
            .reminder_text("Nour", "VPO-1", date(2026, 3, 1), Language::En)
            .await;
        assert!(matches!(result.source, TextSource::Fallback(FallbackReason::Transport(_))));
        assert!(result.text.contains("Nour"));
    }
}
