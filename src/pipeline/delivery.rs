//! Reminder delivery channels: SMTP email with optional audio attachment,
//! and Twilio SMS.
//!
//! Every channel resolves to an outcome rather than an error: a failed
//! send never aborts the batch, it is recorded against the record.

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info, warn};

use crate::config::Config;

const TWILIO_API_URL: &str = "https://api.twilio.com/2010-04-01/Accounts";

/// Per-channel result persisted to the send-state ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Failed,
    /// Channel not configured, or the recipient has no address for it.
    Skipped,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// SMTP mailer. Holds a pooled transport when configured.
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
}

impl Mailer {
    pub fn from_config(config: &Config) -> Self {
        let transport = if config.email_enabled() {
            match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host) {
                Ok(builder) => Some(
                    builder
                        .port(config.smtp_port)
                        .credentials(Credentials::new(
                            config.smtp_user.clone(),
                            config.smtp_password.clone(),
                        ))
                        .build(),
                ),
                Err(e) => {
                    warn!("Invalid SMTP relay {}: {e}", config.smtp_host);
                    None
                }
            }
        } else {
            None
        };
        let from = config
            .smtp_from
            .clone()
            .unwrap_or_else(|| config.smtp_user.clone());
        Self { transport, from }
    }

    /// Send a reminder email, attaching the voice message when present.
    pub async fn send_reminder(
        &self,
        to: Option<&str>,
        child_name: &str,
        vaccine_name: &str,
        body: &str,
        audio: Option<&[u8]>,
    ) -> DeliveryOutcome {
        let Some(transport) = &self.transport else {
            debug!("Email channel disabled, skipping");
            return DeliveryOutcome::Skipped;
        };
        let Some(to) = to else {
            debug!("No email address on record, skipping");
            return DeliveryOutcome::Skipped;
        };

        let (from, to) = match (self.from.parse::<Mailbox>(), to.parse::<Mailbox>()) {
            (Ok(f), Ok(t)) => (f, t),
            _ => {
                warn!("Unparseable email address, marking failed");
                return DeliveryOutcome::Failed;
            }
        };

        let subject = format!("Rappel vaccin: {vaccine_name} pour {child_name}");
        let text = SinglePart::plain(body.to_string());

        let message = match audio {
            Some(bytes) => {
                let filename = format!("rappel_{vaccine_name}_{child_name}.mp3").replace(' ', "_");
                let attachment = Attachment::new(filename)
                    .body(bytes.to_vec(), ContentType::parse("audio/mpeg").unwrap_or(ContentType::TEXT_PLAIN));
                Message::builder()
                    .from(from)
                    .to(to)
                    .subject(subject)
                    .multipart(MultiPart::mixed().singlepart(text).singlepart(attachment))
            }
            None => Message::builder().from(from).to(to).subject(subject).singlepart(text),
        };

        let message = match message {
            Ok(m) => m,
            Err(e) => {
                warn!("Failed to build email: {e}");
                return DeliveryOutcome::Failed;
            }
        };

        match transport.send(message).await {
            Ok(_) => {
                info!("Reminder email sent for {child_name} / {vaccine_name}");
                DeliveryOutcome::Sent
            }
            Err(e) => {
                warn!("Email send failed for {child_name} / {vaccine_name}: {e}");
                DeliveryOutcome::Failed
            }
        }
    }
}

/// Twilio SMS client.
pub struct SmsSender {
    enabled: bool,
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: reqwest::Client,
}

impl SmsSender {
    pub fn from_config(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            enabled: config.sms_enabled(),
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            from_number: config.twilio_phone_number.clone(),
            client,
        }
    }

    pub async fn send_reminder(&self, to: Option<&str>, body: &str) -> DeliveryOutcome {
        if !self.enabled {
            debug!("SMS channel disabled, skipping");
            return DeliveryOutcome::Skipped;
        }
        let Some(to) = to else {
            debug!("No phone number on record, skipping");
            return DeliveryOutcome::Skipped;
        };

        let url = format!("{}/{}/Messages.json", TWILIO_API_URL, self.account_sid);
        let params = [("From", self.from_number.as_str()), ("To", to), ("Body", body)];

        let response = match self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("SMS request failed: {e}");
                return DeliveryOutcome::Failed;
            }
        };

        if response.status().is_success() {
            info!("Reminder SMS sent to {to}");
            DeliveryOutcome::Sent
        } else {
            warn!("SMS send rejected with {}", response.status());
            DeliveryOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_config() -> Config {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, format!("{{\"data_dir\": {:?}}}", dir.path().join("data"))).unwrap();
        Config::load(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_outcome_strings() {
        assert_eq!(DeliveryOutcome::Sent.as_str(), "sent");
        assert_eq!(DeliveryOutcome::Failed.as_str(), "failed");
        assert_eq!(DeliveryOutcome::Skipped.as_str(), "skipped");
    }

    #[tokio::test]
    async fn test_disabled_email_skips() {
        let mailer = Mailer::from_config(&disabled_config());
        let outcome = mailer
            .send_reminder(Some("parent@example.com"), "Amine", "BCG", "body", None)
            .await;
        assert_eq!(outcome, DeliveryOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_missing_recipient_skips() {
        let sms = SmsSender::from_config(&disabled_config());
        assert_eq!(sms.send_reminder(None, "body").await, DeliveryOutcome::Skipped);
        assert_eq!(sms.send_reminder(Some("+212600000000"), "body").await, DeliveryOutcome::Skipped);
    }
}
