use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::config::MailConfig;

/// A password reset message. `link` embeds the plaintext secret and exists only in memory
/// on its way to the delivery service.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetMail {
    pub to: String,
    pub username: String,
    pub secret: String,
    pub link: String,
}

// 1. Mailer Contract
/// Mailer
///
/// The external delivery collaborator for reset secrets. Swapping the implementation
/// (HTTP API in production, log-only locally, recording in tests) never touches the reset
/// flow itself.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_reset(&self, mail: ResetMail) -> Result<(), String>;
}

/// MailerState
///
/// The concrete type used to share the mailer across the application state.
pub type MailerState = Arc<dyn Mailer>;

#[derive(Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: String,
}

// 2. The Real Implementation (transactional mail HTTP API)
/// HttpMailer
///
/// Posts a JSON message to `MAIL_API_URL`, authenticating with `MAIL_API_KEY` as a bearer
/// token when one is configured.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(api_url: &str, api_key: Option<String>, from: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.to_string(),
            api_key,
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_reset(&self, mail: ResetMail) -> Result<(), String> {
        let body = OutgoingMail {
            from: &self.from,
            to: &mail.to,
            subject: "Reset your password",
            text: format!(
                "Hi {},\n\nUse the link below to choose a new password. It works once and expires soon.\n\n{}\n\nIf you did not ask for this, ignore this email.",
                mail.username, mail.link
            ),
        };

        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("mail API responded with {}", response.status()));
        }
        Ok(())
    }
}

// 3. Local Implementation
/// LogMailer
///
/// Used when no mail API is configured in local mode. Records that a mail would have been
/// sent, never its secret.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_reset(&self, mail: ResetMail) -> Result<(), String> {
        tracing::info!(to = %mail.to, "reset mail not delivered: no MAIL_API_URL configured");
        Ok(())
    }
}

// 4. The Recording Implementation (For Tests)
/// RecordingMailer
///
/// Keeps every message in memory so tests can read back the plaintext secret the way a
/// user would read it from their inbox.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<ResetMail>>>,
    /// When true, every delivery fails.
    pub should_fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<ResetMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// The secret from the most recent message addressed to `to`.
    pub fn last_secret_for(&self, to: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.to == to)
            .map(|m| m.secret)
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_reset(&self, mail: ResetMail) -> Result<(), String> {
        if self.should_fail {
            return Err("Recording mailer: failure requested".to_string());
        }
        self.sent
            .lock()
            .map_err(|_| "mail log poisoned".to_string())?
            .push(mail);
        Ok(())
    }
}

/// Picks the implementation matching the configuration.
pub fn from_config(config: &MailConfig) -> MailerState {
    match &config.api_url {
        Some(url) => Arc::new(HttpMailer::new(url, config.api_key.clone(), &config.from)),
        None => Arc::new(LogMailer),
    }
}
