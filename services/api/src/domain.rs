//! Interfaces to the backend collaborators the voice tools depend on.
//!
//! The bridge core never owns business logic: knowledge-base search, SMS and
//! staff notifications live behind these traits and are injected into the
//! tool registry at startup. Every implementation must be safe for concurrent
//! use by many simultaneous calls.

use crate::config::TwilioSmsConfig;
use anyhow::{Context, Result, anyhow};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

/// One retrieved knowledge-base passage with its relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KbSource {
    pub title: String,
    pub score: f64,
}

/// Result of a knowledge-base query: assembled context plus the sources it
/// was drawn from, best match first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KbAnswer {
    pub context: String,
    pub sources: Vec<KbSource>,
}

/// Semantic search over the salon's document corpus.
#[async_trait::async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn answer(&self, question: &str, language: &str) -> Result<KbAnswer>;
}

/// Outbound text messages to callers.
#[async_trait::async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<()>;
}

/// Events worth pinging the salon staff about while a call is live.
#[derive(Debug, Clone, PartialEq)]
pub enum StaffEvent {
    TransferRequest {
        caller_name: Option<String>,
        caller_phone: Option<String>,
        reason: Option<String>,
        call_sid: Option<String>,
    },
}

/// Staff-facing notification channel (Slack in production).
#[async_trait::async_trait]
pub trait StaffNotifier: Send + Sync {
    async fn notify(&self, event: StaffEvent) -> Result<()>;
}

/// Posts staff events to a Slack incoming webhook.
pub struct SlackNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl StaffNotifier for SlackNotifier {
    async fn notify(&self, event: StaffEvent) -> Result<()> {
        let StaffEvent::TransferRequest {
            caller_name,
            caller_phone,
            reason,
            call_sid,
        } = event;

        let payload = json!({
            "text": "Caller requested a human",
            "username": "Salon Receptionist",
            "icon_emoji": ":scissors:",
            "attachments": [{
                "color": "#ffc107",
                "fields": [
                    { "title": "Caller", "value": caller_name.unwrap_or_else(|| "Unknown".to_string()), "short": true },
                    { "title": "Phone", "value": caller_phone.unwrap_or_else(|| "Unknown".to_string()), "short": true },
                    { "title": "Reason", "value": reason.unwrap_or_else(|| "unspecified".to_string()), "short": false },
                    { "title": "Call SID", "value": call_sid.unwrap_or_default(), "short": false },
                ],
                "footer": "AI Salon Receptionist",
            }],
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("failed to reach Slack webhook")?;
        if !response.status().is_success() {
            return Err(anyhow!("Slack returned {}", response.status()));
        }
        info!("staff notification sent");
        Ok(())
    }
}

/// Sends SMS through the Twilio Messages API.
pub struct TwilioSms {
    config: TwilioSmsConfig,
    client: reqwest::Client,
}

impl TwilioSms {
    pub fn new(config: TwilioSmsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Normalizes a caller-spoken number to E.164, assuming US when no
    /// country code was given.
    fn format_number(raw: &str) -> Result<String> {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() < 10 {
            return Err(anyhow!("invalid phone number"));
        }
        if digits.len() == 11 && digits.starts_with('1') {
            Ok(format!("+{digits}"))
        } else {
            Ok(format!("+1{digits}"))
        }
    }
}

#[async_trait::async_trait]
impl SmsSender for TwilioSms {
    async fn send(&self, to: &str, body: &str) -> Result<()> {
        let to = Self::format_number(to)?;
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.config.account_sid
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .form(&[
                ("To", to.as_str()),
                ("From", self.config.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .context("failed to reach Twilio Messages API")?;
        if !response.status().is_success() {
            return Err(anyhow!("Twilio returned {}", response.status()));
        }
        info!(%to, "SMS sent");
        Ok(())
    }
}

/// Stand-in used when a collaborator has no credentials configured. Logs the
/// attempt and reports failure so the assistant can recover conversationally.
pub struct Unconfigured {
    what: &'static str,
}

impl Unconfigured {
    pub fn new(what: &'static str) -> Self {
        Self { what }
    }
}

#[async_trait::async_trait]
impl KnowledgeBase for Unconfigured {
    async fn answer(&self, question: &str, _language: &str) -> Result<KbAnswer> {
        debug!(%question, "knowledge base not configured");
        Err(anyhow!("{} is not configured", self.what))
    }
}

#[async_trait::async_trait]
impl SmsSender for Unconfigured {
    async fn send(&self, to: &str, _body: &str) -> Result<()> {
        debug!(%to, "SMS sender not configured");
        Err(anyhow!("{} is not configured", self.what))
    }
}

#[async_trait::async_trait]
impl StaffNotifier for Unconfigured {
    async fn notify(&self, _event: StaffEvent) -> Result<()> {
        debug!("staff notifier not configured");
        Err(anyhow!("{} is not configured", self.what))
    }
}
