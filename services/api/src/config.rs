use secrecy::SecretString;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Static facts about the business the assistant answers questions about.
#[derive(Clone, Debug)]
pub struct SalonProfile {
    pub name: String,
    pub address: String,
    pub hours: String,
}

/// Credentials for the outbound SMS collaborator. Absent entirely when any
/// of its variables is missing; the tool then reports failure at call time
/// instead of crashing at startup.
#[derive(Clone, Debug)]
pub struct TwilioSmsConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    pub from_number: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: SecretString,
    pub realtime_model: String,
    pub voice: String,
    pub instructions: String,
    pub flush_threshold_bytes: usize,
    pub keepalive: Duration,
    pub public_base_url: String,
    pub kb_min_confidence: f64,
    pub log_level: Level,
    pub salon: SalonProfile,
    pub slack_webhook_url: Option<String>,
    pub twilio_sms: Option<TwilioSmsConfig>,
}

/// Baked-in receptionist prompt, used when `INSTRUCTIONS` is not set.
const DEFAULT_INSTRUCTIONS: &str = "You are an AI salon receptionist — friendly, confident, warm, and efficient. \
Answer common questions fast (pricing, hours, location), screen spam calls, \
offer to transfer to a team member for anything you cannot handle, and keep \
small talk to a minimum.";

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8010".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        // Missing credentials are fatal here, before any call is accepted.
        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map(SecretString::from)
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let realtime_model = std::env::var("OPENAI_REALTIME_MODEL")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview".to_string());

        let voice = std::env::var("OPENAI_TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());

        let instructions =
            std::env::var("INSTRUCTIONS").unwrap_or_else(|_| DEFAULT_INSTRUCTIONS.to_string());

        let flush_threshold_bytes = parse_or_default("FLUSH_THRESHOLD_BYTES", 32_000)?;
        let keepalive = Duration::from_secs(parse_or_default("KEEPALIVE_SECS", 20)?);
        let kb_min_confidence = parse_or_default("KB_MIN_CONFIDENCE", 0.55)?;

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{bind_address}"))
            .trim_end_matches('/')
            .to_string();

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let salon = SalonProfile {
            name: std::env::var("SALON_NAME").unwrap_or_else(|_| "XYZ Salon".to_string()),
            address: std::env::var("SALON_ADDRESS")
                .unwrap_or_else(|_| "123 Main Street".to_string()),
            hours: std::env::var("SALON_HOURS")
                .unwrap_or_else(|_| "Tuesday through Saturday, 9 AM to 7 PM".to_string()),
        };

        let slack_webhook_url = std::env::var("SLACK_WEBHOOK_URL").ok();

        let twilio_sms = match (
            std::env::var("TWILIO_ACCOUNT_SID").ok(),
            std::env::var("TWILIO_AUTH_TOKEN").ok(),
            std::env::var("TWILIO_FROM_NUMBER").ok(),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioSmsConfig {
                account_sid,
                auth_token: SecretString::from(auth_token),
                from_number,
            }),
            _ => None,
        };

        Ok(Self {
            bind_address,
            openai_api_key,
            realtime_model,
            voice,
            instructions,
            flush_threshold_bytes,
            keepalive,
            public_base_url,
            kb_min_confidence,
            log_level,
            salon,
            slack_webhook_url,
            twilio_sms,
        })
    }
}

fn parse_or_default<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(var.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

/// Per-call session settings resolved when the telephony `start` frame
/// arrives, so an operator-facing settings store can change the voice or
/// prompt between calls without a restart.
#[derive(Clone, Debug)]
pub struct CallSettings {
    pub voice: String,
    pub instructions: String,
    pub flush_threshold_bytes: usize,
    pub keepalive: Duration,
}

/// External collaborator that resolves [`CallSettings`]. Must be safe for
/// concurrent use by many simultaneous calls.
#[async_trait::async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn call_settings(&self) -> CallSettings;
}

/// Default provider: every call uses the values loaded at startup.
pub struct StaticSettings {
    settings: CallSettings,
}

impl StaticSettings {
    pub fn new(config: &Config) -> Self {
        Self {
            settings: CallSettings {
                voice: config.voice.clone(),
                instructions: config.instructions.clone(),
                flush_threshold_bytes: config.flush_threshold_bytes,
                keepalive: config.keepalive,
            },
        }
    }
}

#[async_trait::async_trait]
impl SettingsProvider for StaticSettings {
    async fn call_settings(&self) -> CallSettings {
        self.settings.clone()
    }
}
