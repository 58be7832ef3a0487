//! Server configuration from environment variables

use crate::llm::DEFAULT_GEMINI_MODEL;
use crate::runtime::SessionDefaults;
use crate::state_machine::CaptureLimits;
use std::time::Duration;
use thiserror::Error;

/// Invalid configuration value
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

/// Everything the server reads from its environment
#[derive(Debug, Clone)]
pub struct AriaConfig {
    pub port: u16,
    pub gemini_api_key: Option<String>,
    pub model: String,
    pub gateway: Option<String>,
    pub speech_api_key: Option<String>,
    pub thinking_delay: Duration,
    pub listen_timeout: Duration,
    pub phrase_limit: Duration,
    pub language: String,
    /// `None` when expiry is disabled (`ARIA_SESSION_IDLE_MS=0`)
    pub session_idle: Option<Duration>,
}

impl AriaConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("ARIA_PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::InvalidNumber {
                name: "ARIA_PORT",
                value,
            })?,
            None => 8000,
        };

        let gemini_api_key = get("GEMINI_API_KEY");
        let speech_api_key = get("GOOGLE_SPEECH_API_KEY").or_else(|| gemini_api_key.clone());

        let listen_timeout = millis(get("ARIA_LISTEN_TIMEOUT_MS"), "ARIA_LISTEN_TIMEOUT_MS", 5000)?;
        if listen_timeout.is_zero() {
            return Err(ConfigError::Zero {
                name: "ARIA_LISTEN_TIMEOUT_MS",
            });
        }
        let phrase_limit = millis(get("ARIA_PHRASE_LIMIT_MS"), "ARIA_PHRASE_LIMIT_MS", 10_000)?;
        if phrase_limit.is_zero() {
            return Err(ConfigError::Zero {
                name: "ARIA_PHRASE_LIMIT_MS",
            });
        }

        let session_idle = millis(get("ARIA_SESSION_IDLE_MS"), "ARIA_SESSION_IDLE_MS", 30 * 60 * 1000)?;

        Ok(Self {
            port,
            gemini_api_key,
            model: get("ARIA_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gateway: get("LLM_GATEWAY"),
            speech_api_key,
            thinking_delay: millis(get("ARIA_THINKING_DELAY_MS"), "ARIA_THINKING_DELAY_MS", 5000)?,
            listen_timeout,
            phrase_limit,
            language: get("ARIA_LANGUAGE").unwrap_or_else(|| "en".to_string()),
            session_idle: (!session_idle.is_zero()).then_some(session_idle),
        })
    }

    pub fn session_defaults(&self) -> SessionDefaults {
        SessionDefaults {
            thinking_delay: self.thinking_delay,
            capture: CaptureLimits {
                timeout: self.listen_timeout,
                phrase_limit: self.phrase_limit,
            },
            language: self.language.clone(),
            idle_expiry: self.session_idle,
        }
    }
}

fn millis(value: Option<String>, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => value
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        None => Ok(Duration::from_millis(default)),
    }
}
