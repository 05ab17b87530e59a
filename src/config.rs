//! Environment-driven configuration.

use std::time::Duration;

use crate::classifier::{LlmBackend, LlmConfig};
use crate::error::ConfigError;

/// Default public feed polled by `POST /api/fetch-news`.
const DEFAULT_FEED_URL: &str =
    "https://saurav.tech/NewsAPI/top-headlines/category/technology/us.json";

/// Service configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP/WS bind port.
    pub port: u16,
    /// Path of the libSQL database file.
    pub db_path: String,
    /// External classifier backend; `None` means keyword fallback only.
    pub llm: Option<LlmConfig>,
    /// Interval between connection liveness probes.
    pub heartbeat_interval: Duration,
    /// Probes a peer may miss before its connection is closed.
    pub max_missed_probes: u8,
    /// Page size for the initial pending-analyses sync.
    pub sync_page_size: u32,
    /// News feed endpoint.
    pub feed_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = env_parsed("MODWATCH_PORT", 5000u16)?;
        let db_path =
            std::env::var("MODWATCH_DB_PATH").unwrap_or_else(|_| "./data/modwatch.db".to_string());
        let heartbeat_secs = env_parsed("MODWATCH_HEARTBEAT_SECS", 30u64)?;
        let max_missed_probes = env_parsed("MODWATCH_MAX_MISSED_PROBES", 2u8)?;
        let sync_page_size = env_parsed("MODWATCH_SYNC_PAGE_SIZE", 5u32)?;
        let feed_url =
            std::env::var("MODWATCH_FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.to_string());

        Ok(Self {
            port,
            db_path,
            llm: llm_from_env()?,
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
            max_missed_probes,
            sync_page_size,
            feed_url,
        })
    }
}

/// Resolve the classifier backend from the environment. Without an API key
/// the pipeline runs on the keyword fallback alone.
fn llm_from_env() -> Result<Option<LlmConfig>, ConfigError> {
    let backend = match std::env::var("MODWATCH_LLM_BACKEND").ok().as_deref() {
        None | Some("anthropic") => LlmBackend::Anthropic,
        Some("openai") => LlmBackend::OpenAi,
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                key: "MODWATCH_LLM_BACKEND".into(),
                message: format!("unknown backend '{other}' (expected anthropic or openai)"),
            });
        }
    };

    let (key_var, default_model) = match backend {
        LlmBackend::Anthropic => ("ANTHROPIC_API_KEY", "claude-sonnet-4-20250514"),
        LlmBackend::OpenAi => ("OPENAI_API_KEY", "gpt-4o"),
    };

    let Ok(api_key) = std::env::var(key_var) else {
        return Ok(None);
    };
    if api_key.is_empty() {
        return Ok(None);
    }

    let model =
        std::env::var("MODWATCH_LLM_MODEL").unwrap_or_else(|_| default_model.to_string());

    Ok(Some(LlmConfig {
        backend,
        api_key: secrecy::SecretString::from(api_key),
        model,
    }))
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("could not parse '{raw}'"),
        }),
        Err(_) => Ok(default),
    }
}
