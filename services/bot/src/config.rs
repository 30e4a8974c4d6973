//! services/bot/src/config.rs
//!
//! Defines the bot's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use tracing::Level;

pub const DEFAULT_ANKI_MCP_URL: &str = "http://127.0.0.1:3141/";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_token: String,
    /// The only Telegram user the bot answers.
    pub allowed_user_id: i64,
    pub anki_mcp_url: String,
    pub anki_deck: String,
    pub openai_api_key: Option<String>,
    pub card_model: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Telegram Settings ---
        let telegram_token = lookup("TG_API_TOKEN")
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ConfigError::MissingVar("TG_API_TOKEN".to_string()))?;

        let user_id_str = lookup("TG_USER_ID")
            .ok_or_else(|| ConfigError::MissingVar("TG_USER_ID".to_string()))?;
        let allowed_user_id = user_id_str.trim().parse::<i64>().map_err(|_| {
            ConfigError::InvalidValue(
                "TG_USER_ID".to_string(),
                format!("'{}' is not an integer", user_id_str),
            )
        })?;

        // --- Anki Settings ---
        let anki_mcp_url =
            lookup("ANKI_MCP_URL").unwrap_or_else(|| DEFAULT_ANKI_MCP_URL.to_string());
        if !anki_mcp_url.starts_with("http://") && !anki_mcp_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "ANKI_MCP_URL".to_string(),
                format!("'{}' is not an http(s) URL", anki_mcp_url),
            ));
        }
        let anki_deck = lookup("ANKI_DECK").unwrap_or_else(|| "Default".to_string());

        // --- Generator Settings ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let card_model = lookup("CARD_MODEL").unwrap_or_else(|| "gpt-4.1".to_string());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            telegram_token,
            allowed_user_id,
            anki_mcp_url,
            anki_deck,
            openai_api_key,
            card_model,
            log_level,
        })
    }
}
