//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

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
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: Level,
    /// Root directory that relative material locators resolve against.
    pub storage_root: PathBuf,
    pub openai_api_key: Option<String>,
    pub ai_model: String,
    pub default_question_count: usize,
    pub quiz_workers: usize,
    /// Without a token, notifications are logged instead of delivered.
    pub telegram_token: Option<String>,
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

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address_str =
            lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 5u32)?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let storage_root = lookup("STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./storage"));

        // --- Generation Settings ---
        let openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        let ai_model = lookup("AI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());

        let default_question_count = parse_or(&lookup, "QUIZ_QUESTIONS_DEFAULT", 5usize)?;
        if default_question_count == 0 {
            return Err(ConfigError::InvalidValue(
                "QUIZ_QUESTIONS_DEFAULT".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let quiz_workers = parse_or(&lookup, "QUIZ_WORKERS", 3usize)?;
        if quiz_workers == 0 {
            return Err(ConfigError::InvalidValue(
                "QUIZ_WORKERS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        // --- Notification Delivery ---
        let telegram_token = lookup("TELEGRAM_TOKEN").filter(|t| !t.trim().is_empty());

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            log_level,
            storage_root,
            openai_api_key,
            ai_model,
            default_question_count,
            quiz_workers,
            telegram_token,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
