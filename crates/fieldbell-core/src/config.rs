//! Fieldbell configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldbellConfig {
    /// Telegram bot token. Usually supplied via `TELEGRAM_BOT_TOKEN`.
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for FieldbellConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            db_path: default_db_path(),
            dispatch: DispatchConfig::default(),
            verify: VerifyConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

fn default_db_path() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".fieldbell")
        .join("fieldbell.db")
        .to_string_lossy()
        .into_owned()
}

impl FieldbellConfig {
    /// Load config from the default path, falling back to defaults when the
    /// file does not exist. The bot token env var always wins.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN")
            && !token.is_empty()
        {
            config.bot_token = token;
        }
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::FieldbellError::Config(format!("Failed to read config: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::FieldbellError::Config(format!("Failed to parse config: {e}"))
        })?;
        Ok(config)
    }

    /// Validate the parts without which the process must not start.
    pub fn validate(&self) -> Result<()> {
        if self.bot_token.is_empty() {
            return Err(crate::error::FieldbellError::Config(
                "bot token missing — set TELEGRAM_BOT_TOKEN or bot_token in config.toml".into(),
            ));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Fieldbell home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".fieldbell")
    }
}

/// Dispatch scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Seconds between scheduler ticks.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Minimum seconds between group liveness sweeps.
    #[serde(default = "default_liveness_window_secs")]
    pub liveness_window_secs: u64,
}

fn default_tick_secs() -> u64 {
    10
}
fn default_liveness_window_secs() -> u64 {
    600
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            liveness_window_secs: default_liveness_window_secs(),
        }
    }
}

/// Verification engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Failed credential attempts before a lockout triggers.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base lockout duration; multiplied by the lockout count.
    #[serde(default = "default_penalty_base_secs")]
    pub penalty_base_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_penalty_base_secs() -> u64 {
    15
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            penalty_base_secs: default_penalty_base_secs(),
        }
    }
}

/// HTTP ingestion server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn bool_true() -> bool {
    true
}
fn default_http_port() -> u16 {
    3000
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: bool_true(),
            port: default_http_port(),
        }
    }
}
