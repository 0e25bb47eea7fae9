//! Configuration infrastructure
//!
//! Configuration is layered:
//! 1. Built-in defaults
//! 2. JSON config file (explicit path, or the per-user config directory)
//! 3. Environment variables prefixed with `DECISIONS_` (`__` separates sections),
//!    e.g. `DECISIONS_AUTH__ACCESS_TOKEN`

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;
use url::Url;

use crate::application::ingress::{DEFAULT_TRANSCRIPT_LIMIT, MAX_TRANSCRIPT_LIMIT};

const APP_DIR_NAME: &str = "decision-upload-client";
const CONFIG_FILE_NAME: &str = "decision_client_config.json";
const ENV_PREFIX: &str = "DECISIONS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// REST backend
    pub api: ApiSettings,

    /// Push channel for progress notifications
    pub channel: ChannelSettings,

    /// Progress tracking behaviour
    pub progress: ProgressSettings,

    /// Credentials
    pub auth: AuthSettings,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Backend base URL, e.g. `http://localhost:8000/`
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    /// WebSocket base URL, e.g. `ws://localhost:8000`
    pub ws_base_url: String,

    /// Progress endpoint path relative to the base URL
    pub path: String,

    /// Handshake timeout in seconds
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    /// Number of recent events kept for display
    pub transcript_limit: usize,

    /// Release the channel as soon as every item completed
    pub close_on_complete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Bearer token for the REST calls and the push channel
    pub access_token: Option<String>,
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output (stderr)
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Log directory; defaults to the per-user data directory
    pub directory: Option<PathBuf>,

    /// Daily log files are named `<prefix>.YYYY-MM-DD`
    pub file_prefix: String,

    /// Rolled log files kept in the directory; older ones are removed at startup
    pub max_files: u32,

    /// Module-specific log level filters (e.g., "reqwest": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/".to_string(),
            timeout_seconds: 30,
            user_agent: format!("decision-upload-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            ws_base_url: "ws://localhost:8000".to_string(),
            path: "ws/progress/".to_string(),
            connect_timeout_seconds: 10,
        }
    }
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            transcript_limit: DEFAULT_TRANSCRIPT_LIMIT,
            close_on_complete: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            directory: None,
            file_prefix: "decisions.log".to_string(),
            max_files: 7,
            module_filters: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load defaults, then the config file (if any), then environment overrides.
    ///
    /// With `path == None` the per-user config file is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => Some((p.to_path_buf(), true)),
            None => ConfigManager::get_config_dir()
                .ok()
                .map(|dir| (dir.join(CONFIG_FILE_NAME), false)),
        };

        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Self::default())?);
        if let Some((file_path, required)) = file {
            builder = builder.add_source(
                config::File::from(file_path)
                    .format(config::FileFormat::Json)
                    .required(required),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Self = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Check URLs, timeouts and limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        let api = self.api_base_url()?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(validation(format!("api.base_url must be http(s), got '{}'", api.scheme())));
        }
        let ws = Url::parse(&self.channel.ws_base_url)
            .map_err(|e| validation(format!("channel.ws_base_url '{}': {}", self.channel.ws_base_url, e)))?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(validation(format!("channel.ws_base_url must be ws(s), got '{}'", ws.scheme())));
        }
        if self.api.timeout_seconds == 0 {
            return Err(validation("api.timeout_seconds must be greater than 0"));
        }
        if self.channel.connect_timeout_seconds == 0 {
            return Err(validation("channel.connect_timeout_seconds must be greater than 0"));
        }
        if !(1..=MAX_TRANSCRIPT_LIMIT).contains(&self.progress.transcript_limit) {
            return Err(validation(format!(
                "progress.transcript_limit must be between 1 and {MAX_TRANSCRIPT_LIMIT}"
            )));
        }
        if self.logging.level.trim().is_empty() {
            return Err(validation("logging.level must not be empty"));
        }
        Ok(())
    }

    /// API base URL, normalized to end with `/` so relative joins keep its path
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        let raw = if self.api.base_url.ends_with('/') {
            self.api.base_url.clone()
        } else {
            format!("{}/", self.api.base_url)
        };
        Url::parse(&raw).map_err(|e| validation(format!("api.base_url '{}': {}", self.api.base_url, e)))
    }

    /// Token with surrounding whitespace removed; blank counts as missing
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.auth
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

fn validation(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

/// Configuration manager for locating, creating and saving the config file
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(APP_DIR_NAME);

        Ok(data_dir)
    }

    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join(CONFIG_FILE_NAME);
        Ok(Self { config_path })
    }

    pub const fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Write the default configuration on first run, otherwise load the existing file
    pub async fn initialize_on_first_run(&self) -> Result<AppConfig> {
        if self.config_path.exists() {
            return self.load_config();
        }

        info!("First run detected - writing default configuration to {:?}", self.config_path);
        let default_config = AppConfig::default();
        self.save_config(&default_config).await?;
        Ok(default_config)
    }

    pub fn load_config(&self) -> Result<AppConfig> {
        let config = AppConfig::load(Some(&self.config_path))
            .with_context(|| format!("Failed to load configuration from {:?}", self.config_path))?;
        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}
