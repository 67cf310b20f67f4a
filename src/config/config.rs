use crate::error::ConfigError;
use crate::toasts::ToastDurations;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// API root used when neither the file, the environment nor the command line
/// names one
pub const DEFAULT_API_URL: &str = "https://rate-limiter-backend.onrender.com/api";

/// Environment variable overriding the API root
pub const API_URL_ENV: &str = "API_URL";

/// Which [`AdminApi`](crate::api::AdminApi) implementation to talk to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// The REST backend at `api.url`
    #[default]
    Http,
    /// In-process stand-in, no network
    Mock,
}

/// Console configuration, read from TOML
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub notifications: NotificationsConfig,
    pub toasts: ToastConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub url: String,
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Requests sent by one burst
    pub burst_size: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { burst_size: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToastConfig {
    pub max_visible: usize,
    pub max_message_length: usize,
    pub success_ms: u64,
    pub error_ms: u64,
    pub info_ms: u64,
    pub warning_ms: u64,
}

impl Default for ToastConfig {
    fn default() -> Self {
        Self {
            max_visible: 5,
            max_message_length: 512,
            success_ms: 3000,
            error_ms: 5000,
            info_ms: 3000,
            warning_ms: 3000,
        }
    }
}

impl Config {
    /// Read and validate a TOML file
    ///
    /// # Errors
    ///
    /// `ConfigError::ReadError` when the file cannot be read,
    /// `ConfigError::TomlError` when it does not parse and
    /// `ConfigError::ValidationError` when a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::ReadError(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or use defaults
    ///
    /// A missing file is only a warning. A file that does not parse or
    /// validate is reported at error level and defaults are used instead.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("Using default configuration");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match Self::from_file(path) {
            Ok(config) => config,
            Err(ConfigError::ReadError(e)) => {
                warn!("Configuration file not found or unreadable ({}), using defaults", e);
                Self::default()
            }
            Err(e) => {
                error!("Configuration error in '{}': {}", path.display(), e);
                warn!("Using default configuration due to invalid config file");
                Self::default()
            }
        }
    }

    /// Apply the `API_URL` environment override, if set and not blank
    pub fn apply_env_from(&mut self, api_url: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            info!("Using API URL from {}: {}", API_URL_ENV, url);
            self.api.url = url.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.api.url).map_err(|e| {
            ConfigError::ValidationError(format!("api.url '{}': {}", self.api.url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "api.url must be http or https, got '{}'",
                url.scheme()
            )));
        }

        let positive = [
            ("api.timeout_seconds", self.api.timeout_seconds),
            ("polling.interval_seconds", self.polling.interval_seconds),
            ("notifications.burst_size", self.notifications.burst_size as u64),
            ("toasts.max_visible", self.toasts.max_visible as u64),
            ("toasts.max_message_length", self.toasts.max_message_length as u64),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be greater than 0",
                    key
                )));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds)
    }

    pub fn toast_durations(&self) -> ToastDurations {
        ToastDurations {
            success: Duration::from_millis(self.toasts.success_ms),
            info: Duration::from_millis(self.toasts.info_ms),
            warning: Duration::from_millis(self.toasts.warning_ms),
            error: Duration::from_millis(self.toasts.error_ms),
        }
    }
}
