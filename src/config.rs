//! Configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honoured for local development.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the persisted credential pair.
pub const DEFAULT_TOKEN_FILE: &str = ".athlete_tokens.json";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CHART_WIDTH: u32 = 900;
const DEFAULT_CHART_HEIGHT: u32 = 520;

/// Settings for talking to the dashboard backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL without a trailing slash, e.g. `https://api.example.com/api`.
    pub base_url: String,
    /// Per-request timeout applied by the HTTP transport.
    pub timeout: Duration,
    /// JSON file holding the access/refresh pair between runs.
    pub token_file: PathBuf,
}

impl Default for ClientConfig {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            token_file: PathBuf::from(DEFAULT_TOKEN_FILE),
        }
    }
}

impl ClientConfig {
    /// Creates a config for the given base URL with default timeout and token file.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.into()),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let base_url = env::var("ATHLETE_API_BASE_URL")
            .map_err(|_| ConfigError::Missing("ATHLETE_API_BASE_URL"))?;
        if base_url.trim().is_empty() {
            return Err(ConfigError::Missing("ATHLETE_API_BASE_URL"));
        }

        let timeout = match env::var("ATHLETE_API_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(parse_number("ATHLETE_API_TIMEOUT_SECS", &raw)?),
            Err(_) => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let token_file = env::var_os("ATHLETE_TOKEN_FILE")
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE));

        Ok(Self {
            base_url: normalize_base_url(base_url),
            timeout,
            token_file,
        })
    }

    /// Joins an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

/// Settings for the report exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportConfig {
    /// Pixel width used when charts are rasterized for the document.
    pub chart_width: u32,
    /// Pixel height used when charts are rasterized for the document.
    pub chart_height: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            chart_width: DEFAULT_CHART_WIDTH,
            chart_height: DEFAULT_CHART_HEIGHT,
        }
    }
}

impl ExportConfig {
    /// Load exporter settings, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Ok(raw) = env::var("ATHLETE_REPORT_CHART_WIDTH") {
            config.chart_width = parse_number("ATHLETE_REPORT_CHART_WIDTH", &raw)?;
        }
        if let Ok(raw) = env::var("ATHLETE_REPORT_CHART_HEIGHT") {
            config.chart_height = parse_number("ATHLETE_REPORT_CHART_HEIGHT", &raw)?;
        }
        if config.chart_width == 0 || config.chart_height == 0 {
            return Err(ConfigError::Invalid {
                name: "ATHLETE_REPORT_CHART_WIDTH/HEIGHT",
                value: format!("{}x{}", config.chart_width, config.chart_height),
            });
        }
        Ok(config)
    }
}

fn normalize_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_string(),
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
