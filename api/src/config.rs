use std::time::Duration;

use recallbridge_core::rate_limit::{RateWindow, RateWindowError, default_windows};
use thiserror::Error;
use url::Url;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_GENERATION_TIMEOUT_MS: u64 = 12_000;
pub const DEFAULT_RECAPTCHA_MIN_SCORE: f64 = 0.5;
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("RECALL_RATE_LIMITS: {0}")]
    RateWindows(#[from] RateWindowError),
}

#[derive(Debug, Clone)]
pub struct VerificationConfig {
    pub secret: String,
    pub min_score: f64,
    pub verify_url: Url,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub project_id: Option<String>,
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: Url,
    pub default_model: String,
    pub generation_timeout: Duration,
    /// `None` disables human verification
    pub verification: Option<VerificationConfig>,
    pub telemetry: TelemetryConfig,
    pub rate_windows: Vec<RateWindow>,
    /// Empty means any origin
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let port = match get("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                expected: "a TCP port number",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let gemini_api_base = parse_url(
            "GEMINI_API_BASE",
            get("GEMINI_API_BASE").as_deref().unwrap_or(DEFAULT_GEMINI_API_BASE),
        )?;

        let generation_timeout_ms = match get("RECALL_GENERATION_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or(ConfigError::Invalid {
                    name: "RECALL_GENERATION_TIMEOUT_MS",
                    expected: "a positive number of milliseconds",
                    value: raw,
                })?,
            None => DEFAULT_GENERATION_TIMEOUT_MS,
        };

        let verification = match get("RECAPTCHA_SECRET_KEY") {
            Some(secret) => {
                let min_score = match get("RECAPTCHA_MIN_SCORE") {
                    Some(raw) => raw
                        .parse::<f64>()
                        .ok()
                        .filter(|score| (0.0..=1.0).contains(score))
                        .ok_or(ConfigError::Invalid {
                            name: "RECAPTCHA_MIN_SCORE",
                            expected: "a number between 0 and 1",
                            value: raw,
                        })?,
                    None => DEFAULT_RECAPTCHA_MIN_SCORE,
                };
                let verify_url = parse_url(
                    "RECAPTCHA_VERIFY_URL",
                    get("RECAPTCHA_VERIFY_URL")
                        .as_deref()
                        .unwrap_or(DEFAULT_RECAPTCHA_VERIFY_URL),
                )?;
                Some(VerificationConfig {
                    secret,
                    min_score,
                    verify_url,
                })
            }
            None => None,
        };

        let telemetry = TelemetryConfig {
            enabled: get("RECALL_TELEMETRY_ENABLED")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on"))
                .unwrap_or(false),
            project_id: get("RECALL_TELEMETRY_PROJECT"),
        };

        let rate_windows = match get("RECALL_RATE_LIMITS") {
            Some(raw) => RateWindow::parse_table(&raw)?,
            None => default_windows(),
        };

        let cors_origins = get("RECALL_CORS_ORIGINS")
            .filter(|raw| raw != "*")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            port,
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_api_base,
            default_model: get("RECALL_DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            generation_timeout: Duration::from_millis(generation_timeout_ms),
            verification,
            telemetry,
            rate_windows,
            cors_origins,
        })
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|_| ConfigError::Invalid {
        name,
        expected: "an absolute URL",
        value: raw.to_string(),
    })
}
