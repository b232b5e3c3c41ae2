use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_BACKEND_BASE_URL: &str = "https://portlinkpy.vercel.app/api";

/// Application configuration loaded from environment variables.
/// Every variable has a default; malformed numbers fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Origin of the extraction/deployment backend, without a trailing slash.
    pub backend_base_url: String,
    pub port: u16,
    pub rust_log: String,
    pub upload_timeout: Duration,
    pub publish_timeout: Duration,
    pub request_timeout: Duration,
    /// Delay before the upload page redirects to the portfolio view.
    pub redirect_delay_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            backend_base_url: normalize_base_url(
                &std::env::var("BACKEND_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_BACKEND_BASE_URL.to_string()),
            ),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            upload_timeout: Duration::from_secs(parse_env("UPLOAD_TIMEOUT_SECS", 60)?),
            publish_timeout: Duration::from_secs(parse_env("PUBLISH_TIMEOUT_SECS", 120)?),
            request_timeout: Duration::from_secs(parse_env("REQUEST_TIMEOUT_SECS", 30)?),
            redirect_delay_secs: parse_env("REDIRECT_DELAY_SECS", 2)?,
        })
    }

    /// Configuration pointing at an arbitrary backend, used by tests.
    #[cfg(test)]
    pub fn for_backend(base_url: &str) -> Self {
        Config {
            backend_base_url: normalize_base_url(base_url),
            port: 0,
            rust_log: "debug".to_string(),
            upload_timeout: Duration::from_secs(5),
            publish_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            redirect_delay_secs: 2,
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
