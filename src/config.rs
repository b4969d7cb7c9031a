//! Backend configuration parsed from environment variables.

use std::path::PathBuf;

use crate::error::GatewayError;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_TOKEN_DIR: &str = ".medhasmind";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project base URL, without a trailing slash.
    pub url: String,
    /// Public (anon) API key sent with every request.
    pub anon_key: String,
    pub timeouts: Timeouts,
    /// Directory holding the per-origin token file.
    pub token_dir: PathBuf,
}

impl BackendConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `SUPABASE_REQUEST_TIMEOUT_SECS`: default 30
    /// - `SUPABASE_CONNECT_TIMEOUT_SECS`: default 10
    /// - `AUTH_TOKEN_DIR`: default `.medhasmind`
    ///
    /// # Errors
    ///
    /// Returns `Config` if a required variable is missing or the URL is not http(s).
    pub fn from_env() -> Result<Self, GatewayError> {
        let url = require_env("SUPABASE_URL")?;
        let anon_key = require_env("SUPABASE_ANON_KEY")?;
        let timeouts = Timeouts {
            request_secs: env_parse_u64("SUPABASE_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_parse_u64("SUPABASE_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let token_dir = std::env::var("AUTH_TOKEN_DIR").map_or_else(|_| PathBuf::from(DEFAULT_TOKEN_DIR), PathBuf::from);
        Self::new(url, anon_key).map(|cfg| Self { timeouts, token_dir, ..cfg })
    }

    /// Build config with default timeouts and token directory.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the URL is not http(s) or the key is empty.
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self, GatewayError> {
        let url = url.into().trim().trim_end_matches('/').to_owned();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(GatewayError::Config(format!("SUPABASE_URL must be an http(s) URL, got '{url}'")));
        }
        let anon_key = anon_key.into();
        if anon_key.trim().is_empty() {
            return Err(GatewayError::Config("SUPABASE_ANON_KEY is empty".into()));
        }
        Ok(Self { url, anon_key, timeouts: Timeouts::default(), token_dir: PathBuf::from(DEFAULT_TOKEN_DIR) })
    }
}

fn require_env(key: &str) -> Result<String, GatewayError> {
    std::env::var(key).map_err(|_| GatewayError::Config(format!("{key} not set")))
}

fn env_parse_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
