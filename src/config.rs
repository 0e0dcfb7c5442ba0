// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Values are read once at startup. A `.env` file is honored for local runs.

use chrono::{FixedOffset, Offset, Utc};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Lowest allowed scheduler interval. The provider API is rate limited per hour.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Highest allowed scheduler interval (one day).
pub const MAX_SYNC_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Which storage adapter backs the sync ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Firestore,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "firestore" => Ok(Self::Firestore),
            _ => Err(ConfigError::Invalid("STORAGE_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Clone)]
pub struct Config {
    // --- Provider OAuth ---
    pub fitbit_client_id: String,
    pub fitbit_client_secret: String,
    pub fitbit_redirect_uri: String,
    pub fitbit_authorize_url: String,
    pub fitbit_token_url: String,
    pub fitbit_revoke_url: String,
    /// Base URL for data reads
    pub fitbit_api_base_url: String,

    /// Base64 of the 32-byte token encryption key
    pub token_encryption_key: String,

    // --- Sync tuning ---
    pub sync_interval: Duration,
    /// Deadline for one sync run (scheduled or manual)
    pub sync_run_timeout: Duration,
    /// Timeout for a single HTTP call to the provider
    pub provider_request_timeout: Duration,
    /// Upper bound for `stop()` during shutdown
    pub shutdown_timeout: Duration,
    /// Offset of the reporting timezone used to compute "today"
    pub reporting_offset: FixedOffset,

    // --- Storage ---
    pub storage_backend: StorageBackend,
    pub gcp_project_id: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("fitbit_client_id", &self.fitbit_client_id)
            .field("fitbit_client_secret", &"[REDACTED]")
            .field("fitbit_redirect_uri", &self.fitbit_redirect_uri)
            .field("fitbit_api_base_url", &self.fitbit_api_base_url)
            .field("token_encryption_key", &"[REDACTED]")
            .field("sync_interval", &self.sync_interval)
            .field("sync_run_timeout", &self.sync_run_timeout)
            .field("provider_request_timeout", &self.provider_request_timeout)
            .field("reporting_offset", &self.reporting_offset)
            .field("storage_backend", &self.storage_backend)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let sync_interval = sync_interval_from_minutes(parse_or("SYNC_INTERVAL_MIN", 10)?)?;

        Ok(Self {
            fitbit_client_id: required("FITBIT_CLIENT_ID")?,
            fitbit_client_secret: required("FITBIT_CLIENT_SECRET")?,
            fitbit_redirect_uri: required("FITBIT_REDIRECT_URI")?,
            fitbit_authorize_url: env::var("FITBIT_AUTHORIZE_URL")
                .unwrap_or_else(|_| "https://www.fitbit.com/oauth2/authorize".to_string()),
            fitbit_token_url: env::var("FITBIT_TOKEN_URL")
                .unwrap_or_else(|_| "https://api.fitbit.com/oauth2/token".to_string()),
            fitbit_revoke_url: env::var("FITBIT_REVOKE_URL")
                .unwrap_or_else(|_| "https://api.fitbit.com/oauth2/revoke".to_string()),
            fitbit_api_base_url: env::var("FITBIT_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.fitbit.com".to_string()),
            token_encryption_key: required("TOKEN_ENCRYPTION_KEY")?,

            sync_interval,
            sync_run_timeout: Duration::from_secs(parse_or("SYNC_RUN_TIMEOUT_SECS", 120)?),
            provider_request_timeout: Duration::from_secs(parse_or(
                "PROVIDER_REQUEST_TIMEOUT_SECS",
                20,
            )?),
            shutdown_timeout: Duration::from_secs(parse_or("SHUTDOWN_TIMEOUT_SECS", 10)?),
            reporting_offset: match env::var("REPORTING_UTC_OFFSET") {
                Ok(v) => v
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid("REPORTING_UTC_OFFSET", v))?,
                Err(_) => utc(),
            },

            storage_backend: match env::var("STORAGE_BACKEND") {
                Ok(v) => v.parse()?,
                Err(_) => StorageBackend::Memory,
            },
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
        })
    }

    /// Config for tests. Points every provider URL at `base_url`.
    pub fn test_default(base_url: &str) -> Self {
        Self {
            fitbit_client_id: "test_client_id".to_string(),
            fitbit_client_secret: "test_secret".to_string(),
            fitbit_redirect_uri: "http://localhost:8080/callback".to_string(),
            fitbit_authorize_url: format!("{}/oauth2/authorize", base_url),
            fitbit_token_url: format!("{}/oauth2/token", base_url),
            fitbit_revoke_url: format!("{}/oauth2/revoke", base_url),
            fitbit_api_base_url: base_url.to_string(),
            // 32 zero bytes
            token_encryption_key: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string(),
            sync_interval: MIN_SYNC_INTERVAL,
            sync_run_timeout: Duration::from_secs(120),
            provider_request_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
            reporting_offset: utc(),
            storage_backend: StorageBackend::Memory,
            gcp_project_id: "test-project".to_string(),
        }
    }
}

/// Keep the scheduler interval within `[MIN_SYNC_INTERVAL, MAX_SYNC_INTERVAL]`.
pub fn clamp_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_SYNC_INTERVAL, MAX_SYNC_INTERVAL)
}

/// Values below the floor are raised to it; values above a day are rejected.
fn sync_interval_from_minutes(minutes: u64) -> Result<Duration, ConfigError> {
    let interval = minutes
        .checked_mul(60)
        .map(Duration::from_secs)
        .filter(|d| *d <= MAX_SYNC_INTERVAL)
        .ok_or_else(|| ConfigError::Invalid("SYNC_INTERVAL_MIN", minutes.to_string()))?;
    Ok(clamp_interval(interval))
}

fn utc() -> FixedOffset {
    Utc.fix()
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, v)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
