// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types shared by the sync pipeline.

use crate::services::cipher::CipherError;
use chrono::NaiveDate;
use std::time::Duration;

/// Application error type.
///
/// Required-path failures (summary fetch, aggregate write) surface to the
/// caller through this type. Best-effort failures are logged inside the
/// orchestrator and never leave it.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not authorized with the provider")]
    NotAuthorized,

    #[error("OAuth state is unknown or expired")]
    InvalidState,

    #[error("Authorization code exchange failed: {0}")]
    TokenExchange(String),

    #[error("Token refresh rejected: {0}")]
    RefreshFailed(String),

    #[error("Access token rejected after forced refresh: {path}")]
    AuthRejected { path: String },

    #[error("Rate limited again after backoff: {path}")]
    RateLimited { path: String },

    #[error(
        "Insufficient time budget for rate-limit wait of {}s ({}s remaining)",
        wait.as_secs(),
        remaining.as_secs()
    )]
    InsufficientTimeBudget { wait: Duration, remaining: Duration },

    #[error("{path} returned {status}: {body}")]
    Remote {
        path: String,
        status: u16,
        body: String,
    },

    #[error("Request transport error: {0}")]
    Transport(String),

    #[error("Failed to decode provider payload: {0}")]
    Decode(String),

    #[error("No {facet} data for {date}")]
    NoData {
        facet: &'static str,
        date: NaiveDate,
    },

    #[error("Failed to write daily summary: {0}")]
    AggregateWriteFailed(String),

    #[error("Credential decryption failed: {0}")]
    Decryption(#[from] CipherError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("A sync run is already in progress")]
    SyncInProgress,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Single-line message reported to a manual trigger.
    pub fn user_message(&self) -> String {
        match self {
            AppError::NotAuthorized | AppError::RefreshFailed(_) => {
                "Provider connection required: please reconnect your account".to_string()
            }
            AppError::InvalidState => "Authorization expired, please try connecting again".into(),
            AppError::SyncInProgress => "A sync is already running, try again shortly".into(),
            AppError::InsufficientTimeBudget { .. } | AppError::RateLimited { .. } => {
                "Provider rate limit reached, try again later".into()
            }
            AppError::Decryption(_) => {
                "Stored credentials could not be read, please reconnect".into()
            }
            AppError::Database(_) | AppError::AggregateWriteFailed(_) => {
                "Failed to save synced data".into()
            }
            AppError::Internal(_) => "Internal error".into(),
            other => format!("Sync failed: {}", other),
        }
    }

    /// True for errors that mean the user must (re)connect the provider.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            AppError::NotAuthorized | AppError::RefreshFailed(_) | AppError::Decryption(_)
        )
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;
