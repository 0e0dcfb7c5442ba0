// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wearable-sync: pulls daily biometrics from a wearable provider.
//!
//! This crate holds the OAuth credential lifecycle, a rate-limit aware
//! provider client, the partial-failure tolerant daily sync, and the
//! periodic scheduler that drives it.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;

use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use config::Config;
use db::{CredentialStore, SyncStores};
use error::AppError;
use services::sync::run_guarded;
use services::{
    AuthorizationRequest, BiometricsProvider, CallContext, DailySync, FitbitClient, OAuthSession,
    OAuthSettings, SchedulerSettings, SyncGate, SyncOrchestrator, SyncScheduler, TokenCipher,
};
use time_utils::today_in;

/// Deadline for the sync started right after a successful connect.
const INITIAL_SYNC_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Result of a manual sync: one pass/fail line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub date: NaiveDate,
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthStatus {
    pub authorized: bool,
    pub sync_in_progress: bool,
    pub scheduler_running: bool,
}

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub session: Arc<OAuthSession>,
    pub job: Arc<dyn DailySync>,
    pub gate: SyncGate,
    pub scheduler: SyncScheduler,
    shutdown: CancellationToken,
    background: TaskTracker,
}

impl AppState {
    /// Wire the Fitbit client, orchestrator and scheduler over the given stores.
    pub fn build(
        config: Config,
        credentials: Arc<dyn CredentialStore>,
        stores: SyncStores,
    ) -> Result<Self, AppError> {
        let cipher = TokenCipher::from_base64_key(&config.token_encryption_key)
            .map_err(|e| AppError::Config(format!("TOKEN_ENCRYPTION_KEY: {}", e)))?;

        let session = Arc::new(OAuthSession::new(
            OAuthSettings::from_config(&config),
            credentials,
            Arc::new(cipher),
        )?);

        let provider: Arc<dyn BiometricsProvider> =
            Arc::new(FitbitClient::new(&config, session.clone())?);
        let job: Arc<dyn DailySync> = Arc::new(SyncOrchestrator::new(provider, stores));

        Ok(Self::from_parts(config, session, job))
    }

    /// Assemble from already-built parts.
    pub fn from_parts(config: Config, session: Arc<OAuthSession>, job: Arc<dyn DailySync>) -> Self {
        let gate = SyncGate::new();
        let scheduler = SyncScheduler::new(
            job.clone(),
            gate.clone(),
            SchedulerSettings::from_config(&config),
        );

        Self {
            config,
            session,
            job,
            gate,
            scheduler,
            shutdown: CancellationToken::new(),
            background: TaskTracker::new(),
        }
    }

    fn request_context(&self, timeout: Duration) -> CallContext {
        CallContext::new(self.shutdown.child_token()).with_timeout(timeout)
    }

    // ─── Operational Surface ─────────────────────────────────────

    /// Run one sync now. Refused while another run (scheduled or manual)
    /// holds the gate.
    pub async fn sync_now(&self, date: Option<NaiveDate>) -> SyncOutcome {
        let date = date.unwrap_or_else(|| today_in(self.config.reporting_offset));
        let ctx = self.request_context(self.config.sync_run_timeout);

        match run_guarded(&self.gate, self.job.as_ref(), date, &ctx).await {
            Ok(_) => SyncOutcome {
                date,
                ok: true,
                message: format!("Synced {}", date),
            },
            Err(e) => {
                tracing::warn!(date = %date, error = %e, "Manual sync failed");
                SyncOutcome {
                    date,
                    ok: false,
                    message: e.user_message(),
                }
            }
        }
    }

    pub async fn auth_status(&self) -> Result<AuthStatus, AppError> {
        Ok(AuthStatus {
            authorized: self.session.is_authorized().await?,
            sync_in_progress: self.gate.is_busy(),
            scheduler_running: self.scheduler.is_running().await,
        })
    }

    /// Begin the authorization flow.
    pub fn connect(&self) -> Result<AuthorizationRequest, AppError> {
        self.session.authorization_url()
    }

    /// Finish the authorization flow, then start an initial background sync.
    pub async fn complete_connect(&self, code: &str, state: &str) -> Result<(), AppError> {
        let ctx = self.request_context(self.config.provider_request_timeout);
        self.session.exchange_code(code, state, &ctx).await?;
        self.spawn_initial_sync();
        Ok(())
    }

    fn spawn_initial_sync(&self) {
        let Some(permit) = self.gate.try_acquire() else {
            tracing::debug!("Sync already running, skipping initial sync");
            return;
        };

        let job = self.job.clone();
        let date = today_in(self.config.reporting_offset);
        let ctx = self.request_context(INITIAL_SYNC_TIMEOUT);

        self.background.spawn(async move {
            let _permit = permit;
            if let Err(e) = job.sync_date(date, &ctx).await {
                tracing::warn!(date = %date, error = %e, "Initial sync after connect failed");
            }
        });
    }

    /// Revoke and delete the credential. Destructive and irreversible.
    pub async fn disconnect(&self) -> Result<(), AppError> {
        let ctx = self.request_context(self.config.provider_request_timeout);
        self.session.disconnect(&ctx).await
    }

    /// Cancel everything in flight and wait for it. The scheduler and the
    /// background syncs share one shutdown budget.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        let deadline = Instant::now() + self.config.shutdown_timeout;
        self.shutdown.cancel();
        let stopped = self.scheduler.stop_until(deadline).await;

        self.background.close();
        if tokio::time::timeout_at(deadline, self.background.wait())
            .await
            .is_err()
        {
            tracing::warn!("Background sync did not finish before shutdown");
            return Err(AppError::DeadlineExceeded);
        }
        stopped
    }
}
