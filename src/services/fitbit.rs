// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fitbit Web API client.
//!
//! Handles:
//! - Pre-flight token refresh before every request
//! - One forced refresh and retry on 401
//! - One bounded, cancellable wait and retry on 429
//! - Payload normalization via [`crate::services::mapper`]

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{
    BreathingRateSummary, DailySummary, ExerciseSession, HeartRateSample, HrvSummary,
    SkinTemperature, SleepData, Spo2Summary,
};
use crate::services::call_context::CallContext;
use crate::services::mapper::{self, PROVIDER_NAME};
use crate::services::oauth::OAuthSession;
use crate::services::provider::BiometricsProvider;
use crate::services::retry::{next_action, AttemptState, Failure, NextAction};
use crate::services::USER_AGENT;
use crate::time_utils::date_key;

const RATE_LIMIT_REMAINING_HEADER: &str = "Fitbit-Rate-Limit-Remaining";

/// Fitbit API client.
#[derive(Clone)]
pub struct FitbitClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<OAuthSession>,
    /// Offset of the user's Fitbit profile timezone
    tz: FixedOffset,
}

impl FitbitClient {
    pub fn new(config: &Config, session: Arc<OAuthSession>) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.provider_request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.fitbit_api_base_url.trim_end_matches('/').to_string(),
            session,
            tz: config.reporting_offset,
        })
    }

    /// Authenticated GET with auth-expiry and rate-limit recovery.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        ctx: &CallContext,
    ) -> Result<T, AppError> {
        let url = format!("{}{}", self.base_url, path);
        let mut state = AttemptState::default();
        let mut token = self.session.access_token(ctx).await?;

        loop {
            ctx.ensure_active()?;

            let response = ctx
                .run(async {
                    self.http
                        .get(&url)
                        .bearer_auth(&token)
                        .send()
                        .await
                        .map_err(|e| AppError::Transport(format!("{}: {}", path, e)))
                })
                .await?;

            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            match next_action(status, retry_after.as_deref(), ctx.remaining(), &state) {
                NextAction::Accept => {
                    if let Some(remaining) = response
                        .headers()
                        .get(RATE_LIMIT_REMAINING_HEADER)
                        .and_then(|v| v.to_str().ok())
                    {
                        tracing::debug!(path, remaining, "Fitbit rate limit remaining");
                    }

                    let body = ctx
                        .run(async {
                            response
                                .bytes()
                                .await
                                .map_err(|e| AppError::Transport(format!("{}: {}", path, e)))
                        })
                        .await?;

                    return serde_json::from_slice(&body)
                        .map_err(|e| AppError::Decode(format!("{}: {}", path, e)));
                }
                NextAction::RefreshAndRetry => {
                    tracing::info!(path, "Access token rejected, forcing refresh");
                    state.refreshed = true;
                    token = self.session.force_refresh(&token, ctx).await?;
                }
                NextAction::WaitAndRetry(wait) => {
                    tracing::warn!(path, wait_secs = wait.as_secs(), "Fitbit rate limit hit (429)");
                    state.waited = true;
                    ctx.sleep(wait).await?;
                    // Pre-flight again: the wait may have crossed the expiry margin
                    token = self.session.access_token(ctx).await?;
                }
                NextAction::Fail(failure) => {
                    let body = ctx
                        .run(async { Ok(response.text().await.unwrap_or_default()) })
                        .await
                        .unwrap_or_default();
                    return Err(failure_to_error(failure, path, body));
                }
            }
        }
    }
}

fn failure_to_error(failure: Failure, path: &str, body: String) -> AppError {
    let path = path.to_string();
    match failure {
        Failure::AuthRejected => AppError::AuthRejected { path },
        Failure::RateLimited => AppError::RateLimited { path },
        Failure::InsufficientBudget { wait, remaining } => {
            tracing::warn!(
                path,
                wait_secs = wait.as_secs(),
                remaining_secs = remaining.as_secs(),
                "Rate-limit wait exceeds deadline, failing fast"
            );
            AppError::InsufficientTimeBudget { wait, remaining }
        }
        Failure::Remote { status } => AppError::Remote { path, status, body },
    }
}

#[async_trait]
impl BiometricsProvider for FitbitClient {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn is_authorized(&self) -> Result<bool, AppError> {
        self.session.is_authorized().await
    }

    async fn fetch_daily_summary(
        &self,
        date: NaiveDate,
        ctx: &CallContext,
    ) -> Result<DailySummary, AppError> {
        let path = format!("/1/user/-/activities/date/{}.json", date_key(date));
        let resp: mapper::ActivityResponse = self.get_json(&path, ctx).await?;
        Ok(mapper::map_activity_summary(&resp, date, Utc::now()))
    }

    async fn fetch_vo2_max(
        &self,
        date: NaiveDate,
        ctx: &CallContext,
    ) -> Result<Option<f64>, AppError> {
        let path = format!("/1/user/-/cardioscore/date/{}.json", date_key(date));
        let resp: mapper::CardioScoreResponse = self.get_json(&path, ctx).await?;
        Ok(mapper::map_vo2_max(&resp))
    }

    async fn fetch_hrv(&self, date: NaiveDate, ctx: &CallContext) -> Result<HrvSummary, AppError> {
        let path = format!("/1/user/-/hrv/date/{}.json", date_key(date));
        let resp: mapper::HrvResponse = self.get_json(&path, ctx).await?;
        mapper::map_hrv(&resp, date)
    }

    async fn fetch_spo2(
        &self,
        date: NaiveDate,
        ctx: &CallContext,
    ) -> Result<Spo2Summary, AppError> {
        let path = format!("/1/user/-/spo2/date/{}.json", date_key(date));
        let resp: mapper::Spo2Response = self.get_json(&path, ctx).await?;
        mapper::map_spo2(&resp, date)
    }

    async fn fetch_breathing_rate(
        &self,
        date: NaiveDate,
        ctx: &CallContext,
    ) -> Result<BreathingRateSummary, AppError> {
        let path = format!("/1/user/-/br/date/{}/all.json", date_key(date));
        let resp: mapper::BreathingRateResponse = self.get_json(&path, ctx).await?;
        mapper::map_breathing_rate(&resp, date)
    }

    async fn fetch_skin_temperature(
        &self,
        date: NaiveDate,
        ctx: &CallContext,
    ) -> Result<SkinTemperature, AppError> {
        let path = format!("/1/user/-/temp/skin/date/{}.json", date_key(date));
        let resp: mapper::SkinTempResponse = self.get_json(&path, ctx).await?;
        mapper::map_skin_temp(&resp, date)
    }

    async fn fetch_sleep(&self, date: NaiveDate, ctx: &CallContext) -> Result<SleepData, AppError> {
        let path = format!("/1.2/user/-/sleep/date/{}.json", date_key(date));
        let resp: mapper::SleepResponse = self.get_json(&path, ctx).await?;
        Ok(mapper::map_sleep(&resp, date, self.tz))
    }

    async fn fetch_heart_rate_intraday(
        &self,
        date: NaiveDate,
        ctx: &CallContext,
    ) -> Result<Vec<HeartRateSample>, AppError> {
        let path = format!(
            "/1/user/-/activities/heart/date/{}/1d/1min.json",
            date_key(date)
        );
        let resp: mapper::HeartRateIntradayResponse = self.get_json(&path, ctx).await?;
        Ok(mapper::map_hr_intraday(&resp, date, self.tz))
    }

    async fn fetch_exercise_sessions(
        &self,
        date: NaiveDate,
        ctx: &CallContext,
    ) -> Result<Vec<ExerciseSession>, AppError> {
        let path = format!("/1/user/-/activities/date/{}.json", date_key(date));
        let resp: mapper::ActivityResponse = self.get_json(&path, ctx).await?;
        Ok(mapper::map_exercises(&resp, date, self.tz, Utc::now()))
    }
}
