// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Port the orchestrator uses to read biometric facets from a provider.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::AppError;
use crate::models::{
    BreathingRateSummary, DailySummary, ExerciseSession, HeartRateSample, HrvSummary,
    SkinTemperature, SleepData, Spo2Summary,
};
use crate::services::call_context::CallContext;

/// One independent read per facet for a calendar date.
#[async_trait]
pub trait BiometricsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn is_authorized(&self) -> Result<bool, AppError>;

    /// Activity block and resting heart rate. Required for a day to sync.
    async fn fetch_daily_summary(
        &self,
        date: NaiveDate,
        ctx: &CallContext,
    ) -> Result<DailySummary, AppError>;

    /// `Ok(None)` when the provider has no estimate for the date.
    async fn fetch_vo2_max(&self, date: NaiveDate, ctx: &CallContext)
        -> Result<Option<f64>, AppError>;

    async fn fetch_hrv(&self, date: NaiveDate, ctx: &CallContext) -> Result<HrvSummary, AppError>;

    async fn fetch_spo2(&self, date: NaiveDate, ctx: &CallContext)
        -> Result<Spo2Summary, AppError>;

    async fn fetch_breathing_rate(
        &self,
        date: NaiveDate,
        ctx: &CallContext,
    ) -> Result<BreathingRateSummary, AppError>;

    async fn fetch_skin_temperature(
        &self,
        date: NaiveDate,
        ctx: &CallContext,
    ) -> Result<SkinTemperature, AppError>;

    async fn fetch_sleep(&self, date: NaiveDate, ctx: &CallContext) -> Result<SleepData, AppError>;

    async fn fetch_heart_rate_intraday(
        &self,
        date: NaiveDate,
        ctx: &CallContext,
    ) -> Result<Vec<HeartRateSample>, AppError>;

    async fn fetch_exercise_sessions(
        &self,
        date: NaiveDate,
        ctx: &CallContext,
    ) -> Result<Vec<ExerciseSession>, AppError>;
}
