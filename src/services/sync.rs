// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Daily sync use case.
//!
//! One run for one date:
//! 1. Fetch the daily summary (required).
//! 2. Enrich with HRV, SpO2, breathing rate, skin temperature, VO2Max and
//!    the main-sleep summary. Each is best effort.
//! 3. Upsert the aggregate (required).
//! 4. Fetch and upsert heart-rate samples, sleep stages and exercise
//!    sessions, then the data-quality assessment. Each is best effort.
//!
//! Only steps 1 and 3 can fail the run. Everything else is logged and
//! recorded in the [`SyncReport`].

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::Instrument;

use crate::db::SyncStores;
use crate::error::AppError;
use crate::models::data_quality::BASELINE_WINDOW_DAYS;
use crate::models::{DailySummary, DataQuality, SleepStage};
use crate::services::call_context::CallContext;
use crate::services::provider::BiometricsProvider;

/// Best-effort steps of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Facet {
    Hrv,
    Spo2,
    BreathingRate,
    SkinTemperature,
    Vo2Max,
    Sleep,
    HeartRateIntraday,
    SleepStages,
    Exercises,
    DataQuality,
}

impl Facet {
    pub fn as_str(&self) -> &'static str {
        match self {
            Facet::Hrv => "hrv",
            Facet::Spo2 => "spo2",
            Facet::BreathingRate => "breathing_rate",
            Facet::SkinTemperature => "skin_temperature",
            Facet::Vo2Max => "vo2_max",
            Facet::Sleep => "sleep",
            Facet::HeartRateIntraday => "heart_rate_intraday",
            Facet::SleepStages => "sleep_stages",
            Facet::Exercises => "exercises",
            Facet::DataQuality => "data_quality",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacetOutcome {
    Applied,
    /// Attempted but left out, with the reason
    Absent(String),
}

impl FacetOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FacetOutcome::Applied)
    }
}

/// What one successful run attempted and what it stored.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub date: NaiveDate,
    pub facets: BTreeMap<Facet, FacetOutcome>,
    pub heart_rate_samples: usize,
    pub sleep_stages: usize,
    pub exercises: usize,
}

impl SyncReport {
    pub fn outcome(&self, facet: Facet) -> Option<&FacetOutcome> {
        self.facets.get(&facet)
    }

    /// Facets that were attempted but are absent.
    pub fn absent(&self) -> Vec<Facet> {
        self.facets
            .iter()
            .filter(|(_, o)| !o.is_applied())
            .map(|(f, _)| *f)
            .collect()
    }
}

/// Starts from the required summary and folds in each optional facet.
struct AggregateBuilder {
    date: NaiveDate,
    summary: DailySummary,
    facets: BTreeMap<Facet, FacetOutcome>,
}

impl AggregateBuilder {
    fn new(summary: DailySummary) -> Self {
        Self {
            date: summary.date,
            summary,
            facets: BTreeMap::new(),
        }
    }

    /// Apply `result` if it succeeded; otherwise log and leave the facet out.
    fn enrich<T, R>(
        &mut self,
        facet: Facet,
        result: Result<T, AppError>,
        apply: impl FnOnce(&mut DailySummary, T) -> R,
    ) -> Option<R> {
        match result {
            Ok(value) => {
                self.facets.insert(facet, FacetOutcome::Applied);
                Some(apply(&mut self.summary, value))
            }
            Err(e) => {
                self.absent(facet, &e);
                None
            }
        }
    }

    fn absent(&mut self, facet: Facet, reason: &dyn fmt::Display) {
        tracing::warn!(
            date = %self.date,
            facet = %facet,
            error = %reason,
            "Facet skipped"
        );
        self.facets
            .insert(facet, FacetOutcome::Absent(reason.to_string()));
    }

    fn record(&mut self, facet: Facet) {
        self.facets.insert(facet, FacetOutcome::Applied);
    }
}

/// A job the scheduler and manual trigger can run for one date.
#[async_trait]
pub trait DailySync: Send + Sync {
    async fn is_authorized(&self) -> Result<bool, AppError>;

    async fn sync_date(&self, date: NaiveDate, ctx: &CallContext) -> Result<SyncReport, AppError>;
}

/// Produces and stores one daily aggregate per run.
pub struct SyncOrchestrator {
    provider: Arc<dyn BiometricsProvider>,
    stores: SyncStores,
}

impl SyncOrchestrator {
    pub fn new(provider: Arc<dyn BiometricsProvider>, stores: SyncStores) -> Self {
        Self { provider, stores }
    }

    async fn run(&self, date: NaiveDate, ctx: &CallContext) -> Result<SyncReport, AppError> {
        // ─── Step 1: required summary ────────────────────────────
        let summary = self
            .provider
            .fetch_daily_summary(date, ctx)
            .await
            .inspect_err(|e| {
                tracing::error!(date = %date, error = %e, "Daily summary fetch failed")
            })?;

        // ─── Step 2: enrichment ──────────────────────────────────
        let mut agg = AggregateBuilder::new(summary);
        let p = &self.provider;

        let hrv = p.fetch_hrv(date, ctx).await;
        agg.enrich(Facet::Hrv, hrv, |s, v| s.apply_hrv(v));

        let spo2 = p.fetch_spo2(date, ctx).await;
        agg.enrich(Facet::Spo2, spo2, |s, v| s.apply_spo2(v));

        let br = p.fetch_breathing_rate(date, ctx).await;
        agg.enrich(Facet::BreathingRate, br, |s, v| s.apply_breathing_rate(v));

        let temp = p.fetch_skin_temperature(date, ctx).await;
        agg.enrich(Facet::SkinTemperature, temp, |s, v| {
            s.apply_skin_temperature(v)
        });

        let vo2 = p.fetch_vo2_max(date, ctx).await.and_then(|v| {
            v.ok_or(AppError::NoData {
                facet: "vo2_max",
                date,
            })
        });
        agg.enrich(Facet::Vo2Max, vo2, |s, v| s.vo2_max = Some(v));

        let sleep = p.fetch_sleep(date, ctx).await;
        let stages: Option<Vec<SleepStage>> = agg.enrich(Facet::Sleep, sleep, |s, data| {
            if let Some(record) = &data.record {
                s.apply_sleep(record);
            }
            data.stages
        });

        // ─── Step 3: aggregate upsert ────────────────────────────
        ctx.ensure_active()?;

        self.stores
            .summaries
            .upsert(&agg.summary)
            .await
            .map_err(|e| {
                tracing::error!(date = %date, error = %e, "Daily summary upsert failed");
                AppError::AggregateWriteFailed(e.to_string())
            })?;

        // ─── Step 4: detail series ───────────────────────────────
        let (heart_rate_fetched, heart_rate_samples) = self.sync_heart_rate(&mut agg, ctx).await;
        let sleep_stages = self.sync_sleep_stages(&mut agg, stages).await;
        let exercises = self.sync_exercises(&mut agg, ctx).await;
        // Wear time reflects what the device recorded, not what was stored
        self.sync_quality(&mut agg, heart_rate_fetched).await;

        let report = SyncReport {
            date,
            facets: agg.facets,
            heart_rate_samples,
            sleep_stages,
            exercises,
        };

        tracing::info!(
            date = %date,
            heart_rate_samples,
            sleep_stages,
            exercises,
            absent = ?report.absent(),
            "Sync completed"
        );
        Ok(report)
    }

    /// Returns `(fetched, written)` sample counts.
    async fn sync_heart_rate(
        &self,
        agg: &mut AggregateBuilder,
        ctx: &CallContext,
    ) -> (usize, usize) {
        let samples = match self.provider.fetch_heart_rate_intraday(agg.date, ctx).await {
            Ok(samples) => samples,
            Err(e) => {
                agg.absent(Facet::HeartRateIntraday, &e);
                return (0, 0);
            }
        };

        match self.stores.heart_rate.bulk_upsert(&samples).await {
            Ok(()) => {
                agg.record(Facet::HeartRateIntraday);
                (samples.len(), samples.len())
            }
            Err(e) => {
                agg.absent(Facet::HeartRateIntraday, &e);
                (samples.len(), 0)
            }
        }
    }

    async fn sync_sleep_stages(
        &self,
        agg: &mut AggregateBuilder,
        stages: Option<Vec<SleepStage>>,
    ) -> usize {
        let Some(stages) = stages else {
            agg.absent(Facet::SleepStages, &"sleep fetch failed");
            return 0;
        };

        match self.stores.sleep_stages.bulk_upsert(&stages).await {
            Ok(()) => {
                agg.record(Facet::SleepStages);
                stages.len()
            }
            Err(e) => {
                agg.absent(Facet::SleepStages, &e);
                0
            }
        }
    }

    async fn sync_exercises(&self, agg: &mut AggregateBuilder, ctx: &CallContext) -> usize {
        let sessions = match self.provider.fetch_exercise_sessions(agg.date, ctx).await {
            Ok(sessions) => sessions,
            Err(e) => {
                agg.absent(Facet::Exercises, &e);
                return 0;
            }
        };

        let mut written = 0;
        let mut last_error = None;
        for session in &sessions {
            match self.stores.exercises.upsert(session).await {
                Ok(()) => written += 1,
                Err(e) => {
                    tracing::warn!(
                        external_id = %session.external_id,
                        error = %e,
                        "Exercise session upsert failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            None => agg.record(Facet::Exercises),
            Some(e) => agg.absent(
                Facet::Exercises,
                &format!("{} of {} writes failed: {}", sessions.len() - written, sessions.len(), e),
            ),
        }
        written
    }

    async fn sync_quality(&self, agg: &mut AggregateBuilder, hr_sample_count: usize) {
        let Some(store) = &self.stores.quality else {
            return;
        };

        let baseline_days = match store.count_valid_days(agg.date, BASELINE_WINDOW_DAYS).await {
            Ok(n) => n,
            Err(e) => {
                agg.absent(Facet::DataQuality, &e);
                return;
            }
        };

        let quality = DataQuality::assess(
            &agg.summary,
            hr_sample_count as u32,
            baseline_days,
            Utc::now(),
        );

        match store.upsert(&quality).await {
            Ok(()) => {
                tracing::debug!(
                    date = %agg.date,
                    confidence = quality.confidence_score,
                    valid_day = quality.is_valid_day,
                    "Data quality recorded"
                );
                agg.record(Facet::DataQuality);
            }
            Err(e) => agg.absent(Facet::DataQuality, &e),
        }
    }
}

#[async_trait]
impl DailySync for SyncOrchestrator {
    async fn is_authorized(&self) -> Result<bool, AppError> {
        self.provider.is_authorized().await
    }

    async fn sync_date(&self, date: NaiveDate, ctx: &CallContext) -> Result<SyncReport, AppError> {
        let span = tracing::info_span!("sync", date = %date, provider = self.provider.name());
        self.run(date, ctx).instrument(span).await
    }
}

/// Single-slot gate shared by every trigger source. At most one run holds
/// it; other triggers are refused rather than queued.
#[derive(Clone, Default)]
pub struct SyncGate {
    slot: Arc<Mutex<()>>,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot if free. The run ends when the guard is dropped.
    pub fn try_acquire(&self) -> Option<OwnedMutexGuard<()>> {
        self.slot.clone().try_lock_owned().ok()
    }

    pub fn is_busy(&self) -> bool {
        self.slot.try_lock().is_err()
    }
}

/// Run `job` for `date` unless another run holds the gate.
pub async fn run_guarded(
    gate: &SyncGate,
    job: &dyn DailySync,
    date: NaiveDate,
    ctx: &CallContext,
) -> Result<SyncReport, AppError> {
    let _permit = gate.try_acquire().ok_or(AppError::SyncInProgress)?;
    job.sync_date(date, ctx).await
}
