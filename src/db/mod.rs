// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage ports consumed by the sync pipeline, plus their adapters.
//!
//! Every write is an upsert by natural key, so re-running a sync for an
//! overlapping range never creates duplicates.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::{
    Credential, DailySummary, DataQuality, ExerciseSession, HeartRateSample, SleepStage,
};

/// Collection names as constants.
pub mod collections {
    pub const CREDENTIALS: &str = "credentials";
    pub const DAILY_SUMMARIES: &str = "daily_summaries";
    pub const HEART_RATE: &str = "heart_rate_samples";
    pub const SLEEP_STAGES: &str = "sleep_stages";
    pub const EXERCISES: &str = "exercise_sessions";
    pub const DATA_QUALITY: &str = "data_quality";
}

/// Encrypted OAuth credentials, one per provider.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, provider: &str) -> Result<Option<Credential>, AppError>;
    /// Full replacement of the provider's credential.
    async fn save(&self, credential: &Credential) -> Result<(), AppError>;
    async fn delete(&self, provider: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait DailySummaryStore: Send + Sync {
    /// Insert or fully replace the record for `summary.date`.
    async fn upsert(&self, summary: &DailySummary) -> Result<(), AppError>;
    async fn get_by_date(&self, date: NaiveDate) -> Result<Option<DailySummary>, AppError>;
    /// Records with `from <= date <= to`, ascending.
    async fn list_range(&self, from: NaiveDate, to: NaiveDate)
        -> Result<Vec<DailySummary>, AppError>;
}

#[async_trait]
pub trait HeartRateStore: Send + Sync {
    async fn bulk_upsert(&self, samples: &[HeartRateSample]) -> Result<(), AppError>;
    /// Samples with `from <= time < to`, ascending.
    async fn list_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HeartRateSample>, AppError>;
}

#[async_trait]
pub trait SleepStageStore: Send + Sync {
    async fn bulk_upsert(&self, stages: &[SleepStage]) -> Result<(), AppError>;
    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<SleepStage>, AppError>;
}

#[async_trait]
pub trait ExerciseStore: Send + Sync {
    async fn upsert(&self, session: &ExerciseSession) -> Result<(), AppError>;
    /// Sessions with `from <= started_at < to`, ascending.
    async fn list_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExerciseSession>, AppError>;
}

#[async_trait]
pub trait DataQualityStore: Send + Sync {
    async fn upsert(&self, quality: &DataQuality) -> Result<(), AppError>;
    /// Valid days in `[before - window_days, before)`.
    async fn count_valid_days(&self, before: NaiveDate, window_days: u32)
        -> Result<u32, AppError>;
}

/// Storage ports written by one sync run.
#[derive(Clone)]
pub struct SyncStores {
    pub summaries: Arc<dyn DailySummaryStore>,
    pub heart_rate: Arc<dyn HeartRateStore>,
    pub sleep_stages: Arc<dyn SleepStageStore>,
    pub exercises: Arc<dyn ExerciseStore>,
    pub quality: Option<Arc<dyn DataQualityStore>>,
}

impl SyncStores {
    /// Use one adapter for every port.
    pub fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: DailySummaryStore
            + HeartRateStore
            + SleepStageStore
            + ExerciseStore
            + DataQualityStore
            + 'static,
    {
        Self {
            summaries: store.clone(),
            heart_rate: store.clone(),
            sleep_stages: store.clone(),
            exercises: store.clone(),
            quality: Some(store),
        }
    }
}
