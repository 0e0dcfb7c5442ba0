// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory storage adapter.
//!
//! Backs local runs without a database and the test suite. Each map is
//! keyed by the same natural key the Firestore adapter uses as document ID.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use dashmap::DashMap;

use crate::db::{
    CredentialStore, DailySummaryStore, DataQualityStore, ExerciseStore, HeartRateStore,
    SleepStageStore,
};
use crate::error::AppError;
use crate::models::{
    Credential, DailySummary, DataQuality, ExerciseSession, HeartRateSample, SleepStage,
};

#[derive(Default)]
pub struct MemoryStore {
    credentials: DashMap<String, Credential>,
    summaries: DashMap<NaiveDate, DailySummary>,
    heart_rate: DashMap<DateTime<Utc>, HeartRateSample>,
    sleep_stages: DashMap<DateTime<Utc>, SleepStage>,
    exercises: DashMap<String, ExerciseSession>,
    quality: DashMap<NaiveDate, DataQuality>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total stored rows per collection, for tests and diagnostics.
    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            summaries: self.summaries.len(),
            heart_rate: self.heart_rate.len(),
            sleep_stages: self.sleep_stages.len(),
            exercises: self.exercises.len(),
            quality: self.quality.len(),
        }
    }

    pub fn get_quality(&self, date: NaiveDate) -> Option<DataQuality> {
        self.quality.get(&date).map(|q| q.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub summaries: usize,
    pub heart_rate: usize,
    pub sleep_stages: usize,
    pub exercises: usize,
    pub quality: usize,
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, provider: &str) -> Result<Option<Credential>, AppError> {
        Ok(self.credentials.get(provider).map(|c| c.clone()))
    }

    async fn save(&self, credential: &Credential) -> Result<(), AppError> {
        self.credentials
            .insert(credential.provider.clone(), credential.clone());
        Ok(())
    }

    async fn delete(&self, provider: &str) -> Result<(), AppError> {
        self.credentials.remove(provider);
        Ok(())
    }
}

#[async_trait]
impl DailySummaryStore for MemoryStore {
    async fn upsert(&self, summary: &DailySummary) -> Result<(), AppError> {
        self.summaries.insert(summary.date, summary.clone());
        Ok(())
    }

    async fn get_by_date(&self, date: NaiveDate) -> Result<Option<DailySummary>, AppError> {
        Ok(self.summaries.get(&date).map(|s| s.clone()))
    }

    async fn list_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailySummary>, AppError> {
        let mut out: Vec<DailySummary> = self
            .summaries
            .iter()
            .filter(|e| *e.key() >= from && *e.key() <= to)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|s| s.date);
        Ok(out)
    }
}

#[async_trait]
impl HeartRateStore for MemoryStore {
    async fn bulk_upsert(&self, samples: &[HeartRateSample]) -> Result<(), AppError> {
        for sample in samples {
            self.heart_rate.insert(sample.time, sample.clone());
        }
        Ok(())
    }

    async fn list_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HeartRateSample>, AppError> {
        let mut out: Vec<HeartRateSample> = self
            .heart_rate
            .iter()
            .filter(|e| *e.key() >= from && *e.key() < to)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|s| s.time);
        Ok(out)
    }
}

#[async_trait]
impl SleepStageStore for MemoryStore {
    async fn bulk_upsert(&self, stages: &[SleepStage]) -> Result<(), AppError> {
        for stage in stages {
            self.sleep_stages.insert(stage.time, stage.clone());
        }
        Ok(())
    }

    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<SleepStage>, AppError> {
        let mut out: Vec<SleepStage> = self
            .sleep_stages
            .iter()
            .filter(|e| e.value().sleep_date == date)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|s| s.time);
        Ok(out)
    }
}

#[async_trait]
impl ExerciseStore for MemoryStore {
    async fn upsert(&self, session: &ExerciseSession) -> Result<(), AppError> {
        self.exercises
            .insert(session.external_id.clone(), session.clone());
        Ok(())
    }

    async fn list_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExerciseSession>, AppError> {
        let mut out: Vec<ExerciseSession> = self
            .exercises
            .iter()
            .filter(|e| e.value().started_at >= from && e.value().started_at < to)
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|s| s.started_at);
        Ok(out)
    }
}

#[async_trait]
impl DataQualityStore for MemoryStore {
    async fn upsert(&self, quality: &DataQuality) -> Result<(), AppError> {
        self.quality.insert(quality.date, quality.clone());
        Ok(())
    }

    async fn count_valid_days(&self, before: NaiveDate, window_days: u32) -> Result<u32, AppError> {
        let from = before
            .checked_sub_days(Days::new(window_days as u64))
            .unwrap_or(NaiveDate::MIN);
        let count = self
            .quality
            .iter()
            .filter(|e| *e.key() >= from && *e.key() < before && e.value().is_valid_day)
            .count();
        Ok(count as u32)
    }
}
