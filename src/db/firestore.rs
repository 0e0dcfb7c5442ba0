// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore adapter for the storage ports.
//!
//! Document IDs are the natural keys of each record:
//! - `credentials/{provider}`
//! - `daily_summaries/{YYYY-MM-DD}`
//! - `heart_rate_samples/{unix seconds}`
//! - `sleep_stages/{unix seconds}`
//! - `exercise_sessions/{external_id}`
//! - `data_quality/{YYYY-MM-DD}`
//!
//! so every write is an idempotent upsert.

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::db::{
    collections, CredentialStore, DailySummaryStore, DataQualityStore, ExerciseStore,
    HeartRateStore, SleepStageStore,
};
use crate::error::AppError;
use crate::models::{
    Credential, DailySummary, DataQuality, ExerciseSession, HeartRateSample, SleepStage,
};
use crate::time_utils::{date_key, format_utc_rfc3339};

const MAX_CONCURRENT_DB_OPS: usize = 50;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator does not validate credentials; skip ADC lookup entirely.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client. Every operation returns `AppError::Database`.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Upsert one document by ID.
    async fn put<T>(&self, collection: &str, id: &str, doc: &T) -> Result<(), AppError>
    where
        T: Serialize + for<'de> Deserialize<'de> + Sync + Send,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(id)
            .object(doc)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Upsert many documents with bounded concurrency.
    async fn put_many<T, F>(&self, collection: &str, docs: &[T], id_of: F) -> Result<(), AppError>
    where
        T: Serialize + for<'de> Deserialize<'de> + Sync + Send,
        F: Fn(&T) -> String,
    {
        let client = self.get_client()?;
        let keyed: Vec<(String, &T)> = docs.iter().map(|doc| (id_of(doc), doc)).collect();

        let writes: Vec<_> = keyed
            .into_iter()
            .map(|(doc_id, doc)| async move {
                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collection)
                    .document_id(&doc_id)
                    .object(doc)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;

                Ok::<_, AppError>(())
            })
            .collect();

        stream::iter(writes)
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<(), AppError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>, AppError>>()?;

        Ok(())
    }
}

// ─── Credentials ─────────────────────────────────────────────────

#[async_trait]
impl CredentialStore for FirestoreDb {
    async fn get(&self, provider: &str) -> Result<Option<Credential>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::CREDENTIALS)
            .obj()
            .one(provider)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn save(&self, credential: &Credential) -> Result<(), AppError> {
        self.put(collections::CREDENTIALS, &credential.provider, credential)
            .await
    }

    async fn delete(&self, provider: &str) -> Result<(), AppError> {
        self.get_client()?
            .fluent()
            .delete()
            .from(collections::CREDENTIALS)
            .document_id(provider)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

// ─── Daily Summaries ─────────────────────────────────────────────

#[async_trait]
impl DailySummaryStore for FirestoreDb {
    async fn upsert(&self, summary: &DailySummary) -> Result<(), AppError> {
        self.put(
            collections::DAILY_SUMMARIES,
            &date_key(summary.date),
            summary,
        )
        .await
    }

    async fn get_by_date(&self, date: NaiveDate) -> Result<Option<DailySummary>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::DAILY_SUMMARIES)
            .obj()
            .one(&date_key(date))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailySummary>, AppError> {
        let (from, to) = (date_key(from), date_key(to));
        self.get_client()?
            .fluent()
            .select()
            .from(collections::DAILY_SUMMARIES)
            .filter(move |q| {
                q.for_all([
                    q.field("date").greater_than_or_equal(from.clone()),
                    q.field("date").less_than_or_equal(to.clone()),
                ])
            })
            .order_by([("date", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

// ─── Heart Rate ──────────────────────────────────────────────────

#[async_trait]
impl HeartRateStore for FirestoreDb {
    async fn bulk_upsert(&self, samples: &[HeartRateSample]) -> Result<(), AppError> {
        self.put_many(collections::HEART_RATE, samples, |s| {
            s.time.timestamp().to_string()
        })
        .await
    }

    async fn list_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<HeartRateSample>, AppError> {
        let (from, to) = (format_utc_rfc3339(from), format_utc_rfc3339(to));
        self.get_client()?
            .fluent()
            .select()
            .from(collections::HEART_RATE)
            .filter(move |q| {
                q.for_all([
                    q.field("time").greater_than_or_equal(from.clone()),
                    q.field("time").less_than(to.clone()),
                ])
            })
            .order_by([("time", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

// ─── Sleep Stages ────────────────────────────────────────────────

#[async_trait]
impl SleepStageStore for FirestoreDb {
    async fn bulk_upsert(&self, stages: &[SleepStage]) -> Result<(), AppError> {
        self.put_many(collections::SLEEP_STAGES, stages, |s| {
            s.time.timestamp().to_string()
        })
        .await
    }

    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<SleepStage>, AppError> {
        let key = date_key(date);
        self.get_client()?
            .fluent()
            .select()
            .from(collections::SLEEP_STAGES)
            .filter(move |q| q.field("sleep_date").eq(key.clone()))
            .order_by([("time", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

// ─── Exercise Sessions ───────────────────────────────────────────

#[async_trait]
impl ExerciseStore for FirestoreDb {
    async fn upsert(&self, session: &ExerciseSession) -> Result<(), AppError> {
        // Document IDs cannot contain '/'
        let doc_id = urlencoding::encode(&session.external_id).into_owned();
        self.put(collections::EXERCISES, &doc_id, session).await
    }

    async fn list_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExerciseSession>, AppError> {
        let (from, to) = (format_utc_rfc3339(from), format_utc_rfc3339(to));
        self.get_client()?
            .fluent()
            .select()
            .from(collections::EXERCISES)
            .filter(move |q| {
                q.for_all([
                    q.field("started_at").greater_than_or_equal(from.clone()),
                    q.field("started_at").less_than(to.clone()),
                ])
            })
            .order_by([("started_at", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

// ─── Data Quality ────────────────────────────────────────────────

#[async_trait]
impl DataQualityStore for FirestoreDb {
    async fn upsert(&self, quality: &DataQuality) -> Result<(), AppError> {
        self.put(collections::DATA_QUALITY, &date_key(quality.date), quality)
            .await
    }

    async fn count_valid_days(&self, before: NaiveDate, window_days: u32) -> Result<u32, AppError> {
        let from = before
            .checked_sub_days(Days::new(window_days as u64))
            .unwrap_or(NaiveDate::MIN);
        let (from, before) = (date_key(from), date_key(before));

        let days: Vec<DataQuality> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::DATA_QUALITY)
            .filter(move |q| {
                q.for_all([
                    q.field("is_valid_day").eq(true),
                    q.field("date").greater_than_or_equal(from.clone()),
                    q.field("date").less_than(before.clone()),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(days.len() as u32)
    }
}
