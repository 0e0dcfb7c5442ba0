// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wearable_sync::config::Config;
use wearable_sync::db::{CredentialStore, FirestoreDb, MemoryStore};
use wearable_sync::error::AppError;
use wearable_sync::models::{
    BreathingRateSummary, Credential, DailySummary, ExerciseSession, HeartRateSample, HrvSummary,
    SkinTemperature, SleepData, SleepRecord, SleepStage, SleepStageKind, SleepType, Spo2Summary,
};
use wearable_sync::services::cipher::encrypt_tokens;
use wearable_sync::services::{
    BiometricsProvider, CallContext, FitbitClient, OAuthSession, OAuthSettings, TokenCipher,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Offline database: every write fails.
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

#[allow(dead_code)]
pub fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
}

// ═══════════════════════════════════════════════════════════════
// OAUTH / HTTP FIXTURES
// ═══════════════════════════════════════════════════════════════

#[allow(dead_code)]
pub fn test_cipher(config: &Config) -> Arc<TokenCipher> {
    Arc::new(TokenCipher::from_base64_key(&config.token_encryption_key).unwrap())
}

/// Store a credential for `fitbit` that expires `expires_in` from now.
#[allow(dead_code)]
pub async fn seed_credential(
    store: &dyn CredentialStore,
    cipher: &TokenCipher,
    access_token: &str,
    refresh_token: &str,
    expires_in: ChronoDuration,
) {
    let (access, refresh) = encrypt_tokens(cipher, access_token, refresh_token).unwrap();
    let cred = Credential {
        provider: "fitbit".to_string(),
        access_token_encrypted: access,
        refresh_token_encrypted: refresh,
        token_type: "Bearer".to_string(),
        expires_at: Utc::now() + expires_in,
        scopes: vec!["activity".to_string(), "heartrate".to_string()],
        extra: BTreeMap::new(),
        updated_at: Utc::now(),
    };
    store.save(&cred).await.unwrap();
}

/// Session, client and backing store wired against a mock provider.
#[allow(dead_code)]
pub struct TestSession {
    pub config: Config,
    pub store: Arc<MemoryStore>,
    pub cipher: Arc<TokenCipher>,
    pub session: Arc<OAuthSession>,
    pub client: FitbitClient,
}

#[allow(dead_code)]
impl TestSession {
    pub fn new(server: &MockServer) -> Self {
        let config = Config::test_default(&server.uri());
        let store = Arc::new(MemoryStore::new());
        let cipher = test_cipher(&config);
        let session = Arc::new(
            OAuthSession::new(
                OAuthSettings::from_config(&config),
                store.clone(),
                cipher.clone(),
            )
            .unwrap(),
        );
        let client = FitbitClient::new(&config, session.clone()).unwrap();

        Self {
            config,
            store,
            cipher,
            session,
            client,
        }
    }

    /// Seed a credential with the given access token and lifetime.
    pub async fn connected(self, access_token: &str, expires_in: ChronoDuration) -> Self {
        seed_credential(
            self.store.as_ref(),
            &self.cipher,
            access_token,
            "refresh-1",
            expires_in,
        )
        .await;
        self
    }

    pub async fn stored_access_token(&self) -> Option<String> {
        let cred = self.store.get("fitbit").await.unwrap()?;
        Some(self.cipher.decrypt_string(&cred.access_token_encrypted).unwrap())
    }
}

/// Mount a refresh-grant token endpoint that hands out `access_token`.
#[allow(dead_code)]
pub async fn mount_refresh(server: &MockServer, access_token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": access_token,
            "refresh_token": "refresh-2",
            "expires_in": 28800,
            "token_type": "Bearer",
            "user_id": "ABC123"
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub fn hrv_body() -> serde_json::Value {
    serde_json::json!({
        "hrv": [{ "dateTime": "2024-01-15", "value": { "dailyRmssd": 42.5, "deepRmssd": 38.1 } }]
    })
}

// ═══════════════════════════════════════════════════════════════
// FAKE PROVIDER
// ═══════════════════════════════════════════════════════════════

/// Deterministic provider with per-facet failure injection.
///
/// Facet names: `summary`, `vo2_max`, `hrv`, `spo2`, `breathing_rate`,
/// `skin_temperature`, `sleep`, `heart_rate`, `exercises`.
#[allow(dead_code)]
pub struct FakeProvider {
    failing: Mutex<HashSet<&'static str>>,
    pub calls: AtomicUsize,
    pub authorized: bool,
}

#[allow(dead_code)]
impl FakeProvider {
    pub fn new() -> Self {
        Self {
            failing: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
            authorized: true,
        }
    }

    pub fn failing(facets: &[&'static str]) -> Self {
        let fake = Self::new();
        fake.failing.lock().unwrap().extend(facets.iter().copied());
        fake
    }

    pub fn set_failing(&self, facets: &[&'static str]) {
        let mut failing = self.failing.lock().unwrap();
        failing.clear();
        failing.extend(facets.iter().copied());
    }

    fn check(&self, facet: &'static str) -> Result<(), AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(facet) {
            return Err(AppError::Remote {
                path: format!("/fake/{}", facet),
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn at(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_hms_opt(hour, minute, 0).unwrap())
    }
}

#[async_trait]
impl BiometricsProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn is_authorized(&self) -> Result<bool, AppError> {
        Ok(self.authorized)
    }

    async fn fetch_daily_summary(
        &self,
        date: NaiveDate,
        _ctx: &CallContext,
    ) -> Result<DailySummary, AppError> {
        self.check("summary")?;
        let mut s = DailySummary::new(date, "fake", Utc::now());
        s.steps = 8_500;
        s.distance_km = 6.2;
        s.floors = 9;
        s.calories_total = 2_300;
        s.calories_active = 650;
        s.calories_bmr = 1_650;
        s.resting_hr = Some(58);
        s.minutes_sedentary = 600;
        s.minutes_lightly = 180;
        s.minutes_fairly = 25;
        s.minutes_very = 15;
        s.active_zone_min = 55;
        Ok(s)
    }

    async fn fetch_vo2_max(
        &self,
        _date: NaiveDate,
        _ctx: &CallContext,
    ) -> Result<Option<f64>, AppError> {
        self.check("vo2_max")?;
        Ok(Some(44.5))
    }

    async fn fetch_hrv(&self, _date: NaiveDate, _ctx: &CallContext) -> Result<HrvSummary, AppError> {
        self.check("hrv")?;
        Ok(HrvSummary {
            daily_rmssd: Some(42.5),
            deep_rmssd: Some(38.1),
        })
    }

    async fn fetch_spo2(&self, _date: NaiveDate, _ctx: &CallContext) -> Result<Spo2Summary, AppError> {
        self.check("spo2")?;
        Ok(Spo2Summary {
            avg: Some(96.4),
            min: Some(93.0),
            max: Some(99.0),
        })
    }

    async fn fetch_breathing_rate(
        &self,
        _date: NaiveDate,
        _ctx: &CallContext,
    ) -> Result<BreathingRateSummary, AppError> {
        self.check("breathing_rate")?;
        Ok(BreathingRateSummary {
            full_sleep: Some(14.2),
            deep_sleep: Some(13.1),
            light_sleep: Some(14.5),
            rem_sleep: Some(15.0),
        })
    }

    async fn fetch_skin_temperature(
        &self,
        _date: NaiveDate,
        _ctx: &CallContext,
    ) -> Result<SkinTemperature, AppError> {
        self.check("skin_temperature")?;
        Ok(SkinTemperature {
            variation: Some(-0.3),
        })
    }

    async fn fetch_sleep(&self, date: NaiveDate, _ctx: &CallContext) -> Result<SleepData, AppError> {
        self.check("sleep")?;
        let start = Self::at(date, 0, 0) - ChronoDuration::hours(1);
        let record = SleepRecord {
            log_id: 7_001,
            start_time: start,
            end_time: start + ChronoDuration::minutes(450),
            duration_min: 450,
            minutes_asleep: 410,
            minutes_awake: 40,
            sleep_type: SleepType::Stages,
            deep_min: Some(80),
            light_min: Some(230),
            rem_min: Some(100),
            wake_min: Some(40),
        };
        let stages = [
            (0, SleepStageKind::Light),
            (30, SleepStageKind::Deep),
            (90, SleepStageKind::Rem),
            (150, SleepStageKind::Wake),
        ]
        .into_iter()
        .map(|(offset, stage)| SleepStage {
            time: start + ChronoDuration::minutes(offset),
            stage,
            seconds: 1_800,
            log_id: 7_001,
            sleep_date: date,
        })
        .collect();

        Ok(SleepData {
            record: Some(record),
            stages,
        })
    }

    async fn fetch_heart_rate_intraday(
        &self,
        date: NaiveDate,
        _ctx: &CallContext,
    ) -> Result<Vec<HeartRateSample>, AppError> {
        self.check("heart_rate")?;
        // One sample a minute from 06:00 to 21:00
        let start = Self::at(date, 6, 0);
        Ok((0..15 * 60)
            .map(|i| HeartRateSample {
                time: start + ChronoDuration::minutes(i),
                bpm: 60 + (i % 40) as u32,
            })
            .collect())
    }

    async fn fetch_exercise_sessions(
        &self,
        date: NaiveDate,
        _ctx: &CallContext,
    ) -> Result<Vec<ExerciseSession>, AppError> {
        self.check("exercises")?;
        Ok(vec![
            ExerciseSession {
                external_id: "fake-run".to_string(),
                activity_name: "Run".to_string(),
                started_at: Self::at(date, 7, 0),
                duration_ms: 1_800_000,
                calories: 320,
                avg_hr: Some(148),
                distance_km: 5.0,
                zone_minutes: None,
                synced_at: Utc::now(),
            },
            ExerciseSession {
                external_id: "fake-walk".to_string(),
                activity_name: "Walk".to_string(),
                started_at: Self::at(date, 18, 30),
                duration_ms: 2_400_000,
                calories: 140,
                avg_hr: None,
                distance_km: 2.4,
                zone_minutes: None,
                synced_at: Utc::now(),
            },
        ])
    }
}
