// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fitbit payload shapes and their translation into normalized models.
//!
//! Fitbit reports local times in the user's profile timezone without an
//! offset; every mapper takes that offset explicitly.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::biometrics::non_zero;
use crate::models::{
    BreathingRateSummary, DailySummary, ExerciseSession, HeartRateSample, HrvSummary,
    SkinTemperature, SleepData, SleepRecord, SleepStage, SleepStageKind, SleepType, Spo2Summary,
};
use crate::time_utils::local_to_utc;

pub const PROVIDER_NAME: &str = "fitbit";

const SLEEP_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// ─── Payloads ────────────────────────────────────────────────────

/// `/1/user/-/activities/date/{date}.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivityResponse {
    pub summary: ActivitySummary,
    pub activities: Vec<ActivityLog>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivitySummary {
    pub steps: u32,
    pub calories_out: u32,
    #[serde(rename = "caloriesBMR")]
    pub calories_bmr: u32,
    pub floors: u32,
    pub resting_heart_rate: u32,
    pub active_zone_minutes: u32,
    pub distances: Vec<ActivityDistance>,
    pub sedentary_minutes: u32,
    pub lightly_active_minutes: u32,
    pub fairly_active_minutes: u32,
    pub very_active_minutes: u32,
    pub heart_rate_zones: Vec<HeartRateZone>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActivityDistance {
    pub activity: String,
    pub distance: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeartRateZone {
    pub name: String,
    pub minutes: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivityLog {
    pub log_id: i64,
    pub activity_name: String,
    pub start_time: String,
    pub duration: i64,
    pub calories: u32,
    pub average_heart_rate: Option<u32>,
    pub distance: f64,
    pub active_zone_minutes: Option<serde_json::Value>,
}

/// `/1.2/user/-/sleep/date/{date}.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SleepResponse {
    pub sleep: Vec<SleepLog>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SleepLog {
    pub log_id: i64,
    pub start_time: String,
    pub end_time: String,
    /// Milliseconds
    pub duration: i64,
    pub minutes_asleep: u32,
    pub minutes_awake: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_main_sleep: bool,
    pub levels: SleepLevels,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SleepLevels {
    pub summary: SleepLevelSummary,
    pub data: Vec<SleepLevelEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SleepLevelSummary {
    pub deep: Option<LevelMinutes>,
    pub light: Option<LevelMinutes>,
    pub rem: Option<LevelMinutes>,
    pub wake: Option<LevelMinutes>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct LevelMinutes {
    pub minutes: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SleepLevelEntry {
    pub date_time: String,
    pub level: String,
    pub seconds: u32,
}

/// `/1/user/-/activities/heart/date/{date}/1d/1min.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeartRateIntradayResponse {
    #[serde(rename = "activities-heart-intraday")]
    pub intraday: HeartRateDataset,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeartRateDataset {
    pub dataset: Vec<HeartRatePoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HeartRatePoint {
    /// `HH:MM:SS`
    pub time: String,
    pub value: u32,
}

/// `/1/user/-/hrv/date/{date}.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HrvResponse {
    pub hrv: Vec<HrvEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HrvEntry {
    pub value: HrvValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HrvValue {
    pub daily_rmssd: f64,
    pub deep_rmssd: f64,
}

/// `/1/user/-/spo2/date/{date}.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Spo2Response {
    pub value: Option<Spo2Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Spo2Value {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// `/1/user/-/br/date/{date}/all.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BreathingRateResponse {
    pub br: Vec<BreathingRateEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BreathingRateEntry {
    pub value: BreathingRateValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BreathingRateValue {
    pub full_sleep_summary: PhaseRate,
    pub deep_sleep_summary: PhaseRate,
    pub light_sleep_summary: PhaseRate,
    pub rem_sleep_summary: PhaseRate,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PhaseRate {
    pub breathing_rate: f64,
}

/// `/1/user/-/temp/skin/date/{date}.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SkinTempResponse {
    pub temp_skin: Vec<SkinTempEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SkinTempEntry {
    pub value: SkinTempValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SkinTempValue {
    pub nightly_relative: f64,
}

/// `/1/user/-/cardioscore/date/{date}.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CardioScoreResponse {
    pub cardio_score: Vec<CardioScoreEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CardioScoreEntry {
    pub value: CardioScoreValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CardioScoreValue {
    pub vo2_max: String,
}

// ─── Mapping ─────────────────────────────────────────────────────

/// Parse a VO2Max estimate such as `"42.5-46.4"` to its midpoint.
///
/// A single number is returned as-is. Empty or unparsable input is `None`.
pub fn parse_vo2_max_range(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match raw.split_once('-') {
        Some((low, high)) => {
            let low: f64 = low.trim().parse().ok()?;
            let high: f64 = high.trim().parse().ok()?;
            Some((low + high) / 2.0)
        }
        None => raw.parse().ok(),
    }
}

/// Build the activity block of a daily record.
pub fn map_activity_summary(
    resp: &ActivityResponse,
    date: NaiveDate,
    synced_at: DateTime<Utc>,
) -> DailySummary {
    let s = &resp.summary;
    let mut out = DailySummary::new(date, PROVIDER_NAME, synced_at);

    out.steps = s.steps;
    out.floors = s.floors;
    out.calories_total = s.calories_out;
    out.calories_bmr = s.calories_bmr;
    out.calories_active = s.calories_out.saturating_sub(s.calories_bmr);
    out.active_zone_min = s.active_zone_minutes;
    out.minutes_sedentary = s.sedentary_minutes;
    out.minutes_lightly = s.lightly_active_minutes;
    out.minutes_fairly = s.fairly_active_minutes;
    out.minutes_very = s.very_active_minutes;
    out.resting_hr = (s.resting_heart_rate > 0).then_some(s.resting_heart_rate);

    out.distance_km = s
        .distances
        .iter()
        .find(|d| d.activity == "total")
        .map(|d| d.distance)
        .unwrap_or(0.0);

    for zone in &s.heart_rate_zones {
        match zone.name.to_ascii_lowercase().as_str() {
            "out of range" => out.hr_zone_out_min = zone.minutes,
            "fat burn" => out.hr_zone_fat_min = zone.minutes,
            "cardio" => out.hr_zone_cardio_min = zone.minutes,
            "peak" => out.hr_zone_peak_min = zone.minutes,
            _ => {}
        }
    }

    out
}

fn parse_sleep_time(raw: &str, tz: FixedOffset) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, SLEEP_TIME_FORMAT)
        .ok()
        .and_then(|t| local_to_utc(t, tz))
}

/// Extract the main sleep log and its stage intervals.
///
/// Non-main (nap) logs are ignored. Stage entries with an unknown label or
/// an unparsable timestamp are dropped.
pub fn map_sleep(resp: &SleepResponse, date: NaiveDate, tz: FixedOffset) -> SleepData {
    let Some(main) = resp.sleep.iter().find(|s| s.is_main_sleep) else {
        return SleepData::default();
    };

    let record = match (
        parse_sleep_time(&main.start_time, tz),
        parse_sleep_time(&main.end_time, tz),
    ) {
        (Some(start_time), Some(end_time)) => {
            let levels = &main.levels.summary;
            Some(SleepRecord {
                log_id: main.log_id,
                start_time,
                end_time,
                duration_min: (main.duration / 60_000).max(0) as u32,
                minutes_asleep: main.minutes_asleep,
                minutes_awake: main.minutes_awake,
                sleep_type: SleepType::from_provider(&main.kind),
                deep_min: levels.deep.map(|l| l.minutes),
                light_min: levels.light.map(|l| l.minutes),
                rem_min: levels.rem.map(|l| l.minutes),
                wake_min: levels.wake.map(|l| l.minutes),
            })
        }
        _ => {
            tracing::warn!(log_id = main.log_id, "Unparsable main sleep timestamps");
            None
        }
    };

    let stages = main
        .levels
        .data
        .iter()
        .filter_map(|entry| {
            let stage = SleepStageKind::from_provider(&entry.level)?;
            let time = parse_sleep_time(&entry.date_time, tz)?;
            Some(SleepStage {
                time,
                stage,
                seconds: entry.seconds,
                log_id: main.log_id,
                sleep_date: date,
            })
        })
        .collect();

    SleepData { record, stages }
}

/// One-minute heart-rate samples for `date`.
pub fn map_hr_intraday(
    resp: &HeartRateIntradayResponse,
    date: NaiveDate,
    tz: FixedOffset,
) -> Vec<HeartRateSample> {
    resp.intraday
        .dataset
        .iter()
        .filter_map(|p| {
            let time = NaiveTime::parse_from_str(&p.time, "%H:%M:%S").ok()?;
            Some(HeartRateSample {
                time: local_to_utc(date.and_time(time), tz)?,
                bpm: p.value,
            })
        })
        .collect()
}

/// Exercise logs for `date`.
///
/// `startTime` is normally `HH:MM` local; a full RFC3339 timestamp is also
/// accepted, and anything else falls back to local midnight.
pub fn map_exercises(
    resp: &ActivityResponse,
    date: NaiveDate,
    tz: FixedOffset,
    synced_at: DateTime<Utc>,
) -> Vec<ExerciseSession> {
    let midnight = local_to_utc(date.and_time(NaiveTime::MIN), tz).unwrap_or(synced_at);

    resp.activities
        .iter()
        .map(|a| {
            let started_at = NaiveTime::parse_from_str(&a.start_time, "%H:%M")
                .ok()
                .and_then(|t| local_to_utc(date.and_time(t), tz))
                .or_else(|| {
                    DateTime::parse_from_rfc3339(&a.start_time)
                        .ok()
                        .map(|t| t.with_timezone(&Utc))
                })
                .unwrap_or(midnight);

            ExerciseSession {
                external_id: a.log_id.to_string(),
                activity_name: a.activity_name.clone(),
                started_at,
                duration_ms: a.duration,
                calories: a.calories,
                avg_hr: a.average_heart_rate.filter(|hr| *hr > 0),
                distance_km: a.distance,
                zone_minutes: a.active_zone_minutes.clone(),
                synced_at,
            }
        })
        .collect()
}

pub fn map_hrv(resp: &HrvResponse, date: NaiveDate) -> Result<HrvSummary, AppError> {
    let entry = resp
        .hrv
        .first()
        .ok_or(AppError::NoData { facet: "hrv", date })?;
    Ok(HrvSummary {
        daily_rmssd: non_zero(entry.value.daily_rmssd),
        deep_rmssd: non_zero(entry.value.deep_rmssd),
    })
}

pub fn map_spo2(resp: &Spo2Response, date: NaiveDate) -> Result<Spo2Summary, AppError> {
    let value = resp
        .value
        .as_ref()
        .ok_or(AppError::NoData { facet: "spo2", date })?;
    Ok(Spo2Summary {
        avg: non_zero(value.avg),
        min: non_zero(value.min),
        max: non_zero(value.max),
    })
}

pub fn map_breathing_rate(
    resp: &BreathingRateResponse,
    date: NaiveDate,
) -> Result<BreathingRateSummary, AppError> {
    let v = &resp
        .br
        .first()
        .ok_or(AppError::NoData {
            facet: "breathing_rate",
            date,
        })?
        .value;
    Ok(BreathingRateSummary {
        full_sleep: non_zero(v.full_sleep_summary.breathing_rate),
        deep_sleep: non_zero(v.deep_sleep_summary.breathing_rate),
        light_sleep: non_zero(v.light_sleep_summary.breathing_rate),
        rem_sleep: non_zero(v.rem_sleep_summary.breathing_rate),
    })
}

/// Relative skin temperature. Zero is a real reading here, not a sentinel.
pub fn map_skin_temp(resp: &SkinTempResponse, date: NaiveDate) -> Result<SkinTemperature, AppError> {
    let entry = resp.temp_skin.first().ok_or(AppError::NoData {
        facet: "skin_temperature",
        date,
    })?;
    Ok(SkinTemperature {
        variation: Some(entry.value.nightly_relative),
    })
}

pub fn map_vo2_max(resp: &CardioScoreResponse) -> Option<f64> {
    resp.cardio_score
        .first()
        .and_then(|e| parse_vo2_max_range(&e.value.vo2_max))
}
