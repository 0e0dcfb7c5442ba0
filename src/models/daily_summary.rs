// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Daily aggregate record.
//!
//! One document per calendar date. Only the activity block is guaranteed;
//! every enrichment facet may be absent when its fetch failed.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::biometrics::{BreathingRateSummary, HrvSummary, SkinTemperature, Spo2Summary};
use crate::models::sleep::{SleepRecord, SleepType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    /// Date key (also used as document ID)
    pub date: NaiveDate,
    pub provider: String,

    // ─── Heart Rate ──────────────────────────────────────────────
    pub resting_hr: Option<u32>,
    #[serde(default)]
    pub avg_hr: Option<f64>,
    #[serde(default)]
    pub max_hr: Option<u32>,

    // ─── Enrichment Facets ───────────────────────────────────────
    #[serde(default)]
    pub hrv_daily_rmssd: Option<f64>,
    #[serde(default)]
    pub hrv_deep_rmssd: Option<f64>,
    #[serde(default)]
    pub spo2_avg: Option<f64>,
    #[serde(default)]
    pub spo2_min: Option<f64>,
    #[serde(default)]
    pub spo2_max: Option<f64>,
    #[serde(default)]
    pub br_full_sleep: Option<f64>,
    #[serde(default)]
    pub br_deep_sleep: Option<f64>,
    #[serde(default)]
    pub br_light_sleep: Option<f64>,
    #[serde(default)]
    pub br_rem_sleep: Option<f64>,
    #[serde(default)]
    pub skin_temp_variation: Option<f64>,
    #[serde(default)]
    pub vo2_max: Option<f64>,

    // ─── Sleep ───────────────────────────────────────────────────
    #[serde(default)]
    pub sleep_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sleep_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sleep_duration_min: Option<u32>,
    #[serde(default)]
    pub sleep_minutes_asleep: Option<u32>,
    #[serde(default)]
    pub sleep_minutes_awake: Option<u32>,
    #[serde(default)]
    pub sleep_type: Option<SleepType>,
    #[serde(default)]
    pub sleep_deep_min: Option<u32>,
    #[serde(default)]
    pub sleep_light_min: Option<u32>,
    #[serde(default)]
    pub sleep_rem_min: Option<u32>,
    #[serde(default)]
    pub sleep_wake_min: Option<u32>,

    // ─── Activity ────────────────────────────────────────────────
    pub steps: u32,
    pub distance_km: f64,
    pub floors: u32,
    pub calories_total: u32,
    pub calories_active: u32,
    pub calories_bmr: u32,
    pub active_zone_min: u32,
    pub minutes_sedentary: u32,
    pub minutes_lightly: u32,
    pub minutes_fairly: u32,
    pub minutes_very: u32,

    // ─── Heart Rate Zones ────────────────────────────────────────
    pub hr_zone_out_min: u32,
    pub hr_zone_fat_min: u32,
    pub hr_zone_cardio_min: u32,
    pub hr_zone_peak_min: u32,

    pub synced_at: DateTime<Utc>,
}

impl DailySummary {
    /// Empty record for `date` with only the activity block zeroed.
    pub fn new(date: NaiveDate, provider: &str, synced_at: DateTime<Utc>) -> Self {
        Self {
            date,
            provider: provider.to_string(),
            resting_hr: None,
            avg_hr: None,
            max_hr: None,
            hrv_daily_rmssd: None,
            hrv_deep_rmssd: None,
            spo2_avg: None,
            spo2_min: None,
            spo2_max: None,
            br_full_sleep: None,
            br_deep_sleep: None,
            br_light_sleep: None,
            br_rem_sleep: None,
            skin_temp_variation: None,
            vo2_max: None,
            sleep_start: None,
            sleep_end: None,
            sleep_duration_min: None,
            sleep_minutes_asleep: None,
            sleep_minutes_awake: None,
            sleep_type: None,
            sleep_deep_min: None,
            sleep_light_min: None,
            sleep_rem_min: None,
            sleep_wake_min: None,
            steps: 0,
            distance_km: 0.0,
            floors: 0,
            calories_total: 0,
            calories_active: 0,
            calories_bmr: 0,
            active_zone_min: 0,
            minutes_sedentary: 0,
            minutes_lightly: 0,
            minutes_fairly: 0,
            minutes_very: 0,
            hr_zone_out_min: 0,
            hr_zone_fat_min: 0,
            hr_zone_cardio_min: 0,
            hr_zone_peak_min: 0,
            synced_at,
        }
    }

    pub fn apply_hrv(&mut self, hrv: HrvSummary) {
        self.hrv_daily_rmssd = hrv.daily_rmssd;
        self.hrv_deep_rmssd = hrv.deep_rmssd;
    }

    pub fn apply_spo2(&mut self, spo2: Spo2Summary) {
        self.spo2_avg = spo2.avg;
        self.spo2_min = spo2.min;
        self.spo2_max = spo2.max;
    }

    pub fn apply_breathing_rate(&mut self, br: BreathingRateSummary) {
        self.br_full_sleep = br.full_sleep;
        self.br_deep_sleep = br.deep_sleep;
        self.br_light_sleep = br.light_sleep;
        self.br_rem_sleep = br.rem_sleep;
    }

    pub fn apply_skin_temperature(&mut self, temp: SkinTemperature) {
        self.skin_temp_variation = temp.variation;
    }

    /// Copy the main-sleep timing and stage minutes into the record.
    pub fn apply_sleep(&mut self, rec: &SleepRecord) {
        self.sleep_start = Some(rec.start_time);
        self.sleep_end = Some(rec.end_time);
        self.sleep_duration_min = Some(rec.duration_min);
        self.sleep_minutes_asleep = Some(rec.minutes_asleep);
        self.sleep_minutes_awake = Some(rec.minutes_awake);
        self.sleep_type = Some(rec.sleep_type);
        self.sleep_deep_min = rec.deep_min;
        self.sleep_light_min = rec.light_min;
        self.sleep_rem_min = rec.rem_min;
        self.sleep_wake_min = rec.wake_min;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_facets_overwrite_only_their_fields() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut s = DailySummary::new(date, "fitbit", Utc::now());
        s.steps = 8000;

        s.apply_hrv(HrvSummary {
            daily_rmssd: Some(41.2),
            deep_rmssd: None,
        });
        s.apply_spo2(Spo2Summary {
            avg: Some(96.0),
            min: Some(93.5),
            max: Some(99.0),
        });

        assert_eq!(s.steps, 8000);
        assert_eq!(s.hrv_daily_rmssd, Some(41.2));
        assert_eq!(s.hrv_deep_rmssd, None);
        assert_eq!(s.spo2_min, Some(93.5));
        assert!(s.br_full_sleep.is_none());
    }

    #[test]
    fn test_date_serializes_as_key() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let s = DailySummary::new(date, "fitbit", Utc::now());
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["date"], "2024-06-01");
    }
}
