// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-day data quality assessment.
//!
//! Computed after every sync from the stored aggregate and the number of
//! heart-rate samples, so downstream analytics can weight or skip a day.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::DailySummary;

/// Window (days) used to count valid days for the personal baseline.
pub const BASELINE_WINDOW_DAYS: u32 = 60;

/// Minimum wear time for a day to count toward the baseline.
const VALID_DAY_MIN_WEAR_HOURS: f64 = 10.0;

/// Wear time that counts as full coverage for the confidence score.
const FULL_WEAR_HOURS: f64 = 16.0;

const ALL_METRICS: [&str; 7] = ["hr", "hrv", "spo2", "sleep", "activity", "br", "temp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlausibilityStatus {
    Pass,
    FailLow,
    FailHigh,
    Missing,
}

impl PlausibilityStatus {
    fn check(value: Option<f64>, min: f64, max: f64) -> Self {
        match value {
            None => Self::Missing,
            Some(v) if v == 0.0 => Self::Missing,
            Some(v) if v < min => Self::FailLow,
            Some(v) if v > max => Self::FailHigh,
            Some(_) => Self::Pass,
        }
    }

    fn is_failure(&self) -> bool {
        matches!(self, Self::FailLow | Self::FailHigh)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineMaturity {
    Cold,
    Warming,
    Mature,
}

impl BaselineMaturity {
    pub fn from_valid_days(days: u32) -> Self {
        match days {
            d if d < 14 => Self::Cold,
            d if d < BASELINE_WINDOW_DAYS => Self::Warming,
            _ => Self::Mature,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.4 {
            Self::Low
        } else if score <= 0.7 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

/// Quality record for one date. Keyed by `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub date: NaiveDate,
    pub wear_time_hours: f64,
    pub hr_sample_count: u32,
    /// Fraction of tracked metrics present, 0.0 to 1.0
    pub completeness: f64,
    pub metrics_present: Vec<String>,
    pub metrics_missing: Vec<String>,
    pub plausibility_flags: BTreeMap<String, PlausibilityStatus>,
    pub plausibility_pass: bool,
    pub is_valid_day: bool,
    pub baseline_days: u32,
    pub baseline_maturity: BaselineMaturity,
    pub confidence_score: f64,
    pub confidence_level: ConfidenceLevel,
    pub computed_at: DateTime<Utc>,
}

impl DataQuality {
    /// Assess a synced day.
    ///
    /// `hr_sample_count` is the number of one-minute heart-rate samples
    /// written for the date; `baseline_days` is the count of valid days in
    /// the preceding window.
    pub fn assess(
        summary: &DailySummary,
        hr_sample_count: u32,
        baseline_days: u32,
        computed_at: DateTime<Utc>,
    ) -> Self {
        let plausibility_flags = check_plausibility(summary);
        let plausibility_pass = !plausibility_flags.values().any(|s| s.is_failure());

        let (metrics_present, metrics_missing) = check_completeness(summary);
        let completeness = metrics_present.len() as f64 / ALL_METRICS.len() as f64;

        let wear_time_hours = hr_sample_count as f64 / 60.0;
        let is_valid_day = wear_time_hours >= VALID_DAY_MIN_WEAR_HOURS && plausibility_pass;

        let wear_norm = (wear_time_hours / FULL_WEAR_HOURS).min(1.0);
        let baseline_norm = (baseline_days as f64 / BASELINE_WINDOW_DAYS as f64).min(1.0);
        let confidence_score = 0.4 * completeness + 0.3 * wear_norm + 0.3 * baseline_norm;

        Self {
            date: summary.date,
            wear_time_hours,
            hr_sample_count,
            completeness,
            metrics_present,
            metrics_missing,
            plausibility_flags,
            plausibility_pass,
            is_valid_day,
            baseline_days,
            baseline_maturity: BaselineMaturity::from_valid_days(baseline_days),
            confidence_score,
            confidence_level: ConfidenceLevel::from_score(confidence_score),
            computed_at,
        }
    }
}

/// Physiological range checks. Absent values are `Missing`, not failures.
pub fn check_plausibility(s: &DailySummary) -> BTreeMap<String, PlausibilityStatus> {
    let mut flags = BTreeMap::new();
    flags.insert(
        "resting_hr".to_string(),
        PlausibilityStatus::check(s.resting_hr.map(f64::from), 30.0, 100.0),
    );
    flags.insert(
        "hrv_rmssd".to_string(),
        PlausibilityStatus::check(s.hrv_daily_rmssd, 5.0, 300.0),
    );
    flags.insert(
        "spo2".to_string(),
        PlausibilityStatus::check(s.spo2_avg, 70.0, 100.0),
    );
    flags.insert(
        "skin_temp".to_string(),
        PlausibilityStatus::check(s.skin_temp_variation, -5.0, 5.0),
    );
    flags.insert(
        "br".to_string(),
        PlausibilityStatus::check(s.br_full_sleep, 4.0, 40.0),
    );
    flags
}

/// Split tracked metrics into present and missing, in a fixed order.
pub fn check_completeness(s: &DailySummary) -> (Vec<String>, Vec<String>) {
    let present = |metric: &str| match metric {
        "hr" => s.resting_hr.is_some_and(|v| v != 0),
        "hrv" => s.hrv_daily_rmssd.is_some(),
        "spo2" => s.spo2_avg.is_some(),
        "sleep" => s.sleep_duration_min.is_some_and(|v| v != 0),
        "activity" => s.steps != 0,
        "br" => s.br_full_sleep.is_some(),
        "temp" => s.skin_temp_variation.is_some(),
        _ => false,
    };

    let (p, m): (Vec<&str>, Vec<&str>) = ALL_METRICS.into_iter().partition(|m| present(*m));
    (
        p.into_iter().map(String::from).collect(),
        m.into_iter().map(String::from).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_summary() -> DailySummary {
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let mut s = DailySummary::new(date, "fitbit", Utc::now());
        s.steps = 9000;
        s.resting_hr = Some(58);
        s
    }

    #[test]
    fn test_plausibility_missing_is_not_failure() {
        let s = make_summary();
        let flags = check_plausibility(&s);
        assert_eq!(flags["resting_hr"], PlausibilityStatus::Pass);
        assert_eq!(flags["hrv_rmssd"], PlausibilityStatus::Missing);

        let q = DataQuality::assess(&s, 0, 0, Utc::now());
        assert!(q.plausibility_pass);
    }

    #[test]
    fn test_plausibility_out_of_range() {
        let mut s = make_summary();
        s.resting_hr = Some(20);
        s.spo2_avg = Some(101.0);
        let flags = check_plausibility(&s);
        assert_eq!(flags["resting_hr"], PlausibilityStatus::FailLow);
        assert_eq!(flags["spo2"], PlausibilityStatus::FailHigh);

        let q = DataQuality::assess(&s, 16 * 60, 0, Utc::now());
        assert!(!q.plausibility_pass);
        assert!(!q.is_valid_day, "implausible day must not be valid");
    }

    #[test]
    fn test_completeness_fraction() {
        let mut s = make_summary();
        s.hrv_daily_rmssd = Some(45.0);
        let (present, missing) = check_completeness(&s);
        assert_eq!(present, vec!["hr", "hrv", "activity"]);
        assert_eq!(missing.len(), 4);

        let q = DataQuality::assess(&s, 0, 0, Utc::now());
        assert!((q.completeness - 3.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_score_and_levels() {
        let mut s = make_summary();
        s.hrv_daily_rmssd = Some(45.0);
        s.spo2_avg = Some(96.0);
        s.sleep_duration_min = Some(420);
        s.br_full_sleep = Some(14.0);
        s.skin_temp_variation = Some(-0.3);

        // Full completeness, 16h wear, mature baseline
        let q = DataQuality::assess(&s, 16 * 60, 60, Utc::now());
        assert!((q.confidence_score - 1.0).abs() < 1e-9);
        assert_eq!(q.confidence_level, ConfidenceLevel::High);
        assert_eq!(q.baseline_maturity, BaselineMaturity::Mature);
        assert!(q.is_valid_day);

        // No wear, cold baseline: 0.4 * 1.0
        let q = DataQuality::assess(&s, 0, 0, Utc::now());
        assert!((q.confidence_score - 0.4).abs() < 1e-9);
        assert_eq!(q.confidence_level, ConfidenceLevel::Medium);
        assert_eq!(q.baseline_maturity, BaselineMaturity::Cold);
    }

    #[test]
    fn test_baseline_maturity_boundaries() {
        assert_eq!(BaselineMaturity::from_valid_days(13), BaselineMaturity::Cold);
        assert_eq!(BaselineMaturity::from_valid_days(14), BaselineMaturity::Warming);
        assert_eq!(BaselineMaturity::from_valid_days(59), BaselineMaturity::Warming);
        assert_eq!(BaselineMaturity::from_valid_days(60), BaselineMaturity::Mature);
    }
}
