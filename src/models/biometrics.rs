// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Values returned by the enrichment facets, already in normalized units.

use serde::{Deserialize, Serialize};

/// Nightly heart-rate variability (ms).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HrvSummary {
    pub daily_rmssd: Option<f64>,
    pub deep_rmssd: Option<f64>,
}

/// Blood oxygen saturation (%).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Spo2Summary {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Breathing rate per sleep phase (breaths/min).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BreathingRateSummary {
    pub full_sleep: Option<f64>,
    pub deep_sleep: Option<f64>,
    pub light_sleep: Option<f64>,
    pub rem_sleep: Option<f64>,
}

/// Nightly skin temperature relative to the personal baseline (°C).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SkinTemperature {
    pub variation: Option<f64>,
}

/// `None` for the provider's zero sentinel.
pub fn non_zero(v: f64) -> Option<f64> {
    if v == 0.0 {
        None
    } else {
        Some(v)
    }
}
