// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exercise session model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A logged workout. Keyed by the provider's session ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSession {
    /// Provider log ID (document ID)
    pub external_id: String,
    pub activity_name: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub calories: u32,
    pub avg_hr: Option<u32>,
    pub distance_km: f64,
    /// Raw active-zone breakdown as reported by the provider
    pub zone_minutes: Option<serde_json::Value>,
    pub synced_at: DateTime<Utc>,
}
