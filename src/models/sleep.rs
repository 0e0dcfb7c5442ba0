// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sleep models: the main-sleep record and its stage intervals.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Normalized sleep stage vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepStageKind {
    Deep,
    Light,
    Rem,
    Wake,
}

impl SleepStageKind {
    /// Map a provider stage label onto the fixed vocabulary.
    ///
    /// Classic-mode logs report `asleep`/`restless`/`awake`; those fold into
    /// light and wake. Unknown labels yield `None`.
    pub fn from_provider(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "deep" => Some(Self::Deep),
            "light" | "asleep" => Some(Self::Light),
            "rem" => Some(Self::Rem),
            "wake" | "awake" | "restless" => Some(Self::Wake),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deep => "deep",
            Self::Light => "light",
            Self::Rem => "rem",
            Self::Wake => "wake",
        }
    }
}

/// How the provider scored the sleep log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepType {
    Stages,
    Classic,
}

impl SleepType {
    /// Anything other than `stages` is treated as classic.
    pub fn from_provider(label: &str) -> Self {
        if label == "stages" {
            Self::Stages
        } else {
            Self::Classic
        }
    }
}

/// One stage interval. Keyed by `time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepStage {
    pub time: DateTime<Utc>,
    pub stage: SleepStageKind,
    pub seconds: u32,
    pub log_id: i64,
    /// Calendar date the sleep log belongs to
    pub sleep_date: NaiveDate,
}

/// Summary of the main sleep log for a date.
#[derive(Debug, Clone, PartialEq)]
pub struct SleepRecord {
    pub log_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_min: u32,
    pub minutes_asleep: u32,
    pub minutes_awake: u32,
    pub sleep_type: SleepType,
    pub deep_min: Option<u32>,
    pub light_min: Option<u32>,
    pub rem_min: Option<u32>,
    pub wake_min: Option<u32>,
}

/// Result of the sleep facet: the main-sleep summary plus its intervals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SleepData {
    pub record: Option<SleepRecord>,
    pub stages: Vec<SleepStage>,
}
