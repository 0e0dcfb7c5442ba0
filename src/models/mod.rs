// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod biometrics;
pub mod credential;
pub mod daily_summary;
pub mod data_quality;
pub mod exercise;
pub mod heart_rate;
pub mod sleep;

pub use biometrics::{BreathingRateSummary, HrvSummary, SkinTemperature, Spo2Summary};
pub use credential::Credential;
pub use daily_summary::DailySummary;
pub use data_quality::DataQuality;
pub use exercise::ExerciseSession;
pub use heart_rate::HeartRateSample;
pub use sleep::{SleepData, SleepRecord, SleepStage, SleepStageKind, SleepType};
