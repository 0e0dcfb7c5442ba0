// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - the sync pipeline.

pub mod call_context;
pub mod cipher;
pub mod fitbit;
pub mod mapper;
pub mod oauth;
pub mod provider;
pub mod retry;
pub mod scheduler;
pub mod sync;

pub use call_context::CallContext;
pub use cipher::{CipherError, TokenCipher};
pub use fitbit::FitbitClient;
pub use oauth::{AuthorizationRequest, OAuthSession, OAuthSettings};
pub use provider::BiometricsProvider;
pub use scheduler::{SchedulerSettings, SyncScheduler};
pub use sync::{DailySync, Facet, FacetOutcome, SyncGate, SyncOrchestrator, SyncReport};

/// Client identifier sent with every provider request.
pub const USER_AGENT: &str = concat!("wearable-sync/", env!("CARGO_PKG_VERSION"));
