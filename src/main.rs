// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Wearable-sync service
//!
//! Keeps today's biometrics in sync on a fixed cadence until SIGINT or
//! SIGTERM.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wearable_sync::{
    config::{Config, StorageBackend},
    db::{CredentialStore, FirestoreDb, MemoryStore, SyncStores},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        backend = ?config.storage_backend,
        interval_secs = config.sync_interval.as_secs(),
        "Starting wearable-sync"
    );

    let (credentials, stores): (Arc<dyn CredentialStore>, SyncStores) =
        match config.storage_backend {
            StorageBackend::Firestore => {
                let db = Arc::new(FirestoreDb::new(&config.gcp_project_id).await?);
                (db.clone(), SyncStores::from_backend(db))
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on exit");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), SyncStores::from_backend(store))
            }
        };

    let state = AppState::build(config, credentials, stores)?;

    if !state.auth_status().await?.authorized {
        let request = state.connect()?;
        tracing::warn!(url = %request.url, "Provider not connected, authorize at this URL");
    }

    state.scheduler.start().await;

    wait_for_signal().await;
    tracing::info!("Shutdown signal received");

    state.shutdown().await?;
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in ["wearable_sync=debug", "info"] {
        match directive.parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("Invalid log directive {}: {}", directive, e),
        }
    }

    tracing_subscriber::registry().with(filter).with(format).init();
}
