// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic sync of "today".
//!
//! `Stopped -> Running -> Stopped`. Each tick takes the shared [`SyncGate`];
//! a tick that finds it held is dropped, never queued.

use chrono::FixedOffset;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{clamp_interval, Config};
use crate::error::AppError;
use crate::services::call_context::CallContext;
use crate::services::sync::{DailySync, SyncGate};
use crate::time_utils::today_in;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    /// Deadline for each triggered run
    pub run_timeout: Duration,
    /// Upper bound on `stop()`
    pub shutdown_timeout: Duration,
    pub reporting_offset: FixedOffset,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.sync_interval,
            run_timeout: config.sync_run_timeout,
            shutdown_timeout: config.shutdown_timeout,
            reporting_offset: config.reporting_offset,
        }
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    tracker: TaskTracker,
}

pub struct SyncScheduler {
    job: Arc<dyn DailySync>,
    gate: SyncGate,
    settings: SchedulerSettings,
    state: Mutex<Option<Running>>,
}

impl SyncScheduler {
    /// The interval is raised to the minimum floor if set lower.
    pub fn new(job: Arc<dyn DailySync>, gate: SyncGate, mut settings: SchedulerSettings) -> Self {
        settings.interval = clamp_interval(settings.interval);
        Self {
            job,
            gate,
            settings,
            state: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.settings.interval
    }

    /// Start ticking. The first tick fires one interval from now. Calling
    /// `start` on a running scheduler does nothing.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            tracing::debug!("Sync scheduler already running");
            return;
        }

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let period = self.settings.interval;

        let handle = tokio::spawn(tick_loop(
            self.job.clone(),
            self.gate.clone(),
            self.settings.clone(),
            cancel.clone(),
            tracker.clone(),
        ));

        tracing::info!(interval_secs = period.as_secs(), "Sync scheduler started");
        *state = Some(Running {
            cancel,
            handle,
            tracker,
        });
    }

    /// Cancel any in-flight run and wait for it and the timer to finish,
    /// bounded by the shutdown timeout.
    pub async fn stop(&self) -> Result<(), AppError> {
        self.stop_until(Instant::now() + self.settings.shutdown_timeout)
            .await
    }

    /// Like [`stop`](Self::stop), but bounded by a deadline shared with
    /// other shutdown work.
    pub async fn stop_until(&self, deadline: Instant) -> Result<(), AppError> {
        let Some(running) = self.state.lock().await.take() else {
            return Ok(());
        };

        running.cancel.cancel();
        running.tracker.close();

        let drained = tokio::time::timeout_at(deadline, async {
            if let Err(e) = running.handle.await {
                tracing::error!(error = %e, "Sync scheduler loop panicked");
            }
            running.tracker.wait().await;
        })
        .await;

        match drained {
            Ok(()) => {
                tracing::info!("Sync scheduler stopped");
                Ok(())
            }
            Err(_) => {
                tracing::warn!("Sync scheduler did not stop in time");
                Err(AppError::DeadlineExceeded)
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

async fn tick_loop(
    job: Arc<dyn DailySync>,
    gate: SyncGate,
    settings: SchedulerSettings,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    let period = settings.interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(permit) = gate.try_acquire() else {
                    tracing::debug!("Previous sync still running, skipping tick");
                    continue;
                };

                let date = today_in(settings.reporting_offset);
                let ctx = CallContext::new(cancel.child_token()).with_timeout(settings.run_timeout);
                let job = job.clone();

                tracker.spawn(async move {
                    let _permit = permit;
                    run_scheduled(job.as_ref(), date, &ctx).await;
                });
            }
        }
    }
}

async fn run_scheduled(job: &dyn DailySync, date: chrono::NaiveDate, ctx: &CallContext) {
    match ctx.run(job.is_authorized()).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::info!("Provider not connected, skipping scheduled sync");
            return;
        }
        Err(AppError::Cancelled) => return,
        Err(e) => {
            tracing::warn!(error = %e, "Authorization check failed, skipping scheduled sync");
            return;
        }
    }

    match job.sync_date(date, ctx).await {
        Ok(report) => {
            tracing::debug!(date = %date, absent = ?report.absent(), "Scheduled sync finished");
        }
        Err(AppError::Cancelled) => {
            tracing::info!(date = %date, "Scheduled sync cancelled");
        }
        Err(e) if e.requires_reauthorization() => {
            tracing::warn!(date = %date, error = %e, "Provider connection lost, reconnect required");
        }
        Err(e) => {
            tracing::error!(date = %date, error = %e, "Scheduled sync failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sync::SyncReport;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Offset, Utc};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Unauthorized {
        syncs: AtomicUsize,
    }

    #[async_trait]
    impl DailySync for Unauthorized {
        async fn is_authorized(&self) -> Result<bool, AppError> {
            Ok(false)
        }

        async fn sync_date(
            &self,
            date: NaiveDate,
            _ctx: &CallContext,
        ) -> Result<SyncReport, AppError> {
            self.syncs.fetch_add(1, Ordering::SeqCst);
            Ok(SyncReport {
                date,
                facets: BTreeMap::new(),
                heart_rate_samples: 0,
                sleep_stages: 0,
                exercises: 0,
            })
        }
    }

    /// Authorization check that never resolves, as with a hung store read.
    struct HungAuthorization;

    #[async_trait]
    impl DailySync for HungAuthorization {
        async fn is_authorized(&self) -> Result<bool, AppError> {
            std::future::pending().await
        }

        async fn sync_date(
            &self,
            _date: NaiveDate,
            _ctx: &CallContext,
        ) -> Result<SyncReport, AppError> {
            unreachable!("authorization check never completes")
        }
    }

    fn settings(interval: Duration) -> SchedulerSettings {
        SchedulerSettings {
            interval,
            run_timeout: Duration::from_secs(120),
            shutdown_timeout: Duration::from_secs(5),
            reporting_offset: Utc.fix(),
        }
    }

    #[test]
    fn test_interval_floor() {
        let job = Arc::new(Unauthorized {
            syncs: AtomicUsize::new(0),
        });
        let s = SyncScheduler::new(job, SyncGate::new(), settings(Duration::from_secs(30)));
        assert_eq!(s.interval(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_ticks_are_skipped() {
        let job = Arc::new(Unauthorized {
            syncs: AtomicUsize::new(0),
        });
        let s = SyncScheduler::new(job.clone(), SyncGate::new(), settings(Duration::from_secs(300)));

        s.start().await;
        assert!(s.is_running().await);
        tokio::time::sleep(Duration::from_secs(16 * 60)).await;

        assert_eq!(job.syncs.load(Ordering::SeqCst), 0);
        s.stop().await.unwrap();
        assert!(!s.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_hung_authorization_check() {
        let s = SyncScheduler::new(
            Arc::new(HungAuthorization),
            SyncGate::new(),
            settings(Duration::from_secs(300)),
        );

        s.start().await;
        tokio::time::sleep(Duration::from_secs(6 * 60)).await;

        let stopping = Instant::now();
        s.stop().await.unwrap();
        assert!(stopping.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let job = Arc::new(Unauthorized {
            syncs: AtomicUsize::new(0),
        });
        let s = SyncScheduler::new(job, SyncGate::new(), settings(Duration::from_secs(300)));
        s.stop().await.unwrap();
        assert!(!s.is_running().await);
    }
}
