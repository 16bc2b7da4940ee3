//! Core sync engine: push pending check-ins, pull foreign ones.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use gatecheck_api::{CheckinSubmission, ServerApi, SubmitOutcome};
use gatecheck_common::{CheckinRecord, Result};
use gatecheck_store::CheckinLog;

use crate::conflict::reject_reason;
use crate::connectivity::Connectivity;
use crate::health::{HealthTracker, SyncHealth};
use crate::retry::{RetryConfig, RetryExecutor};

/// Configuration for the sync engine.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SyncConfig {
    /// Maximum number of retries for one server round trip.
    pub max_retries: u32,
    /// Initial delay between retries.
    pub retry_initial_delay: Duration,
    /// Consecutive failed cycles before the health indicator degrades.
    pub degraded_threshold: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_initial_delay: Duration::from_secs(1),
            degraded_threshold: 3,
        }
    }
}

/// Result of one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// The cycle did not run (offline, or another cycle was in flight).
    pub skipped: bool,
    /// Records accepted by the server this cycle.
    pub accepted: usize,
    /// Records terminally rejected this cycle.
    pub rejected: usize,
    /// Records left pending for the next cycle.
    pub deferred: usize,
    /// Foreign check-ins newly merged from the pull feed.
    pub merged: usize,
}

impl SyncOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            accepted: 0,
            rejected: 0,
            deferred: 0,
            merged: 0,
        }
    }
}

/// Reconciles the local check-in log with the authoritative server.
///
/// A cycle pushes pending records in local sequence order, applies the
/// server's verdicts, then pulls check-ins recorded by other devices since
/// the stored cursor. At most one cycle runs at a time; losing connectivity
/// mid-cycle cancels cleanly between records.
pub struct SyncEngine {
    api: Arc<dyn ServerApi>,
    log: Arc<CheckinLog>,
    connectivity: watch::Receiver<Connectivity>,
    retry: RetryExecutor,
    health: RwLock<HealthTracker>,
    /// Single-flight guard: held for the duration of a cycle.
    in_flight: Mutex<()>,
}

impl SyncEngine {
    /// Create a new sync engine.
    pub fn new(
        api: Arc<dyn ServerApi>,
        log: Arc<CheckinLog>,
        connectivity: watch::Receiver<Connectivity>,
        config: SyncConfig,
    ) -> Self {
        let retry_config = RetryConfig::new(config.max_retries)
            .with_initial_delay(config.retry_initial_delay);

        Self {
            api,
            log,
            connectivity,
            retry: RetryExecutor::new(retry_config),
            health: RwLock::new(HealthTracker::new(config.degraded_threshold)),
            in_flight: Mutex::new(()),
        }
    }

    /// Run one push/pull cycle.
    ///
    /// Returns a skipped outcome when the device is offline or another cycle
    /// is already in flight. Transient server failures leave the affected
    /// records pending and are absorbed into the health tracker; they are not
    /// errors.
    ///
    /// # Errors
    /// - Local storage or serialization failure
    pub async fn sync_cycle(&self) -> Result<SyncOutcome> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("Sync cycle already in progress; skipping");
            return Ok(SyncOutcome::skipped());
        };

        if !self.is_online() {
            debug!("Offline; sync cycle skipped");
            return Ok(SyncOutcome::skipped());
        }

        let start = Instant::now();
        let event = self.log.event().clone();
        info!(event = %event, "Starting sync cycle");

        let mut accepted = 0;
        let mut rejected = 0;
        let mut deferred = 0;
        let mut merged = 0;
        let mut transient: Option<String> = None;

        // 1. Push pending records, oldest first.
        let pending = self.log.pending()?;
        let total = pending.len();

        for (position, record) in pending.iter().enumerate() {
            if !self.is_online() {
                deferred = total - position;
                info!(deferred, "Connectivity lost mid-cycle; deferring remainder");
                break;
            }

            match self.submit(record).await {
                Ok(SubmitOutcome::Accepted) => {
                    self.log.mark_synced(record.sequence)?;
                    accepted += 1;
                }
                Ok(SubmitOutcome::Conflict { reason }) => {
                    self.log.mark_rejected(record.sequence, reject_reason(reason))?;
                    rejected += 1;
                }
                Err(err) if err.is_transient() => {
                    // Stays pending; later records keep their causal order
                    // by waiting for the next cycle too.
                    deferred = total - position;
                    warn!(sequence = record.sequence, error = %err, "Push deferred");
                    transient = Some(err.to_string());
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        // 2. Pull check-ins recorded by other devices.
        if transient.is_none() && self.is_online() {
            match self.pull().await {
                Ok(count) => merged = count,
                Err(err) if err.is_transient() => {
                    warn!(error = %err, "Pull deferred");
                    transient = Some(err.to_string());
                }
                Err(err) => return Err(err),
            }
        }

        {
            let mut health = self.health.write().await;
            match &transient {
                Some(message) => health.record_failure(message.clone()),
                None => health.record_success(),
            }
        }

        info!(
            event = %event,
            accepted,
            rejected,
            deferred,
            merged,
            duration = ?start.elapsed(),
            "Sync cycle completed"
        );

        Ok(SyncOutcome {
            skipped: false,
            accepted,
            rejected,
            deferred,
            merged,
        })
    }

    /// Current sync health.
    pub async fn health(&self) -> SyncHealth {
        self.health.read().await.health()
    }

    /// Failures since the last successful cycle.
    pub async fn consecutive_failures(&self) -> u32 {
        self.health.read().await.consecutive_failures()
    }

    fn is_online(&self) -> bool {
        *self.connectivity.borrow() == Connectivity::Online
    }

    async fn submit(&self, record: &CheckinRecord) -> Result<SubmitOutcome> {
        let submission = CheckinSubmission {
            attendee: record.attendee.clone(),
            method: record.method,
            recorded_at: record.recorded_at,
            device: record.device.clone(),
            sequence: record.sequence,
            override_reason: record.override_reason.clone(),
        };

        let api = self.api.clone();
        let event = self.log.event().clone();

        self.retry
            .execute(move || {
                let api = api.clone();
                let event = event.clone();
                let submission = submission.clone();
                async move { api.submit_checkin(&event, &submission).await }
            })
            .await
    }

    async fn pull(&self) -> Result<usize> {
        let cursor = self.log.cursor()?;
        let api = self.api.clone();
        let event = self.log.event().clone();

        let page = self
            .retry
            .execute(move || {
                let api = api.clone();
                let event = event.clone();
                async move { api.checkins_since(&event, cursor).await }
            })
            .await?;

        let mut merged = 0;
        for checkin in &page.checkins {
            if self.log.merge_remote(checkin)? {
                merged += 1;
            }
        }
        self.log.set_cursor(page.cursor)?;

        Ok(merged)
    }
}
