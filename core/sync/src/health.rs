//! Sync health tracking for the non-blocking status indicator.

use chrono::{DateTime, Utc};

/// User-visible sync status.
///
/// Degradation is a warning, never a modal: check-in throughput at the door
/// continues regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncHealth {
    /// Recent cycles are succeeding (or none have run yet).
    Healthy,
    /// Transient failures have exceeded the configured threshold.
    Degraded,
}

/// Counts consecutive transient sync failures.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    threshold: u32,
    consecutive_failures: u32,
    last_success: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl HealthTracker {
    /// Create a tracker that degrades after `threshold` consecutive failures.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
            last_success: None,
            last_error: None,
        }
    }

    /// Record a completed sync cycle.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_success = Some(Utc::now());
        self.last_error = None;
    }

    /// Record a cycle that failed transiently.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.consecutive_failures += 1;
        self.last_error = Some(error.into());
    }

    /// Current health.
    pub fn health(&self) -> SyncHealth {
        if self.consecutive_failures >= self.threshold {
            SyncHealth::Degraded
        } else {
            SyncHealth::Healthy
        }
    }

    /// Number of failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Time of the last successful cycle.
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    /// Message of the most recent failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
