//! Session configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use gatecheck_store::DEFAULT_SEARCH_LIMIT;
use gatecheck_sync::SyncConfig;

/// Configuration for an event session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interval between periodic sync cycles while online.
    pub sync_interval: Duration,
    /// Sync engine tuning (retries, degraded threshold).
    pub sync: SyncConfig,
    /// Bound on attendee search results.
    pub search_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            sync: SyncConfig::default(),
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}
