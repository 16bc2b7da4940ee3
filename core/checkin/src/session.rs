//! Event session: one device serving one event.
//!
//! The session wires the attendee cache, the check-in log, the sync engine
//! and the scheduler together, and is the surface the surrounding product
//! calls. Everything it returns is a typed result; nothing here panics on
//! bad input or a dead network.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use gatecheck_api::ServerApi;
use gatecheck_common::{AttendeeId, AttendeeRecord, CheckinRecord, DeviceId, EventId, EventStats, Result};
use gatecheck_store::{AttendeeCache, CheckinLog, KeyValueStore};
use gatecheck_sync::{
    Connectivity, ConnectivityMonitor, SyncEngine, SyncHealth, SyncOutcome, SyncScheduler,
};

use crate::config::SessionConfig;
use crate::operations::{CheckinOperations, CheckinOutcome};
use crate::stats::StatsAggregator;

/// Active session for one `(event, device)` pair.
pub struct EventSession {
    event: EventId,
    api: Arc<dyn ServerApi>,
    cache: Arc<AttendeeCache>,
    log: Arc<CheckinLog>,
    operations: CheckinOperations,
    stats: StatsAggregator,
    monitor: Arc<ConnectivityMonitor>,
    engine: Arc<SyncEngine>,
    scheduler: Option<SyncScheduler>,
    config: SessionConfig,
}

impl EventSession {
    /// Open a session over a local store and a server endpoint.
    ///
    /// `initial` seeds the connectivity flag from the platform's reachability
    /// probe. The sync scheduler is not started until
    /// [`start_scheduler`](Self::start_scheduler) is called.
    ///
    /// # Errors
    /// - Storage failure while restoring persisted state
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn ServerApi>,
        event: EventId,
        device: DeviceId,
        initial: Connectivity,
        config: SessionConfig,
    ) -> Result<Self> {
        let cache = Arc::new(AttendeeCache::open(store.clone(), event.clone())?);
        let log = Arc::new(CheckinLog::new(store, event.clone(), device.clone()));
        let monitor = Arc::new(ConnectivityMonitor::new(initial));
        let engine = Arc::new(SyncEngine::new(
            api.clone(),
            log.clone(),
            monitor.subscribe(),
            config.sync.clone(),
        ));
        let operations =
            CheckinOperations::new(cache.clone(), log.clone(), config.search_limit);
        let stats = StatsAggregator::new(cache.clone(), log.clone());

        info!(event = %event, device = %device, "Event session opened");
        Ok(Self {
            event,
            api,
            cache,
            log,
            operations,
            stats,
            monitor,
            engine,
            scheduler: None,
            config,
        })
    }

    /// The connectivity monitor, for the platform reachability layer to feed.
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    /// The event this session serves.
    pub fn event(&self) -> &EventId {
        &self.event
    }

    /// The device running this session.
    pub fn device(&self) -> &DeviceId {
        self.log.device()
    }

    /// Start the background sync scheduler.
    ///
    /// Runs cycles on reconnect, on the configured interval while online,
    /// and on [`force_sync`](Self::force_sync) requests.
    pub fn start_scheduler(&mut self) -> JoinHandle<()> {
        let (scheduler, handle) =
            SyncScheduler::new(self.config.sync_interval, self.monitor.subscribe());
        self.scheduler = Some(scheduler);

        let engine = self.engine.clone();
        tokio::spawn(handle.run(move || {
            let engine = engine.clone();
            async move { engine.sync_cycle().await }
        }))
    }

    /// Fetch the roster from the server and replace the local cache.
    ///
    /// All-or-nothing: any failure leaves the previous cache untouched.
    ///
    /// # Errors
    /// - `Transient` when the server cannot be reached
    /// - Storage failure
    pub async fn load_roster(&self) -> Result<usize> {
        let roster = self.api.fetch_roster(&self.event).await?;
        self.cache.load(roster)
    }

    /// Admit an attendee from a scanned QR payload.
    pub fn scan(&self, qr_payload: &str) -> Result<CheckinOutcome> {
        self.operations.scan(qr_payload)
    }

    /// Admit an attendee found by manual lookup.
    pub fn manual_checkin(&self, attendee: &AttendeeId) -> Result<CheckinOutcome> {
        self.operations.manual_checkin(attendee)
    }

    /// Re-admit an attendee past the duplicate check, with justification.
    pub fn emergency_override(
        &self,
        attendee: &AttendeeId,
        reason: &str,
    ) -> Result<CheckinRecord> {
        self.operations.emergency_override(attendee, reason)
    }

    /// Search the cached roster.
    pub fn search(&self, query: &str) -> Vec<AttendeeRecord> {
        self.operations.search(query)
    }

    /// Current derived statistics.
    pub fn stats(&self) -> Result<EventStats> {
        self.stats.compute()
    }

    /// Run a sync cycle now and wait for its outcome.
    pub async fn force_sync(&self) -> Result<SyncOutcome> {
        match &self.scheduler {
            Some(scheduler) => scheduler.force_sync().await,
            None => self.engine.sync_cycle().await,
        }
    }

    /// Non-blocking sync status indicator.
    pub async fn sync_health(&self) -> SyncHealth {
        self.engine.health().await
    }

    /// Stop the background scheduler, if started.
    pub async fn shutdown(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown().await;
        }
    }

    /// Destroy all locally persisted state for this event.
    ///
    /// Removes the check-in log, remote knowledge, the sync cursor and the
    /// cached roster; other events sharing the store are untouched.
    pub fn clear_event_data(&self) -> Result<()> {
        self.log.clear_event()?;
        self.cache.clear()?;
        info!(event = %self.event, "Event data cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatecheck_api::MemoryServer;
    use gatecheck_common::SyncState;
    use gatecheck_store::MemoryStore;
    use std::time::Duration;

    fn aid(s: &str) -> AttendeeId {
        AttendeeId::new(s).unwrap()
    }

    fn attendee(id: &str, name: &str) -> AttendeeRecord {
        AttendeeRecord {
            id: aid(id),
            display_name: name.to_string(),
            category: "general".to_string(),
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            sync_interval: Duration::from_secs(3600),
            sync: gatecheck_sync::SyncConfig {
                max_retries: 1,
                retry_initial_delay: Duration::from_millis(1),
                degraded_threshold: 2,
            },
            search_limit: 25,
        }
    }

    fn open_session(server: &Arc<MemoryServer>) -> EventSession {
        EventSession::open(
            Arc::new(MemoryStore::new()),
            server.clone(),
            EventId::new("e1").unwrap(),
            DeviceId::new("d1").unwrap(),
            Connectivity::Online,
            fast_config(),
        )
        .unwrap()
    }

    fn seeded_server() -> Arc<MemoryServer> {
        let server = Arc::new(MemoryServer::new());
        server.seed_roster(
            &EventId::new("e1").unwrap(),
            vec![
                attendee("a", "Ada Lovelace"),
                attendee("b", "Alan Turing"),
                attendee("c", "Grace Hopper"),
            ],
        );
        server
    }

    #[tokio::test]
    async fn test_full_offline_scenario() {
        let server = seeded_server();
        let session = open_session(&server);

        assert_eq!(session.load_roster().await.unwrap(), 3);

        // Device goes offline; the door keeps moving.
        session.connectivity().set_offline();

        assert!(matches!(
            session.scan("a").unwrap(),
            CheckinOutcome::Admitted(_)
        ));
        assert!(matches!(
            session.scan("a").unwrap(),
            CheckinOutcome::Duplicate { .. }
        ));
        assert!(matches!(
            session.manual_checkin(&aid("b")).unwrap(),
            CheckinOutcome::Admitted(_)
        ));

        let stats = session.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.checked_in, 2);

        // Reconnect and reconcile: both records accepted.
        session.connectivity().set_online();
        let outcome = session.force_sync().await.unwrap();
        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.rejected, 0);

        let stats = session.stats().unwrap();
        assert_eq!(stats.checked_in, 2);

        // Override still works for an already-admitted attendee.
        let record = session
            .emergency_override(&aid("a"), "lost badge")
            .unwrap();
        assert_eq!(record.override_reason.as_deref(), Some("lost badge"));
    }

    #[tokio::test]
    async fn test_offline_continuity_hundred_scans() {
        let server = Arc::new(MemoryServer::new());
        let event = EventId::new("e1").unwrap();
        let roster: Vec<AttendeeRecord> = (0..100)
            .map(|i| attendee(&format!("a-{}", i), &format!("Attendee {}", i)))
            .collect();
        server.seed_roster(&event, roster);

        let session = open_session(&server);
        session.load_roster().await.unwrap();
        session.connectivity().set_offline();

        for i in 0..100 {
            let outcome = session.scan(&format!("a-{}", i)).unwrap();
            assert!(matches!(outcome, CheckinOutcome::Admitted(_)));
        }

        let stats = session.stats().unwrap();
        assert_eq!(stats.checked_in, 100);

        // Everything is still pending locally
        let pending: Vec<CheckinRecord> = session.log.pending().unwrap();
        assert_eq!(pending.len(), 100);
        assert!(pending.iter().all(|r| r.state == SyncState::Pending));

        // Reconnect: all converge to synced
        session.connectivity().set_online();
        let outcome = session.force_sync().await.unwrap();
        assert_eq!(outcome.accepted, 100);
        assert!(session.log.pending().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_roster_load_keeps_previous_cache() {
        let server = seeded_server();
        let session = open_session(&server);
        session.load_roster().await.unwrap();

        server.set_online(false);
        let err = session.load_roster().await.unwrap_err();
        assert!(err.is_transient());

        // The earlier roster is intact
        assert_eq!(session.stats().unwrap().total, 3);
        assert_eq!(session.search("ada").len(), 1);
    }

    #[tokio::test]
    async fn test_scheduler_lifecycle() {
        let server = seeded_server();
        let mut session = open_session(&server);
        session.load_roster().await.unwrap();
        let task = session.start_scheduler();

        session.scan("a").unwrap();
        // The periodic tick may or may not have synced the record already;
        // after an explicit cycle it must be acknowledged either way.
        session.force_sync().await.unwrap();
        assert!(session.log.pending().unwrap().is_empty());
        assert_eq!(server.admission_count(session.event()), 1);

        session.shutdown().await;
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_clear_event_data() {
        let server = seeded_server();
        let session = open_session(&server);
        session.load_roster().await.unwrap();
        session.scan("a").unwrap();

        session.clear_event_data().unwrap();

        let stats = session.stats().unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.checked_in, 0);
        // The same attendee can be admitted again after a clear
        session
            .cache
            .load(vec![attendee("a", "Ada Lovelace")])
            .unwrap();
        assert!(matches!(
            session.scan("a").unwrap(),
            CheckinOutcome::Admitted(_)
        ));
    }

    #[tokio::test]
    async fn test_sync_health_degrades_and_recovers() {
        let server = seeded_server();
        let session = open_session(&server);
        session.load_roster().await.unwrap();
        session.scan("a").unwrap();

        server.set_online(false);
        session.force_sync().await.unwrap();
        session.force_sync().await.unwrap();
        assert_eq!(session.sync_health().await, SyncHealth::Degraded);

        server.set_online(true);
        session.force_sync().await.unwrap();
        assert_eq!(session.sync_health().await, SyncHealth::Healthy);
    }
}
