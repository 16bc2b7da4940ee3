//! Background sync scheduling.
//!
//! The scheduler is the one place retry-on-reconnect lives: a single task
//! that runs a cycle when connectivity returns, on a fixed interval while
//! online, and on explicit request. The engine's single-flight guard makes
//! overlapping triggers harmless.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::time::interval;
use tracing::{debug, error, info};

use gatecheck_common::{Error, Result};

use crate::connectivity::Connectivity;
use crate::engine::SyncOutcome;

/// Sync request types.
#[derive(Debug)]
pub enum SyncRequest {
    /// Run one cycle now.
    Cycle,
    /// Shut down the scheduler.
    Shutdown,
}

type RequestSender = mpsc::Sender<(SyncRequest, oneshot::Sender<Result<SyncOutcome>>)>;
type RequestReceiver = mpsc::Receiver<(SyncRequest, oneshot::Sender<Result<SyncOutcome>>)>;

/// Handle for requesting syncs from the running scheduler task.
pub struct SyncScheduler {
    request_tx: RequestSender,
    shutdown: Arc<RwLock<bool>>,
}

impl SyncScheduler {
    /// Create a scheduler and the handle that runs its background task.
    pub fn new(
        period: Duration,
        connectivity: watch::Receiver<Connectivity>,
    ) -> (Self, SyncSchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(100);
        let shutdown = Arc::new(RwLock::new(false));

        let scheduler = Self {
            request_tx: request_tx.clone(),
            shutdown: shutdown.clone(),
        };

        let handle = SyncSchedulerHandle {
            period,
            connectivity,
            request_rx: Some(request_rx),
            shutdown,
        };

        (scheduler, handle)
    }

    /// Request a sync cycle and wait for its outcome.
    pub async fn force_sync(&self) -> Result<SyncOutcome> {
        let (response_tx, response_rx) = oneshot::channel();

        self.request_tx
            .send((SyncRequest::Cycle, response_tx))
            .await
            .map_err(|_| Error::Storage("Scheduler not running".to_string()))?;

        response_rx
            .await
            .map_err(|_| Error::Storage("Failed to receive sync result".to_string()))?
    }

    /// Shut down the scheduler.
    pub async fn shutdown(&self) {
        let mut is_shutdown = self.shutdown.write().await;
        *is_shutdown = true;

        let (response_tx, _) = oneshot::channel();
        let _ = self
            .request_tx
            .send((SyncRequest::Shutdown, response_tx))
            .await;
    }
}

/// Handle for the scheduler background task.
pub struct SyncSchedulerHandle {
    period: Duration,
    connectivity: watch::Receiver<Connectivity>,
    request_rx: Option<RequestReceiver>,
    shutdown: Arc<RwLock<bool>>,
}

impl SyncSchedulerHandle {
    /// Run the scheduler background task.
    ///
    /// This should be spawned in a tokio task. The `sync_fn` is called
    /// whenever a cycle is due.
    pub async fn run<F, Fut>(mut self, sync_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<SyncOutcome>> + Send,
    {
        let mut request_rx = self.request_rx.take().expect("Handle can only be run once");
        let mut ticker = interval(self.period);
        let mut connectivity = self.connectivity.clone();
        let mut online = *connectivity.borrow() == Connectivity::Online;

        info!("Sync scheduler started");

        loop {
            if *self.shutdown.read().await {
                break;
            }

            tokio::select! {
                Some((request, response_tx)) = request_rx.recv() => {
                    match request {
                        SyncRequest::Shutdown => {
                            info!("Received shutdown request");
                            break;
                        }
                        SyncRequest::Cycle => {
                            debug!("Processing manual sync request");
                            let result = sync_fn().await;
                            let _ = response_tx.send(result);
                        }
                    }
                }

                _ = ticker.tick() => {
                    if online {
                        debug!("Periodic sync tick");
                        if let Err(e) = sync_fn().await {
                            error!("Periodic sync failed: {}", e);
                        }
                    }
                }

                changed = connectivity.changed() => {
                    if changed.is_err() {
                        // Monitor dropped; nothing will wake us again.
                        break;
                    }
                    online = *connectivity.borrow_and_update() == Connectivity::Online;
                    // The monitor only notifies on real transitions, so an
                    // online reading here is an offline→online edge.
                    if online {
                        info!("Connectivity regained; starting sync cycle");
                        if let Err(e) = sync_fn().await {
                            error!("Reconnect sync failed: {}", e);
                        }
                    }
                }
            }
        }

        info!("Sync scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::connectivity::ConnectivityMonitor;

    fn outcome() -> SyncOutcome {
        SyncOutcome {
            skipped: false,
            accepted: 0,
            rejected: 0,
            deferred: 0,
            merged: 0,
        }
    }

    fn counting_sync(
        counter: Arc<AtomicU32>,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<SyncOutcome>> + Send>>
           + Send
           + Sync
           + 'static {
        move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(outcome())
            })
        }
    }

    #[tokio::test]
    async fn test_force_sync() {
        let monitor = ConnectivityMonitor::new(Connectivity::Online);
        let (scheduler, handle) = SyncScheduler::new(Duration::from_secs(3600), monitor.subscribe());

        let count = Arc::new(AtomicU32::new(0));
        let task = tokio::spawn(handle.run(counting_sync(count.clone())));

        let result = scheduler.force_sync().await.unwrap();
        assert!(!result.skipped);
        assert!(count.load(Ordering::SeqCst) >= 1);

        scheduler.shutdown().await;
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_reconnect_triggers_cycle() {
        let monitor = ConnectivityMonitor::new(Connectivity::Offline);
        let (scheduler, handle) = SyncScheduler::new(Duration::from_secs(3600), monitor.subscribe());

        let count = Arc::new(AtomicU32::new(0));
        let task = tokio::spawn(handle.run(counting_sync(count.clone())));

        // Nothing runs while offline
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        monitor.set_online();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(count.load(Ordering::SeqCst) >= 1);

        scheduler.shutdown().await;
        let _ = task.await;
    }

    #[tokio::test]
    async fn test_periodic_while_online() {
        let monitor = ConnectivityMonitor::new(Connectivity::Online);
        let (scheduler, handle) =
            SyncScheduler::new(Duration::from_millis(10), monitor.subscribe());

        let count = Arc::new(AtomicU32::new(0));
        let task = tokio::spawn(handle.run(counting_sync(count.clone())));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(count.load(Ordering::SeqCst) >= 2);

        scheduler.shutdown().await;
        let _ = task.await;
    }
}
