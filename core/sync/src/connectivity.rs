//! Process-wide connectivity state.
//!
//! One explicit online/offline flag with a defined lifecycle: seeded at
//! startup from a platform reachability probe, updated only through the
//! monitor, observed by the sync scheduler. Operation code never probes
//! reachability on its own.

use tokio::sync::watch;
use tracing::info;

/// Network reachability as last reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// The server is believed reachable.
    Online,
    /// The device is partitioned; all server work is deferred.
    Offline,
}

/// Owner of the connectivity flag.
///
/// The platform layer feeds transitions in through [`set_online`] /
/// [`set_offline`]; everything else holds a [`watch::Receiver`] from
/// [`subscribe`].
///
/// [`set_online`]: ConnectivityMonitor::set_online
/// [`set_offline`]: ConnectivityMonitor::set_offline
/// [`subscribe`]: ConnectivityMonitor::subscribe
pub struct ConnectivityMonitor {
    tx: watch::Sender<Connectivity>,
}

impl ConnectivityMonitor {
    /// Create a monitor seeded with the initial probe result.
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Report that connectivity was regained.
    pub fn set_online(&self) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == Connectivity::Online {
                false
            } else {
                *state = Connectivity::Online;
                true
            }
        });
        if changed {
            info!("Connectivity regained");
        }
    }

    /// Report that connectivity was lost.
    pub fn set_offline(&self) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == Connectivity::Offline {
                false
            } else {
                *state = Connectivity::Offline;
                true
            }
        });
        if changed {
            info!("Connectivity lost");
        }
    }

    /// Current state.
    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    /// Whether the device is currently online.
    pub fn is_online(&self) -> bool {
        self.current() == Connectivity::Online
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state() {
        let monitor = ConnectivityMonitor::new(Connectivity::Offline);
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_transitions_observed() {
        let monitor = ConnectivityMonitor::new(Connectivity::Offline);
        let mut rx = monitor.subscribe();

        monitor.set_online();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Connectivity::Online);

        monitor.set_offline();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Connectivity::Offline);
    }

    #[tokio::test]
    async fn test_no_notification_without_transition() {
        let monitor = ConnectivityMonitor::new(Connectivity::Online);
        let mut rx = monitor.subscribe();

        // Already online: no spurious wakeup
        monitor.set_online();
        assert!(!rx.has_changed().unwrap());
    }
}
