//! Pairing session tracking and shutdown cleanup.
//!
//! Every address successfully paired during the process lifetime is
//! recorded here, across sessions. At shutdown the tracker sweeps the set,
//! opening a transient connection to each address to unpair it, so that no
//! device is left bonded by this process.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::EventDispatcher;
use crate::transport::Transport;

/// Process-lifetime registry of addresses this process has paired.
pub struct PairingTracker {
    tracked: RwLock<HashSet<String>>,
}

impl PairingTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            tracked: RwLock::new(HashSet::new()),
        }
    }

    /// Record a successful pairing.
    pub fn record(&self, address: &str) {
        debug!("Tracking paired device {}", address);
        self.tracked.write().insert(address.to_string());
    }

    /// Remove an address after a successful unpair.
    pub fn forget(&self, address: &str) {
        debug!("No longer tracking {}", address);
        self.tracked.write().remove(address);
    }

    /// Whether an address is currently tracked.
    pub fn is_tracked(&self, address: &str) -> bool {
        self.tracked.read().contains(address)
    }

    /// Number of tracked addresses.
    pub fn len(&self) -> usize {
        self.tracked.read().len()
    }

    /// Whether no addresses are tracked.
    pub fn is_empty(&self) -> bool {
        self.tracked.read().is_empty()
    }

    /// Snapshot of the tracked set, sorted for stable iteration.
    pub fn snapshot(&self) -> Vec<String> {
        let mut addresses: Vec<_> = self.tracked.read().iter().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Unpair every tracked device via a transient connection each.
    ///
    /// Per-device failures leave the address tracked and never abort the
    /// sweep. Progress and the aggregate summary are reported through the
    /// dispatcher. The caller decides how long to wait for this.
    pub async fn cleanup_all(&self, transport: Arc<dyn Transport>, dispatcher: &EventDispatcher) {
        // Snapshot first: pair()/unpair() may mutate the set concurrently.
        let addresses = self.snapshot();

        if addresses.is_empty() {
            dispatcher.message("No devices to unpair");
            return;
        }

        let total = addresses.len();
        dispatcher.message(format!("Unpairing {total} device(s)..."));

        let mut unpaired = 0usize;
        for address in &addresses {
            match Self::unpair_one(transport.as_ref(), address).await {
                Ok(()) => {
                    self.forget(address);
                    unpaired += 1;
                    dispatcher.message(format!("Unpaired device: {address}"));
                }
                Err(e) => {
                    warn!("Cleanup unpair of {} failed: {}", address, e);
                    dispatcher.message(format!("Failed to unpair {address}: {e}"));
                }
            }
        }

        if unpaired == total {
            info!("Shutdown cleanup unpaired all {} device(s)", total);
            dispatcher.message("All devices unpaired successfully");
        } else if unpaired > 0 {
            dispatcher.message(format!("Unpaired {unpaired}/{total} devices"));
        } else {
            dispatcher.message("No devices could be unpaired");
        }
    }

    /// Transient connect, unpair, disconnect for a single address.
    async fn unpair_one(transport: &dyn Transport, address: &str) -> Result<()> {
        transport.connect(address).await?;
        transport.unpair().await?;
        transport.disconnect().await?;
        Ok(())
    }
}

impl Default for PairingTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::events::SessionEvent;
    use crate::transport::MockTransport;

    fn collect_messages(
        rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
    ) -> Vec<String> {
        let mut messages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::Message(m) = event {
                messages.push(m);
            }
        }
        messages
    }

    #[test]
    fn test_record_and_forget() {
        let tracker = PairingTracker::new();
        assert!(tracker.is_empty());

        tracker.record("AA");
        tracker.record("AA");
        tracker.record("BB");
        assert_eq!(tracker.len(), 2);
        assert!(tracker.is_tracked("AA"));

        tracker.forget("AA");
        assert!(!tracker.is_tracked("AA"));
        assert_eq!(tracker.snapshot(), vec!["BB".to_string()]);
    }

    #[tokio::test]
    async fn test_cleanup_with_nothing_tracked() {
        let tracker = PairingTracker::new();
        let dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe();

        // Transport must not be touched at all.
        let mock = MockTransport::new();
        tracker.cleanup_all(Arc::new(mock), &dispatcher).await;

        assert_eq!(collect_messages(&mut rx), vec!["No devices to unpair"]);
    }

    #[tokio::test]
    async fn test_cleanup_all_successful() {
        let tracker = PairingTracker::new();
        tracker.record("AA");
        tracker.record("BB");

        let mut mock = MockTransport::new();
        mock.expect_connect().times(2).returning(|_| Ok(()));
        mock.expect_unpair().times(2).returning(|| Ok(()));
        mock.expect_disconnect().times(2).returning(|| Ok(()));

        let dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe();
        tracker.cleanup_all(Arc::new(mock), &dispatcher).await;

        assert!(tracker.is_empty());
        let messages = collect_messages(&mut rx);
        assert_eq!(messages.first().unwrap(), "Unpairing 2 device(s)...");
        assert_eq!(messages.last().unwrap(), "All devices unpaired successfully");
    }

    #[tokio::test]
    async fn test_cleanup_partial_failure_keeps_failed_address() {
        let tracker = PairingTracker::new();
        tracker.record("AA");
        tracker.record("BB");

        let mut mock = MockTransport::new();
        mock.expect_connect()
            .withf(|address| address == "AA")
            .returning(|_| Ok(()));
        mock.expect_connect()
            .withf(|address| address == "BB")
            .returning(|_| Err(Error::ConnectionFailed {
                reason: "unreachable".to_string(),
            }));
        mock.expect_unpair().times(1).returning(|| Ok(()));
        mock.expect_disconnect().times(1).returning(|| Ok(()));

        let dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe();
        tracker.cleanup_all(Arc::new(mock), &dispatcher).await;

        // Only the failing address stays tracked.
        assert_eq!(tracker.snapshot(), vec!["BB".to_string()]);

        let messages = collect_messages(&mut rx);
        assert!(messages.iter().any(|m| m == "Unpaired device: AA"));
        assert!(messages.iter().any(|m| m.starts_with("Failed to unpair BB")));
        assert_eq!(messages.last().unwrap(), "Unpaired 1/2 devices");
    }

    #[tokio::test]
    async fn test_cleanup_total_failure() {
        let tracker = PairingTracker::new();
        tracker.record("AA");

        let mut mock = MockTransport::new();
        mock.expect_connect().returning(|_| Ok(()));
        mock.expect_unpair()
            .returning(|| Err(Error::PairingFailed {
                reason: "refused".to_string(),
            }));
        mock.expect_disconnect().returning(|| Ok(()));

        let dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe();
        tracker.cleanup_all(Arc::new(mock), &dispatcher).await;

        assert!(tracker.is_tracked("AA"));
        let messages = collect_messages(&mut rx);
        assert_eq!(messages.last().unwrap(), "No devices could be unpaired");
    }
}
