//! Session events.
//!
//! The single outward channel through which every component reports state
//! transitions, data, and failures. Consumers subscribe to a broadcast
//! receiver; no operation ever returns a result synchronously.

use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::registry::DiscoveredDevice;
use crate::transport::ServiceInfo;

/// Default broadcast channel capacity.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One notification per occurrence, as observed by the UI collaborator.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Discovery loop started; the registry was cleared.
    ScanStarted,
    /// Discovery stop was requested.
    ScanStopped,
    /// A new device entered the registry; carries a full snapshot.
    RegistryChanged(Vec<DiscoveredDevice>),
    /// Connection attempt started for a device.
    ConnectionStarted(DiscoveredDevice),
    /// Transport-level connect succeeded.
    Connected(DiscoveredDevice),
    /// Transport-level connect failed; the session reverted to disconnected.
    ConnectionFailed(String),
    /// The session was torn down. Emitted exactly once per disconnect.
    Disconnected,
    /// Service enumeration on the connected device completed.
    ServicesDiscovered(Vec<ServiceInfo>),
    /// Pairing attempt started.
    PairingStarted,
    /// Pairing succeeded; the device is now tracked for shutdown cleanup.
    Paired,
    /// Pairing failed; pairing state is unchanged.
    PairingFailed(String),
    /// Unpairing attempt started.
    UnpairingStarted,
    /// Unpairing succeeded; the device is no longer tracked.
    Unpaired,
    /// Unpairing failed; the device stays tracked.
    UnpairingFailed(String),
    /// A characteristic write started; carries the text being sent.
    SendStarted(String),
    /// A characteristic write completed.
    SendSucceeded(String),
    /// A characteristic read started.
    ReadStarted(Uuid),
    /// A formatted payload line (read, notification, or polled).
    DataReceived(String),
    /// Value-change subscription is being set up.
    NotificationsStarting,
    /// Native notifications are active.
    NotificationsStartedReal,
    /// The polling fallback is active.
    NotificationsStartedPolling,
    /// Value-change delivery stopped.
    NotificationsStopped,
    /// General informational message.
    Message(String),
    /// An operation failed; the message is labeled by operation kind.
    Error(String),
}

/// Fan-out handle for [`SessionEvent`]s.
///
/// Cheap to clone; every component holds one and reports through it.
/// Delivery to lagging or absent subscribers is best-effort.
#[derive(Clone)]
pub struct EventDispatcher {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventDispatcher {
    /// Create a dispatcher with the default capacity.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: SessionEvent) {
        trace!("Event: {:?}", event);
        let _ = self.tx.send(event);
    }

    /// Emit a generic informational message.
    pub fn message(&self, text: impl Into<String>) {
        self.emit(SessionEvent::Message(text.into()));
    }

    /// Emit a generic error message.
    pub fn error(&self, text: impl Into<String>) {
        self.emit(SessionEvent::Error(text.into()));
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let dispatcher = EventDispatcher::new();
        let mut rx = dispatcher.subscribe();

        dispatcher.emit(SessionEvent::ScanStarted);
        dispatcher.message("hello");
        dispatcher.error("boom");

        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::ScanStarted));
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::Message(m) if m == "hello"));
        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::Error(m) if m == "boom"));
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let dispatcher = EventDispatcher::new();
        dispatcher.emit(SessionEvent::Disconnected);
    }
}
