//! Session manager composition root.
//!
//! Wires the discovery engine, connection controller, characteristic I/O
//! gateway, notification engine, and pairing tracker over one shared
//! transport and one event channel. Long-running operations are spawned
//! onto the runtime; their outcomes arrive as [`SessionEvent`]s.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::discovery::DiscoveryEngine;
use crate::error::Result;
use crate::events::{EventDispatcher, SessionEvent};
use crate::gatt_io::CharacteristicIo;
use crate::notify::{NotificationEngine, NotifyMode};
use crate::pairing::PairingTracker;
use crate::registry::{DeviceRegistry, DiscoveredDevice};
use crate::session::{ConnectionState, SessionController};
use crate::transport::{BtleTransport, CharacteristicRef, Transport};

/// Client-side GATT session manager.
///
/// All mutating operations are fire-and-forget: they return immediately and
/// report progress and outcomes through the event channel obtained from
/// [`subscribe_events`](Self::subscribe_events). Read-only accessors answer
/// from shared state without touching the transport.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    dispatcher: EventDispatcher,
    registry: Arc<DeviceRegistry>,
    pairing: Arc<PairingTracker>,
    discovery: DiscoveryEngine,
    session: Arc<SessionController>,
    io: Arc<CharacteristicIo>,
    notify: Arc<NotificationEngine>,
    config: SessionConfig,
}

impl SessionManager {
    /// Create a manager over the default system Bluetooth adapter.
    pub async fn new() -> Result<Self> {
        Self::with_config(SessionConfig::default()).await
    }

    /// Create a manager over the default adapter with custom timings.
    pub async fn with_config(config: SessionConfig) -> Result<Self> {
        let transport = BtleTransport::new().await?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Create a manager over an explicit transport.
    ///
    /// Useful for alternate backends and for tests.
    pub fn with_transport(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let dispatcher = EventDispatcher::new();
        let registry = Arc::new(DeviceRegistry::new());
        let pairing = Arc::new(PairingTracker::new());

        let discovery = DiscoveryEngine::new(
            transport.clone(),
            registry.clone(),
            dispatcher.clone(),
            config,
        );
        let session = Arc::new(SessionController::new(
            transport.clone(),
            registry.clone(),
            pairing.clone(),
            dispatcher.clone(),
        ));
        let io = Arc::new(CharacteristicIo::new(
            transport.clone(),
            session.shared_state(),
            dispatcher.clone(),
        ));
        let notify = Arc::new(NotificationEngine::new(
            transport.clone(),
            session.shared_state(),
            dispatcher.clone(),
            config,
        ));

        Self {
            transport,
            dispatcher,
            registry,
            pairing,
            discovery,
            session,
            io,
            notify,
            config,
        }
    }

    /// Subscribe to the session event stream.
    ///
    /// Every subscriber receives every event emitted after the call. Slow
    /// subscribers that fall behind the channel capacity lose the oldest
    /// events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.dispatcher.subscribe()
    }

    // Discovery ------------------------------------------------------------

    /// Start the repeating discovery loop.
    ///
    /// Clears the device registry and begins a fresh scan session. Ignored
    /// if discovery is already running.
    pub fn start_scan(&self) {
        self.discovery.start();
    }

    /// Request the discovery loop to stop.
    pub fn stop_scan(&self) {
        self.discovery.stop();
    }

    /// Whether the discovery loop is running.
    pub fn is_scanning(&self) -> bool {
        self.discovery.is_scanning()
    }

    /// Devices discovered in the current scan session, sorted by address.
    pub fn devices(&self) -> Vec<DiscoveredDevice> {
        self.registry.snapshot()
    }

    /// Look up a discovered device by address.
    pub fn device(&self, address: &str) -> Option<DiscoveredDevice> {
        self.registry.get(address)
    }

    // Connection lifecycle -------------------------------------------------

    /// Connect to a previously discovered device.
    ///
    /// Returns immediately; the outcome arrives as a `Connected`,
    /// `ConnectionFailed`, or `Error` event.
    pub fn connect(&self, address: &str) {
        let session = self.session.clone();
        let address = address.to_string();
        tokio::spawn(async move {
            session.connect(&address).await;
        });
    }

    /// Disconnect the active session.
    ///
    /// Notifications are stopped before the transport disconnect so no data
    /// events trail the `Disconnected` event.
    pub fn disconnect(&self) {
        let session = self.session.clone();
        let notify = self.notify.clone();
        tokio::spawn(async move {
            if notify.mode() != NotifyMode::Idle {
                notify.stop().await;
            }
            session.disconnect().await;
        });
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    /// The device of the active session, if any.
    pub fn connected_device(&self) -> Option<DiscoveredDevice> {
        self.session.target()
    }

    // Pairing --------------------------------------------------------------

    /// Pair with the connected device.
    pub fn pair(&self) {
        let session = self.session.clone();
        tokio::spawn(async move {
            session.pair().await;
        });
    }

    /// Unpair from the connected device.
    pub fn unpair(&self) {
        let session = self.session.clone();
        tokio::spawn(async move {
            session.unpair().await;
        });
    }

    /// Whether the current session is paired.
    pub fn is_paired(&self) -> bool {
        self.session.is_paired()
    }

    /// Addresses of devices paired during this run and not yet unpaired.
    pub fn paired_devices(&self) -> Vec<String> {
        self.pairing.snapshot()
    }

    // Characteristic I/O ---------------------------------------------------

    /// Read a characteristic once; the payload arrives as a `DataReceived`
    /// event.
    pub fn read(&self, characteristic: &CharacteristicRef) {
        let io = self.io.clone();
        let characteristic = characteristic.clone();
        tokio::spawn(async move {
            io.read(&characteristic).await;
        });
    }

    /// Write UTF-8 text to a characteristic.
    pub fn write(&self, characteristic: &CharacteristicRef, text: &str) {
        let io = self.io.clone();
        let characteristic = characteristic.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            io.write(&characteristic, &text).await;
        });
    }

    // Notifications --------------------------------------------------------

    /// Start value-change delivery for a characteristic.
    ///
    /// Falls back to polling reads if the subscription cannot be
    /// established.
    pub fn start_notifications(&self, characteristic: &CharacteristicRef) {
        let notify = self.notify.clone();
        let characteristic = characteristic.clone();
        tokio::spawn(async move {
            notify.start(&characteristic).await;
        });
    }

    /// Stop value-change delivery.
    pub fn stop_notifications(&self) {
        let notify = self.notify.clone();
        tokio::spawn(async move {
            notify.stop().await;
        });
    }

    /// Current mode of the notification engine.
    pub fn notify_mode(&self) -> NotifyMode {
        self.notify.mode()
    }

    // Shutdown -------------------------------------------------------------

    /// Shut the manager down.
    ///
    /// Stops discovery and notifications, disconnects any active session,
    /// then runs the unpair sweep over devices paired during this run.
    /// The sweep is bounded by the configured cleanup budget; whatever it
    /// does not finish in time is abandoned.
    pub async fn shutdown(&self) {
        info!("Shutting down session manager");

        self.discovery.stop();

        if self.notify.mode() != NotifyMode::Idle {
            self.notify.stop().await;
        }

        if self.session.state().is_connected() {
            self.session.disconnect().await;
        }

        let pairing = self.pairing.clone();
        let transport = self.transport.clone();
        let dispatcher = self.dispatcher.clone();
        let sweep = tokio::spawn(async move {
            pairing.cleanup_all(transport, &dispatcher).await;
        });

        if tokio::time::timeout(self.config.cleanup_wait, sweep)
            .await
            .is_err()
        {
            warn!(
                "Unpair sweep exceeded {:?}, abandoning",
                self.config.cleanup_wait
            );
        } else {
            debug!("Unpair sweep finished within budget");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transport::{AdvertisedDevice, CapabilitySet, MockTransport};
    use std::time::Duration;
    use uuid::Uuid;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn manager_with(mock: MockTransport) -> SessionManager {
        init_tracing();
        SessionManager::with_transport(Arc::new(mock), SessionConfig::fast())
    }

    async fn next_event(rx: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn wait_for(
        rx: &mut broadcast::Receiver<SessionEvent>,
        mut pred: impl FnMut(&SessionEvent) -> bool,
    ) -> SessionEvent {
        loop {
            let event = next_event(rx).await;
            if pred(&event) {
                return event;
            }
        }
    }

    fn advertised(address: &str) -> AdvertisedDevice {
        AdvertisedDevice {
            address: address.to_string(),
            name: Some("Sensor".to_string()),
            rssi: Some(-60),
        }
    }

    #[tokio::test]
    async fn test_scan_populates_registry() {
        let mut mock = MockTransport::new();
        mock.expect_discover()
            .returning(|_| Ok(vec![advertised("AA:BB")]));

        let manager = manager_with(mock);
        let mut rx = manager.subscribe_events();

        manager.start_scan();
        assert!(manager.is_scanning());

        wait_for(&mut rx, |e| matches!(e, SessionEvent::RegistryChanged(_))).await;

        let devices = manager.devices();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address, "AA:BB");
        assert!(manager.device("AA:BB").is_some());

        manager.stop_scan();
        assert!(!manager.is_scanning());
    }

    #[tokio::test]
    async fn test_connect_unknown_device_reports_error() {
        let mock = MockTransport::new();
        let manager = manager_with(mock);
        let mut rx = manager.subscribe_events();

        manager.connect("DE:AD");

        match wait_for(&mut rx, |e| matches!(e, SessionEvent::Error(_))).await {
            SessionEvent::Error(text) => assert!(text.contains("DE:AD")),
            _ => unreachable!(),
        }
        assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_then_disconnect() {
        let mut mock = MockTransport::new();
        mock.expect_discover()
            .returning(|_| Ok(vec![advertised("AA:BB")]));
        mock.expect_connect().times(1).returning(|_| Ok(()));
        mock.expect_list_services().returning(|| Ok(vec![]));
        mock.expect_disconnect().times(1).returning(|| Ok(()));

        let manager = manager_with(mock);
        let mut rx = manager.subscribe_events();

        manager.start_scan();
        wait_for(&mut rx, |e| matches!(e, SessionEvent::RegistryChanged(_))).await;
        manager.stop_scan();

        manager.connect("AA:BB");
        wait_for(&mut rx, |e| matches!(e, SessionEvent::Connected(_))).await;
        assert!(manager.connection_state().is_connected());
        assert_eq!(manager.connected_device().unwrap().address, "AA:BB");

        manager.disconnect();
        wait_for(&mut rx, |e| matches!(e, SessionEvent::Disconnected)).await;
        assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
        assert!(manager.connected_device().is_none());
    }

    #[tokio::test]
    async fn test_read_requires_connection() {
        let mock = MockTransport::new();
        let manager = manager_with(mock);
        let mut rx = manager.subscribe_events();

        let characteristic = CharacteristicRef {
            uuid: Uuid::from_u128(0xABCD),
            service_uuid: Uuid::from_u128(0x1111),
            capabilities: CapabilitySet::empty(),
            description: None,
        };
        manager.read(&characteristic);

        match wait_for(&mut rx, |e| matches!(e, SessionEvent::Error(_))).await {
            SessionEvent::Error(text) => assert!(text.contains("No device connected")),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_shutdown_runs_unpair_sweep() {
        let mut mock = MockTransport::new();
        mock.expect_discover()
            .returning(|_| Ok(vec![advertised("AA:BB")]));
        mock.expect_connect().returning(|_| Ok(()));
        mock.expect_list_services().returning(|| Ok(vec![]));
        mock.expect_pair().times(1).returning(|| Ok(()));
        mock.expect_unpair().times(1).returning(|| Ok(()));
        mock.expect_disconnect().returning(|| Ok(()));

        let manager = manager_with(mock);
        let mut rx = manager.subscribe_events();

        manager.start_scan();
        wait_for(&mut rx, |e| matches!(e, SessionEvent::RegistryChanged(_))).await;
        manager.stop_scan();

        manager.connect("AA:BB");
        wait_for(&mut rx, |e| matches!(e, SessionEvent::Connected(_))).await;
        manager.pair();
        wait_for(&mut rx, |e| matches!(e, SessionEvent::Paired)).await;
        assert!(manager.is_paired());
        assert_eq!(manager.paired_devices(), vec!["AA:BB".to_string()]);

        manager.shutdown().await;

        let unpaired = wait_for(&mut rx, |e| {
            matches!(e, SessionEvent::Message(m) if m.contains("Unpaired device"))
        })
        .await;
        match unpaired {
            SessionEvent::Message(m) => assert!(m.contains("AA:BB")),
            _ => unreachable!(),
        }
        assert!(manager.paired_devices().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_with_no_paired_devices() {
        let mut mock = MockTransport::new();
        mock.expect_disconnect().returning(|| Ok(()));

        let manager = manager_with(mock);
        let mut rx = manager.subscribe_events();

        manager.shutdown().await;

        wait_for(&mut rx, |e| {
            matches!(e, SessionEvent::Message(m) if m.contains("No devices to unpair"))
        })
        .await;
    }

    #[tokio::test]
    async fn test_shutdown_survives_sweep_failures() {
        let mut mock = MockTransport::new();
        mock.expect_discover()
            .returning(|_| Ok(vec![advertised("AA:BB")]));
        mock.expect_connect().times(1).returning(|_| Ok(()));
        mock.expect_list_services().returning(|| Ok(vec![]));
        mock.expect_pair().returning(|| Ok(()));
        mock.expect_disconnect().returning(|| Ok(()));
        // The sweep's reconnect fails; the device stays tracked and
        // shutdown still completes.
        mock.expect_connect()
            .returning(|_| Err(Error::ConnectionFailed {
                reason: "powered off".to_string(),
            }));

        let manager = manager_with(mock);
        let mut rx = manager.subscribe_events();

        manager.start_scan();
        wait_for(&mut rx, |e| matches!(e, SessionEvent::RegistryChanged(_))).await;
        manager.stop_scan();
        manager.connect("AA:BB");
        wait_for(&mut rx, |e| matches!(e, SessionEvent::Connected(_))).await;
        manager.pair();
        wait_for(&mut rx, |e| matches!(e, SessionEvent::Paired)).await;

        manager.shutdown().await;

        wait_for(&mut rx, |e| {
            matches!(e, SessionEvent::Message(m) if m.contains("No devices could be unpaired"))
        })
        .await;
        assert_eq!(manager.paired_devices(), vec!["AA:BB".to_string()]);
    }
}
