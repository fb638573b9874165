//! Connection lifecycle.
//!
//! Owns the single active session: connect/disconnect against the transport
//! plus the pair/unpair operations valid while connected. At most one
//! session exists at any time; a connect request while a session exists is
//! rejected.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::events::{EventDispatcher, SessionEvent};
use crate::pairing::PairingTracker;
use crate::registry::{DeviceRegistry, DiscoveredDevice};
use crate::transport::Transport;

/// Connection state of the managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No session exists.
    #[default]
    Disconnected,
    /// A transport connect is in flight.
    Connecting,
    /// The session is established.
    Connected,
    /// A transport disconnect is in flight.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Controller for the single active connection.
pub struct SessionController {
    transport: Arc<dyn Transport>,
    registry: Arc<DeviceRegistry>,
    pairing: Arc<PairingTracker>,
    dispatcher: EventDispatcher,
    state: Arc<RwLock<ConnectionState>>,
    target: RwLock<Option<DiscoveredDevice>>,
    paired: AtomicBool,
}

impl SessionController {
    /// Create a controller over the shared transport and registry.
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<DeviceRegistry>,
        pairing: Arc<PairingTracker>,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            transport,
            registry,
            pairing,
            dispatcher,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            target: RwLock::new(None),
            paired: AtomicBool::new(false),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Shared view of the connection state, for the notification engine.
    pub(crate) fn shared_state(&self) -> Arc<RwLock<ConnectionState>> {
        self.state.clone()
    }

    /// Whether the current session is paired.
    pub fn is_paired(&self) -> bool {
        self.paired.load(Ordering::SeqCst)
    }

    /// The device of the active session, if any.
    pub fn target(&self) -> Option<DiscoveredDevice> {
        self.target.read().clone()
    }

    /// Connect to a previously discovered device.
    ///
    /// Rejected with an `Error` event if the address is unknown or a
    /// session already exists. Service enumeration after a successful
    /// connect is best-effort: its failure degrades the report but leaves
    /// the connection standing.
    pub async fn connect(&self, address: &str) {
        let Some(device) = self.registry.get(address) else {
            self.dispatcher
                .error(format!("Device {address} not found in discovered devices"));
            return;
        };

        {
            let mut state = self.state.write();
            if *state != ConnectionState::Disconnected {
                drop(state);
                // Report the address the session is actually bound to; during
                // Connecting the target is not set yet.
                let active = self
                    .target
                    .read()
                    .as_ref()
                    .map(|d| d.address.clone())
                    .unwrap_or_else(|| address.to_string());
                self.dispatcher
                    .error(Error::AlreadyConnected { address: active }.to_string());
                return;
            }
            *state = ConnectionState::Connecting;
        }

        info!("Connecting to {} ({})", device.name, device.address);
        self.dispatcher
            .emit(SessionEvent::ConnectionStarted(device.clone()));

        match self.transport.connect(address).await {
            Ok(()) => {
                *self.state.write() = ConnectionState::Connected;
                *self.target.write() = Some(device.clone());
                info!("Connected to {}", device.address);
                self.dispatcher.emit(SessionEvent::Connected(device));

                match self.transport.list_services().await {
                    Ok(services) => {
                        debug!("Enumerated {} services", services.len());
                        self.dispatcher
                            .emit(SessionEvent::ServicesDiscovered(services));
                    }
                    Err(e) => {
                        // The connection stands; only the service list is missing.
                        warn!("Service discovery failed: {}", e);
                        self.dispatcher.message(format!(
                            "Connected - services discovery failed: {e}. \
                             Services will be loaded when available."
                        ));
                    }
                }
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", address, e);
                *self.state.write() = ConnectionState::Disconnected;
                self.dispatcher
                    .emit(SessionEvent::ConnectionFailed(format!(
                        "Connection failed: {e}"
                    )));
            }
        }
    }

    /// Tear down the active session.
    ///
    /// Defined to be unconditionally successful from the caller's point of
    /// view: whatever the transport disconnect returns, the session ends and
    /// exactly one `Disconnected` event is emitted. A transport failure is
    /// additionally reported as an `Error`.
    pub async fn disconnect(&self) {
        {
            let mut state = self.state.write();
            if *state == ConnectionState::Disconnected {
                drop(state);
                self.dispatcher
                    .error("No device connected to disconnect from");
                return;
            }
            *state = ConnectionState::Disconnecting;
        }

        if let Err(e) = self.transport.disconnect().await {
            warn!("Transport disconnect failed: {}", e);
            self.dispatcher.error(format!("Disconnect error: {e}"));
        }

        *self.state.write() = ConnectionState::Disconnected;
        self.paired.store(false, Ordering::SeqCst);
        *self.target.write() = None;

        info!("Session torn down");
        self.dispatcher.emit(SessionEvent::Disconnected);
    }

    /// Pair with the connected device.
    ///
    /// Success records the address in the pairing tracker for shutdown
    /// cleanup; failure leaves pairing state unchanged.
    pub async fn pair(&self) {
        let Some(device) = self.target() else {
            self.dispatcher.error("No device connected for pairing");
            return;
        };

        self.dispatcher.emit(SessionEvent::PairingStarted);

        match self.transport.pair().await {
            Ok(()) => {
                self.paired.store(true, Ordering::SeqCst);
                self.pairing.record(&device.address);
                info!("Paired with {}", device.address);
                self.dispatcher.emit(SessionEvent::Paired);
            }
            Err(e) => {
                warn!("Pairing with {} failed: {}", device.address, e);
                self.dispatcher
                    .emit(SessionEvent::PairingFailed(format!("Pairing failed: {e}")));
            }
        }
    }

    /// Remove the bond with the connected device.
    pub async fn unpair(&self) {
        let Some(device) = self.target() else {
            self.dispatcher.error("No device connected for unpairing");
            return;
        };

        self.dispatcher.emit(SessionEvent::UnpairingStarted);

        match self.transport.unpair().await {
            Ok(()) => {
                self.paired.store(false, Ordering::SeqCst);
                self.pairing.forget(&device.address);
                info!("Unpaired from {}", device.address);
                self.dispatcher.emit(SessionEvent::Unpaired);
            }
            Err(e) => {
                warn!("Unpairing from {} failed: {}", device.address, e);
                self.dispatcher.emit(SessionEvent::UnpairingFailed(format!(
                    "Unpairing failed: {e}"
                )));
            }
        }
    }
}
