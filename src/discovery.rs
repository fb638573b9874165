//! Device discovery.
//!
//! Runs the repeating discovery cycle: one bounded discovery pass, merge the
//! results into the registry, idle, repeat. Stopping is cooperative; the
//! loop observes the flag at cycle boundaries. A transport-level discovery
//! failure is fatal to the loop and reported once.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::events::{EventDispatcher, SessionEvent};
use crate::registry::DeviceRegistry;
use crate::transport::Transport;

/// Repeating-cycle discovery engine feeding the device registry.
pub struct DiscoveryEngine {
    transport: Arc<dyn Transport>,
    registry: Arc<DeviceRegistry>,
    dispatcher: EventDispatcher,
    config: SessionConfig,
    scanning: Arc<AtomicBool>,
    scan_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl DiscoveryEngine {
    /// Create a discovery engine over the given transport and registry.
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<DeviceRegistry>,
        dispatcher: EventDispatcher,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            dispatcher,
            config,
            scanning: Arc::new(AtomicBool::new(false)),
            scan_handle: RwLock::new(None),
        }
    }

    /// Start the discovery loop.
    ///
    /// Clears the registry, begins a new scan session, and spawns the
    /// repeating cycle. Ignored if a loop is already running.
    pub fn start(&self) {
        if self.scanning.swap(true, Ordering::SeqCst) {
            debug!("Already scanning, ignoring start request");
            return;
        }

        let session = self.registry.begin_session();
        info!("Starting discovery (scan session {})", session);

        self.dispatcher.emit(SessionEvent::ScanStarted);

        let transport = self.transport.clone();
        let registry = self.registry.clone();
        let dispatcher = self.dispatcher.clone();
        let scanning = self.scanning.clone();
        let config = self.config;

        let handle = tokio::spawn(async move {
            Self::run_loop(transport, registry, dispatcher, scanning, config).await;
        });

        *self.scan_handle.write() = Some(handle);
    }

    /// Request the discovery loop to stop.
    ///
    /// Sets the cooperative flag; the loop exits at its next cycle boundary.
    /// The caller is not synchronized with the loop's actual termination.
    pub fn stop(&self) {
        info!("Stopping discovery");
        self.scanning.store(false, Ordering::SeqCst);
        self.dispatcher.emit(SessionEvent::ScanStopped);
    }

    /// Whether the discovery loop is (still) running.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    async fn run_loop(
        transport: Arc<dyn Transport>,
        registry: Arc<DeviceRegistry>,
        dispatcher: EventDispatcher,
        scanning: Arc<AtomicBool>,
        config: SessionConfig,
    ) {
        while scanning.load(Ordering::SeqCst) {
            match transport.discover(config.scan_timeout).await {
                Ok(devices) => {
                    for adv in devices {
                        if registry.insert_if_new(&adv, config.default_rssi) {
                            debug!("New device: {}", adv.address);
                            dispatcher
                                .emit(SessionEvent::RegistryChanged(registry.snapshot()));
                        }
                    }
                }
                Err(e) => {
                    // Fatal to the loop; reported once. Restarting is the
                    // caller's decision.
                    warn!("Discovery pass failed: {}", e);
                    dispatcher.error(format!("Scan error: {e}"));
                    scanning.store(false, Ordering::SeqCst);
                    break;
                }
            }

            if scanning.load(Ordering::SeqCst) {
                tokio::time::sleep(config.scan_interval).await;
            }
        }

        debug!("Discovery loop ended");
    }
}

impl Drop for DiscoveryEngine {
    fn drop(&mut self) {
        self.scanning.store(false, Ordering::SeqCst);
        // The loop would exit at its next cycle boundary anyway; aborting
        // skips the remainder of an in-flight pass.
        if let Some(handle) = self.scan_handle.write().take() {
            handle.abort();
        }
    }
}
