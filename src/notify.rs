//! Value-change delivery.
//!
//! Subscribes to a characteristic's notifications; when the subscribe call
//! fails for any reason the engine falls back to fixed-interval polling
//! reads instead of surfacing the failure. Inbound notification payloads
//! are queued in arrival order and drained FIFO by a dedicated loop.

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::events::{EventDispatcher, SessionEvent};
use crate::format::{format_payload, timestamp, PayloadKind};
use crate::session::ConnectionState;
use crate::transport::{CharacteristicRef, NotificationStream, Transport};

/// State machine of the value-change engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NotifyMode {
    /// No subscription active.
    #[default]
    Idle,
    /// A transport subscribe call is in flight.
    Subscribing,
    /// Native notifications are being delivered.
    RealNotify,
    /// The polling fallback is active.
    Polling,
}

impl std::fmt::Display for NotifyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Subscribing => write!(f, "Subscribing"),
            Self::RealNotify => write!(f, "Notifications"),
            Self::Polling => write!(f, "Polling"),
        }
    }
}

/// Notification engine with transparent polling fallback.
pub struct NotificationEngine {
    transport: Arc<dyn Transport>,
    state: Arc<RwLock<ConnectionState>>,
    dispatcher: EventDispatcher,
    config: SessionConfig,
    mode: Arc<RwLock<NotifyMode>>,
    queue: Arc<Mutex<VecDeque<String>>>,
    handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl NotificationEngine {
    /// Create an engine bound to the session's connection state.
    pub fn new(
        transport: Arc<dyn Transport>,
        state: Arc<RwLock<ConnectionState>>,
        dispatcher: EventDispatcher,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            state,
            dispatcher,
            config,
            mode: Arc::new(RwLock::new(NotifyMode::Idle)),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Current engine mode.
    pub fn mode(&self) -> NotifyMode {
        *self.mode.read()
    }

    /// Start delivering value changes for a characteristic.
    ///
    /// Any existing subscription is torn down first. If the transport
    /// subscribe fails, the engine reports one informational message and
    /// switches to the polling fallback; the failure never surfaces as an
    /// error.
    pub async fn start(&self, characteristic: &CharacteristicRef) {
        if *self.mode.read() != NotifyMode::Idle {
            // Switching characteristics tears down the previous subscription.
            self.stop().await;
        }

        if !self.state.read().is_connected() {
            self.dispatcher
                .error("No device connected for notifications");
            return;
        }

        *self.mode.write() = NotifyMode::Subscribing;
        self.dispatcher.emit(SessionEvent::NotificationsStarting);

        let uuid = characteristic.uuid;

        match self.transport.subscribe(uuid).await {
            Ok(stream) => {
                info!("Native notifications active for {}", uuid);
                *self.mode.write() = NotifyMode::RealNotify;
                self.dispatcher.emit(SessionEvent::NotificationsStartedReal);
                self.queue.lock().clear();
                self.spawn_feeder(stream);
                self.spawn_drain(uuid);
            }
            Err(e) => {
                // Demoted, not surfaced: polling takes over.
                info!("Subscribe to {} failed, using polling fallback: {}", uuid, e);
                self.dispatcher.message(format!(
                    "Notifications failed, falling back to polling: {e}"
                ));
                *self.mode.write() = NotifyMode::Polling;
                self.dispatcher
                    .emit(SessionEvent::NotificationsStartedPolling);

                let interval = self.config.poll_interval.as_secs_f64();
                self.dispatcher.emit(SessionEvent::DataReceived(format!(
                    "[{}] Polling started - checking for data every {interval}s...\n",
                    timestamp()
                )));

                self.spawn_poller(uuid);
            }
        }
    }

    /// Stop value-change delivery.
    ///
    /// Sets the mode to idle; the delivery loops observe the flag at their
    /// next iteration boundary. Leaving native notifications issues a
    /// best-effort unsubscribe whose failure is ignored.
    pub async fn stop(&self) {
        *self.mode.write() = NotifyMode::Idle;
        self.dispatcher.emit(SessionEvent::NotificationsStopped);

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Feed inbound notifications into the FIFO queue, formatted.
    fn spawn_feeder(&self, mut stream: NotificationStream) {
        use futures::stream::StreamExt;

        let mode = self.mode.clone();
        let queue = self.queue.clone();
        let check_interval = self.config.drain_interval;

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    item = stream.next() => match item {
                        Some(data) => {
                            trace!("Notification payload: {} bytes", data.len());
                            queue
                                .lock()
                                .push_back(format_payload(&data, PayloadKind::Notification));
                        }
                        None => break,
                    },
                    _ = tokio::time::sleep(check_interval) => {}
                }

                if *mode.read() != NotifyMode::RealNotify {
                    break;
                }
            }
            debug!("Notification feeder ended");
        });

        self.handles.lock().push(handle);
    }

    /// Drain the queue in FIFO order at the fixed drain interval.
    fn spawn_drain(&self, uuid: Uuid) {
        let transport = self.transport.clone();
        let dispatcher = self.dispatcher.clone();
        let mode = self.mode.clone();
        let queue = self.queue.clone();
        let drain_interval = self.config.drain_interval;

        let handle = tokio::spawn(async move {
            loop {
                if *mode.read() != NotifyMode::RealNotify {
                    break;
                }

                loop {
                    let message = queue.lock().pop_front();
                    match message {
                        Some(m) => dispatcher.emit(SessionEvent::DataReceived(m)),
                        None => break,
                    }
                }

                tokio::time::sleep(drain_interval).await;
            }

            // Best effort; the session may already be gone.
            if let Err(e) = transport.unsubscribe(uuid).await {
                debug!("Unsubscribe from {} failed (ignored): {}", uuid, e);
            }

            debug!("Notification drain ended");
        });

        self.handles.lock().push(handle);
    }

    /// Polling fallback: fixed-interval reads until stopped or disconnected.
    fn spawn_poller(&self, uuid: Uuid) {
        let transport = self.transport.clone();
        let state = self.state.clone();
        let dispatcher = self.dispatcher.clone();
        let mode = self.mode.clone();
        let poll_interval = self.config.poll_interval;

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(poll_interval).await;

                if *mode.read() != NotifyMode::Polling || !state.read().is_connected() {
                    break;
                }

                match transport.read_characteristic(uuid).await {
                    Ok(data) => {
                        if *mode.read() == NotifyMode::Polling {
                            dispatcher.emit(SessionEvent::DataReceived(format_payload(
                                &data,
                                PayloadKind::Polled,
                            )));
                        }
                    }
                    Err(e) => {
                        // Swallowed: devices routinely reject reads mid-session.
                        trace!("Polling read of {} failed (ignored): {}", uuid, e);
                    }
                }
            }

            debug!("Polling loop ended");
        });

        self.handles.lock().push(handle);
    }
}
