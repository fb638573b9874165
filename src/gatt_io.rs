//! Characteristic read and write operations.
//!
//! One-shot reads and writes against a selected characteristic of the
//! active session. Write mode is chosen from the characteristic's
//! advertised capability set. No retries, no payload chunking.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::events::{EventDispatcher, SessionEvent};
use crate::format::{format_payload, PayloadKind};
use crate::session::ConnectionState;
use crate::transport::{Capability, CharacteristicRef, Transport, WriteMode};

/// Gateway for characteristic I/O on the active session.
pub struct CharacteristicIo {
    transport: Arc<dyn Transport>,
    state: Arc<RwLock<ConnectionState>>,
    dispatcher: EventDispatcher,
}

impl CharacteristicIo {
    /// Create a gateway bound to the session's connection state.
    pub fn new(
        transport: Arc<dyn Transport>,
        state: Arc<RwLock<ConnectionState>>,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            transport,
            state,
            dispatcher,
        }
    }

    fn is_connected(&self) -> bool {
        self.state.read().is_connected()
    }

    /// Read the characteristic once and deliver the formatted payload.
    pub async fn read(&self, characteristic: &CharacteristicRef) {
        if !self.is_connected() {
            self.dispatcher.error("No device connected for reading data");
            return;
        }

        self.dispatcher
            .emit(SessionEvent::ReadStarted(characteristic.uuid));

        match self.transport.read_characteristic(characteristic.uuid).await {
            Ok(data) => {
                debug!("Read {} bytes from {}", data.len(), characteristic.uuid);
                self.dispatcher.emit(SessionEvent::DataReceived(
                    format_payload(&data, PayloadKind::Read),
                ));
            }
            Err(e) => {
                warn!("Read from {} failed: {}", characteristic.uuid, e);
                self.dispatcher.error(format!("Read failed: {e}"));
            }
        }
    }

    /// Write text to the characteristic as UTF-8 bytes.
    ///
    /// Uses write-without-response when the characteristic advertises it,
    /// write-with-response otherwise.
    pub async fn write(&self, characteristic: &CharacteristicRef, text: &str) {
        if !self.is_connected() {
            self.dispatcher.error("No device connected for sending data");
            return;
        }

        if text.is_empty() {
            self.dispatcher.error("Cannot send empty data");
            return;
        }

        self.dispatcher
            .emit(SessionEvent::SendStarted(text.to_string()));

        let mode = if characteristic
            .capabilities
            .contains(Capability::WriteNoResponse)
        {
            WriteMode::WithoutResponse
        } else {
            WriteMode::WithResponse
        };

        match self
            .transport
            .write_characteristic(characteristic.uuid, text.as_bytes(), mode)
            .await
        {
            Ok(()) => {
                debug!("Wrote {} bytes to {}", text.len(), characteristic.uuid);
                self.dispatcher
                    .emit(SessionEvent::SendSucceeded(text.to_string()));
            }
            Err(e) => {
                warn!("Write to {} failed: {}", characteristic.uuid, e);
                self.dispatcher.error(format!("Send failed: {e}"));
            }
        }
    }
}
