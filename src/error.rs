//! Error types for the ble-gatt-session crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// The specified device was not found in the discovery registry.
    #[error("Device {address} not found in discovered devices")]
    DeviceNotFound {
        /// The address that was searched for.
        address: String,
    },

    /// Operation requires an active session but no device is connected.
    #[error("Not connected")]
    NotConnected,

    /// A session already exists; only one connection is managed at a time.
    #[error("Already connected to {address}")]
    AlreadyConnected {
        /// Address of the active session's device.
        address: String,
    },

    /// Failed to establish a connection to the device.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// Pairing or unpairing with the device failed.
    #[error("Pairing operation failed: {reason}")]
    PairingFailed {
        /// Description of why the pairing operation failed.
        reason: String,
    },

    /// Subscribing to value-change notifications failed.
    ///
    /// The notification engine demotes this to the polling fallback rather
    /// than surfacing it as an operation-ending error.
    #[error("Subscribe failed: {reason}")]
    SubscribeFailed {
        /// Description of why the subscription failed.
        reason: String,
    },

    /// Characteristic not found on the connected device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// The requested operation is not supported.
    #[error("Operation not supported: {operation}")]
    NotSupported {
        /// Description of the unsupported operation.
        operation: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DeviceNotFound {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Device AA:BB:CC:DD:EE:FF not found in discovered devices"
        );

        let err = Error::AlreadyConnected {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
        };
        assert!(err.to_string().contains("AA:BB:CC:DD:EE:FF"));
    }
}
