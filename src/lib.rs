//! # ble-gatt-session
//!
//! A cross-platform Rust library for client-side Bluetooth Low Energy GATT
//! sessions: discover nearby devices, hold a single connection, read and
//! write characteristics, and receive value changes with a transparent
//! polling fallback when a device refuses notification subscriptions.
//!
//! ## Features
//!
//! - **Device Discovery**: Repeating scan loop with first-seen-wins
//!   deduplication per scan session
//! - **Single Session**: One connection at a time with a full lifecycle
//!   state machine
//! - **Characteristic I/O**: One-shot reads and UTF-8 text writes with
//!   automatic write-mode selection
//! - **Notifications**: Native subscriptions where supported, silent
//!   fallback to fixed-interval polling where not
//! - **Pairing Tracking**: Devices paired during a run are unpaired again
//!   on shutdown, best effort
//! - **Event Stream**: Every outcome arrives as a [`SessionEvent`] on a
//!   broadcast channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ble_gatt_session::{SessionEvent, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> ble_gatt_session::Result<()> {
//!     let manager = SessionManager::new().await?;
//!     let mut events = manager.subscribe_events();
//!
//!     manager.start_scan();
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             SessionEvent::RegistryChanged(devices) => {
//!                 for device in &devices {
//!                     println!("{} ({}) rssi {}", device.name, device.address, device.rssi);
//!                 }
//!             }
//!             SessionEvent::DataReceived(line) => print!("{line}"),
//!             SessionEvent::Error(text) => eprintln!("error: {text}"),
//!             _ => {}
//!         }
//!     }
//!
//!     manager.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps. Device addresses are opaque
//! CoreBluetooth identifiers rather than MAC addresses.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod format;
pub mod gatt_io;
pub mod manager;
pub mod notify;
pub mod pairing;
pub mod registry;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use config::SessionConfig;
pub use error::{Error, Result};
pub use events::{EventDispatcher, SessionEvent};
pub use format::PayloadKind;
pub use manager::SessionManager;
pub use notify::NotifyMode;
pub use registry::{DeviceRegistry, DiscoveredDevice, UNKNOWN_NAME};
pub use session::ConnectionState;

// Re-export commonly used transport types
pub use transport::{
    AdvertisedDevice, BtleTransport, Capability, CapabilitySet, CharacteristicRef,
    NotificationStream, ServiceInfo, Transport, WriteMode,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<SessionManager>();
        let _ = std::any::TypeId::of::<SessionEvent>();
        let _ = std::any::TypeId::of::<SessionConfig>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<DiscoveredDevice>();
        let _ = std::any::TypeId::of::<ConnectionState>();
        let _ = std::any::TypeId::of::<NotifyMode>();
        let _ = std::any::TypeId::of::<CharacteristicRef>();
    }

    #[test]
    fn test_default_states() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(NotifyMode::default(), NotifyMode::Idle);
    }
}
