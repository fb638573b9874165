//! The consumed GATT transport capability.
//!
//! The session manager does not implement a BLE stack; it drives one through
//! the [`Transport`] trait. The production backend over `btleplug` lives in
//! [`btle`]; tests substitute a mock.

pub mod btle;

use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

pub use btle::BtleTransport;

/// Stream of raw value-change payloads from a subscribed characteristic.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// A device as seen in a single discovery pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedDevice {
    /// Platform address or identifier of the peripheral.
    pub address: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Signal strength in dBm, if reported.
    pub rssi: Option<i16>,
}

/// A single GATT characteristic capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Capability {
    /// The characteristic value can be read.
    Read,
    /// The value can be written with a response.
    Write,
    /// The value can be written without a response.
    WriteNoResponse,
    /// The peripheral can push value changes as notifications.
    Notify,
    /// The peripheral can push value changes as indications.
    Indicate,
}

impl Capability {
    const fn bit(self) -> u8 {
        match self {
            Self::Read => 1 << 0,
            Self::Write => 1 << 1,
            Self::WriteNoResponse => 1 << 2,
            Self::Notify => 1 << 3,
            Self::Indicate => 1 << 4,
        }
    }
}

/// Closed set of [`Capability`] flags advertised by a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// The empty capability set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Return a copy of this set with `cap` added.
    #[must_use]
    pub const fn with(self, cap: Capability) -> Self {
        Self(self.0 | cap.bit())
    }

    /// Check whether `cap` is present.
    pub const fn contains(self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    /// Whether the characteristic supports either write mode.
    pub const fn can_write(self) -> bool {
        self.contains(Capability::Write) || self.contains(Capability::WriteNoResponse)
    }

    /// Whether the characteristic supports notify or indicate.
    pub const fn can_subscribe(self) -> bool {
        self.contains(Capability::Notify) || self.contains(Capability::Indicate)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), CapabilitySet::with)
    }
}

/// Reference to a characteristic discovered on the connected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicRef {
    /// UUID of the characteristic.
    pub uuid: Uuid,
    /// UUID of the service that owns it.
    pub service_uuid: Uuid,
    /// Advertised capability set.
    pub capabilities: CapabilitySet,
    /// Human-readable description, if the platform exposes one.
    pub description: Option<String>,
}

/// A service discovered on the connected device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// UUID of the service.
    pub uuid: Uuid,
    /// Human-readable description, if the platform exposes one.
    pub description: Option<String>,
    /// Characteristics contained in the service.
    pub characteristics: Vec<CharacteristicRef>,
}

/// Write mode for a characteristic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Write and wait for the peripheral's acknowledgement.
    WithResponse,
    /// Fire-and-forget write.
    WithoutResponse,
}

/// The external GATT transport consumed by the session manager.
///
/// One implementation manages at most one active connection; `connect`
/// replaces any previous connection context. Transient connections for the
/// shutdown unpair sweep reuse the same methods.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run one bounded discovery pass and return everything seen.
    async fn discover(&self, timeout: Duration) -> Result<Vec<AdvertisedDevice>>;

    /// Connect to the peripheral with the given address.
    async fn connect(&self, address: &str) -> Result<()>;

    /// Disconnect from the current peripheral.
    async fn disconnect(&self) -> Result<()>;

    /// Pair (bond) with the current peripheral.
    async fn pair(&self) -> Result<()>;

    /// Remove the bond with the current peripheral.
    async fn unpair(&self) -> Result<()>;

    /// Enumerate services and characteristics of the current peripheral.
    async fn list_services(&self) -> Result<Vec<ServiceInfo>>;

    /// Read the value of a characteristic.
    async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>>;

    /// Write a value to a characteristic.
    async fn write_characteristic(&self, uuid: Uuid, data: &[u8], mode: WriteMode) -> Result<()>;

    /// Subscribe to value changes of a characteristic.
    async fn subscribe(&self, uuid: Uuid) -> Result<NotificationStream>;

    /// Stop value-change delivery for a characteristic.
    async fn unsubscribe(&self, uuid: Uuid) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_set_membership() {
        let caps = CapabilitySet::empty()
            .with(Capability::Read)
            .with(Capability::Notify);

        assert!(caps.contains(Capability::Read));
        assert!(caps.contains(Capability::Notify));
        assert!(!caps.contains(Capability::Write));
        assert!(!caps.can_write());
        assert!(caps.can_subscribe());
    }

    #[test]
    fn test_capability_set_from_iter() {
        let caps: CapabilitySet = [Capability::Write, Capability::WriteNoResponse]
            .into_iter()
            .collect();
        assert!(caps.can_write());
        assert!(!caps.can_subscribe());
    }

    #[test]
    fn test_empty_set() {
        let caps = CapabilitySet::empty();
        assert!(!caps.can_write());
        assert!(!caps.can_subscribe());
        assert_eq!(caps, CapabilitySet::default());
    }
}
