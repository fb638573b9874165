//! Discovered-device registry.
//!
//! Deduplicated collection of devices seen during the current scan session.
//! The first sighting of an address wins; later sightings within the same
//! session never update the stored name or signal strength. Starting a new
//! scan session clears the registry.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::transport::AdvertisedDevice;

/// Name recorded for devices that advertise none.
pub const UNKNOWN_NAME: &str = "Unknown";

/// A device discovered during a scan session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscoveredDevice {
    /// Platform address, unique within the registry.
    pub address: String,
    /// Advertised name, or [`UNKNOWN_NAME`].
    pub name: String,
    /// Signal strength in dBm, defaulted when unavailable.
    pub rssi: i16,
    /// Scan session in which the device was first seen.
    pub scan_session: u64,
}

/// Address-keyed registry of discovered devices.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, DiscoveredDevice>>,
    scan_session: AtomicU64,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            scan_session: AtomicU64::new(0),
        }
    }

    /// Start a new scan session: clear all entries and bump the session id.
    pub fn begin_session(&self) -> u64 {
        let session = self.scan_session.fetch_add(1, Ordering::SeqCst) + 1;
        self.devices.write().clear();
        session
    }

    /// The current scan session id.
    pub fn current_session(&self) -> u64 {
        self.scan_session.load(Ordering::SeqCst)
    }

    /// Merge one advertisement into the registry.
    ///
    /// Returns `true` if the address was newly added. Re-sightings of a
    /// known address are ignored, not merged.
    pub fn insert_if_new(&self, adv: &AdvertisedDevice, default_rssi: i16) -> bool {
        let mut devices = self.devices.write();
        if devices.contains_key(&adv.address) {
            return false;
        }

        let device = DiscoveredDevice {
            address: adv.address.clone(),
            name: adv
                .name
                .clone()
                .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            rssi: adv.rssi.unwrap_or(default_rssi),
            scan_session: self.scan_session.load(Ordering::SeqCst),
        };
        devices.insert(device.address.clone(), device);
        true
    }

    /// Look up a device by address.
    pub fn get(&self, address: &str) -> Option<DiscoveredDevice> {
        self.devices.read().get(address).cloned()
    }

    /// Whether an address is known in the current session.
    pub fn contains(&self, address: &str) -> bool {
        self.devices.read().contains_key(address)
    }

    /// Full snapshot of the registry, sorted by address for stable output.
    pub fn snapshot(&self) -> Vec<DiscoveredDevice> {
        let mut devices: Vec<_> = self.devices.read().values().cloned().collect();
        devices.sort_by(|a, b| a.address.cmp(&b.address));
        devices
    }

    /// Number of devices discovered this session.
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adv(address: &str, name: Option<&str>, rssi: Option<i16>) -> AdvertisedDevice {
        AdvertisedDevice {
            address: address.to_string(),
            name: name.map(str::to_string),
            rssi,
        }
    }

    #[test]
    fn test_first_seen_wins() {
        let registry = DeviceRegistry::new();
        registry.begin_session();

        assert!(registry.insert_if_new(&adv("AA", Some("First"), Some(-40)), -50));
        // Same address re-sighted with a different name: ignored, not merged.
        assert!(!registry.insert_if_new(&adv("AA", Some("Second"), Some(-20)), -50));

        let device = registry.get("AA").unwrap();
        assert_eq!(device.name, "First");
        assert_eq!(device.rssi, -40);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let registry = DeviceRegistry::new();
        registry.begin_session();
        registry.insert_if_new(&adv("BB", None, None), -50);

        let device = registry.get("BB").unwrap();
        assert_eq!(device.name, UNKNOWN_NAME);
        assert_eq!(device.rssi, -50);
    }

    #[test]
    fn test_new_session_clears_registry() {
        let registry = DeviceRegistry::new();
        let first = registry.begin_session();
        registry.insert_if_new(&adv("AA", Some("Gadget"), None), -50);
        assert_eq!(registry.len(), 1);

        let second = registry.begin_session();
        assert!(registry.is_empty());
        assert!(second > first);
        assert!(!registry.contains("AA"));
    }

    #[test]
    fn test_snapshot_sorted_by_address() {
        let registry = DeviceRegistry::new();
        registry.begin_session();
        registry.insert_if_new(&adv("CC", None, None), -50);
        registry.insert_if_new(&adv("AA", None, None), -50);
        registry.insert_if_new(&adv("BB", None, None), -50);

        let addresses: Vec<_> = registry
            .snapshot()
            .into_iter()
            .map(|d| d.address)
            .collect();
        assert_eq!(addresses, vec!["AA", "BB", "CC"]);
    }
}
