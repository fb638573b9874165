//! `btleplug`-backed transport.
//!
//! Production implementation of [`Transport`] over the platform BLE stack.
//! Peripherals are keyed by their platform identifier string; the active
//! connection's characteristics are cached by UUID after service enumeration.

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{
    AdvertisedDevice, Capability, CapabilitySet, CharacteristicRef, NotificationStream,
    ServiceInfo, Transport, WriteMode,
};

/// GATT transport over `btleplug`.
pub struct BtleTransport {
    /// The BLE adapter used for discovery and connections.
    adapter: Adapter,
    /// The currently connected peripheral, if any.
    active: Arc<RwLock<Option<Peripheral>>>,
    /// Characteristics of the active peripheral, cached by UUID.
    characteristics: Arc<RwLock<HashMap<Uuid, Characteristic>>>,
}

impl BtleTransport {
    /// Create a transport on the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a transport on a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            active: Arc::new(RwLock::new(None)),
            characteristics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Clone out the active peripheral or fail with `NotConnected`.
    fn require_active(&self) -> Result<Peripheral> {
        self.active.read().clone().ok_or(Error::NotConnected)
    }

    /// Look up a cached characteristic by UUID.
    fn require_characteristic(&self, uuid: Uuid) -> Result<Characteristic> {
        self.characteristics
            .read()
            .get(&uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            })
    }
}

/// Map `btleplug` property flags onto the closed capability set.
fn capabilities_from_flags(flags: CharPropFlags) -> CapabilitySet {
    let mut caps = CapabilitySet::empty();
    if flags.contains(CharPropFlags::READ) {
        caps = caps.with(Capability::Read);
    }
    if flags.contains(CharPropFlags::WRITE) {
        caps = caps.with(Capability::Write);
    }
    if flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE) {
        caps = caps.with(Capability::WriteNoResponse);
    }
    if flags.contains(CharPropFlags::NOTIFY) {
        caps = caps.with(Capability::Notify);
    }
    if flags.contains(CharPropFlags::INDICATE) {
        caps = caps.with(Capability::Indicate);
    }
    caps
}

#[async_trait]
impl Transport for BtleTransport {
    async fn discover(&self, timeout: Duration) -> Result<Vec<AdvertisedDevice>> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        tokio::time::sleep(timeout).await;

        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;

        let peripherals = self.adapter.peripherals().await.map_err(Error::Bluetooth)?;

        let mut devices = Vec::with_capacity(peripherals.len());
        for peripheral in peripherals {
            let address = peripheral.id().to_string();
            let properties = peripheral.properties().await.ok().flatten();

            let (name, rssi) = match properties {
                Some(p) => (p.local_name, p.rssi),
                None => (None, None),
            };

            trace!("Discovered {} ({:?})", address, name);

            devices.push(AdvertisedDevice {
                address,
                name,
                rssi,
            });
        }

        Ok(devices)
    }

    async fn connect(&self, address: &str) -> Result<()> {
        let peripherals = self.adapter.peripherals().await.map_err(Error::Bluetooth)?;

        let peripheral = peripherals
            .into_iter()
            .find(|p| p.id().to_string() == address)
            .ok_or_else(|| Error::DeviceNotFound {
                address: address.to_string(),
            })?;

        peripheral.connect().await.map_err(Error::Bluetooth)?;

        debug!("Connected to {}", address);

        self.characteristics.write().clear();
        *self.active.write() = Some(peripheral);

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let peripheral = self.active.write().take().ok_or(Error::NotConnected)?;
        self.characteristics.write().clear();

        peripheral.disconnect().await.map_err(Error::Bluetooth)?;

        debug!("Disconnected from {}", peripheral.id());

        Ok(())
    }

    async fn pair(&self) -> Result<()> {
        // btleplug has no cross-platform bonding API; platforms bond on
        // demand when a protected characteristic is accessed.
        self.require_active()?;
        Err(Error::NotSupported {
            operation: "pairing is platform-initiated on this backend".to_string(),
        })
    }

    async fn unpair(&self) -> Result<()> {
        self.require_active()?;
        Err(Error::NotSupported {
            operation: "unpairing is platform-initiated on this backend".to_string(),
        })
    }

    async fn list_services(&self) -> Result<Vec<ServiceInfo>> {
        let peripheral = self.require_active()?;

        peripheral
            .discover_services()
            .await
            .map_err(Error::Bluetooth)?;

        let services = peripheral.services();

        let mut cache = self.characteristics.write();
        cache.clear();

        let mut infos = Vec::new();
        for service in services {
            let mut characteristics = Vec::new();
            for characteristic in service.characteristics {
                characteristics.push(CharacteristicRef {
                    uuid: characteristic.uuid,
                    service_uuid: service.uuid,
                    capabilities: capabilities_from_flags(characteristic.properties),
                    description: None,
                });
                cache.insert(characteristic.uuid, characteristic);
            }

            infos.push(ServiceInfo {
                uuid: service.uuid,
                description: None,
                characteristics,
            });
        }

        debug!(
            "Enumerated {} services, {} characteristics",
            infos.len(),
            cache.len()
        );

        Ok(infos)
    }

    async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>> {
        let peripheral = self.require_active()?;
        let characteristic = self.require_characteristic(uuid)?;

        let data = peripheral
            .read(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Read {} bytes from {}", data.len(), uuid);

        Ok(data)
    }

    async fn write_characteristic(&self, uuid: Uuid, data: &[u8], mode: WriteMode) -> Result<()> {
        let peripheral = self.require_active()?;
        let characteristic = self.require_characteristic(uuid)?;

        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };

        peripheral
            .write(&characteristic, data, write_type)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Wrote {} bytes to {}", data.len(), uuid);

        Ok(())
    }

    async fn subscribe(&self, uuid: Uuid) -> Result<NotificationStream> {
        let peripheral = self.require_active()?;
        let characteristic = self.require_characteristic(uuid)?;

        peripheral
            .subscribe(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Subscribed to notifications from {}", uuid);

        let notifications = peripheral.notifications().await.map_err(Error::Bluetooth)?;

        // One peripheral-wide stream; keep only this characteristic's values.
        let stream = notifications
            .filter_map(move |n| async move { (n.uuid == uuid).then_some(n.value) });

        Ok(Box::pin(stream))
    }

    async fn unsubscribe(&self, uuid: Uuid) -> Result<()> {
        let peripheral = self.require_active()?;
        let characteristic = self.require_characteristic(uuid)?;

        peripheral
            .unsubscribe(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Unsubscribed from notifications from {}", uuid);

        Ok(())
    }
}
