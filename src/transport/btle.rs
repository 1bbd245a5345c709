//! btleplug transport
//!
//! This module bridges the blocking transport interface onto btleplug.
//! Each central owns a tokio runtime and every call is driven to
//! completion with `block_on`, so the session API must not be called from
//! inside an async context.
//!
//! btleplug does not expose ATT handles, so handles are assigned here: the
//! four notifying characteristics get the wand firmware's fixed handles and
//! everything else is numbered from `ALLOCATED_HANDLE_BASE` in steps of two.
//! A write to `handle + 1` is the CCC descriptor of `handle` and is turned
//! into a btleplug subscribe/unsubscribe.

use btleplug::api::{
    Central as _, Characteristic, Manager as _, Peripheral as _, ScanFilter, Service, ValueNotification,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{Stream, StreamExt};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use uuid::Uuid;

use crate::transport::{Central, DiscoveredDevice, Handle, Notification, ServiceHandle, Transport, TransportError};
use crate::wand::constants::*;

/// First handle given to characteristics without a fixed firmware handle
const ALLOCATED_HANDLE_BASE: Handle = 0x0100;

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// Firmware handle for characteristics the wand notifies on
fn fixed_handle(uuid: Uuid) -> Option<Handle> {
    const FIXED: [(Uuid, Handle); 4] = [
        (QUATERNIONS_CHAR_UUID, POSITION_NOTIFICATION_HANDLE),
        (USER_BUTTON_CHAR_UUID, BUTTON_NOTIFICATION_HANDLE),
        (TEMPERATURE_CHAR_UUID, TEMPERATURE_NOTIFICATION_HANDLE),
        (BATTERY_CHAR_UUID, BATTERY_NOTIFICATION_HANDLE),
    ];

    FIXED
        .iter()
        .find(|(fixed, _)| *fixed == uuid)
        .map(|(_, handle)| *handle)
}

/// Discovery through the first Bluetooth adapter
pub struct BtleCentral {
    runtime: Arc<Runtime>,
    _manager: Manager,
    adapter: Adapter,
}

impl BtleCentral {
    /// Create a runtime and pick the first adapter
    pub fn new() -> Result<Self, TransportError> {
        let runtime = Runtime::new()
            .map_err(|e| TransportError::Operation(format!("Failed to create tokio runtime: {}", e)))?;

        let (manager, adapter) = runtime.block_on(async {
            let manager = Manager::new().await?;
            let adapters = manager.adapters().await?;
            let adapter = adapters.into_iter().next().ok_or(TransportError::NoAdapter)?;
            Ok::<_, TransportError>((manager, adapter))
        })?;

        match runtime.block_on(adapter.adapter_info()) {
            Ok(adapter_info) => info!("Using Bluetooth adapter: {}", adapter_info),
            Err(e) => debug!("Could not query adapter info: {}", e),
        }

        Ok(Self {
            runtime: Arc::new(runtime),
            _manager: manager,
            adapter,
        })
    }
}

impl Central for BtleCentral {
    fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, TransportError> {
        self.runtime.block_on(async {
            self.adapter.start_scan(ScanFilter::default()).await?;
            tokio::time::sleep(timeout).await;
            self.adapter.stop_scan().await?;

            let mut devices = Vec::new();
            for peripheral in self.adapter.peripherals().await? {
                match peripheral.properties().await {
                    Ok(Some(properties)) => devices.push(DiscoveredDevice {
                        mac_address: properties.address.to_string(),
                        name: properties.local_name,
                        rssi: properties.rssi,
                    }),
                    Ok(None) => debug!("Peripheral {:?} has no properties", peripheral.id()),
                    Err(e) => warn!("Could not query peripheral for properties: {}", e),
                }
            }

            debug!("Scan finished, {} devices seen", devices.len());
            Ok(devices)
        })
    }

    fn open(&self, _device: &DiscoveredDevice) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(BtleTransport::new(Arc::clone(&self.runtime), self.adapter.clone())))
    }
}

/// Connection to one peripheral through btleplug
pub struct BtleTransport {
    runtime: Arc<Runtime>,
    adapter: Adapter,
    peripheral: Option<Peripheral>,
    services: Vec<Service>,
    characteristics: HashMap<Handle, Characteristic>,
    next_handle: Handle,
    notifications: Option<NotificationStream>,
}

impl BtleTransport {
    pub fn new(runtime: Arc<Runtime>, adapter: Adapter) -> Self {
        Self {
            runtime,
            adapter,
            peripheral: None,
            services: Vec::new(),
            characteristics: HashMap::new(),
            next_handle: ALLOCATED_HANDLE_BASE,
            notifications: None,
        }
    }

    fn peripheral(&self) -> Result<&Peripheral, TransportError> {
        self.peripheral.as_ref().ok_or(TransportError::Disconnected)
    }

    fn characteristic(&self, handle: Handle) -> Result<&Characteristic, TransportError> {
        self.characteristics.get(&handle).ok_or(TransportError::UnknownHandle(handle))
    }

    fn handle_for(&self, uuid: Uuid) -> Option<Handle> {
        self.characteristics
            .iter()
            .find(|(_, characteristic)| characteristic.uuid == uuid)
            .map(|(handle, _)| *handle)
    }

    fn allocate_handle(&mut self, uuid: Uuid) -> Handle {
        if let Some(handle) = fixed_handle(uuid) {
            return handle;
        }
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(2);
        handle
    }

    fn reset(&mut self) {
        self.peripheral = None;
        self.services.clear();
        self.characteristics.clear();
        self.next_handle = ALLOCATED_HANDLE_BASE;
        self.notifications = None;
    }
}

async fn find_peripheral(adapter: &Adapter, mac_address: &str) -> Result<Peripheral, TransportError> {
    for peripheral in adapter.peripherals().await? {
        if let Ok(Some(properties)) = peripheral.properties().await {
            if properties.address.to_string().eq_ignore_ascii_case(mac_address) {
                return Ok(peripheral);
            }
        }
    }
    Err(TransportError::DeviceNotFound(mac_address.to_string()))
}

impl Transport for BtleTransport {
    fn connect(&mut self, mac_address: &str) -> Result<(), TransportError> {
        info!("Connecting to {}...", mac_address);

        let (peripheral, notifications) = self.runtime.block_on(async {
            let peripheral = find_peripheral(&self.adapter, mac_address).await?;
            peripheral.connect().await?;

            info!("Discovering services...");
            peripheral.discover_services().await?;
            let notifications = peripheral.notifications().await?;
            Ok::<_, TransportError>((peripheral, notifications))
        })?;

        self.reset();
        self.services = peripheral.services().into_iter().collect();
        self.peripheral = Some(peripheral);
        self.notifications = Some(notifications);

        debug!("Found {} services", self.services.len());
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        let Some(peripheral) = self.peripheral.take() else {
            return Ok(());
        };

        let result = self.runtime.block_on(peripheral.disconnect());
        self.reset();
        result.map_err(TransportError::from)
    }

    fn get_service(&mut self, uuid: Uuid) -> Result<ServiceHandle, TransportError> {
        self.peripheral()?;
        self.services
            .iter()
            .position(|service| service.uuid == uuid)
            .map(|index| ServiceHandle(index as u16))
            .ok_or(TransportError::ServiceNotFound(uuid))
    }

    fn get_characteristic(&mut self, service: ServiceHandle, uuid: Uuid) -> Result<Handle, TransportError> {
        self.peripheral()?;
        let characteristic = self
            .services
            .get(service.0 as usize)
            .ok_or_else(|| TransportError::Operation(format!("Unknown service handle {}", service.0)))?
            .characteristics
            .iter()
            .find(|characteristic| characteristic.uuid == uuid)
            .cloned()
            .ok_or(TransportError::CharacteristicNotFound(uuid))?;

        if let Some(handle) = self.handle_for(uuid) {
            return Ok(handle);
        }

        let handle = self.allocate_handle(uuid);
        debug!("Assigned handle {} to characteristic {}", handle, uuid);
        self.characteristics.insert(handle, characteristic);
        Ok(handle)
    }

    fn read(&mut self, handle: Handle) -> Result<Vec<u8>, TransportError> {
        let peripheral = self.peripheral()?;
        let characteristic = self.characteristic(handle)?;
        Ok(self.runtime.block_on(peripheral.read(characteristic))?)
    }

    fn write(&mut self, handle: Handle, data: &[u8], with_response: bool) -> Result<(), TransportError> {
        let peripheral = self.peripheral()?;

        if let Ok(characteristic) = self.characteristic(handle) {
            let write_type = if with_response {
                WriteType::WithResponse
            } else {
                WriteType::WithoutResponse
            };
            return Ok(self.runtime.block_on(peripheral.write(characteristic, data, write_type))?);
        }

        // CCC descriptor of the characteristic just below
        let characteristic = self
            .characteristics
            .get(&handle.wrapping_sub(CCC_HANDLE_OFFSET))
            .ok_or(TransportError::UnknownHandle(handle))?;

        if data.first().copied().unwrap_or(0) != 0 {
            debug!("Subscribing to {}", characteristic.uuid);
            self.runtime.block_on(peripheral.subscribe(characteristic))?;
        } else {
            debug!("Unsubscribing from {}", characteristic.uuid);
            self.runtime.block_on(peripheral.unsubscribe(characteristic))?;
        }
        Ok(())
    }

    fn wait_for_notification(&mut self, timeout: Duration) -> Result<Option<Notification>, TransportError> {
        let stream = self.notifications.as_mut().ok_or(TransportError::Disconnected)?;
        let next = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, stream.next()).await });

        match next {
            Err(_) => Ok(None),
            Ok(None) => Err(TransportError::Disconnected),
            Ok(Some(notification)) => match self.handle_for(notification.uuid) {
                Some(handle) => Ok(Some(Notification {
                    handle,
                    value: notification.value,
                })),
                None => {
                    debug!("Notification from unmapped characteristic {}", notification.uuid);
                    Ok(None)
                }
            },
        }
    }
}
