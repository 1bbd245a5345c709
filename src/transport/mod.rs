//! Transport abstraction for the BLE stack
//!
//! This module provides the narrow, blocking interface the wand session
//! drives. The session serializes every call behind its own lock, so
//! implementations do not have to be safe for concurrent use.

pub mod btle;
pub mod mock;

pub use btle::{BtleCentral, BtleTransport};
pub use mock::{MockCentral, MockTransport};

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Attribute handle of a characteristic value (or descriptor)
pub type Handle = u16;

/// Opaque reference to a resolved GATT service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceHandle(pub u16);

/// Advertisement seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub mac_address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

/// A notification delivered by the peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub handle: Handle,
    pub value: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Bluetooth error: {0}")]
    Btle(#[from] btleplug::Error),

    #[error("No Bluetooth adapters found")]
    NoAdapter,

    #[error("Device {0} not found")]
    DeviceNotFound(String),

    #[error("Service {0} not found")]
    ServiceNotFound(Uuid),

    #[error("Characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error("Unknown attribute handle {0}")]
    UnknownHandle(Handle),

    #[error("Not connected")]
    Disconnected,

    #[error("Transport operation failed: {0}")]
    Operation(String),
}

/// Discovery side of the BLE stack
pub trait Central: Send + Sync {
    /// Scan for advertising devices for `timeout`
    fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, TransportError>;

    /// Create an unconnected transport for a discovered device
    fn open(&self, device: &DiscoveredDevice) -> Result<Box<dyn Transport>, TransportError>;
}

/// Connection to one peripheral
pub trait Transport: Send {
    /// Connect to the peripheral with the given MAC address
    fn connect(&mut self, mac_address: &str) -> Result<(), TransportError>;

    /// Drop the connection
    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Look up a primary service by UUID
    fn get_service(&mut self, uuid: Uuid) -> Result<ServiceHandle, TransportError>;

    /// Look up a characteristic's value handle within a service
    fn get_characteristic(&mut self, service: ServiceHandle, uuid: Uuid) -> Result<Handle, TransportError>;

    /// Read a characteristic value
    fn read(&mut self, handle: Handle) -> Result<Vec<u8>, TransportError>;

    /// Write to a characteristic value or descriptor
    fn write(&mut self, handle: Handle, data: &[u8], with_response: bool) -> Result<(), TransportError>;

    /// Block up to `timeout` for the next notification
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn wait_for_notification(&mut self, timeout: Duration) -> Result<Option<Notification>, TransportError>;
}
