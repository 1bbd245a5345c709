//! Characteristic resolution
//!
//! Maps the wand's named characteristics to transport handles. Each handle
//! is looked up once per connection and cached until the session
//! disconnects.

use log::debug;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{Handle, ServiceHandle, Transport};
use crate::wand::constants::*;
use crate::wand::types::Stream;

/// The wand's three GATT services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Info,
    Io,
    Sensor,
}

impl Service {
    pub const ALL: [Service; 3] = [Service::Info, Service::Io, Service::Sensor];

    pub fn uuid(self) -> Uuid {
        match self {
            Service::Info => INFO_SERVICE_UUID,
            Service::Io => IO_SERVICE_UUID,
            Service::Sensor => SENSOR_SERVICE_UUID,
        }
    }
}

/// Every characteristic the session talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    Organization,
    Software,
    Hardware,
    Battery,
    UserButton,
    Vibrator,
    Led,
    KeepAlive,
    Temperature,
    Quaternions,
    QuaternionsReset,
    MagnetometerCalibrate,
}

impl Characteristic {
    pub fn service(self) -> Service {
        match self {
            Characteristic::Organization | Characteristic::Software | Characteristic::Hardware => Service::Info,
            Characteristic::Battery
            | Characteristic::UserButton
            | Characteristic::Vibrator
            | Characteristic::Led
            | Characteristic::KeepAlive => Service::Io,
            Characteristic::Temperature
            | Characteristic::Quaternions
            | Characteristic::QuaternionsReset
            | Characteristic::MagnetometerCalibrate => Service::Sensor,
        }
    }

    pub fn uuid(self) -> Uuid {
        match self {
            Characteristic::Organization => ORGANIZATION_CHAR_UUID,
            Characteristic::Software => SOFTWARE_CHAR_UUID,
            Characteristic::Hardware => HARDWARE_CHAR_UUID,
            Characteristic::Battery => BATTERY_CHAR_UUID,
            Characteristic::UserButton => USER_BUTTON_CHAR_UUID,
            Characteristic::Vibrator => VIBRATOR_CHAR_UUID,
            Characteristic::Led => LED_CHAR_UUID,
            Characteristic::KeepAlive => KEEP_ALIVE_CHAR_UUID,
            Characteristic::Temperature => TEMPERATURE_CHAR_UUID,
            Characteristic::Quaternions => QUATERNIONS_CHAR_UUID,
            Characteristic::QuaternionsReset => QUATERNIONS_RESET_CHAR_UUID,
            Characteristic::MagnetometerCalibrate => MAGN_CALIBRATE_CHAR_UUID,
        }
    }
}

impl From<Stream> for Characteristic {
    fn from(stream: Stream) -> Self {
        match stream {
            Stream::Position => Characteristic::Quaternions,
            Stream::Button => Characteristic::UserButton,
            Stream::Temperature => Characteristic::Temperature,
            Stream::Battery => Characteristic::Battery,
        }
    }
}

/// CCC descriptor handle for a characteristic value handle
pub fn ccc_handle(data_handle: Handle) -> Handle {
    data_handle + CCC_HANDLE_OFFSET
}

/// Per-connection cache of service and characteristic handles
#[derive(Debug, Default)]
pub struct CharacteristicResolver {
    services: HashMap<Service, ServiceHandle>,
    handles: HashMap<Characteristic, Handle>,
}

impl CharacteristicResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the three wand services, dropping any stale handles
    pub fn load_services(&mut self, transport: &mut dyn Transport) -> Result<()> {
        self.clear();
        for service in Service::ALL {
            let handle = transport.get_service(service.uuid())?;
            debug!("Found {:?} service", service);
            self.services.insert(service, handle);
        }
        Ok(())
    }

    /// Handle for `characteristic`, asking the transport only on first use
    pub fn resolve(&mut self, transport: &mut dyn Transport, characteristic: Characteristic) -> Result<Handle> {
        if let Some(handle) = self.handles.get(&characteristic) {
            return Ok(*handle);
        }

        let service = self
            .services
            .get(&characteristic.service())
            .copied()
            .ok_or(Error::CharacteristicNotFound(characteristic.uuid()))?;

        let handle = transport.get_characteristic(service, characteristic.uuid())?;
        debug!("Resolved {:?} to handle {}", characteristic, handle);
        self.handles.insert(characteristic, handle);
        Ok(handle)
    }

    /// Cached handle, without touching the transport
    pub fn cached(&self, characteristic: Characteristic) -> Option<Handle> {
        self.handles.get(&characteristic).copied()
    }

    pub fn clear(&mut self) {
        self.services.clear();
        self.handles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn connected_mock() -> MockTransport {
        let mut transport = MockTransport::wand();
        transport.connect("AA:BB:CC:DD:EE:FF").unwrap();
        transport
    }

    #[test]
    fn test_resolve_is_cached() {
        let mock = connected_mock();
        let mut transport = mock.clone();
        let mut resolver = CharacteristicResolver::new();
        resolver.load_services(&mut transport).unwrap();

        let calls = mock.call_count();
        let first = resolver.resolve(&mut transport, Characteristic::Led).unwrap();
        assert_eq!(mock.call_count(), calls + 1);

        let second = resolver.resolve(&mut transport, Characteristic::Led).unwrap();
        assert_eq!(first, second);
        assert_eq!(mock.call_count(), calls + 1);
        assert_eq!(resolver.cached(Characteristic::Led), Some(first));
    }

    #[test]
    fn test_resolve_missing_characteristic() {
        let mock = connected_mock();
        mock.remove_characteristic(KEEP_ALIVE_CHAR_UUID);
        let mut transport = mock.clone();
        let mut resolver = CharacteristicResolver::new();
        resolver.load_services(&mut transport).unwrap();

        let err = resolver.resolve(&mut transport, Characteristic::KeepAlive).unwrap_err();
        assert!(matches!(err, Error::CharacteristicNotFound(uuid) if uuid == KEEP_ALIVE_CHAR_UUID));
        assert_eq!(resolver.cached(Characteristic::KeepAlive), None);
    }

    #[test]
    fn test_clear_drops_handles() {
        let mut transport = connected_mock();
        let mut resolver = CharacteristicResolver::new();
        resolver.load_services(&mut transport).unwrap();
        resolver.resolve(&mut transport, Characteristic::Quaternions).unwrap();

        resolver.clear();
        assert_eq!(resolver.cached(Characteristic::Quaternions), None);
    }

    #[test]
    fn test_stream_characteristics() {
        assert_eq!(Characteristic::from(Stream::Position), Characteristic::Quaternions);
        assert_eq!(Characteristic::from(Stream::Button).service(), Service::Io);
        assert_eq!(ccc_handle(POSITION_NOTIFICATION_HANDLE), 42);
    }
}
