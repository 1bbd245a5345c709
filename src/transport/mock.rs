//! Mock transport for testing.
//!
//! This transport simulates a wand's GATT table in memory, records every
//! write and lets tests inject notifications. Useful for exercising the
//! session, notification loop and scanner without BLE hardware.

use log::debug;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use crate::transport::{Central, DiscoveredDevice, Handle, Notification, ServiceHandle, Transport, TransportError};
use crate::wand::constants::*;

/// GATT layout of a real wand: (service, characteristic, value handle)
pub const WAND_LAYOUT: [(Uuid, Uuid, Handle); 12] = [
    (INFO_SERVICE_UUID, ORGANIZATION_CHAR_UUID, 3),
    (INFO_SERVICE_UUID, SOFTWARE_CHAR_UUID, 5),
    (INFO_SERVICE_UUID, HARDWARE_CHAR_UUID, 7),
    (IO_SERVICE_UUID, BATTERY_CHAR_UUID, BATTERY_NOTIFICATION_HANDLE),
    (IO_SERVICE_UUID, VIBRATOR_CHAR_UUID, 26),
    (IO_SERVICE_UUID, LED_CHAR_UUID, 29),
    (IO_SERVICE_UUID, USER_BUTTON_CHAR_UUID, BUTTON_NOTIFICATION_HANDLE),
    (IO_SERVICE_UUID, KEEP_ALIVE_CHAR_UUID, 36),
    (SENSOR_SERVICE_UUID, QUATERNIONS_CHAR_UUID, POSITION_NOTIFICATION_HANDLE),
    (SENSOR_SERVICE_UUID, QUATERNIONS_RESET_CHAR_UUID, 44),
    (SENSOR_SERVICE_UUID, MAGN_CALIBRATE_CHAR_UUID, 47),
    (SENSOR_SERVICE_UUID, TEMPERATURE_CHAR_UUID, TEMPERATURE_NOTIFICATION_HANDLE),
];

/// Value handle of `uuid` in [`WAND_LAYOUT`]
pub fn wand_handle(uuid: Uuid) -> Option<Handle> {
    WAND_LAYOUT
        .iter()
        .find(|(_, characteristic, _)| *characteristic == uuid)
        .map(|(_, _, handle)| *handle)
}

/// A write seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub handle: Handle,
    pub data: Vec<u8>,
    pub with_response: bool,
}

#[derive(Debug, Default)]
struct MockInner {
    connected: bool,
    connected_to: Option<String>,
    fail_connect: bool,
    services: HashMap<Uuid, ServiceHandle>,
    characteristics: HashMap<(ServiceHandle, Uuid), Handle>,
    value_handles: HashSet<Handle>,
    values: HashMap<Handle, Vec<u8>>,
    writes: Vec<WriteRecord>,
    replies: HashMap<Handle, Notification>,
    pending: VecDeque<Notification>,
    wait_errors: usize,
    calls: usize,
}

#[derive(Debug, Default)]
struct MockState {
    inner: Mutex<MockInner>,
    arrived: Condvar,
}

/// In-memory wand peripheral
///
/// Clones share state, so a test keeps one clone for inspection while the
/// session owns another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    /// A peripheral with no services
    pub fn empty() -> Self {
        Self::default()
    }

    /// A peripheral with the full wand GATT table
    pub fn wand() -> Self {
        let transport = Self::default();
        {
            let mut inner = transport.lock();
            for (service_uuid, characteristic_uuid, handle) in WAND_LAYOUT {
                let next = ServiceHandle(inner.services.len() as u16 + 1);
                let service = *inner.services.entry(service_uuid).or_insert(next);
                inner.characteristics.insert((service, characteristic_uuid), handle);
                inner.value_handles.insert(handle);
            }
        }
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MockInner> {
        self.state.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the value returned when `handle` is read
    pub fn set_value(&self, handle: Handle, value: &[u8]) {
        self.lock().values.insert(handle, value.to_vec());
    }

    /// Drop a characteristic from the GATT table
    pub fn remove_characteristic(&self, uuid: Uuid) {
        let mut inner = self.lock();
        inner.characteristics.retain(|(_, characteristic), _| *characteristic != uuid);
    }

    /// Make `connect` fail
    pub fn fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    /// Make the next `count` waits return an error
    pub fn fail_next_waits(&self, count: usize) {
        self.lock().wait_errors = count;
    }

    /// Queue a notification for the next wait
    pub fn push_notification(&self, handle: Handle, value: &[u8]) {
        self.lock().pending.push_back(Notification {
            handle,
            value: value.to_vec(),
        });
        self.state.arrived.notify_all();
    }

    /// Queue `notification` whenever `handle` is written
    pub fn reply_on_write(&self, handle: Handle, notification: Notification) {
        self.lock().replies.insert(handle, notification);
    }

    /// Every write so far, oldest first
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    /// Payloads written to `handle`, oldest first
    pub fn writes_to(&self, handle: Handle) -> Vec<Vec<u8>> {
        self.lock()
            .writes
            .iter()
            .filter(|write| write.handle == handle)
            .map(|write| write.data.clone())
            .collect()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Number of transport calls issued, waits included
    pub fn call_count(&self) -> usize {
        self.lock().calls
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// MAC address of the last successful connect
    pub fn connected_to(&self) -> Option<String> {
        self.lock().connected_to.clone()
    }

    fn require_connected(inner: &MockInner) -> Result<(), TransportError> {
        if inner.connected {
            Ok(())
        } else {
            Err(TransportError::Disconnected)
        }
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, mac_address: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.calls += 1;

        if inner.fail_connect {
            return Err(TransportError::DeviceNotFound(mac_address.to_string()));
        }

        debug!("[MOCK TRANSPORT] Connect: {}", mac_address);
        inner.connected = true;
        inner.connected_to = Some(mac_address.to_string());
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.calls += 1;

        debug!("[MOCK TRANSPORT] Disconnect");
        inner.connected = false;
        Ok(())
    }

    fn get_service(&mut self, uuid: Uuid) -> Result<ServiceHandle, TransportError> {
        let mut inner = self.lock();
        inner.calls += 1;
        Self::require_connected(&inner)?;

        inner
            .services
            .get(&uuid)
            .copied()
            .ok_or(TransportError::ServiceNotFound(uuid))
    }

    fn get_characteristic(&mut self, service: ServiceHandle, uuid: Uuid) -> Result<Handle, TransportError> {
        let mut inner = self.lock();
        inner.calls += 1;
        Self::require_connected(&inner)?;

        inner
            .characteristics
            .get(&(service, uuid))
            .copied()
            .ok_or(TransportError::CharacteristicNotFound(uuid))
    }

    fn read(&mut self, handle: Handle) -> Result<Vec<u8>, TransportError> {
        let mut inner = self.lock();
        inner.calls += 1;
        Self::require_connected(&inner)?;

        if !inner.value_handles.contains(&handle) {
            return Err(TransportError::UnknownHandle(handle));
        }
        Ok(inner.values.get(&handle).cloned().unwrap_or_default())
    }

    fn write(&mut self, handle: Handle, data: &[u8], with_response: bool) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.calls += 1;
        Self::require_connected(&inner)?;

        let is_descriptor = inner.value_handles.contains(&handle.wrapping_sub(CCC_HANDLE_OFFSET));
        if !inner.value_handles.contains(&handle) && !is_descriptor {
            return Err(TransportError::UnknownHandle(handle));
        }

        debug!("[MOCK TRANSPORT] Write {:?} to handle {}", data, handle);
        inner.writes.push(WriteRecord {
            handle,
            data: data.to_vec(),
            with_response,
        });

        if let Some(reply) = inner.replies.get(&handle).cloned() {
            inner.pending.push_back(reply);
            self.state.arrived.notify_all();
        }
        Ok(())
    }

    fn wait_for_notification(&mut self, timeout: Duration) -> Result<Option<Notification>, TransportError> {
        let mut inner = self.lock();
        inner.calls += 1;

        if inner.wait_errors > 0 {
            inner.wait_errors -= 1;
            return Err(TransportError::Operation("injected wait failure".to_string()));
        }

        let (mut inner, _) = self
            .state
            .arrived
            .wait_timeout_while(inner, timeout, |inner| inner.pending.is_empty())
            .unwrap_or_else(PoisonError::into_inner);

        Ok(inner.pending.pop_front())
    }
}

/// Mock discovery feed
///
/// Every advertisement in the feed is reported by each scan, duplicates
/// included. Transports are created lazily per MAC address and shared
/// with the test through [`MockCentral::transport`].
#[derive(Debug, Default)]
pub struct MockCentral {
    advertisements: Vec<DiscoveredDevice>,
    transports: Mutex<HashMap<String, MockTransport>>,
}

impl MockCentral {
    pub fn new(advertisements: Vec<DiscoveredDevice>) -> Self {
        Self {
            advertisements,
            transports: Mutex::new(HashMap::new()),
        }
    }

    /// Convenience constructor for a single advertisement
    pub fn advertisement(mac_address: &str, name: Option<&str>, rssi: Option<i16>) -> DiscoveredDevice {
        DiscoveredDevice {
            mac_address: mac_address.to_string(),
            name: name.map(str::to_string),
            rssi,
        }
    }

    /// Transport handed out for `mac_address`, creating a wand if needed
    pub fn transport(&self, mac_address: &str) -> MockTransport {
        let mut transports = self.transports.lock().unwrap_or_else(PoisonError::into_inner);
        transports
            .entry(mac_address.to_ascii_uppercase())
            .or_insert_with(MockTransport::wand)
            .clone()
    }

    /// Number of transports opened so far
    pub fn opened(&self) -> usize {
        self.transports.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Central for MockCentral {
    fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, TransportError> {
        debug!("[MOCK CENTRAL] Scan for {:?}", timeout);
        Ok(self.advertisements.clone())
    }

    fn open(&self, device: &DiscoveredDevice) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(self.transport(&device.mac_address)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_wand_layout() {
        let mut transport = MockTransport::wand();
        transport.connect("AA:BB:CC:DD:EE:FF").unwrap();

        let io = transport.get_service(IO_SERVICE_UUID).unwrap();
        let button = transport.get_characteristic(io, USER_BUTTON_CHAR_UUID).unwrap();
        assert_eq!(button, BUTTON_NOTIFICATION_HANDLE);

        // Characteristics are scoped to their service
        let sensor = transport.get_service(SENSOR_SERVICE_UUID).unwrap();
        assert!(matches!(
            transport.get_characteristic(sensor, USER_BUTTON_CHAR_UUID),
            Err(TransportError::CharacteristicNotFound(_))
        ));
    }

    #[test]
    fn test_mock_requires_connection() {
        let mut transport = MockTransport::wand();
        assert!(matches!(transport.read(3), Err(TransportError::Disconnected)));
        assert!(matches!(transport.write(29, &[1, 0, 0], true), Err(TransportError::Disconnected)));
    }

    #[test]
    fn test_mock_records_writes_and_replies() {
        let mut transport = MockTransport::wand();
        transport.connect("AA:BB:CC:DD:EE:FF").unwrap();
        transport.reply_on_write(47, Notification { handle: 47, value: vec![2] });

        transport.write(48, &NOTIFICATIONS_ON, false).unwrap();
        transport.write(47, &CALIBRATE_COMMAND, true).unwrap();
        assert!(matches!(transport.write(100, &[1], true), Err(TransportError::UnknownHandle(100))));

        assert_eq!(transport.writes_to(48), vec![NOTIFICATIONS_ON.to_vec()]);
        let reply = transport.wait_for_notification(Duration::from_millis(10)).unwrap();
        assert_eq!(reply, Some(Notification { handle: 47, value: vec![2] }));
    }

    #[test]
    fn test_mock_wait_times_out() {
        let mut transport = MockTransport::wand();
        let result = transport.wait_for_notification(Duration::from_millis(5)).unwrap();
        assert!(result.is_none());
    }
}
