//! Wand device session
//!
//! A [`Wand`] owns one transport connection and provides:
//! - Connect / disconnect with handler extension points
//! - Info, battery, temperature and button reads
//! - Vibration, LED, keep-alive, position reset and calibration writes
//! - Per-stream subscriptions and listener registration
//!
//! Locking: the session state lock may be held while taking the transport
//! lock, never the other way round. Listeners and hooks run with no lock
//! held, so they are free to call back into the session.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::transport::{Handle, Notification, Transport, TransportError};
use crate::wand::codec;
use crate::wand::constants::*;
use crate::wand::handler::WandHandler;
use crate::wand::notify;
use crate::wand::resolver::{ccc_handle, Characteristic, CharacteristicResolver};
use crate::wand::subscription::SubscriptionRegistry;
use crate::wand::types::{ConnectionState, DeviceIdentity, ListenerId, Stream, Vibration, WandEvent, WandOptions};

/// Transport plus the handles resolved on it
struct Link {
    transport: Box<dyn Transport>,
    resolver: CharacteristicResolver,
}

impl Link {
    fn resolve(&mut self, characteristic: Characteristic) -> Result<Handle> {
        self.resolver.resolve(self.transport.as_mut(), characteristic)
    }

    fn read(&mut self, characteristic: Characteristic) -> Result<Vec<u8>> {
        let handle = self.resolve(characteristic)?;
        Ok(self.transport.read(handle)?)
    }

    fn write(&mut self, characteristic: Characteristic, data: &[u8], with_response: bool) -> Result<()> {
        let handle = self.resolve(characteristic)?;
        Ok(self.transport.write(handle, data, with_response)?)
    }

    /// Write the CCC descriptor that follows the value handle
    fn write_ccc(&mut self, characteristic: Characteristic, value: &[u8]) -> Result<()> {
        let handle = self.resolve(characteristic)?;
        Ok(self.transport.write(ccc_handle(handle), value, false)?)
    }
}

/// An in-flight magnetometer calibration
pub(crate) struct Calibration {
    pub(crate) handle: Handle,
    pub(crate) status: Sender<u8>,
}

pub(crate) struct SessionState {
    pub(crate) connection: ConnectionState,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) calibration: Option<Calibration>,
    /// Quaternion reset already sent on this connection
    position_reset: bool,
    /// Cleared by the worker, under this lock, when it decides to exit
    worker_running: bool,
    worker: Option<JoinHandle<()>>,
}

struct Inner {
    identity: DeviceIdentity,
    handler: Arc<dyn WandHandler>,
    options: WandOptions,
    state: Mutex<SessionState>,
    link: Mutex<Link>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.connection == ConnectionState::Disconnected {
            return;
        }

        let link = self.link.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = link.transport.disconnect() {
            warn!("Failed to disconnect {} on drop: {}", self.identity.mac_address, e);
        }
    }
}

/// Session with one Kano wand
///
/// Cloning is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct Wand {
    inner: Arc<Inner>,
}

/// Non-owning session handle
///
/// Held by the notification worker, and by listeners that need the session
/// without keeping it alive.
#[derive(Clone)]
pub struct WeakWand(Weak<Inner>);

impl WeakWand {
    pub fn upgrade(&self) -> Option<Wand> {
        self.0.upgrade().map(|inner| Wand { inner })
    }
}

impl Wand {
    pub fn new(
        identity: DeviceIdentity,
        transport: Box<dyn Transport>,
        handler: Arc<dyn WandHandler>,
        options: WandOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                identity,
                handler,
                options,
                state: Mutex::new(SessionState {
                    connection: ConnectionState::Disconnected,
                    registry: SubscriptionRegistry::new(),
                    calibration: None,
                    position_reset: false,
                    worker_running: false,
                    worker: None,
                }),
                link: Mutex::new(Link {
                    transport,
                    resolver: CharacteristicResolver::new(),
                }),
            }),
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.inner.identity
    }

    pub fn mac_address(&self) -> &str {
        &self.inner.identity.mac_address
    }

    pub fn name(&self) -> &str {
        self.inner.identity.display_name()
    }

    pub fn options(&self) -> &WandOptions {
        &self.inner.options
    }

    pub fn state(&self) -> ConnectionState {
        self.lock_state().connection
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Whether the wand has been told to send notifications for `stream`
    pub fn is_subscribed(&self, stream: Stream) -> bool {
        self.lock_state().registry.is_notifying(stream)
    }

    /// Whether the notification worker is running
    pub fn is_listening(&self) -> bool {
        self.lock_state().worker_running
    }

    pub(crate) fn handler(&self) -> &dyn WandHandler {
        self.inner.handler.as_ref()
    }

    pub fn downgrade(&self) -> WeakWand {
        WeakWand(Arc::downgrade(&self.inner))
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.inner.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connected_state(&self) -> Result<MutexGuard<'_, SessionState>> {
        let state = self.lock_state();
        if state.connection != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        Ok(state)
    }

    // ============================================================================
    // Connection
    // ============================================================================

    /// Connect, resolve the wand services and run the post-connect hooks
    ///
    /// Streams with an installed hook, or with listeners left over from an
    /// earlier connection, are subscribed before `post_connect` runs.
    pub fn connect(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            match state.connection {
                ConnectionState::Connected => {
                    debug!("{} is already connected", self.name());
                    return Ok(());
                }
                ConnectionState::Connecting => return Err(Error::ConnectInProgress),
                ConnectionState::Disconnected => state.connection = ConnectionState::Connecting,
            }
        }

        info!("Connecting to {} ({})...", self.name(), self.mac_address());
        if let Err(e) = self.open_link() {
            self.lock_state().connection = ConnectionState::Disconnected;
            return Err(e);
        }

        {
            let mut state = self.lock_state();
            if state.connection != ConnectionState::Connecting {
                // Disconnected while the link was coming up
                return Err(Error::NotConnected);
            }
            state.connection = ConnectionState::Connected;
            state.position_reset = false;

            for stream in Stream::ALL {
                let hook = self.inner.handler.subscribes_to(stream);
                state.registry.set_hook(stream, hook);
            }
            if let Err(e) = self.resubscribe(&mut state) {
                warn!("Failed to subscribe {} after connecting: {}", self.name(), e);
                if let Err(close_err) = self.close(state) {
                    debug!("Disconnect after failed subscribe: {}", close_err);
                }
                return Err(e);
            }
        }

        self.inner.handler.post_connect(self)?;
        info!("✓ Connected to {}", self.name());
        Ok(())
    }

    /// Subscribe every stream that still has listeners or a hook
    fn resubscribe(&self, state: &mut SessionState) -> Result<()> {
        for stream in Stream::ALL {
            if !state.registry.is_unused(stream) {
                self.subscribe_locked(state, stream)?;
            }
        }
        Ok(())
    }

    fn open_link(&self) -> Result<()> {
        let mut guard = self.lock_link();
        let link = &mut *guard;

        link.transport.connect(&self.inner.identity.mac_address)?;
        if let Err(e) = link.resolver.load_services(link.transport.as_mut()) {
            if let Err(disconnect_err) = link.transport.disconnect() {
                debug!("Disconnect after failed service lookup: {}", disconnect_err);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Disconnect and stop the notification worker
    ///
    /// Listeners stay registered and are resubscribed by the next `connect`.
    pub fn disconnect(&self) -> Result<()> {
        let state = self.lock_state();
        if state.connection == ConnectionState::Disconnected {
            return Ok(());
        }
        info!("Disconnecting from {}...", self.name());
        let result = self.close(state);

        self.inner.handler.post_disconnect(self);
        info!("✓ Disconnected from {}", self.name());
        result.map_err(Error::from)
    }

    /// Mark the session disconnected, drop the link and stop the worker
    fn close(&self, mut state: MutexGuard<'_, SessionState>) -> std::result::Result<(), TransportError> {
        state.connection = ConnectionState::Disconnected;
        state.registry.deactivate_all();
        state.calibration = None;
        let worker = state.worker.take();
        drop(state);

        let result = {
            let mut link = self.lock_link();
            link.resolver.clear();
            link.transport.disconnect()
        };

        if let Some(worker) = worker {
            // A listener may disconnect from the worker thread itself
            if !is_current_thread(&worker) && worker.join().is_err() {
                warn!("Notification thread for {} panicked", self.name());
            }
        }
        result
    }

    // ============================================================================
    // Reads
    // ============================================================================

    fn read(&self, characteristic: Characteristic) -> Result<Vec<u8>> {
        let _state = self.connected_state()?;
        self.lock_link().read(characteristic)
    }

    fn read_string(&self, characteristic: Characteristic) -> Result<String> {
        let data = self.read(characteristic)?;
        Ok(String::from_utf8_lossy(&data).trim_end_matches('\0').to_string())
    }

    pub fn get_organization(&self) -> Result<String> {
        self.read_string(Characteristic::Organization)
    }

    pub fn get_software_version(&self) -> Result<String> {
        self.read_string(Characteristic::Software)
    }

    pub fn get_hardware_version(&self) -> Result<String> {
        self.read_string(Characteristic::Hardware)
    }

    /// Battery level as reported by the wand
    pub fn get_battery(&self) -> Result<u8> {
        codec::decode_battery(&self.read(Characteristic::Battery)?)
    }

    pub fn get_temperature(&self) -> Result<i16> {
        codec::decode_temperature(&self.read(Characteristic::Temperature)?)
    }

    /// Whether the button is currently held
    pub fn get_button(&self) -> Result<bool> {
        codec::decode_button(&self.read(Characteristic::UserButton)?)
    }

    // ============================================================================
    // Writes
    // ============================================================================

    fn write(&self, characteristic: Characteristic, data: &[u8], with_response: bool) -> Result<()> {
        let _state = self.connected_state()?;
        self.lock_link().write(characteristic, data, with_response)
    }

    /// Vibrate with a built-in pattern or a raw firmware code
    pub fn vibrate(&self, vibration: impl Into<Vibration>) -> Result<()> {
        let vibration = vibration.into();
        debug!("Vibrating {}: {:?}", self.name(), vibration);
        self.write(Characteristic::Vibrator, &codec::encode_vibration(vibration), true)
    }

    /// Set the LED colour (`#RRGGBB`, `0xRRGGBB` or `RRGGBB`)
    pub fn set_led(&self, color: &str, on: bool) -> Result<()> {
        let _state = self.connected_state()?;
        let message = codec::encode_led(color, on)?;
        debug!("Setting LED of {} to {} (on: {})", self.name(), color, on);
        self.lock_link().write(Characteristic::Led, &message, true)
    }

    pub fn keep_alive(&self) -> Result<()> {
        self.write(Characteristic::KeepAlive, &KEEP_ALIVE_COMMAND, true)
    }

    /// Reset the wand's quaternions
    pub fn reset_position(&self) -> Result<()> {
        let mut state = self.connected_state()?;
        self.lock_link()
            .write(Characteristic::QuaternionsReset, &RESET_POSITION_COMMAND, false)?;
        state.position_reset = true;
        Ok(())
    }

    /// Run a magnetometer calibration, waiting up to `timeout` for the result
    ///
    /// Position notifications are paused while calibrating and restored
    /// afterwards if they were on.
    ///
    /// When called from a listener or hook the worker is busy running the
    /// caller, so the status is read from the transport directly. Other
    /// notifications seen meanwhile are delivered once calibration ends.
    pub fn calibrate_magnetometer(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let (sender, receiver) = bounded(8);

        let mut state = self.connected_state()?;
        let on_worker = state.worker.as_ref().is_some_and(is_current_thread);
        let restore_position = state.registry.is_notifying(Stream::Position);
        let started = self.start_calibration(&mut state, sender);
        drop(state);

        let mut deferred = Vec::new();
        let verdict = match started {
            Ok(handle) => {
                info!("Calibrating magnetometer of {}...", self.name());
                if on_worker {
                    self.poll_calibration(handle, deadline, &mut deferred)
                } else {
                    wait_for_calibration(&receiver, deadline)
                }
            }
            Err(e) => Err(e),
        };

        self.finish_calibration(restore_position);
        match &verdict {
            Ok(()) => info!("✓ Magnetometer calibrated"),
            Err(e) => warn!("Magnetometer calibration of {} failed: {}", self.name(), e),
        }

        for notification in deferred {
            notify::route(self, notification);
        }
        verdict
    }

    fn start_calibration(&self, state: &mut SessionState, status: Sender<u8>) -> Result<Handle> {
        if state.registry.is_notifying(Stream::Position) {
            self.unsubscribe_locked(state, Stream::Position, false)?;
        }

        let mut link = self.lock_link();
        let handle = link.resolve(Characteristic::MagnetometerCalibrate)?;
        link.transport.write(ccc_handle(handle), &NOTIFICATIONS_ON, false)?;

        state.calibration = Some(Calibration { handle, status });
        self.ensure_worker(state)?;

        link.transport.write(handle, &CALIBRATE_COMMAND, true)?;
        Ok(handle)
    }

    /// Wait for the calibration status on the worker thread itself
    fn poll_calibration(&self, handle: Handle, deadline: Instant, deferred: &mut Vec<Notification>) -> Result<()> {
        loop {
            if !self.is_connected() {
                return Err(Error::NotConnected);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::CalibrationTimeout);
            }

            let timeout = remaining.min(self.inner.options.notification_timeout);
            match self.lock_link().transport.wait_for_notification(timeout) {
                Ok(Some(notification)) if notification.handle == handle => {
                    if let Some(verdict) = notification.value.first().and_then(|status| calibration_verdict(*status)) {
                        return verdict;
                    }
                }
                Ok(Some(notification)) => deferred.push(notification),
                Ok(None) => {}
                Err(e) => {
                    debug!("Notification wait failed: {}", e);
                    thread::sleep(timeout);
                }
            }
        }
    }

    fn finish_calibration(&self, restore_position: bool) {
        let mut state = self.lock_state();
        let calibration = state.calibration.take();
        if state.connection != ConnectionState::Connected {
            return;
        }

        if let Some(calibration) = calibration {
            let result = self
                .lock_link()
                .transport
                .write(ccc_handle(calibration.handle), &NOTIFICATIONS_OFF, false);
            if let Err(e) = result {
                warn!("Failed to disable calibration notifications: {}", e);
            }
        }

        if restore_position {
            if let Err(e) = self.subscribe_locked(&mut state, Stream::Position) {
                warn!("Failed to restore position notifications: {}", e);
            }
        }
    }

    // ============================================================================
    // Subscriptions
    // ============================================================================

    /// Ask the wand for notifications on `stream` and start the worker
    ///
    /// Does nothing if the stream is already subscribed.
    pub fn subscribe(&self, stream: Stream) -> Result<()> {
        let mut state = self.connected_state()?;
        self.subscribe_locked(&mut state, stream)
    }

    /// Stop notifications for `stream`
    ///
    /// With `keep_notifications` the stream still counts as active, so the
    /// worker keeps running. A later `subscribe` turns notifications back on.
    pub fn unsubscribe(&self, stream: Stream, keep_notifications: bool) -> Result<()> {
        let mut state = self.connected_state()?;
        self.unsubscribe_locked(&mut state, stream, keep_notifications)
    }

    /// Register a listener for `stream` and subscribe to it
    pub fn on<F>(&self, stream: Stream, callback: F) -> Result<ListenerId>
    where
        F: Fn(&WandEvent) + Send + Sync + 'static,
    {
        let mut state = self.connected_state()?;
        let id = state.registry.add(stream, Arc::new(callback));

        if let Err(e) = self.subscribe_locked(&mut state, stream) {
            state.registry.remove(id);
            return Err(e);
        }

        debug!("Added {} listener {}", stream, id);
        Ok(id)
    }

    /// Remove a listener; returns false if `id` is unknown
    ///
    /// Removing the last listener of a stream without a hook unsubscribes it.
    pub fn off(&self, id: ListenerId, keep_notifications: bool) -> Result<bool> {
        let mut state = self.lock_state();
        let Some(stream) = state.registry.remove(id) else {
            debug!("Could not remove listener {}", id);
            return Ok(false);
        };
        debug!("Removed {} listener {}", stream, id);

        if state.registry.is_unused(stream) && state.connection == ConnectionState::Connected {
            self.unsubscribe_locked(&mut state, stream, keep_notifications)?;
        }
        Ok(true)
    }

    fn subscribe_locked(&self, state: &mut SessionState, stream: Stream) -> Result<()> {
        if state.registry.is_notifying(stream) {
            return Ok(());
        }

        {
            let mut link = self.lock_link();
            if !state.position_reset {
                link.write(Characteristic::QuaternionsReset, &RESET_POSITION_COMMAND, false)?;
                state.position_reset = true;
            }
            link.write_ccc(Characteristic::from(stream), &NOTIFICATIONS_ON)?;
        }

        let was_active = state.registry.is_active(stream);
        state.registry.set_notifying(stream, true);
        state.registry.set_active(stream, true);
        debug!("Subscribed to {} notifications", stream);

        if let Err(e) = self.ensure_worker(state) {
            state.registry.set_active(stream, was_active);
            return Err(e);
        }
        Ok(())
    }

    fn unsubscribe_locked(&self, state: &mut SessionState, stream: Stream, keep_notifications: bool) -> Result<()> {
        self.lock_link()
            .write_ccc(Characteristic::from(stream), &NOTIFICATIONS_OFF)?;
        state.registry.set_notifying(stream, false);
        state.registry.set_active(stream, keep_notifications);
        debug!("Unsubscribed from {} notifications", stream);
        Ok(())
    }

    fn ensure_worker(&self, state: &mut SessionState) -> Result<()> {
        if state.worker_running {
            return Ok(());
        }

        let worker = notify::spawn(self)?;
        state.worker_running = true;
        state.worker = Some(worker);
        Ok(())
    }

    // ============================================================================
    // Worker side
    // ============================================================================

    /// Loop condition, checked by the worker once per cycle
    pub(crate) fn keep_listening(&self) -> bool {
        let mut state = self.lock_state();
        let keep = state.connection == ConnectionState::Connected
            && (state.registry.any_active() || state.calibration.is_some());
        if !keep {
            state.worker_running = false;
        }
        keep
    }

    pub(crate) fn next_notification(&self) -> std::result::Result<Option<Notification>, TransportError> {
        let timeout = self.inner.options.notification_timeout;
        self.lock_link().transport.wait_for_notification(timeout)
    }
}

fn is_current_thread(worker: &JoinHandle<()>) -> bool {
    worker.thread().id() == thread::current().id()
}

/// Final result for a calibration status byte, `None` while in progress
fn calibration_verdict(status: u8) -> Option<Result<()>> {
    match status {
        CALIBRATION_DONE => Some(Ok(())),
        CALIBRATION_FAILED => Some(Err(Error::CalibrationFailed)),
        _ => {
            debug!("Calibration status {}", status);
            None
        }
    }
}

fn wait_for_calibration(receiver: &Receiver<u8>, deadline: Instant) -> Result<()> {
    loop {
        match receiver.recv_deadline(deadline) {
            Ok(status) => {
                if let Some(verdict) = calibration_verdict(status) {
                    return verdict;
                }
            }
            Err(RecvTimeoutError::Timeout) => return Err(Error::CalibrationTimeout),
            Err(RecvTimeoutError::Disconnected) => return Err(Error::NotConnected),
        }
    }
}

impl fmt::Debug for Wand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("Wand")
            .field("identity", &self.inner.identity)
            .field("connection", &state.connection)
            .field("subscriptions", &state.registry)
            .field("listening", &state.worker_running)
            .finish()
    }
}
