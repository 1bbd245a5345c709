//! Wand type definitions
//!
//! This module defines the basic data types used throughout the wand module,
//! including stream kinds, decoded notification values and session options.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::wand::constants::*;

/// One of the four notification sources the wand exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Position,
    Button,
    Temperature,
    Battery,
}

impl Stream {
    /// All streams, in registry order
    pub const ALL: [Stream; 4] = [
        Stream::Position,
        Stream::Button,
        Stream::Temperature,
        Stream::Battery,
    ];

    /// Index into per-stream arrays
    pub(crate) fn index(self) -> usize {
        match self {
            Stream::Position => 0,
            Stream::Button => 1,
            Stream::Temperature => 2,
            Stream::Battery => 3,
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stream::Position => "position",
            Stream::Button => "button",
            Stream::Temperature => "temperature",
            Stream::Battery => "battery",
        };
        f.write_str(name)
    }
}

/// Wand orientation decoded from a quaternion frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Roll (the `w` component on the wire)
    pub roll: i16,

    /// Horizontal position
    pub x: i16,

    /// Vertical position
    pub y: i16,

    /// Pitch
    pub z: i16,
}

/// A decoded notification, as handed to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WandEvent {
    Position(Position),
    Button(bool),
    Temperature(i16),
    Battery(u8),
}

/// Built-in vibration patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pattern {
    Regular = 1,
    Short = 2,
    Burst = 3,
    Long = 4,
    ShortLong = 5,
    ShortShort = 6,
    BigPause = 7,
}

/// Vibration command: a known pattern or a raw firmware code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vibration {
    Pattern(Pattern),
    Raw(u8),
}

impl From<Pattern> for Vibration {
    fn from(pattern: Pattern) -> Self {
        Vibration::Pattern(pattern)
    }
}

impl From<u8> for Vibration {
    fn from(code: u8) -> Self {
        Vibration::Raw(code)
    }
}

/// Identity of a device seen during a discovery scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// MAC address (string format like "AA:BB:CC:DD:EE:FF")
    pub mac_address: String,

    /// Advertised local name
    #[serde(default)]
    pub name: Option<String>,

    /// Signal strength in dBm
    #[serde(default)]
    pub rssi: Option<i16>,
}

impl DeviceIdentity {
    pub fn new(mac_address: &str, name: Option<&str>, rssi: Option<i16>) -> Self {
        Self {
            mac_address: canonical_mac(mac_address),
            name: name.map(str::to_string),
            rssi,
        }
    }

    /// Name for log lines
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Normalize a MAC address to upper-case, colon separated form
pub fn canonical_mac(mac: &str) -> String {
    mac.trim().replace('-', ":").to_ascii_uppercase()
}

/// Opaque id returned by `Wand::on`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Value handles the firmware sends notifications from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationHandles {
    pub position: u16,
    pub button: u16,
    pub temperature: u16,
    pub battery: u16,
}

impl Default for NotificationHandles {
    fn default() -> Self {
        Self {
            position: POSITION_NOTIFICATION_HANDLE,
            button: BUTTON_NOTIFICATION_HANDLE,
            temperature: TEMPERATURE_NOTIFICATION_HANDLE,
            battery: BATTERY_NOTIFICATION_HANDLE,
        }
    }
}

impl NotificationHandles {
    /// Stream a notification handle belongs to
    pub fn stream_for(&self, handle: u16) -> Option<Stream> {
        if handle == self.position {
            Some(Stream::Position)
        } else if handle == self.button {
            Some(Stream::Button)
        } else if handle == self.temperature {
            Some(Stream::Temperature)
        } else if handle == self.battery {
            Some(Stream::Battery)
        } else {
            None
        }
    }
}

/// Per-session tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WandOptions {
    /// How long each notification loop cycle waits
    pub notification_timeout: Duration,

    /// Firmware notification handle layout
    pub handles: NotificationHandles,
}

impl Default for WandOptions {
    fn default() -> Self {
        Self {
            notification_timeout: Duration::from_millis(NOTIFICATION_TIMEOUT_MS),
            handles: NotificationHandles::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_mac() {
        assert_eq!(canonical_mac("aa-bb-cc-dd-ee-ff"), "AA:BB:CC:DD:EE:FF");
        assert_eq!(canonical_mac(" e3:ae:cd:af:28:e2 "), "E3:AE:CD:AF:28:E2");
    }

    #[test]
    fn test_notification_handle_lookup() {
        let handles = NotificationHandles::default();
        assert_eq!(handles.stream_for(41), Some(Stream::Position));
        assert_eq!(handles.stream_for(33), Some(Stream::Button));
        assert_eq!(handles.stream_for(56), Some(Stream::Temperature));
        assert_eq!(handles.stream_for(23), Some(Stream::Battery));
        assert_eq!(handles.stream_for(42), None);
    }

    #[test]
    fn test_listener_ids_are_unique() {
        assert_ne!(ListenerId::new(), ListenerId::new());
    }
}
