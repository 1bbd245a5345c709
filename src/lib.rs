//! kano-wand: Kano BLE wand driver
//!
//! This library discovers Kano wands, manages their connection and GATT
//! handles, and delivers decoded position, button, temperature and battery
//! notifications to registered listeners.

pub mod config;
pub mod error;
pub mod scanner;
pub mod transport;
pub mod wand;

// Re-export commonly used items
pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use scanner::{MatchCriteria, Scanner};
pub use transport::{Central, Transport, TransportError};
pub use wand::{
    ConnectionState, DeviceIdentity, ListenerId, NoopHandler, Pattern, Position, Stream, Vibration, Wand,
    WandEvent, WandHandler, WandOptions, WeakWand,
};
