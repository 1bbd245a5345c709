//! Error types for wand sessions and scanning

use thiserror::Error;
use uuid::Uuid;

use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Either a name, prefix, or mac address must be provided to find a wand")]
    InvalidMatchCriteria,

    #[error("Characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error("Wand is not connected")]
    NotConnected,

    #[error("Wand is already connecting")]
    ConnectInProgress,

    #[error("Invalid color '{0}', expected #RRGGBB, 0xRRGGBB or RRGGBB")]
    InvalidColor(String),

    #[error("Invalid frame: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },

    #[error("Magnetometer calibration failed")]
    CalibrationFailed,

    #[error("Magnetometer calibration did not finish in time")]
    CalibrationTimeout,

    #[error("Failed to start notification thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(TransportError),
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::CharacteristicNotFound(uuid) => Error::CharacteristicNotFound(uuid),
            other => Error::Transport(other),
        }
    }
}
