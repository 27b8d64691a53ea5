//! DAQ Protocol Error Types

use thiserror::Error;

/// Rejected requests. Raised before any register is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Single-channel readout mode outside {off, opt1, opt2}
    #[error("Single channel readout mode must be 0, 1 or 2, got {0}")]
    InvalidReadoutMode(u8),

    /// No fixed mux mapping exists for this band
    #[error("Cannot take debug data on band {0}")]
    UnsupportedDebugBand(u8),

    /// Unknown capture source name
    #[error("Unknown capture source: {0}")]
    UnknownSource(String),

    /// Destination path does not fit the writer's address buffer
    #[error("Writer path is {len} characters, the address buffer holds {max}")]
    WriterPathTooLong { len: usize, max: usize },

    /// Destination path contains characters the writer cannot store
    #[error("Writer path must be ASCII: {0}")]
    NonAsciiPath(String),
}

/// Failures of the register access layer.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// The backend could not be reached
    #[error("Register bus unavailable: {0}")]
    Unavailable(String),

    /// Index outside the register array
    #[error("Register {register} has no index {index}")]
    InvalidIndex { register: &'static str, index: usize },

    /// Stream endpoint does not exist
    #[error("No stream endpoint {0}")]
    UnknownStream(usize),

    /// I/O failure while servicing a register access
    #[error("Register I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BusError {
    fn from(err: std::io::Error) -> Self {
        BusError::Io(err.to_string())
    }
}

/// Any failure surfaced by the DAQ programming helpers.
#[derive(Debug, Clone, Error)]
pub enum DaqError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Bus(#[from] BusError),
}
