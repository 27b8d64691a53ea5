//! Acquisition Error Types

use crate::link::LinkState;
use daq_protocol::{BusError, ConfigurationError, DaqError};
use frame_decoder::DecodeError;
use std::time::Duration;
use thiserror::Error;

/// Link still unhealthy after one recovery attempt
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("{0}")]
    StillDown(LinkState),

    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Failures of a debug capture or a direct converter read
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Daq(#[from] DaqError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Link(#[from] LinkError),

    /// Waveform buffers did not fill in time
    #[error("Capture did not complete within {0:?}")]
    Timeout(Duration),

    /// Caller cancelled while waiting on the hardware
    #[error("Capture cancelled")]
    Cancelled,

    /// A stream endpoint went away before delivering fresh data
    #[error("Stream {0} closed before delivering data")]
    StreamClosed(usize),

    #[error("Capture I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BusError> for CaptureError {
    fn from(err: BusError) -> Self {
        CaptureError::Daq(err.into())
    }
}

impl From<ConfigurationError> for CaptureError {
    fn from(err: ConfigurationError) -> Self {
        CaptureError::Daq(err.into())
    }
}

/// Lowpass parameters no digital design can satisfy
#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("Filter order must be at least 1")]
    ZeroOrder,

    /// Cutoff is normalized to Nyquist and must lie in (0, 1)
    #[error("Filter cutoff {0} is outside (0, 1) of Nyquist")]
    CutoffOutOfRange(f64),
}

/// Failures while starting, stopping or configuring a stream
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Daq(#[from] DaqError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("Aggregator config I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BusError> for StreamError {
    fn from(err: BusError) -> Self {
        StreamError::Daq(err.into())
    }
}

impl From<ConfigurationError> for StreamError {
    fn from(err: ConfigurationError) -> Self {
        StreamError::Daq(err.into())
    }
}
