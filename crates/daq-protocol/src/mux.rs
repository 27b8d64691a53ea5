//! DAQ Multiplexer Configuration
//!
//! Routes a capture source onto the two mux inputs and sizes the waveform
//! engine buffers to match the requested sample length.

use crate::bus::RegisterBus;
use crate::error::{ConfigurationError, DaqError};
use crate::revision::HardwareRevision;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, error, info};

/// Signal source routed into the waveform capture buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Raw ADC samples
    Adc,
    /// Raw DAC samples
    Dac,
    /// Processed debug stream of a single band
    Debug,
}

impl FromStr for SourceKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adc" => Ok(SourceKind::Adc),
            "dac" => Ok(SourceKind::Dac),
            "debug" => Ok(SourceKind::Debug),
            _ => Err(ConfigurationError::UnknownSource(s.to_string())),
        }
    }
}

/// Mux input channel pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxChannels {
    pub channel0: u32,
    pub channel1: u32,
}

/// Map a source onto its mux channel pair.
///
/// `index` selects the converter for ADC/DAC sources; `band` selects the
/// route for debug sources.
pub fn channel_pair(
    revision: &HardwareRevision,
    kind: SourceKind,
    index: u32,
    band: u8,
) -> Result<MuxChannels, ConfigurationError> {
    let channel0 = match kind {
        SourceKind::Adc => (index + 1) * 2,
        SourceKind::Dac => (index + 1) * 2 + revision.dac_channel_offset,
        SourceKind::Debug => {
            let route = revision
                .debug_route(band)
                .ok_or(ConfigurationError::UnsupportedDebugBand(band))?;
            return Ok(MuxChannels {
                channel0: route.channel0,
                channel1: route.channel1,
            });
        }
    };

    Ok(MuxChannels {
        channel0,
        channel1: channel0 + 1,
    })
}

/// Size the DAQ buffer and every waveform engine for `samples` samples
pub fn set_buffer_size<B: RegisterBus + ?Sized>(
    bus: &B,
    revision: &HardwareRevision,
    samples: u32,
) -> Result<(), DaqError> {
    bus.set_data_buffer_size(samples)?;
    for engine in 0..revision.daq_engines {
        let start = bus.waveform_start_addr(engine)?;
        let end = start + revision.bytes_per_sample * samples as u64;
        bus.set_waveform_end_addr(engine, end)?;
        debug!("DAQ number {}: start {:#x} - end {:#x}", engine, start, end);
    }
    Ok(())
}

/// Route `kind` onto the mux and size the capture buffers.
///
/// Unsupported debug bands are rejected before any register is written.
pub fn configure_mux<B: RegisterBus + ?Sized>(
    bus: &B,
    revision: &HardwareRevision,
    kind: SourceKind,
    index: u32,
    samples: u32,
    band: u8,
) -> Result<(), DaqError> {
    let channels = channel_pair(revision, kind, index, band).map_err(|e| {
        error!("Mux configuration rejected: {}", e);
        e
    })?;

    set_buffer_size(bus, revision, samples)?;

    bus.set_input_mux_sel(0, channels.channel0)?;
    bus.set_input_mux_sel(1, channels.channel1)?;
    info!(
        "Mux routed {:?} {} (band {}) to channels {}/{}",
        kind, index, band, channels.channel0, channels.channel1
    );
    Ok(())
}
