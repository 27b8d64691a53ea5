//! Per-Revision Hardware Tables
//!
//! Mux routing and link register patterns differ between carrier firmware
//! revisions. They are kept as data so a deployment can load them from its
//! configuration instead of patching code.

use serde::{Deserialize, Serialize};

/// Fixed mux route for debug captures on one band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugRoute {
    pub band: u8,
    pub channel0: u32,
    pub channel1: u32,
}

/// Register tables for one hardware revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareRevision {
    /// Human-readable revision name
    pub name: String,
    /// Mux channel offset added for DAC sources
    pub dac_channel_offset: u32,
    /// Debug-capture routes; bands not listed cannot be captured
    pub debug_routes: Vec<DebugRoute>,
    /// Number of DAQ waveform engines
    pub daq_engines: usize,
    /// Bytes per sample in waveform engine addressing
    pub bytes_per_sample: u64,
    /// Nominal JESD rx enable pattern
    pub rx_enable_nominal: u32,
    /// Nominal JESD tx enable pattern
    pub tx_enable_nominal: u32,
    /// Per-converter JESD reset lines pulsed during tx recovery
    pub converter_reset_lines: Vec<usize>,
}

impl Default for HardwareRevision {
    fn default() -> Self {
        Self {
            name: "base".to_string(),
            dac_channel_offset: 10,
            debug_routes: vec![
                DebugRoute { band: 2, channel0: 22, channel1: 23 },
                DebugRoute { band: 3, channel0: 24, channel1: 25 },
            ],
            daq_engines: 4,
            bytes_per_sample: 4,
            rx_enable_nominal: 0x3F3,
            tx_enable_nominal: 0x3CF,
            converter_reset_lines: vec![0, 1],
        }
    }
}

impl HardwareRevision {
    /// Look up the debug route for a band
    pub fn debug_route(&self, band: u8) -> Option<&DebugRoute> {
        self.debug_routes.iter().find(|r| r.band == band)
    }
}
