//! Register Access Interface
//!
//! Every hardware operation in this workspace goes through [`RegisterBus`].
//! The production implementation talks to the carrier's register server;
//! [`crate::SimulatedBus`] backs the test suite.

use crate::error::BusError;
use crate::writer_path::WriterPath;
use tokio::sync::mpsc;

/// Named register primitives used by the acquisition core.
///
/// Implementations must not cache values: every getter reads the hardware.
pub trait RegisterBus {
    // DAQ multiplexer and waveform engines

    /// Select the source channel of mux input `index` (0 or 1)
    fn set_input_mux_sel(&self, index: usize, channel: u32) -> Result<(), BusError>;

    /// Program the DAQ data buffer size, in samples
    fn set_data_buffer_size(&self, samples: u32) -> Result<(), BusError>;

    /// Start address of waveform engine `engine`, in bytes
    fn waveform_start_addr(&self, engine: usize) -> Result<u64, BusError>;

    /// Set the end address of waveform engine `engine`, in bytes
    fn set_waveform_end_addr(&self, engine: usize, addr: u64) -> Result<(), BusError>;

    /// Whether waveform engine `engine` holds no data
    fn waveform_empty(&self, engine: usize) -> Result<bool, BusError>;

    /// Software DAQ trigger
    fn trigger_daq(&self) -> Result<(), BusError>;

    /// Arm the hardware trigger instead of firing a software one
    fn arm_hw_trigger(&self) -> Result<(), BusError>;

    /// Subscribe to updates of a DAQ stream endpoint
    fn subscribe_stream(&self, stream: usize) -> Result<mpsc::UnboundedReceiver<Vec<i32>>, BusError>;

    // Band readout configuration

    fn set_single_channel_readout(&self, band: u8, enable: bool) -> Result<(), BusError>;

    fn set_single_channel_readout_opt2(&self, band: u8, enable: bool) -> Result<(), BusError>;

    fn set_iq_stream_enable(&self, band: u8, enable: bool) -> Result<(), BusError>;

    // Debug capture writer

    fn set_debug_writer_datafile(&self, path: &WriterPath) -> Result<(), BusError>;

    fn set_debug_writer_open(&self, open: bool) -> Result<(), BusError>;

    // Continuous streaming

    /// Flux ramp maximum count; zero means the ramp is off
    fn ramp_max_cnt(&self) -> Result<u32, BusError>;

    /// Flux ramp reset rate in kHz
    fn flux_ramp_freq_khz(&self) -> Result<f64, BusError>;

    fn set_stream_enable(&self, band: u8, enable: bool) -> Result<(), BusError>;

    fn set_streaming_datafile(&self, path: &WriterPath) -> Result<(), BusError>;

    fn set_streaming_file_open(&self, open: bool) -> Result<(), BusError>;

    /// Enable the writer feeding the external aggregator
    fn set_aggregator_writer(&self, enable: bool) -> Result<(), BusError>;

    /// Ask the aggregator to re-read its config file
    fn set_aggregator_cfg_read(&self, read: bool) -> Result<(), BusError>;

    // JESD serial links

    fn jesd_rx_enable(&self) -> Result<u32, BusError>;

    fn jesd_rx_data_valid(&self) -> Result<u32, BusError>;

    fn set_jesd_rx_enable(&self, value: u32) -> Result<(), BusError>;

    fn jesd_tx_enable(&self) -> Result<u32, BusError>;

    fn jesd_tx_data_valid(&self) -> Result<u32, BusError>;

    fn set_jesd_tx_enable(&self, value: u32) -> Result<(), BusError>;

    /// Drive the active-low JESD reset line of converter `index`
    fn set_jesd_reset_n(&self, index: usize, level: bool) -> Result<(), BusError>;

    /// Pulse the system reference power-up sequence
    fn run_pwr_up_sys_ref(&self) -> Result<(), BusError>;
}
