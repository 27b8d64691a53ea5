//! DAQ Protocol
//!
//! Register-level access to the readout carrier: the [`RegisterBus`]
//! interface, a simulated backend, and the DAQ multiplexer programming that
//! routes ADC, DAC or debug sources into the waveform capture buffers.

mod bus;
mod error;
mod mux;
mod readout;
mod revision;
mod simulator;
mod writer_path;

pub use bus::RegisterBus;
pub use error::{BusError, ConfigurationError, DaqError};
pub use mux::{channel_pair, configure_mux, set_buffer_size, MuxChannels, SourceKind};
pub use readout::ReadoutMode;
pub use revision::{DebugRoute, HardwareRevision};
pub use simulator::{RegisterWrite, SimulatedBus};
pub use writer_path::{WriterPath, WRITER_PATH_LEN};

/// DAQ stream endpoints, two per AMC bay
pub mod stream {
    /// Bay 0, first stream
    pub const BAY0_STREAM0: usize = 0;
    /// Bay 0, second stream
    pub const BAY0_STREAM1: usize = 1;
    /// Bay 1, first stream
    pub const BAY1_STREAM0: usize = 4;
    /// Bay 1, second stream
    pub const BAY1_STREAM1: usize = 5;
}
