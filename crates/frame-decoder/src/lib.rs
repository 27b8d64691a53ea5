//! Frame Decoding
//!
//! Turns raw capture and stream dumps into physical quantities: debug
//! captures into frequency / frequency-error arrays, stream files into
//! per-channel phase, and aggregator records into phase with timing headers.

pub mod aggregator;
pub mod debug;
mod error;
pub mod stream;
mod unwrap;

pub use aggregator::{read_aggregator_file, resolve_latest, AggregatorHeader, AggregatorRecord};
pub use debug::{decode_full_band, decode_single_channel, read_debug_file, DebugCapture};
pub use error::DecodeError;
pub use stream::{
    decode_stream, read_stream_file, PhaseSeries, StreamData, StreamHeader, StreamRecord,
    StreamVersion,
};
pub use unwrap::{unwrap_phase, unwrap_series};

/// On-wire frame layouts and their per-frame channel capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Raw debug / version 0 stream frames
    DebugV0,
    /// Aggregator records
    Aggregator,
}

impl FrameFormat {
    pub fn channels(self) -> usize {
        match self {
            FrameFormat::DebugV0 => debug::BLOCK_SIZE,
            FrameFormat::Aggregator => AggregatorRecord::CHANNELS,
        }
    }

    /// Buffer length to program for `frames` frames
    pub fn buffer_len(self, frames: usize) -> usize {
        self.channels() * frames
    }
}
