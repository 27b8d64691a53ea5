//! Decode Error Types

use thiserror::Error;

/// Errors while turning raw capture bytes into physical units
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Version tag with no known layout
    #[error("Frame version {0} not supported")]
    UnsupportedVersion(u8),

    /// Stream length does not divide into whole reshape blocks
    #[error("Number of points ({len}) not a multiple of {block}. Cannot decode")]
    BlockMisaligned { len: usize, block: usize },

    /// Buffer shorter than the layout requires
    #[error("Buffer truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// No channel-0 strobe in the given column
    #[error("No channel 0 strobe found in column {0}")]
    NoStrobe(usize),

    /// Prefix lookup for an aggregator file found nothing
    #[error("No data file matches {0}")]
    NoMatchingFile(String),

    /// Reading the capture file failed
    #[error("Data file I/O error: {0}")]
    Io(#[from] std::io::Error),
}
