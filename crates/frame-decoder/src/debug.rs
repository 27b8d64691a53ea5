//! Debug Capture Decoding
//!
//! A debug capture is a dump of 32-bit words from the two DAQ streams of one
//! band: the first half of the file holds stream 0, the second half stream 1.
//! Each stream starts with two header words. Every data word packs two strobe
//! bits above a 24-bit two's complement sample:
//!
//! ```text
//!  31      30     29 .. 24   23 ............ 0
//! ┌──────┬──────┬─────────┬──────────────────┐
//! │ flux │ ch0  │ unused  │ sample (signed)  │
//! │ ramp │      │         │                  │
//! └──────┴──────┴─────────┴──────────────────┘
//! ```

use crate::error::DecodeError;
use ndarray::{s, Array2, Axis};
use std::path::Path;
use tracing::{debug, error, info};

/// Half-width of a subband in MHz; full scale of the frequency words
pub const SUBBAND_HALFWIDTH_MHZ: f64 = 4.8;

/// MHz per LSB of a frequency word
pub const FREQ_SCALE_MHZ: f64 = SUBBAND_HALFWIDTH_MHZ / (1u32 << 23) as f64;

/// Samples per flux ramp cycle; full-band streams reshape into rows of this
pub const BLOCK_SIZE: usize = 512;

const STROBE_SHIFT: u32 = 30;
const SIGN_BIT: u32 = 1 << 23;
const WRAP: i64 = 1 << 24;
const HEADER_ROWS: usize = 2;
/// Header marker requesting swapped stream columns
const SWAP_MARKER: u32 = 2;

/// Split a raw word into (strobe bits, sample bits)
pub fn split_strobe(raw: u32) -> (u8, u32) {
    let strobe = raw >> STROBE_SHIFT;
    (strobe as u8, raw - (strobe << STROBE_SHIFT))
}

/// Sign-correct a 24-bit two's complement sample
pub fn twos_complement_24(value: u32) -> i64 {
    let value = value as i64;
    if value >= SIGN_BIT as i64 {
        value - WRAP
    } else {
        value
    }
}

/// Convert a raw frequency sample to MHz
pub fn sample_to_mhz(sample: u32) -> f64 {
    twos_complement_24(sample) as f64 * FREQ_SCALE_MHZ
}

/// Header and payload of a debug capture, one column per stream
#[derive(Debug, Clone)]
pub struct DebugWords {
    pub header: [[u32; 2]; 2],
    pub data: Array2<u32>,
}

/// Decoded debug capture.
///
/// `measurement_a`/`measurement_b` are frequency/frequency-error (or I/Q when
/// IQ streaming is enabled). Full-band captures hold one row per flux ramp
/// cycle; single-channel captures hold a single row. A measurement that could
/// not be shaped is `None`.
#[derive(Debug, Clone)]
pub struct DebugCapture {
    pub measurement_a: Option<Array2<f64>>,
    pub measurement_b: Option<Array2<f64>>,
    /// Flux ramp strobe per row and stream column
    pub sync: Array2<u8>,
}

/// Interpret a byte dump as little-endian 32-bit words
pub fn words_from_le_bytes(bytes: &[u8]) -> Result<Vec<u32>, DecodeError> {
    if bytes.len() % 4 != 0 {
        return Err(DecodeError::Truncated {
            needed: bytes.len().next_multiple_of(4),
            available: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect())
}

/// Arrange the word dump into header and two-column payload
pub fn split_columns(words: &[u32]) -> Result<DebugWords, DecodeError> {
    let min_words = 2 * HEADER_ROWS;
    if words.len() < min_words || words.len() % 2 != 0 {
        return Err(DecodeError::Truncated {
            needed: words.len().max(min_words).next_multiple_of(2) * 4,
            available: words.len() * 4,
        });
    }

    let rows = words.len() / 2;
    let (first, second) = words.split_at(rows);
    let mut table = Array2::from_shape_fn((rows, 2), |(r, c)| if c == 0 { first[r] } else { second[r] });

    let mut header = [[table[[0, 0]], table[[0, 1]]], [table[[1, 0]], table[[1, 1]]]];
    if header[1][1] == SWAP_MARKER {
        debug!("Header requests swapped stream columns");
        table.invert_axis(Axis(1));
        header = [[header[0][1], header[0][0]], [header[1][1], header[1][0]]];
    }

    let data = table.slice(s![HEADER_ROWS.., ..]).to_owned();
    Ok(DebugWords { header, data })
}

/// Reshape a stream into rows of [`BLOCK_SIZE`]
pub fn reshape_blocks(values: Vec<f64>) -> Result<Array2<f64>, DecodeError> {
    let len = values.len();
    if len % BLOCK_SIZE != 0 {
        return Err(DecodeError::BlockMisaligned { len, block: BLOCK_SIZE });
    }
    Array2::from_shape_vec((len / BLOCK_SIZE, BLOCK_SIZE), values)
        .map_err(|_| DecodeError::BlockMisaligned { len, block: BLOCK_SIZE })
}

/// Samples of `column` between the first and last channel-0 strobe
fn strobed_blocks(
    samples: &Array2<u32>,
    strobes: &Array2<u8>,
    column: usize,
) -> Result<Array2<f64>, DecodeError> {
    let mut strobed = strobes
        .column(column)
        .into_iter()
        .enumerate()
        .filter(|&(_, &s)| s & 1 == 1)
        .map(|(i, _)| i);

    let first = strobed.next().ok_or(DecodeError::NoStrobe(column))?;
    let last = strobed.last().unwrap_or(first);

    let values: Vec<f64> = samples
        .slice(s![first..last, column])
        .iter()
        .map(|&v| sample_to_mhz(v))
        .collect();
    reshape_blocks(values)
}

fn strobes_and_samples(data: &Array2<u32>) -> (Array2<u8>, Array2<u32>) {
    (data.mapv(|w| split_strobe(w).0), data.mapv(|w| split_strobe(w).1))
}

/// Decode a full-band capture.
///
/// Misaligned streams are logged and left as `None`; a stream-1 column with
/// no strobes decodes to an empty array.
pub fn decode_full_band(words: &[u32]) -> Result<DebugCapture, DecodeError> {
    let DebugWords { data, .. } = split_columns(words)?;
    let (strobes, samples) = strobes_and_samples(&data);
    let sync = strobes.mapv(|s| s >> 1);

    let measurement_a = match strobed_blocks(&samples, &strobes, 0) {
        Ok(f) => Some(f),
        Err(e) => {
            error!("Frequency stream: {}", e);
            None
        }
    };

    let measurement_b = match strobed_blocks(&samples, &strobes, 1) {
        Ok(df) => Some(df),
        Err(DecodeError::NoStrobe(_)) => Some(Array2::zeros((0, BLOCK_SIZE))),
        Err(e) => {
            error!("Frequency error stream: {}", e);
            None
        }
    };

    Ok(DebugCapture {
        measurement_a,
        measurement_b,
        sync,
    })
}

/// Decode a single-channel capture. Every sample is kept; no strobe windowing.
pub fn decode_single_channel(words: &[u32], swap_fdf: bool) -> Result<DebugCapture, DecodeError> {
    let DebugWords { data, .. } = split_columns(words)?;
    let (strobes, samples) = strobes_and_samples(&data);
    let sync = strobes.mapv(|s| s >> 1);

    let (nf, ndf) = if swap_fdf { (1, 0) } else { (0, 1) };
    let row = |column: usize| samples.column(column).mapv(sample_to_mhz).insert_axis(Axis(0));

    Ok(DebugCapture {
        measurement_a: Some(row(nf)),
        measurement_b: Some(row(ndf)),
        sync,
    })
}

/// Read and decode a debug capture file
pub fn read_debug_file(path: &Path, single_channel: bool) -> Result<DebugCapture, DecodeError> {
    let bytes = std::fs::read(path)?;
    let words = words_from_le_bytes(&bytes)?;
    info!(
        "Decoding {} words from {} ({})",
        words.len(),
        path.display(),
        if single_channel { "single channel" } else { "full band" }
    );

    if single_channel {
        decode_single_channel(&words, false)
    } else {
        decode_full_band(&words)
    }
}
