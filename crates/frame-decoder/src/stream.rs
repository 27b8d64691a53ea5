//! Stream File Decoding
//!
//! Streamed data files carry a version tag at byte offset 8. Version 0 files
//! are plain 32-bit word dumps with interleaved I/Q; version 1 files are a
//! sequence of fixed-size records with a full timing header.

use crate::error::DecodeError;
use crate::unwrap::unwrap_phase;
use bytes::Buf;
use ndarray::Array2;
use serde::Serialize;
use std::f64::consts::PI;
use std::path::Path;
use tracing::{debug, info, warn};

/// Byte offset of the version tag
pub const VERSION_OFFSET: usize = 8;

/// Raw phase LSB in radians
pub const PHASE_SCALE: f64 = PI / (1u32 << 15) as f64;

/// Channels carried per frame
pub const STREAM_CHANNELS: usize = 512;

const WRITER_HEADER_WORDS: usize = 2;
const STREAM_HEADER_WORDS: usize = 4;
const V0_HEADER_WORDS: usize = WRITER_HEADER_WORDS + STREAM_HEADER_WORDS;
const V0_DATA_WORDS: usize = 2 * STREAM_CHANNELS;
const V0_FRAME_WORDS: usize = V0_HEADER_WORDS + V0_DATA_WORDS;

/// Word value marking the start of a version 0 frame
pub const V0_FRAME_MARKER: i32 = ((V0_FRAME_WORDS - 1) * 4) as i32;

/// Known stream layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamVersion {
    V0,
    V1,
}

impl TryFrom<u8> for StreamVersion {
    type Error = DecodeError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(StreamVersion::V0),
            1 => Ok(StreamVersion::V1),
            other => Err(DecodeError::UnsupportedVersion(other)),
        }
    }
}

impl StreamVersion {
    /// Read the version tag of a stream buffer
    pub fn detect(bytes: &[u8]) -> Result<Self, DecodeError> {
        let tag = *bytes.get(VERSION_OFFSET).ok_or(DecodeError::Truncated {
            needed: VERSION_OFFSET + 1,
            available: bytes.len(),
        })?;
        Self::try_from(tag)
    }
}

/// Timestamps and per-channel phase (channels × frames)
#[derive(Debug, Clone)]
pub struct PhaseSeries {
    pub timestamps: Vec<i64>,
    pub phase: Array2<f64>,
}

impl PhaseSeries {
    /// Number of frames (time samples)
    pub fn frames(&self) -> usize {
        self.timestamps.len()
    }

    /// Remove 2π wraps along the time axis
    pub fn remove_wraps(&mut self) {
        unwrap_phase(&mut self.phase);
    }
}

/// Version 0 frames as I/Q pairs
#[derive(Debug, Clone)]
pub struct StreamV0 {
    pub timestamps: Vec<i64>,
    pub i: Array2<f64>,
    pub q: Array2<f64>,
}

impl StreamV0 {
    pub fn phase(&self) -> Array2<f64> {
        ndarray::Zip::from(&self.q)
            .and(&self.i)
            .map_collect(|&q, &i| q.atan2(i))
    }
}

/// Version 1 record header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamHeader {
    pub h0: u32,
    pub h1: u32,
    pub version: u8,
    pub crate_id: u8,
    pub slot_number: u16,
    pub number_of_channels: u32,
    pub rtm_dac_config: [u64; 6],
    pub flux_ramp_increment: u32,
    pub flux_ramp_start: u32,
    pub base_rate_since_1_hz: u32,
    pub base_rate_since_tm: u32,
    pub timestamp_ns: u32,
    pub timestamp_s: u32,
    pub fixed_rate_marker: u16,
    pub sequence_counter: u32,
    pub tes_relay: u64,
    pub mce_word: u64,
}

/// One version 1 record
#[derive(Debug, Clone)]
pub struct StreamRecord {
    pub header: StreamHeader,
    pub payload: Vec<i16>,
}

impl StreamRecord {
    /// Encoded size of one record
    pub const SIZE: usize = 8328;
    /// Samples per record
    pub const PAYLOAD_LEN: usize = 4096;
    /// First payload index of the phase channels
    pub const PHASE_OFFSET: usize = 1024;

    /// Parse one record from exactly [`Self::SIZE`] bytes
    pub fn parse(mut buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < Self::SIZE {
            return Err(DecodeError::Truncated {
                needed: Self::SIZE,
                available: buf.len(),
            });
        }

        let h0 = buf.get_u32_le();
        let h1 = buf.get_u32_le();
        let version = buf.get_u8();
        let crate_id = buf.get_u8();
        let slot_number = buf.get_u16_le();
        let number_of_channels = buf.get_u32_le();
        let mut rtm_dac_config = [0u64; 6];
        for word in rtm_dac_config.iter_mut() {
            *word = buf.get_u64_le();
        }
        let flux_ramp_increment = buf.get_u32_le();
        let flux_ramp_start = buf.get_u32_le();
        let base_rate_since_1_hz = buf.get_u32_le();
        let base_rate_since_tm = buf.get_u32_le();
        let timestamp_ns = buf.get_u32_le();
        let timestamp_s = buf.get_u32_le();
        let fixed_rate_marker = buf.get_u16_le();
        buf.advance(2);
        let sequence_counter = buf.get_u32_le();
        let tes_relay = buf.get_u64_le();
        let mce_word = buf.get_u64_le();
        buf.advance(24);

        let payload = (0..Self::PAYLOAD_LEN).map(|_| buf.get_i16_le()).collect();

        Ok(Self {
            header: StreamHeader {
                h0,
                h1,
                version,
                crate_id,
                slot_number,
                number_of_channels,
                rtm_dac_config,
                flux_ramp_increment,
                flux_ramp_start,
                base_rate_since_1_hz,
                base_rate_since_tm,
                timestamp_ns,
                timestamp_s,
                fixed_rate_marker,
                sequence_counter,
                tes_relay,
                mce_word,
            },
            payload,
        })
    }

    /// Phase channels of this record in radians
    pub fn phase(&self) -> impl Iterator<Item = f64> + '_ {
        self.payload[Self::PHASE_OFFSET..Self::PHASE_OFFSET + STREAM_CHANNELS]
            .iter()
            .map(|&raw| raw as f64 * PHASE_SCALE)
    }
}

/// Version 1 file contents
#[derive(Debug, Clone)]
pub struct StreamV1 {
    pub records: Vec<StreamRecord>,
}

impl StreamV1 {
    pub fn phase_series(&self) -> PhaseSeries {
        let frames = self.records.len();
        let mut phase = Array2::zeros((STREAM_CHANNELS, frames));
        for (col, record) in self.records.iter().enumerate() {
            for (row, value) in record.phase().enumerate() {
                phase[[row, col]] = value;
            }
        }
        PhaseSeries {
            timestamps: self
                .records
                .iter()
                .map(|r| r.header.sequence_counter as i64)
                .collect(),
            phase,
        }
    }
}

/// Decoded stream file, one variant per layout
#[derive(Debug, Clone)]
pub enum StreamData {
    V0(StreamV0),
    V1(StreamV1),
}

impl StreamData {
    pub fn version(&self) -> StreamVersion {
        match self {
            StreamData::V0(_) => StreamVersion::V0,
            StreamData::V1(_) => StreamVersion::V1,
        }
    }

    /// Timestamps and phase in radians
    pub fn phase_series(&self) -> PhaseSeries {
        match self {
            StreamData::V0(v0) => PhaseSeries {
                timestamps: v0.timestamps.clone(),
                phase: v0.phase(),
            },
            StreamData::V1(v1) => v1.phase_series(),
        }
    }
}

fn decode_v0(bytes: &[u8]) -> StreamV0 {
    let mut buf = bytes;
    let mut words = Vec::with_capacity(bytes.len() / 4);
    while buf.remaining() >= 4 {
        words.push(buf.get_i32_le());
    }

    let mut starts = Vec::new();
    let mut next_free = 0;
    for (idx, &word) in words.iter().enumerate() {
        if word != V0_FRAME_MARKER || idx < next_free {
            continue;
        }
        if idx + V0_FRAME_WORDS > words.len() {
            warn!("Dropping partial frame at word {}", idx);
            break;
        }
        starts.push(idx);
        next_free = idx + V0_FRAME_WORDS;
    }
    debug!("Found {} version 0 frames", starts.len());

    let mut i = Array2::zeros((STREAM_CHANNELS, starts.len()));
    let mut q = Array2::zeros((STREAM_CHANNELS, starts.len()));
    let mut timestamps = Vec::with_capacity(starts.len());
    for (col, &start) in starts.iter().enumerate() {
        timestamps.push(words[start + 2] as i64);
        let data = &words[start + V0_HEADER_WORDS..start + V0_FRAME_WORDS];
        for (row, pair) in data.chunks_exact(2).enumerate() {
            i[[row, col]] = pair[0] as f64;
            q[[row, col]] = pair[1] as f64;
        }
    }

    StreamV0 { timestamps, i, q }
}

fn decode_v1(bytes: &[u8]) -> Result<StreamV1, DecodeError> {
    let trailing = bytes.len() % StreamRecord::SIZE;
    if trailing != 0 {
        return Err(DecodeError::Truncated {
            needed: bytes.len() - trailing + StreamRecord::SIZE,
            available: bytes.len(),
        });
    }
    let records = bytes
        .chunks_exact(StreamRecord::SIZE)
        .map(StreamRecord::parse)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(StreamV1 { records })
}

/// Decode a stream buffer, dispatching on its version tag
pub fn decode_stream(bytes: &[u8]) -> Result<StreamData, DecodeError> {
    let version = StreamVersion::detect(bytes)?;
    info!("Data version {:?}", version);
    match version {
        StreamVersion::V0 => Ok(StreamData::V0(decode_v0(bytes))),
        StreamVersion::V1 => Ok(StreamData::V1(decode_v1(bytes)?)),
    }
}

/// Read a stream file and return its phase series
pub fn read_stream_file(path: &Path, unwrap: bool) -> Result<PhaseSeries, DecodeError> {
    let bytes = std::fs::read(path)?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    let mut series = decode_stream(&bytes)?.phase_series();
    if unwrap {
        series.remove_wraps();
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v1_record(sequence_counter: u32, phase_raw: i16) -> Vec<u8> {
        let mut out = Vec::with_capacity(StreamRecord::SIZE);
        out.extend_from_slice(&0xAAAA_0000u32.to_le_bytes());
        out.extend_from_slice(&0xBBBB_0000u32.to_le_bytes());
        out.push(1); // version
        out.push(3); // crate id
        out.extend_from_slice(&7u16.to_le_bytes());
        out.extend_from_slice(&4096u32.to_le_bytes());
        for n in 0..6u64 {
            out.extend_from_slice(&(n + 1).to_le_bytes());
        }
        for field in [11u32, 12, 13, 14, 15, 16] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        out.extend_from_slice(&9u16.to_le_bytes());
        out.extend_from_slice(&[0; 2]);
        out.extend_from_slice(&sequence_counter.to_le_bytes());
        out.extend_from_slice(&0x55u64.to_le_bytes());
        out.extend_from_slice(&0x66u64.to_le_bytes());
        out.extend_from_slice(&[0; 24]);
        for idx in 0..StreamRecord::PAYLOAD_LEN {
            let value = if (1024..1536).contains(&idx) { phase_raw } else { -1 };
            out.extend_from_slice(&value.to_le_bytes());
        }
        assert_eq!(out.len(), StreamRecord::SIZE);
        out
    }

    fn v0_frame(timestamp: i32, i: i32, q: i32) -> Vec<u8> {
        let mut words = vec![V0_FRAME_MARKER, 0, timestamp, 0, 0, 0];
        for _ in 0..STREAM_CHANNELS {
            words.push(i);
            words.push(q);
        }
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_v0_marker_value() {
        assert_eq!(V0_FRAME_MARKER, 4116);
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = vec![0u8; 16];
        bytes[VERSION_OFFSET] = 7;
        assert!(matches!(
            decode_stream(&bytes),
            Err(DecodeError::UnsupportedVersion(7))
        ));
    }

    #[test]
    fn test_short_buffer_has_no_version() {
        assert!(matches!(
            StreamVersion::detect(&[0; 4]),
            Err(DecodeError::Truncated { needed: 9, available: 4 })
        ));
    }

    #[test]
    fn test_v1_header_fields() {
        let record = StreamRecord::parse(&v1_record(42, 0)).unwrap();
        let h = record.header;
        assert_eq!(h.version, 1);
        assert_eq!(h.crate_id, 3);
        assert_eq!(h.slot_number, 7);
        assert_eq!(h.number_of_channels, 4096);
        assert_eq!(h.rtm_dac_config, [1, 2, 3, 4, 5, 6]);
        assert_eq!(h.flux_ramp_increment, 11);
        assert_eq!(h.timestamp_s, 16);
        assert_eq!(h.fixed_rate_marker, 9);
        assert_eq!(h.sequence_counter, 42);
        assert_eq!(h.tes_relay, 0x55);
        assert_eq!(h.mce_word, 0x66);
        assert_eq!(record.payload[0], -1);
    }

    #[test]
    fn test_v1_end_to_end() {
        let mut bytes = Vec::new();
        for (seq, raw) in [(100, 0), (101, 16384), (102, 0)] {
            bytes.extend(v1_record(seq, raw));
        }

        let data = decode_stream(&bytes).unwrap();
        assert_eq!(data.version(), StreamVersion::V1);
        let mut series = data.phase_series();
        series.remove_wraps();

        assert_eq!(series.timestamps, vec![100, 101, 102]);
        assert_eq!(series.phase.dim(), (512, 3));
        for row in series.phase.rows() {
            assert_eq!(row[0], 0.0);
            assert!((row[1] - PI / 2.0).abs() < 1e-12);
            assert_eq!(row[2], 0.0);
        }
    }

    #[test]
    fn test_v1_trailing_partial_record() {
        let mut bytes = v1_record(1, 0);
        bytes.extend_from_slice(&[0; 100]);
        assert!(matches!(
            decode_stream(&bytes),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_v0_iq_to_phase() {
        let mut bytes = v0_frame(0, 1, 0);
        bytes.extend(v0_frame(5, 0, 1));

        let data = decode_stream(&bytes).unwrap();
        let StreamData::V0(v0) = &data else {
            panic!("expected version 0");
        };
        assert_eq!(v0.timestamps, vec![0, 5]);
        assert_eq!(v0.i.dim(), (512, 2));

        let series = data.phase_series();
        assert_eq!(series.phase[[0, 0]], 0.0);
        assert!((series.phase[[511, 1]] - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_v0_marker_inside_payload_ignored() {
        let bytes = v0_frame(0, V0_FRAME_MARKER, 0);
        let StreamData::V0(v0) = decode_stream(&bytes).unwrap() else {
            panic!("expected version 0");
        };
        assert_eq!(v0.timestamps.len(), 1);
    }

    #[test]
    fn test_read_stream_file() {
        let path = std::env::temp_dir().join(format!("stream-{}.dat", uuid::Uuid::new_v4()));
        std::fs::write(&path, v1_record(3, 8192)).unwrap();
        let series = read_stream_file(&path, true).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(series.frames(), 1);
        assert!((series.phase[[0, 0]] - PI / 4.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_v1_phase_scaling_inverts(raw in any::<i16>()) {
            let record = StreamRecord::parse(&v1_record(0, raw)).unwrap();
            for value in record.phase() {
                prop_assert_eq!((value / PHASE_SCALE).round() as i64, raw as i64);
                prop_assert!(value.abs() <= PI);
            }
        }
    }
}
