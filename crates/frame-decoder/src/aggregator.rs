//! Aggregator Record Reader
//!
//! The downstream aggregator saves fixed 2240-byte records, one per frame,
//! each with a timing header followed by 528 signed 32-bit phase words.

use crate::error::DecodeError;
use crate::stream::{PhaseSeries, PHASE_SCALE};
use bytes::Buf;
use ndarray::Array2;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregatorHeader {
    pub protocol_version: u8,
    pub crate_id: u8,
    pub slot_number: u8,
    pub number_of_channels: u32,
    pub rtm_dac_config: [u64; 6],
    pub flux_ramp_increment: u32,
    pub flux_ramp_start: u32,
    pub rate_since_1hz: u32,
    pub rate_since_tm: u32,
    pub nanoseconds: u32,
    pub seconds: u32,
    pub fixed_rate_marker: u32,
    pub sequence_counter: u32,
    pub tes_relay_config: u64,
    pub mce_word: u64,
    pub user_word: [u64; 3],
}

#[derive(Debug, Clone)]
pub struct AggregatorRecord {
    pub header: AggregatorHeader,
    pub payload: Vec<i32>,
}

impl AggregatorRecord {
    pub const SIZE: usize = 2240;
    pub const CHANNELS: usize = 528;

    pub fn parse(mut buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < Self::SIZE {
            return Err(DecodeError::Truncated {
                needed: Self::SIZE,
                available: buf.len(),
            });
        }

        let protocol_version = buf.get_u8();
        let crate_id = buf.get_u8();
        let slot_number = buf.get_u8();
        buf.advance(1);
        let number_of_channels = buf.get_u32_le();
        let mut rtm_dac_config = [0u64; 6];
        for word in rtm_dac_config.iter_mut() {
            *word = buf.get_u64_le();
        }
        let mut timing = [0u32; 8];
        for word in timing.iter_mut() {
            *word = buf.get_u32_le();
        }
        let tes_relay_config = buf.get_u64_le();
        let mce_word = buf.get_u64_le();
        let user_word = [buf.get_u64_le(), buf.get_u64_le(), buf.get_u64_le()];
        let payload = (0..Self::CHANNELS).map(|_| buf.get_i32_le()).collect();

        let [
            flux_ramp_increment,
            flux_ramp_start,
            rate_since_1hz,
            rate_since_tm,
            nanoseconds,
            seconds,
            fixed_rate_marker,
            sequence_counter,
        ] = timing;

        Ok(Self {
            header: AggregatorHeader {
                protocol_version,
                crate_id,
                slot_number,
                number_of_channels,
                rtm_dac_config,
                flux_ramp_increment,
                flux_ramp_start,
                rate_since_1hz,
                rate_since_tm,
                nanoseconds,
                seconds,
                fixed_rate_marker,
                sequence_counter,
                tes_relay_config,
                mce_word,
                user_word,
            },
            payload,
        })
    }
}

/// Parse every whole record in a buffer
pub fn decode_aggregator(bytes: &[u8]) -> Result<Vec<AggregatorRecord>, DecodeError> {
    let trailing = bytes.len() % AggregatorRecord::SIZE;
    if trailing != 0 {
        return Err(DecodeError::Truncated {
            needed: bytes.len() - trailing + AggregatorRecord::SIZE,
            available: bytes.len(),
        });
    }
    bytes
        .chunks_exact(AggregatorRecord::SIZE)
        .map(AggregatorRecord::parse)
        .collect()
}

/// Sequence counters and scaled phase (528 × records)
pub fn aggregator_phase(records: &[AggregatorRecord]) -> PhaseSeries {
    let mut phase = Array2::zeros((AggregatorRecord::CHANNELS, records.len()));
    for (col, record) in records.iter().enumerate() {
        for (row, &raw) in record.payload.iter().enumerate() {
            phase[[row, col]] = raw as f64 * PHASE_SCALE;
        }
    }
    PhaseSeries {
        timestamps: records.iter().map(|r| r.header.sequence_counter as i64).collect(),
        phase,
    }
}

/// Lexically last file whose path starts with `prefix`
pub fn resolve_latest(prefix: &Path) -> Result<PathBuf, DecodeError> {
    let not_found = || DecodeError::NoMatchingFile(prefix.display().to_string());

    let dir = match prefix.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let stem = prefix
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };

    let mut matches = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with(&stem) {
            matches.push(entry.path());
        }
    }
    matches.sort();
    debug!("{} files match {}", matches.len(), prefix.display());
    matches.pop().ok_or_else(not_found)
}

/// Read the newest aggregator file for `prefix`
pub fn read_aggregator_file(prefix: &Path, unwrap: bool) -> Result<PhaseSeries, DecodeError> {
    let path = resolve_latest(prefix)?;
    info!("Treating {} as aggregator data", path.display());
    let bytes = std::fs::read(&path)?;
    let records = decode_aggregator(&bytes)?;
    let mut series = aggregator_phase(&records);
    if unwrap {
        series.remove_wraps();
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn record(sequence_counter: u32, phase_raw: i32) -> Vec<u8> {
        let mut out = vec![2u8, 4, 6, 0];
        out.extend_from_slice(&528u32.to_le_bytes());
        for n in 0..6u64 {
            out.extend_from_slice(&(n * 10).to_le_bytes());
        }
        for field in [1u32, 2, 3, 4, 5, 6, 7, sequence_counter] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        for field in [8u64, 9, 10, 11, 12] {
            out.extend_from_slice(&field.to_le_bytes());
        }
        for _ in 0..AggregatorRecord::CHANNELS {
            out.extend_from_slice(&phase_raw.to_le_bytes());
        }
        assert_eq!(out.len(), AggregatorRecord::SIZE);
        out
    }

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("agg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_header_layout() {
        let parsed = AggregatorRecord::parse(&record(77, -5)).unwrap();
        let h = parsed.header;
        assert_eq!((h.protocol_version, h.crate_id, h.slot_number), (2, 4, 6));
        assert_eq!(h.number_of_channels, 528);
        assert_eq!(h.rtm_dac_config[5], 50);
        assert_eq!(h.flux_ramp_increment, 1);
        assert_eq!(h.seconds, 6);
        assert_eq!(h.fixed_rate_marker, 7);
        assert_eq!(h.sequence_counter, 77);
        assert_eq!(h.tes_relay_config, 8);
        assert_eq!(h.mce_word, 9);
        assert_eq!(h.user_word, [10, 11, 12]);
        assert_eq!(parsed.payload.len(), 528);
        assert_eq!(parsed.payload[527], -5);
    }

    #[test]
    fn test_phase_scaling() {
        let mut bytes = record(1, 1 << 15);
        bytes.extend(record(2, -(1 << 14)));
        let series = aggregator_phase(&decode_aggregator(&bytes).unwrap());
        assert_eq!(series.timestamps, vec![1, 2]);
        assert_eq!(series.phase.dim(), (528, 2));
        assert!((series.phase[[0, 0]] - PI).abs() < 1e-12);
        assert!((series.phase[[100, 1]] + PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_resolve_latest_takes_last() {
        let dir = scratch_dir();
        for name in ["run_1.dat", "run_3.dat", "run_2.dat", "other.dat"] {
            std::fs::write(dir.join(name), record(0, 0)).unwrap();
        }
        let found = resolve_latest(&dir.join("run_")).unwrap();
        assert_eq!(found, dir.join("run_3.dat"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_resolve_latest_none() {
        let dir = scratch_dir();
        assert!(matches!(
            resolve_latest(&dir.join("missing")),
            Err(DecodeError::NoMatchingFile(_))
        ));
        assert!(matches!(
            resolve_latest(&dir.join("nope").join("x")),
            Err(DecodeError::NoMatchingFile(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_read_aggregator_file_unwraps() {
        let dir = scratch_dir();
        let mut bytes = record(10, 30000);
        bytes.extend(record(11, -30000));
        std::fs::write(dir.join("agg_0001.dat"), bytes).unwrap();

        let series = read_aggregator_file(&dir.join("agg_"), true).unwrap();
        let step = series.phase[[0, 1]] - series.phase[[0, 0]];
        assert!(step.abs() <= PI);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
