//! Aggregator Config File
//!
//! The downstream aggregator takes its receiver address, output file and
//! filter from a `key value` text file, re-read whenever the config-read flag
//! is toggled.

use crate::controller::timestamp_stem;
use crate::error::StreamError;
use crate::filter::{FilterCoefficients, FilterDesign};
use crate::settings::AggregatorSettings;
use daq_protocol::{BusError, RegisterBus};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Flux ramp rates below this are replaced when designing the filter
const MIN_FLUX_RAMP_HZ: f64 = 1000.0;
/// Rate assumed for filter design when the flux ramp is too slow
const FALLBACK_FLUX_RAMP_HZ: f64 = 4000.0;
/// How long the config-read flag is held high
const CFG_READ_HOLD: Duration = Duration::from_millis(100);

/// Point the aggregator at `data_file` with the basic receiver settings
pub fn write_aggregator_config(settings: &AggregatorSettings, data_file: &Path) -> std::io::Result<()> {
    let body = format!(
        "num_averages {}\nreceiver_ip {}\nport_number {}\ndata_file_name {}\ndata_frames {}",
        settings.num_averages,
        settings.receiver_ip,
        settings.port_number,
        data_file.display(),
        settings.data_frames
    );
    std::fs::write(&settings.config_file, body)?;
    debug!(
        "Aggregator config {} now targets {}",
        settings.config_file.display(),
        data_file.display()
    );
    Ok(())
}

/// Options for a full aggregator config with a downsampling filter
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfigOptions {
    pub num_averages: u32,
    /// File name under the data directory; timestamped when unset
    pub file_name: Option<String>,
    pub file_name_extend: bool,
    pub data_frames: u64,
    pub filter_order: usize,
    pub filter_freq_hz: f64,
}

impl Default for AggregatorConfigOptions {
    fn default() -> Self {
        Self {
            num_averages: 0,
            file_name: None,
            file_name_extend: false,
            data_frames: 2_000_000,
            filter_order: 4,
            filter_freq_hz: 63.0,
        }
    }
}

/// What was written by [`make_aggregator_config`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatorConfigSummary {
    pub config_file: PathBuf,
    pub num_averages: u32,
    pub receiver_ip: String,
    pub port_number: String,
    pub data_file_name: PathBuf,
    pub file_name_extend: bool,
    pub data_frames: u64,
    pub flux_ramp_freq_hz: f64,
    pub filter_order: usize,
    pub filter: FilterCoefficients,
}

/// Write the full aggregator config, including lowpass coefficients designed
/// against the current flux ramp rate
pub fn make_aggregator_config<B: RegisterBus + ?Sized>(
    bus: &B,
    settings: &AggregatorSettings,
    data_dir: &Path,
    options: &AggregatorConfigOptions,
    design: &dyn FilterDesign,
) -> Result<AggregatorConfigSummary, StreamError> {
    let file_name = options
        .file_name
        .clone()
        .unwrap_or_else(|| format!("{}.dat", timestamp_stem()));
    let data_file_name = data_dir.join(file_name);

    let mut flux_ramp_freq_hz = bus.flux_ramp_freq_khz()? * 1e3;
    if flux_ramp_freq_hz < MIN_FLUX_RAMP_HZ {
        info!("Flux ramp frequency is below 1kHz. Setting a filter using 4kHz");
        flux_ramp_freq_hz = FALLBACK_FLUX_RAMP_HZ;
    }

    let filter = design.lowpass(
        options.filter_order,
        2.0 * options.filter_freq_hz / flux_ramp_freq_hz,
    )?;

    let mut body = String::new();
    let _ = writeln!(body, "num_averages {}", options.num_averages);
    let _ = writeln!(body, "receiver_ip {}", settings.receiver_ip);
    let _ = writeln!(body, "port_number {}", settings.port_number);
    let _ = writeln!(body, "data_file_name {}", data_file_name.display());
    let _ = writeln!(body, "file_name_extend {}", options.file_name_extend as u8);
    let _ = writeln!(body, "data_frames {}", options.data_frames);
    let _ = writeln!(body, "filter_order {}", options.filter_order);
    for (n, a) in filter.a.iter().enumerate() {
        let _ = writeln!(body, "filter_a{} {:?}", n, a);
    }
    for (n, b) in filter.b.iter().enumerate() {
        let _ = writeln!(body, "filter_b{} {:?}", n, b);
    }

    info!("Making aggregator config file {}", settings.config_file.display());
    std::fs::write(&settings.config_file, body)?;

    Ok(AggregatorConfigSummary {
        config_file: settings.config_file.clone(),
        num_averages: options.num_averages,
        receiver_ip: settings.receiver_ip.clone(),
        port_number: settings.port_number.clone(),
        data_file_name,
        file_name_extend: options.file_name_extend,
        data_frames: options.data_frames,
        flux_ramp_freq_hz,
        filter_order: options.filter_order,
        filter,
    })
}

/// Make the aggregator re-read its config file
pub async fn reload_aggregator_config<B: RegisterBus + ?Sized>(bus: &B) -> Result<(), BusError> {
    info!("Reading aggregator config");
    bus.set_aggregator_cfg_read(true)?;
    tokio::time::sleep(CFG_READ_HOLD).await;
    bus.set_aggregator_cfg_read(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FilterError;
    use crate::filter::Butterworth;
    use daq_protocol::{RegisterWrite, SimulatedBus};

    fn scratch_settings() -> (PathBuf, AggregatorSettings) {
        let dir = std::env::temp_dir().join(format!("aggcfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let settings = AggregatorSettings {
            config_file: dir.join("aggregator.cfg"),
            ..AggregatorSettings::default()
        };
        (dir, settings)
    }

    struct FixedDesign;

    impl FilterDesign for FixedDesign {
        fn lowpass(&self, order: usize, cutoff: f64) -> Result<FilterCoefficients, FilterError> {
            Ok(FilterCoefficients {
                b: vec![cutoff; order + 1],
                a: vec![1.0; order + 1],
            })
        }
    }

    #[test]
    fn test_basic_config_lines() {
        let (dir, settings) = scratch_settings();
        write_aggregator_config(&settings, Path::new("/data/run.dat")).unwrap();
        let text = std::fs::read_to_string(&settings.config_file).unwrap();
        assert_eq!(
            text,
            "num_averages 0\nreceiver_ip 192.168.3.1\nport_number #3334\n\
             data_file_name /data/run.dat\ndata_frames 1000000"
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_full_config_slow_ramp_uses_fallback() {
        let (dir, settings) = scratch_settings();
        let bus = SimulatedBus::new().with_flux_ramp_khz(0.5);
        let options = AggregatorConfigOptions {
            file_name: Some("night.dat".into()),
            filter_order: 2,
            ..AggregatorConfigOptions::default()
        };

        let summary =
            make_aggregator_config(&bus, &settings, Path::new("/data/cryo"), &options, &FixedDesign).unwrap();
        assert_eq!(summary.flux_ramp_freq_hz, 4000.0);
        assert_eq!(summary.data_file_name, PathBuf::from("/data/cryo/night.dat"));

        let text = std::fs::read_to_string(&settings.config_file).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[4], "file_name_extend 0");
        assert_eq!(lines[5], "data_frames 2000000");
        assert_eq!(lines[6], "filter_order 2");
        assert_eq!(lines[7], "filter_a0 1.0");
        assert_eq!(lines[10], "filter_b0 0.0315");
        assert_eq!(lines.len(), 13);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_full_config_with_butterworth() {
        let (dir, settings) = scratch_settings();
        let bus = SimulatedBus::new().with_flux_ramp_khz(4.0);
        let summary = make_aggregator_config(
            &bus,
            &settings,
            Path::new("/data"),
            &AggregatorConfigOptions::default(),
            &Butterworth,
        )
        .unwrap();
        assert_eq!(summary.filter.a.len(), 5);
        assert_eq!(summary.filter.b.len(), 5);
        assert!(summary.data_file_name.to_string_lossy().ends_with(".dat"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_cutoff_above_nyquist_writes_nothing() {
        let (dir, settings) = scratch_settings();
        let bus = SimulatedBus::new().with_flux_ramp_khz(4.0);
        let options = AggregatorConfigOptions {
            filter_freq_hz: 2500.0,
            ..AggregatorConfigOptions::default()
        };
        let err =
            make_aggregator_config(&bus, &settings, Path::new("/data"), &options, &Butterworth).unwrap_err();
        assert!(matches!(err, StreamError::Filter(FilterError::CutoffOutOfRange(_))));
        assert!(!settings.config_file.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_toggles_flag() {
        let bus = SimulatedBus::new();
        reload_aggregator_config(&bus).await.unwrap();
        assert_eq!(
            bus.writes(),
            vec![
                RegisterWrite::AggregatorCfgRead(true),
                RegisterWrite::AggregatorCfgRead(false)
            ]
        );
    }
}
