//! Acquisition Configuration
//!
//! Loaded from an optional TOML file layered under `CRYOMUX_`-prefixed
//! environment variables. Nested keys use a double underscore, e.g.
//! `CRYOMUX_AGGREGATOR__RECEIVER_IP`.

use config::{Config, ConfigError, Environment, File};
use daq_protocol::HardwareRevision;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "CRYOMUX";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Downstream aggregator writer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorSettings {
    /// Config file the aggregator reads on a config-read toggle
    pub config_file: PathBuf,
    /// Receiver address written into the config
    pub receiver_ip: String,
    /// Receiver port, in the aggregator's `#<port>` notation
    pub port_number: String,
    /// Data file the aggregator is pointed at while idle
    pub neutral_sink: PathBuf,
    /// 0 = one output frame per sync word
    pub num_averages: u32,
    /// Frames stored per data file
    pub data_frames: u64,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("/data/cryo/aggregator.cfg"),
            receiver_ip: "192.168.3.1".to_string(),
            port_number: "#3334".to_string(),
            neutral_sink: PathBuf::from("/data/cryo/mas_data_pipe"),
            num_averages: 0,
            data_frames: 1_000_000,
        }
    }
}

/// Top-level acquisition configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Directory for debug captures and direct streams
    pub output_dir: PathBuf,
    /// Directory for aggregator data files
    pub data_dir: PathBuf,
    /// Completion poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Upper bound on the completion poll; unset waits forever
    pub capture_timeout_ms: Option<u64>,
    /// Delay between stream enable and opening the sink, in milliseconds
    pub stream_settle_ms: u64,
    pub log_format: LogFormat,
    pub aggregator: AggregatorSettings,
    pub hardware: HardwareRevision,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            data_dir: PathBuf::from("data"),
            poll_interval_ms: 1000,
            capture_timeout_ms: None,
            stream_settle_ms: 1000,
            log_format: LogFormat::default(),
            aggregator: AggregatorSettings::default(),
            hardware: HardwareRevision::default(),
        }
    }
}

impl AcquisitionConfig {
    /// Load from `path` (if any) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn capture_timeout(&self) -> Option<Duration> {
        self.capture_timeout_ms.map(Duration::from_millis)
    }

    pub fn stream_settle(&self) -> Duration {
        Duration::from_millis(self.stream_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AcquisitionConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.capture_timeout(), None);
        assert_eq!(config.aggregator.port_number, "#3334");
        assert_eq!(config.hardware.rx_enable_nominal, 0x3F3);
    }

    #[test]
    fn test_load_toml_file() {
        let path = std::env::temp_dir().join(format!("cryomux-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"
output_dir = "/tmp/captures"
capture_timeout_ms = 30000
log_format = "json"

[aggregator]
receiver_ip = "10.0.0.7"

[hardware]
name = "rev-b"
debug_routes = [{ band = 1, channel0 = 20, channel1 = 21 }]
"#,
        )
        .unwrap();

        let config = AcquisitionConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.output_dir, PathBuf::from("/tmp/captures"));
        assert_eq!(config.capture_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.aggregator.receiver_ip, "10.0.0.7");
        assert_eq!(config.aggregator.port_number, "#3334");
        assert_eq!(config.hardware.name, "rev-b");
        assert!(config.hardware.debug_route(1).is_some());
        assert!(config.hardware.debug_route(2).is_none());
        assert_eq!(config.hardware.tx_enable_nominal, 0x3CF);
    }

    #[test]
    fn test_missing_file_is_error() {
        let path = std::env::temp_dir().join(format!("missing-{}.toml", uuid::Uuid::new_v4()));
        assert!(AcquisitionConfig::load(Some(&path)).is_err());
    }
}
