//! Streaming Session Manager
//!
//! Starts and stops continuous streaming per band, either through the
//! downstream aggregator or straight to a file written by the carrier.

use crate::aggregator_config::write_aggregator_config;
use crate::controller::destination_path;
use crate::error::StreamError;
use crate::settings::AcquisitionConfig;
use chrono::{DateTime, Utc};
use daq_protocol::{RegisterBus, WriterPath};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Where streamed frames end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkMode {
    /// Through the downstream aggregator writer
    #[default]
    Aggregator,
    /// The carrier's own streaming file writer
    Direct,
}

/// An active stream on one band
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamingSession {
    pub band: u8,
    pub mode: SinkMode,
    pub destination: PathBuf,
    pub started_at: DateTime<Utc>,
}

/// Tracks streaming sessions by band
pub struct StreamManager {
    config: AcquisitionConfig,
    sessions: HashMap<u8, StreamingSession>,
}

impl StreamManager {
    pub fn new(config: AcquisitionConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    pub fn session(&self, band: u8) -> Option<&StreamingSession> {
        self.sessions.get(&band)
    }

    pub fn active_bands(&self) -> Vec<u8> {
        let mut bands: Vec<u8> = self.sessions.keys().copied().collect();
        bands.sort_unstable();
        bands
    }

    /// Start streaming `band`.
    ///
    /// Returns `Ok(None)` without opening anything when the flux ramp is off.
    pub async fn start<B: RegisterBus + ?Sized>(
        &mut self,
        bus: &B,
        band: u8,
        mode: SinkMode,
    ) -> Result<Option<PathBuf>, StreamError> {
        if bus.ramp_max_cnt()? == 0 {
            error!("Flux ramp frequency is zero. Cannot take data.");
            return Ok(None);
        }
        if let Some(previous) = self.sessions.get(&band).map(|s| s.mode) {
            warn!("Band {} is already streaming; restarting", band);
            self.stop(bus, band, previous).await?;
        }

        let destination = destination_path(&self.config.output_dir, None);
        info!("Writing to file : {}", destination.display());

        match mode {
            SinkMode::Aggregator => write_aggregator_config(&self.config.aggregator, &destination)?,
            SinkMode::Direct => bus.set_streaming_datafile(&WriterPath::encode(&destination)?)?,
        }

        // enable before opening the sink so the filter transient is not recorded
        bus.set_stream_enable(band, true)?;
        tokio::time::sleep(self.config.stream_settle()).await;

        match mode {
            SinkMode::Aggregator => bus.set_aggregator_writer(true)?,
            SinkMode::Direct => bus.set_streaming_file_open(true)?,
        }

        self.sessions.insert(
            band,
            StreamingSession {
                band,
                mode,
                destination: destination.clone(),
                started_at: Utc::now(),
            },
        );
        Ok(Some(destination))
    }

    /// Stop streaming `band`.
    ///
    /// Stream-enable is always cleared. The sink of a tracked session is torn
    /// down with the mode it was started in; an untracked band uses `mode`.
    pub async fn stop<B: RegisterBus + ?Sized>(
        &mut self,
        bus: &B,
        band: u8,
        mode: SinkMode,
    ) -> Result<Option<StreamingSession>, StreamError> {
        let session = self.sessions.remove(&band);
        let mode = match &session {
            Some(session) => {
                if session.mode != mode {
                    warn!(
                        "Band {} was started in {:?} mode, not {:?}",
                        band, session.mode, mode
                    );
                }
                session.mode
            }
            None => {
                warn!("Band {} has no tracked session; stopping as {:?}", band, mode);
                mode
            }
        };

        bus.set_stream_enable(band, false)?;
        match mode {
            SinkMode::Aggregator => {
                bus.set_aggregator_writer(false)?;
                write_aggregator_config(&self.config.aggregator, &self.config.aggregator.neutral_sink)?;
            }
            SinkMode::Direct => bus.set_streaming_file_open(false)?,
        }

        if let Some(session) = &session {
            info!(
                "Stopped band {} after {}s",
                band,
                (Utc::now() - session.started_at).num_seconds()
            );
        }
        Ok(session)
    }

    /// Stream `band` for `duration` and return the data file
    pub async fn take_stream_data<B: RegisterBus + ?Sized>(
        &mut self,
        bus: &B,
        band: u8,
        duration: Duration,
        mode: SinkMode,
    ) -> Result<Option<PathBuf>, StreamError> {
        info!("Starting to take data.");
        let Some(path) = self.start(bus, band, mode).await? else {
            return Ok(None);
        };
        tokio::time::sleep(duration).await;
        self.stop(bus, band, mode).await?;
        info!("Done taking data.");
        Ok(Some(path))
    }
}
