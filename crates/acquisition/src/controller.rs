//! Acquisition Controller
//!
//! Orchestrates a debug capture: program readout, route the mux, point the
//! debug writer at a file, trigger, wait for the waveform buffers, close the
//! writer and decode. Also performs direct ADC/DAC reads over the DAQ streams.

use crate::error::CaptureError;
use crate::settings::AcquisitionConfig;
use crate::sync_group::SyncGroup;
use daq_protocol::{configure_mux, stream, ReadoutMode, RegisterBus, SourceKind, WriterPath};
use frame_decoder::{read_debug_file, DebugCapture};
use rustfft::num_complex::Complex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default debug capture length in samples
pub const DEFAULT_CAPTURE_SAMPLES: u32 = 1 << 19;

/// Converters per AMC bay
const CONVERTERS_PER_BAY: u32 = 4;

/// Delay between the trigger and waiting on the stream sync group
const STREAM_TRIGGER_DELAY: Duration = Duration::from_millis(100);

/// A single debug capture on one band
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub band: u8,
    pub samples: u32,
    pub mode: ReadoutMode,
    pub iq_stream: bool,
    /// File stem under the output directory; a timestamp when unset
    pub file_name: Option<String>,
}

impl CaptureRequest {
    pub fn new(band: u8) -> Self {
        Self {
            band,
            samples: DEFAULT_CAPTURE_SAMPLES,
            mode: ReadoutMode::Off,
            iq_stream: true,
            file_name: None,
        }
    }

    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_mode(mut self, mode: ReadoutMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_iq_stream(mut self, enable: bool) -> Self {
        self.iq_stream = enable;
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}

/// Unix seconds, right-aligned to width 10
pub fn timestamp_stem() -> String {
    format!("{:10}", chrono::Utc::now().timestamp())
}

/// `<dir>/<name>.dat`, or a timestamped name when `name` is unset
pub fn destination_path(dir: &Path, name: Option<&str>) -> PathBuf {
    match name {
        Some(name) => dir.join(format!("{}.dat", name)),
        None => dir.join(format!("{}.dat", timestamp_stem())),
    }
}

/// Runs captures against a register bus
pub struct AcquisitionController {
    config: AcquisitionConfig,
}

impl AcquisitionController {
    pub fn new(config: AcquisitionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Take and decode one debug capture.
    ///
    /// `cancel` aborts the completion poll of this capture only; the writer
    /// is closed before the cancellation is reported.
    pub async fn capture<B: RegisterBus + ?Sized>(
        &self,
        bus: &B,
        request: &CaptureRequest,
        cancel: &CancellationToken,
    ) -> Result<DebugCapture, CaptureError> {
        let band = request.band;

        let path = destination_path(&self.config.output_dir, request.file_name.as_deref());
        let writer_path = WriterPath::encode(&path)?;

        let (opt1, opt2) = request.mode.register_bits();
        bus.set_single_channel_readout(band, opt1)?;
        bus.set_single_channel_readout_opt2(band, opt2)?;
        bus.set_iq_stream_enable(band, request.iq_stream)?;

        info!("Writing to file : {}", path.display());

        configure_mux(
            bus,
            &self.config.hardware,
            SourceKind::Debug,
            0,
            request.samples,
            band,
        )?;

        bus.set_debug_writer_datafile(&writer_path)?;
        bus.set_debug_writer_open(true)?;

        let acquired = self.trigger_and_wait(bus, cancel).await;
        info!("Closing file...");
        let closed = bus.set_debug_writer_open(false);
        acquired?;
        closed?;
        info!("Done taking data");

        Ok(read_debug_file(&path, request.mode.is_single_channel())?)
    }

    /// Trigger with the writer open, then wait for the buffers to fill
    async fn trigger_and_wait<B: RegisterBus + ?Sized>(
        &self,
        bus: &B,
        cancel: &CancellationToken,
    ) -> Result<(), CaptureError> {
        info!("Data acquisition in progress...");
        if let Err(e) = bus.trigger_daq() {
            error!("Trigger failed: {}", e);
            return Err(e.into());
        }
        self.wait_for_completion(bus, cancel).await
    }

    /// Poll until every waveform buffer holds data, bounded by the configured
    /// timeout and the cancellation token
    async fn wait_for_completion<B: RegisterBus + ?Sized>(
        &self,
        bus: &B,
        cancel: &CancellationToken,
    ) -> Result<(), CaptureError> {
        let poll = poll_until_filled(bus, self.config.hardware.daq_engines, self.config.poll_interval());

        let bounded = async {
            match self.config.capture_timeout() {
                Some(limit) => match tokio::time::timeout(limit, poll).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("Capture did not complete within {:?}", limit);
                        Err(CaptureError::Timeout(limit))
                    }
                },
                None => poll.await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                warn!("Capture cancelled");
                Err(CaptureError::Cancelled)
            }
            result = bounded => result,
        }
    }

    /// Read `samples` from ADC `number` as complex samples
    pub async fn read_adc_data<B: RegisterBus + ?Sized>(
        &self,
        bus: &B,
        number: u32,
        samples: u32,
        hw_trigger: bool,
    ) -> Result<Vec<Complex<f64>>, CaptureError> {
        self.read_converter(bus, SourceKind::Adc, number, samples, hw_trigger)
            .await
    }

    /// Read `samples` from DAC `number` as complex samples
    pub async fn read_dac_data<B: RegisterBus + ?Sized>(
        &self,
        bus: &B,
        number: u32,
        samples: u32,
        hw_trigger: bool,
    ) -> Result<Vec<Complex<f64>>, CaptureError> {
        self.read_converter(bus, SourceKind::Dac, number, samples, hw_trigger)
            .await
    }

    async fn read_converter<B: RegisterBus + ?Sized>(
        &self,
        bus: &B,
        kind: SourceKind,
        number: u32,
        samples: u32,
        hw_trigger: bool,
    ) -> Result<Vec<Complex<f64>>, CaptureError> {
        let (bay, index) = if number >= CONVERTERS_PER_BAY {
            (1, number - CONVERTERS_PER_BAY)
        } else {
            (0, number)
        };

        configure_mux(bus, &self.config.hardware, kind, index, samples, 0)?;

        let streams = if bay == 0 {
            [stream::BAY0_STREAM0, stream::BAY0_STREAM1]
        } else {
            [stream::BAY1_STREAM0, stream::BAY1_STREAM1]
        };
        let mut group = SyncGroup::subscribe(bus, &streams, true)?;

        if hw_trigger {
            bus.arm_hw_trigger()?;
        } else {
            bus.trigger_daq()?;
        }
        tokio::time::sleep(STREAM_TRIGGER_DELAY).await;

        match self.config.capture_timeout() {
            Some(limit) => group.wait_timeout(limit).await?,
            None => group.wait().await?,
        }

        let r0 = group.value(streams[0]).unwrap_or_default();
        let r1 = group.value(streams[1]).unwrap_or_default();
        if r0.len() != r1.len() {
            warn!("Stream lengths differ: {} vs {}", r0.len(), r1.len());
        }
        debug!("Read {} samples from {:?} {} on bay {}", r0.len().min(r1.len()), kind, index, bay);

        Ok(r1
            .iter()
            .zip(r0)
            .map(|(&re, &im)| Complex::new(re as f64, im as f64))
            .collect())
    }
}

async fn poll_until_filled<B: RegisterBus + ?Sized>(
    bus: &B,
    engines: usize,
    interval: Duration,
) -> Result<(), CaptureError> {
    loop {
        tokio::time::sleep(interval).await;
        let mut filled = true;
        for engine in 0..engines {
            if bus.waveform_empty(engine)? {
                filled = false;
            }
        }
        if filled {
            info!("Finished acquisition");
            return Ok(());
        }
        debug!("Waveform buffers still filling");
    }
}
