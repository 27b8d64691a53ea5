//! Readout Acquisition
//!
//! Orchestrates debug captures, continuous streaming and JESD link recovery
//! on top of a [`daq_protocol::RegisterBus`]. Captured files are handed to
//! `frame_decoder` for conversion into physical units.

mod aggregator_config;
mod controller;
mod error;
mod filter;
mod link;
mod logging;
mod settings;
mod streaming;
mod sync_group;

pub use aggregator_config::{
    make_aggregator_config, reload_aggregator_config, write_aggregator_config,
    AggregatorConfigOptions, AggregatorConfigSummary,
};
pub use controller::{
    destination_path, timestamp_stem, AcquisitionController, CaptureRequest,
    DEFAULT_CAPTURE_SAMPLES,
};
pub use error::{CaptureError, FilterError, LinkError, StreamError};
pub use filter::{Butterworth, FilterCoefficients, FilterDesign};
pub use link::{check, recover, run_guarded, LinkReport, LinkState, LinkStatus};
pub use logging::init_logging;
pub use settings::{AcquisitionConfig, AggregatorSettings, LogFormat, ENV_PREFIX};
pub use streaming::{SinkMode, StreamManager, StreamingSession};
pub use sync_group::SyncGroup;
