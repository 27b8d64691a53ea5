//! Simulated Register Backend
//!
//! In-memory [`RegisterBus`] used by tests and offline runs. Every register
//! write is recorded so callers can assert on ordering.

use crate::bus::RegisterBus;
use crate::error::BusError;
use crate::writer_path::WriterPath;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Base address of the first waveform engine
const WAVEFORM_BASE_ADDR: u64 = 0x8000_0000;
/// Address stride between waveform engines
const WAVEFORM_STRIDE: u64 = 0x1000_0000;
/// Number of simulated waveform engines
const WAVEFORM_ENGINES: usize = 4;

/// A register write observed by the simulator
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterWrite {
    InputMuxSel { index: usize, channel: u32 },
    DataBufferSize(u32),
    WaveformEndAddr { engine: usize, addr: u64 },
    TriggerDaq,
    ArmHwTrigger,
    SingleChannelReadout { band: u8, enable: bool },
    SingleChannelReadoutOpt2 { band: u8, enable: bool },
    IqStreamEnable { band: u8, enable: bool },
    DebugWriterDatafile(PathBuf),
    DebugWriterOpen(bool),
    StreamEnable { band: u8, enable: bool },
    StreamingDatafile(PathBuf),
    StreamingFileOpen(bool),
    AggregatorWriter(bool),
    AggregatorCfgRead(bool),
    JesdRxEnable(u32),
    JesdTxEnable(u32),
    JesdResetN { index: usize, level: bool },
    PwrUpSysRef,
}

#[derive(Debug)]
struct SimState {
    writes: Vec<RegisterWrite>,
    triggered: bool,
    polls_until_ready: usize,
    polls_remaining: usize,
    capture: Option<Vec<u8>>,
    debug_writer_path: Option<PathBuf>,
    debug_writer_open: bool,
    ramp_max_cnt: u32,
    flux_ramp_khz: f64,
    rx_enable: u32,
    rx_valid: u32,
    tx_enable: u32,
    tx_valid: u32,
    links_repairable: bool,
    trigger_fault: Option<String>,
    stream_data: HashMap<usize, Vec<i32>>,
    subscribers: HashMap<usize, Vec<mpsc::UnboundedSender<Vec<i32>>>>,
}

/// Simulated carrier board
#[derive(Debug)]
pub struct SimulatedBus {
    state: Mutex<SimState>,
}

impl SimulatedBus {
    /// Create a simulator with healthy links and a running flux ramp
    pub fn new() -> Self {
        info!("Creating simulated register bus");
        Self {
            state: Mutex::new(SimState {
                writes: Vec::new(),
                triggered: false,
                polls_until_ready: 1,
                polls_remaining: 0,
                capture: None,
                debug_writer_path: None,
                debug_writer_open: false,
                ramp_max_cnt: 0x2000,
                flux_ramp_khz: 4.0,
                rx_enable: 0x3F3,
                rx_valid: 0x3F3,
                tx_enable: 0x3CF,
                tx_valid: 0x3CF,
                links_repairable: true,
                trigger_fault: None,
                stream_data: HashMap::new(),
                subscribers: HashMap::new(),
            }),
        }
    }

    /// Bytes the debug writer dumps when it is closed after a trigger
    pub fn with_capture(self, bytes: Vec<u8>) -> Self {
        self.update(|s| s.capture = Some(bytes));
        self
    }

    /// Number of poll rounds after a trigger before the buffers fill
    pub fn with_polls_until_ready(self, polls: usize) -> Self {
        self.update(|s| s.polls_until_ready = polls);
        self
    }

    /// Make every software trigger fail with `reason`
    pub fn with_trigger_fault(self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        self.update(|s| s.trigger_fault = Some(reason));
        self
    }

    /// Flux ramp maximum count (0 = ramp off)
    pub fn with_ramp_max_cnt(self, count: u32) -> Self {
        self.update(|s| s.ramp_max_cnt = count);
        self
    }

    /// Flux ramp reset rate in kHz
    pub fn with_flux_ramp_khz(self, khz: f64) -> Self {
        self.update(|s| s.flux_ramp_khz = khz);
        self
    }

    /// Raw JESD enable/valid words for both links
    pub fn with_links(self, rx: (u32, u32), tx: (u32, u32)) -> Self {
        self.update(|s| {
            s.rx_enable = rx.0;
            s.rx_valid = rx.1;
            s.tx_enable = tx.0;
            s.tx_valid = tx.1;
        });
        self
    }

    /// Whether data-valid follows enable after a toggle
    pub fn with_links_repairable(self, repairable: bool) -> Self {
        self.update(|s| s.links_repairable = repairable);
        self
    }

    /// Value published on `stream` at every trigger
    pub fn with_stream_data(self, stream: usize, data: Vec<i32>) -> Self {
        self.update(|s| {
            s.stream_data.insert(stream, data);
        });
        self
    }

    /// All register writes so far, oldest first
    pub fn writes(&self) -> Vec<RegisterWrite> {
        self.lock().map(|s| s.writes.clone()).unwrap_or_default()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.update(|s| s.writes.clear());
    }

    /// Whether a trigger has been issued
    pub fn triggered(&self) -> bool {
        self.lock().map(|s| s.triggered).unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>, BusError> {
        self.state
            .lock()
            .map_err(|e| BusError::Unavailable(format!("Lock error: {}", e)))
    }

    fn update(&self, f: impl FnOnce(&mut SimState)) {
        if let Ok(mut state) = self.lock() {
            f(&mut state);
        }
    }

    fn record(&self, write: RegisterWrite) -> Result<MutexGuard<'_, SimState>, BusError> {
        let mut state = self.lock()?;
        debug!("sim write {:?}", write);
        state.writes.push(write);
        Ok(state)
    }

    fn check_engine(engine: usize) -> Result<(), BusError> {
        if engine >= WAVEFORM_ENGINES {
            return Err(BusError::InvalidIndex {
                register: "waveform",
                index: engine,
            });
        }
        Ok(())
    }

    fn fire(state: &mut SimState) {
        state.triggered = true;
        state.polls_remaining = state.polls_until_ready;
        for (stream, senders) in state.subscribers.iter_mut() {
            let data = state.stream_data.get(stream).cloned().unwrap_or_default();
            senders.retain(|tx| tx.send(data.clone()).is_ok());
        }
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for SimulatedBus {
    fn set_input_mux_sel(&self, index: usize, channel: u32) -> Result<(), BusError> {
        if index > 1 {
            return Err(BusError::InvalidIndex {
                register: "input_mux_sel",
                index,
            });
        }
        self.record(RegisterWrite::InputMuxSel { index, channel })?;
        Ok(())
    }

    fn set_data_buffer_size(&self, samples: u32) -> Result<(), BusError> {
        self.record(RegisterWrite::DataBufferSize(samples))?;
        Ok(())
    }

    fn waveform_start_addr(&self, engine: usize) -> Result<u64, BusError> {
        Self::check_engine(engine)?;
        Ok(WAVEFORM_BASE_ADDR + WAVEFORM_STRIDE * engine as u64)
    }

    fn set_waveform_end_addr(&self, engine: usize, addr: u64) -> Result<(), BusError> {
        Self::check_engine(engine)?;
        self.record(RegisterWrite::WaveformEndAddr { engine, addr })?;
        Ok(())
    }

    fn waveform_empty(&self, engine: usize) -> Result<bool, BusError> {
        Self::check_engine(engine)?;
        let mut state = self.lock()?;
        if !state.triggered {
            return Ok(true);
        }
        if engine == 0 && state.polls_remaining > 0 {
            state.polls_remaining -= 1;
        }
        Ok(state.polls_remaining > 0)
    }

    fn trigger_daq(&self) -> Result<(), BusError> {
        if let Some(reason) = self.lock()?.trigger_fault.clone() {
            return Err(BusError::Unavailable(reason));
        }
        let mut state = self.record(RegisterWrite::TriggerDaq)?;
        Self::fire(&mut state);
        Ok(())
    }

    fn arm_hw_trigger(&self) -> Result<(), BusError> {
        let mut state = self.record(RegisterWrite::ArmHwTrigger)?;
        Self::fire(&mut state);
        Ok(())
    }

    fn subscribe_stream(&self, stream: usize) -> Result<mpsc::UnboundedReceiver<Vec<i32>>, BusError> {
        let mut state = self.lock()?;
        let (tx, rx) = mpsc::unbounded_channel();
        // Monitors deliver the current value on connect.
        let current = state.stream_data.get(&stream).cloned().unwrap_or_default();
        let _ = tx.send(current);
        state.subscribers.entry(stream).or_default().push(tx);
        Ok(rx)
    }

    fn set_single_channel_readout(&self, band: u8, enable: bool) -> Result<(), BusError> {
        self.record(RegisterWrite::SingleChannelReadout { band, enable })?;
        Ok(())
    }

    fn set_single_channel_readout_opt2(&self, band: u8, enable: bool) -> Result<(), BusError> {
        self.record(RegisterWrite::SingleChannelReadoutOpt2 { band, enable })?;
        Ok(())
    }

    fn set_iq_stream_enable(&self, band: u8, enable: bool) -> Result<(), BusError> {
        self.record(RegisterWrite::IqStreamEnable { band, enable })?;
        Ok(())
    }

    fn set_debug_writer_datafile(&self, path: &WriterPath) -> Result<(), BusError> {
        let path = path.to_path();
        let mut state = self.record(RegisterWrite::DebugWriterDatafile(path.clone()))?;
        state.debug_writer_path = Some(path);
        Ok(())
    }

    fn set_debug_writer_open(&self, open: bool) -> Result<(), BusError> {
        let mut state = self.record(RegisterWrite::DebugWriterOpen(open))?;
        let closing = state.debug_writer_open && !open;
        state.debug_writer_open = open;

        if closing && state.triggered {
            if let (Some(path), Some(bytes)) = (&state.debug_writer_path, &state.capture) {
                std::fs::write(path, bytes)?;
                debug!("sim writer dumped {} bytes to {}", bytes.len(), path.display());
            }
        }
        Ok(())
    }

    fn ramp_max_cnt(&self) -> Result<u32, BusError> {
        Ok(self.lock()?.ramp_max_cnt)
    }

    fn flux_ramp_freq_khz(&self) -> Result<f64, BusError> {
        Ok(self.lock()?.flux_ramp_khz)
    }

    fn set_stream_enable(&self, band: u8, enable: bool) -> Result<(), BusError> {
        self.record(RegisterWrite::StreamEnable { band, enable })?;
        Ok(())
    }

    fn set_streaming_datafile(&self, path: &WriterPath) -> Result<(), BusError> {
        self.record(RegisterWrite::StreamingDatafile(path.to_path()))?;
        Ok(())
    }

    fn set_streaming_file_open(&self, open: bool) -> Result<(), BusError> {
        self.record(RegisterWrite::StreamingFileOpen(open))?;
        Ok(())
    }

    fn set_aggregator_writer(&self, enable: bool) -> Result<(), BusError> {
        self.record(RegisterWrite::AggregatorWriter(enable))?;
        Ok(())
    }

    fn set_aggregator_cfg_read(&self, read: bool) -> Result<(), BusError> {
        self.record(RegisterWrite::AggregatorCfgRead(read))?;
        Ok(())
    }

    fn jesd_rx_enable(&self) -> Result<u32, BusError> {
        Ok(self.lock()?.rx_enable)
    }

    fn jesd_rx_data_valid(&self) -> Result<u32, BusError> {
        Ok(self.lock()?.rx_valid)
    }

    fn set_jesd_rx_enable(&self, value: u32) -> Result<(), BusError> {
        let mut state = self.record(RegisterWrite::JesdRxEnable(value))?;
        state.rx_enable = value;
        if state.links_repairable {
            state.rx_valid = value;
        }
        Ok(())
    }

    fn jesd_tx_enable(&self) -> Result<u32, BusError> {
        Ok(self.lock()?.tx_enable)
    }

    fn jesd_tx_data_valid(&self) -> Result<u32, BusError> {
        Ok(self.lock()?.tx_valid)
    }

    fn set_jesd_tx_enable(&self, value: u32) -> Result<(), BusError> {
        let mut state = self.record(RegisterWrite::JesdTxEnable(value))?;
        state.tx_enable = value;
        if state.links_repairable {
            state.tx_valid = value;
        }
        Ok(())
    }

    fn set_jesd_reset_n(&self, index: usize, level: bool) -> Result<(), BusError> {
        self.record(RegisterWrite::JesdResetN { index, level })?;
        Ok(())
    }

    fn run_pwr_up_sys_ref(&self) -> Result<(), BusError> {
        self.record(RegisterWrite::PwrUpSysRef)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_empty_until_triggered() {
        let bus = SimulatedBus::new().with_polls_until_ready(2);
        assert!(bus.waveform_empty(0).unwrap());

        bus.trigger_daq().unwrap();
        // first round still empty
        assert!(bus.waveform_empty(0).unwrap());
        assert!(bus.waveform_empty(3).unwrap());
        // second round ready
        assert!(!bus.waveform_empty(0).unwrap());
        assert!(!bus.waveform_empty(3).unwrap());
    }

    #[test]
    fn test_invalid_engine() {
        let bus = SimulatedBus::new();
        assert!(matches!(
            bus.waveform_empty(4),
            Err(BusError::InvalidIndex { index: 4, .. })
        ));
    }

    #[test]
    fn test_valid_follows_enable_when_repairable() {
        let bus = SimulatedBus::new().with_links((0x3F3, 0), (0x3CF, 0x3CF));
        bus.set_jesd_rx_enable(0).unwrap();
        bus.set_jesd_rx_enable(0x3F3).unwrap();
        assert_eq!(bus.jesd_rx_data_valid().unwrap(), 0x3F3);
    }

    #[test]
    fn test_broken_link_stays_invalid() {
        let bus = SimulatedBus::new()
            .with_links((0x3F3, 0), (0x3CF, 0x3CF))
            .with_links_repairable(false);
        bus.set_jesd_rx_enable(0).unwrap();
        bus.set_jesd_rx_enable(0x3F3).unwrap();
        assert_eq!(bus.jesd_rx_data_valid().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stream_subscribers_get_stale_then_fresh() {
        let bus = SimulatedBus::new().with_stream_data(0, vec![1, 2, 3]);
        let mut rx = bus.subscribe_stream(0).unwrap();
        bus.trigger_daq().unwrap();
        assert_eq!(rx.recv().await, Some(vec![1, 2, 3]));
        assert_eq!(rx.recv().await, Some(vec![1, 2, 3]));
    }
}
