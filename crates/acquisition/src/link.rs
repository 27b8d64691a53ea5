//! JESD Link Health and Recovery
//!
//! A link is healthy when its data-valid word matches its enable word. The
//! words are read fresh on every check; nothing is cached between calls.

use crate::error::LinkError;
use daq_protocol::{BusError, HardwareRevision, RegisterBus};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use tracing::{error, info};

/// Enable and data-valid words of one link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub enable: u32,
    pub valid: u32,
}

impl LinkStatus {
    pub fn is_healthy(&self) -> bool {
        self.enable == self.valid
    }
}

/// Combined health of the rx and tx links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    Healthy,
    RxDown,
    TxDown,
    BothDown,
}

impl LinkState {
    pub fn from_health(rx_ok: bool, tx_ok: bool) -> Self {
        match (rx_ok, tx_ok) {
            (true, true) => LinkState::Healthy,
            (false, true) => LinkState::RxDown,
            (true, false) => LinkState::TxDown,
            (false, false) => LinkState::BothDown,
        }
    }

    pub fn rx_ok(&self) -> bool {
        matches!(self, LinkState::Healthy | LinkState::TxDown)
    }

    pub fn tx_ok(&self) -> bool {
        matches!(self, LinkState::Healthy | LinkState::RxDown)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LinkState::Healthy => "Jesd Rx and Tx are up",
            LinkState::RxDown => "Jesd Rx is down",
            LinkState::TxDown => "Jesd Tx is down",
            LinkState::BothDown => "Jesd Rx and Tx are both down",
        };
        f.write_str(text)
    }
}

/// Raw link words as read from the carrier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub rx: LinkStatus,
    pub tx: LinkStatus,
}

impl LinkReport {
    pub fn state(&self) -> LinkState {
        LinkState::from_health(self.rx.is_healthy(), self.tx.is_healthy())
    }
}

/// Read both links. Unhealthy links are always logged; healthy ones only
/// when `silent` is false.
pub fn check<B: RegisterBus + ?Sized>(bus: &B, silent: bool) -> Result<LinkReport, BusError> {
    let tx = LinkStatus {
        enable: bus.jesd_tx_enable()?,
        valid: bus.jesd_tx_data_valid()?,
    };
    let rx = LinkStatus {
        enable: bus.jesd_rx_enable()?,
        valid: bus.jesd_rx_data_valid()?,
    };

    for (name, status) in [("Tx", tx), ("Rx", rx)] {
        if !status.is_healthy() {
            error!(
                "JESD {} DOWN (enable {:#x}, valid {:#x})",
                name, status.enable, status.valid
            );
        } else if !silent {
            info!("JESD {} Okay", name);
        }
    }

    Ok(LinkReport { rx, tx })
}

/// One recovery attempt on the selected links, followed by a re-check.
///
/// Enable registers are driven off then back to nominal; tx recovery also
/// pulses every converter reset line low then high.
pub fn recover<B: RegisterBus + ?Sized>(
    bus: &B,
    revision: &HardwareRevision,
    rx: bool,
    tx: bool,
) -> Result<LinkReport, LinkError> {
    if rx {
        bus.set_jesd_rx_enable(0)?;
        bus.set_jesd_rx_enable(revision.rx_enable_nominal)?;
    }

    if tx {
        bus.set_jesd_tx_enable(0)?;
        bus.set_jesd_tx_enable(revision.tx_enable_nominal)?;
        for &line in &revision.converter_reset_lines {
            bus.set_jesd_reset_n(line, false)?;
            bus.set_jesd_reset_n(line, true)?;
        }
    }

    if rx || tx {
        bus.run_pwr_up_sys_ref()?;
    }

    let report = check(bus, false)?;
    match report.state() {
        LinkState::Healthy => {
            info!("Recovered Jesd");
            Ok(report)
        }
        state => {
            error!("Failed to recover Jesd: {}", state);
            Err(LinkError::StillDown(state))
        }
    }
}

/// Run `op` once the links are known healthy.
///
/// A down link gets a single recovery attempt. If it fails the recovery error
/// is returned and `op` is never started.
pub async fn run_guarded<B, F, Fut, T, E>(
    bus: &B,
    revision: &HardwareRevision,
    op: F,
) -> Result<T, E>
where
    B: RegisterBus + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LinkError>,
{
    let state = check(bus, true).map_err(LinkError::from)?.state();
    if state != LinkState::Healthy {
        error!("{} ... will attempt to recover", state);
        recover(bus, revision, !state.rx_ok(), !state.tx_ok())?;
        info!("Recovered Jesd; prior setup may need to be redone");
    }
    op().await
}
