//! Stream Sync Group
//!
//! Waits for a fresh update on every endpoint of a set of DAQ streams. Stream
//! monitors deliver their current (stale) value on connect; with `skip_first`
//! that value is discarded so only data produced after the trigger is kept.

use crate::error::CaptureError;
use daq_protocol::{BusError, RegisterBus};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

struct Endpoint {
    stream: usize,
    rx: UnboundedReceiver<Vec<i32>>,
    latest: Option<Vec<i32>>,
}

pub struct SyncGroup {
    endpoints: Vec<Endpoint>,
    skip_first: bool,
}

impl SyncGroup {
    /// Subscribe to every stream in `streams`
    pub fn subscribe<B: RegisterBus + ?Sized>(
        bus: &B,
        streams: &[usize],
        skip_first: bool,
    ) -> Result<Self, BusError> {
        let endpoints = streams
            .iter()
            .map(|&stream| {
                Ok(Endpoint {
                    stream,
                    rx: bus.subscribe_stream(stream)?,
                    latest: None,
                })
            })
            .collect::<Result<Vec<_>, BusError>>()?;
        Ok(Self {
            endpoints,
            skip_first,
        })
    }

    /// Block until every endpoint has produced one fresh update
    pub async fn wait(&mut self) -> Result<(), CaptureError> {
        let skip = std::mem::take(&mut self.skip_first);
        for endpoint in self.endpoints.iter_mut() {
            if skip {
                endpoint
                    .rx
                    .recv()
                    .await
                    .ok_or(CaptureError::StreamClosed(endpoint.stream))?;
            }
            let mut value = endpoint
                .rx
                .recv()
                .await
                .ok_or(CaptureError::StreamClosed(endpoint.stream))?;
            // keep only the newest if several arrived
            while let Ok(newer) = endpoint.rx.try_recv() {
                value = newer;
            }
            debug!("Stream {} delivered {} samples", endpoint.stream, value.len());
            endpoint.latest = Some(value);
        }
        Ok(())
    }

    /// [`Self::wait`] bounded by `limit`
    pub async fn wait_timeout(&mut self, limit: Duration) -> Result<(), CaptureError> {
        tokio::time::timeout(limit, self.wait())
            .await
            .map_err(|_| CaptureError::Timeout(limit))?
    }

    /// Latest value of `stream`, if it has delivered one
    pub fn value(&self, stream: usize) -> Option<&[i32]> {
        self.endpoints
            .iter()
            .find(|e| e.stream == stream)
            .and_then(|e| e.latest.as_deref())
    }
}
