//! Sources of link configuration and counter snapshots.

use crate::counters::CounterSnapshot;
use crate::link::PortLinkConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Provides link configuration and raw counters of switch ports.
///
/// Implementations need not be reentrant; a `Sampler` owns its source exclusively.
pub trait CounterSource {
    /// Current link configuration of `port`.
    fn fetch_link_config(&mut self, port: u8) -> Result<PortLinkConfig>;

    /// Current ingress and egress counters of `port`.
    fn fetch_counters(&mut self, port: u8) -> Result<(CounterSnapshot, CounterSnapshot)>;

    /// Clear the hardware counters and (re)start counting.
    ///
    /// Sources without control over the hardware do nothing.
    fn reset_counters(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One port in a recorded trace frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortRecord {
    /// Link configuration when the counters were read.
    pub link: PortLinkConfig,
    /// Ingress counters.
    pub ingress: CounterSnapshot,
    /// Egress counters.
    pub egress: CounterSnapshot,
}

/// Counters of all recorded ports at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceFrame {
    /// Milliseconds since the previous frame.
    #[serde(default)]
    pub elapsed_ms: u64,
    /// Recorded ports.
    pub ports: Vec<PortRecord>,
}

/// Replays frames recorded from another source.
#[derive(Debug, Default)]
pub struct ReplaySource {
    frames: Vec<TraceFrame>,
    /// Next frame to serve, per port.
    cursors: HashMap<u8, usize>,
}

impl ReplaySource {
    /// Replay `frames` in order.
    pub fn new(frames: Vec<TraceFrame>) -> Self {
        ReplaySource {
            frames,
            cursors: HashMap::new(),
        }
    }

    /// Load a trace written as a JSON array of frames.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(ReplaySource::new(serde_json::from_str(s)?))
    }

    /// Load a JSON trace file.
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        ReplaySource::from_json_str(&std::fs::read_to_string(path)?)
    }

    /// Recorded frames.
    #[inline]
    pub fn frames(&self) -> &[TraceFrame] {
        &self.frames
    }

    /// Interval recorded before the next frame `port` will be served from.
    pub fn pending_elapsed_ms(&self, port: u8) -> Option<u64> {
        let cursor = self.cursors.get(&port).copied().unwrap_or(0);
        self.frames.get(cursor).map(|f| f.elapsed_ms)
    }

    fn pending_record(&self, port: u8) -> Result<&PortRecord> {
        let cursor = self.cursors.get(&port).copied().unwrap_or(0);
        let frame = self.frames.get(cursor).ok_or(Error::ReplayExhausted)?;
        frame
            .ports
            .iter()
            .find(|r| r.link.port == port)
            .ok_or(Error::UnknownPort(port))
    }
}

impl CounterSource for ReplaySource {
    fn fetch_link_config(&mut self, port: u8) -> Result<PortLinkConfig> {
        Ok(self.pending_record(port)?.link)
    }

    fn fetch_counters(&mut self, port: u8) -> Result<(CounterSnapshot, CounterSnapshot)> {
        let record = *self.pending_record(port)?;
        *self.cursors.entry(port).or_insert(0) += 1;
        Ok((record.ingress, record.egress))
    }
}
