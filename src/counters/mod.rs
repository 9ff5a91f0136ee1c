//! Raw hardware counter snapshots and wraparound reconciliation.
//!
//! Every switch port exposes seven free-running 32-bit counters per direction. Two snapshots taken
//! one sampling interval apart are reconciled into 64-bit deltas before any statistics are derived.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

mod ram;
pub use ram::{CounterRam, RamLayout};

/// Number of counters tracked per direction.
pub const COUNTERS_PER_DIRECTION: usize = 7;

/// Value written by Draco-1 silicon in place of a real count.
const DROPOUT_GARBAGE: u32 = 0x4C04_1301;

/// Traffic direction relative to the switch port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Traffic received by the port.
    Ingress,
    /// Traffic transmitted by the port.
    Egress,
}

/// True number of counts between two readings of a 32-bit counter.
///
/// A reading lower than the previous one is taken to mean the counter wrapped exactly once. Two
/// wraps within one interval cannot be detected and under-count.
#[inline]
pub fn delta(current: u32, previous: u32) -> u64 {
    let mut current = u64::from(current);
    if current < u64::from(previous) {
        current += 1 << 32;
    }
    current - u64::from(previous)
}

/// One reading of the counters of a single direction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Posted TLP headers.
    pub posted_header: u32,
    /// Posted DWs, headers included.
    pub posted_dw: u32,
    /// Non-posted TLP headers. Only wired on Atlas.
    #[serde(default)]
    pub nonposted_header: u32,
    /// Non-posted DWs.
    pub nonposted_dw: u32,
    /// Completion TLP headers.
    pub cpl_header: u32,
    /// Completion DWs, headers included.
    pub cpl_dw: u32,
    /// Data link layer packets.
    pub dllp: u32,
}

impl CounterSnapshot {
    /// Counters in hardware order.
    pub fn to_array(&self) -> [u32; COUNTERS_PER_DIRECTION] {
        [
            self.posted_header,
            self.posted_dw,
            self.nonposted_header,
            self.nonposted_dw,
            self.cpl_header,
            self.cpl_dw,
            self.dllp,
        ]
    }

    /// Build a snapshot from counters in hardware order.
    pub fn from_array(c: [u32; COUNTERS_PER_DIRECTION]) -> Self {
        CounterSnapshot {
            posted_header: c[0],
            posted_dw: c[1],
            nonposted_header: c[2],
            nonposted_dw: c[3],
            cpl_header: c[4],
            cpl_dw: c[5],
            dllp: c[6],
        }
    }

    /// Replace counters that dropped out with an extrapolation of the last increment.
    ///
    /// A counter has dropped out when it reads as 0 after a non-zero `previous` reading, or when
    /// it reads as the known garbage value. The replacement is `previous` advanced by the
    /// increment seen between `before_previous` and `previous`. Returns the number of counters
    /// replaced.
    pub fn repair_dropouts(
        &mut self,
        previous: &CounterSnapshot,
        before_previous: &CounterSnapshot,
    ) -> usize {
        let mut current = self.to_array();
        let prev = previous.to_array();
        let prev2 = before_previous.to_array();
        let mut repaired = 0;
        for i in 0..COUNTERS_PER_DIRECTION {
            if (current[i] == 0 && prev[i] != 0) || current[i] == DROPOUT_GARBAGE {
                current[i] = prev[i].wrapping_add(prev[i].wrapping_sub(prev2[i]));
                repaired += 1;
            }
        }
        if repaired > 0 {
            warn!("Repaired {} dropped out counter(s)", repaired);
            *self = CounterSnapshot::from_array(current);
        }
        repaired
    }
}

/// Current and previous snapshots of one direction, bracketing a sampling interval.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterPair {
    /// Reading at the end of the interval.
    pub current: CounterSnapshot,
    /// Reading at the start of the interval.
    pub previous: CounterSnapshot,
}

/// Per-interval deltas of the counters of one direction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CounterDeltas {
    /// Posted TLP headers.
    pub posted_header: u64,
    /// Posted DWs.
    pub posted_dw: u64,
    /// Non-posted DWs.
    pub nonposted_dw: u64,
    /// Completion TLP headers.
    pub cpl_header: u64,
    /// Completion DWs.
    pub cpl_dw: u64,
    /// Data link layer packets.
    pub dllp: u64,
}

impl CounterPair {
    /// Pair two snapshots.
    pub fn new(current: CounterSnapshot, previous: CounterSnapshot) -> Self {
        CounterPair { current, previous }
    }

    /// Reconcile every counter used for statistics into its interval delta.
    pub fn deltas(&self) -> CounterDeltas {
        let (c, p) = (&self.current, &self.previous);
        let d = |cur: u32, prev: u32| {
            if cur < prev {
                debug!("Counter wrapped ({:#010X} -> {:#010X})", prev, cur);
            }
            delta(cur, prev)
        };
        CounterDeltas {
            posted_header: d(c.posted_header, p.posted_header),
            posted_dw: d(c.posted_dw, p.posted_dw),
            nonposted_dw: d(c.nonposted_dw, p.nonposted_dw),
            cpl_header: d(c.cpl_header, p.cpl_header),
            cpl_dw: d(c.cpl_dw, p.cpl_dw),
            dllp: d(c.dllp, p.dllp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_wrap() {
        assert_eq!(delta(10, 0xFFFF_FFF0), 26);
        assert_eq!(delta(0, u32::max_value()), 1);
        assert_eq!(delta(5, 6), (1u64 << 32) - 1);
    }

    #[test]
    fn test_delta_no_wrap() {
        assert_eq!(delta(100, 40), 60);
        assert_eq!(delta(7, 7), 0);
        assert_eq!(delta(u32::max_value(), 0), u64::from(u32::max_value()));
    }

    #[test]
    fn test_pair_deltas() {
        let previous = CounterSnapshot {
            posted_header: 0xFFFF_FF00,
            posted_dw: 100,
            ..Default::default()
        };
        let current = CounterSnapshot {
            posted_header: 0x10,
            posted_dw: 700,
            dllp: 3,
            ..Default::default()
        };
        let d = CounterPair::new(current, previous).deltas();
        assert_eq!(d.posted_header, 0x110);
        assert_eq!(d.posted_dw, 600);
        assert_eq!(d.dllp, 3);
        assert_eq!(d.cpl_dw, 0);
    }

    #[test]
    fn test_array_order() {
        let s = CounterSnapshot::from_array([1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(s.nonposted_header, 3);
        assert_eq!(s.dllp, 7);
        assert_eq!(s.to_array(), [1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_repair_dropouts() {
        let before_previous =
            CounterSnapshot::from_array([100, 200, 0, 300, 400, 500, 0xFFFF_FFF0]);
        let previous = CounterSnapshot::from_array([150, 260, 0, 330, 400, 500, 0x10]);
        let mut current = CounterSnapshot::from_array([0, 320, 0, DROPOUT_GARBAGE, 400, 600, 0]);
        assert_eq!(current.repair_dropouts(&previous, &before_previous), 3);
        assert_eq!(current.posted_header, 200);
        assert_eq!(current.posted_dw, 320);
        assert_eq!(current.nonposted_header, 0);
        assert_eq!(current.nonposted_dw, 360);
        // Increment of 0x20 across the wrap is carried forward
        assert_eq!(current.dllp, 0x30);

        let mut clean = CounterSnapshot::from_array([160, 270, 0, 340, 410, 510, 0x20]);
        assert_eq!(clean.repair_dropouts(&previous, &before_previous), 0);
    }
}
