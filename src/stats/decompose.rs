//! Separation of TLP payload from protocol overhead for one traffic direction.

use crate::counters::{CounterPair, Direction};
use crate::link::ChipFamily;
use log::debug;

/// Bytes per DW.
pub const DW_BYTES: u64 = 4;
/// Overhead DWs per TLP (framing, sequence number, LCRC).
pub const TLP_OVERHEAD_DW: u64 = 2;
/// DWs per TLP excluding payload: 3 DW header plus overhead.
pub const TLP_DW: u64 = 3 + TLP_OVERHEAD_DW;
/// Bytes per TLP excluding payload.
pub const TLP_SIZE_BYTES: u64 = TLP_DW * DW_BYTES;
/// Bytes per DLLP.
pub const DLLP_BYTES: u64 = 2 * DW_BYTES;

/// Corrected counter deltas of one direction over one interval.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Decomposed {
    /// Posted TLPs.
    pub posted_header: u64,
    /// Posted DWs including TLP overhead.
    pub posted_dw: u64,
    /// Non-posted DWs.
    pub nonposted_dw: u64,
    /// Completion TLPs.
    pub cpl_header: u64,
    /// Completion DWs including TLP overhead.
    pub cpl_dw: u64,
    /// DLLPs.
    pub dllp: u64,
}

impl Decomposed {
    /// Payload bytes carried by posted (write) TLPs.
    #[inline]
    pub fn write_bytes(&self) -> u64 {
        (self.posted_dw * DW_BYTES).saturating_sub(self.posted_header * TLP_SIZE_BYTES)
    }

    /// Payload bytes carried by completion (read) TLPs.
    #[inline]
    pub fn read_bytes(&self) -> u64 {
        (self.cpl_dw * DW_BYTES).saturating_sub(self.cpl_header * TLP_SIZE_BYTES)
    }

    /// Read and write payload bytes.
    #[inline]
    pub fn payload_bytes(&self) -> u64 {
        self.write_bytes() + self.read_bytes()
    }

    /// Mean payload bytes per posted or completion TLP, 0 with no TLPs.
    pub fn avg_payload_per_tlp(&self) -> f64 {
        let tlps = self.posted_header + self.cpl_header;
        if tlps == 0 {
            0.0
        } else {
            self.payload_bytes() as f64 / tlps as f64
        }
    }

    /// All bytes seen on the link, TLP overhead and DLLPs included.
    #[inline]
    pub fn total_bytes(&self) -> u64 {
        (self.posted_dw + self.nonposted_dw + self.cpl_dw) * DW_BYTES + self.dllp * DLLP_BYTES
    }
}

/// Reconcile and correct the counters of one direction.
///
/// Capella-2 egress DW counters lack the per-TLP overhead, which is added back for posted and
/// completion DWs. Non-posted DWs stay uncorrected since no non-posted TLP count exists.
///
/// The chip periodically reports fewer posted DWs than its posted header count implies. The
/// header count is then re-derived from the DW count assuming 4 byte payloads.
pub fn decompose_direction(
    pair: &CounterPair,
    family: ChipFamily,
    direction: Direction,
) -> Decomposed {
    let d = pair.deltas();
    let mut out = Decomposed {
        posted_header: d.posted_header,
        posted_dw: d.posted_dw,
        nonposted_dw: d.nonposted_dw,
        cpl_header: d.cpl_header,
        cpl_dw: d.cpl_dw,
        dllp: d.dllp,
    };

    if direction == Direction::Egress && family.egress_excludes_tlp_overhead() {
        out.posted_dw += out.posted_header * TLP_OVERHEAD_DW;
        out.cpl_dw += out.cpl_header * TLP_OVERHEAD_DW;
    }

    if out.posted_header * TLP_DW > out.posted_dw {
        let clamped = out.posted_dw / (TLP_DW + 1);
        debug!(
            "{:?} posted header count {} exceeds {} DW, using {}",
            direction, out.posted_header, out.posted_dw, clamped
        );
        out.posted_header = clamped;
    }

    out
}
