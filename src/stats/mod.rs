//! Link statistics derived from two counter snapshots.

use crate::counters::{CounterPair, Direction};
use crate::link::PortLinkConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

mod decompose;
pub use decompose::{
    decompose_direction, Decomposed, DLLP_BYTES, DW_BYTES, TLP_DW, TLP_OVERHEAD_DW, TLP_SIZE_BYTES,
};

/// Statistics of one traffic direction over one interval.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionStatistics {
    /// Bytes on the link including TLP overhead and DLLPs.
    pub total_bytes: u64,
    /// `total_bytes` per second.
    pub total_byte_rate: f64,
    /// Payload bytes of completion TLPs.
    pub payload_read_bytes: u64,
    /// Payload bytes of posted TLPs.
    pub payload_write_bytes: u64,
    /// Read and write payload bytes.
    pub payload_total_bytes: u64,
    /// Mean payload bytes per TLP.
    pub payload_avg_per_tlp: f64,
    /// `payload_total_bytes` per second.
    pub payload_byte_rate: f64,
    /// Percentage of the theoretical link rate in use, within `[0, 100]`.
    pub link_utilization: f64,
}

impl DirectionStatistics {
    fn from_decomposed(d: &Decomposed, elapsed_ms: u64, max_link_rate: f64) -> Self {
        let total_bytes = d.total_bytes();
        let payload_total_bytes = d.payload_bytes();
        let link_utilization = if max_link_rate == 0.0 {
            0.0
        } else {
            (total_bytes as f64 * 100.0 / max_link_rate).min(100.0)
        };
        DirectionStatistics {
            total_bytes,
            total_byte_rate: total_bytes as f64 * 1000.0 / elapsed_ms as f64,
            payload_read_bytes: d.read_bytes(),
            payload_write_bytes: d.write_bytes(),
            payload_total_bytes,
            payload_avg_per_tlp: d.avg_payload_per_tlp(),
            payload_byte_rate: payload_total_bytes as f64 * 1000.0 / elapsed_ms as f64,
            link_utilization,
        }
    }
}

/// Statistics of both directions of a port over one interval.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedStatistics {
    /// Length of the interval in milliseconds.
    pub elapsed_ms: u64,
    /// Traffic received by the port.
    pub ingress: DirectionStatistics,
    /// Traffic transmitted by the port.
    pub egress: DirectionStatistics,
}

impl DerivedStatistics {
    /// Statistics of `direction`.
    #[inline]
    pub fn direction(&self, direction: Direction) -> &DirectionStatistics {
        match direction {
            Direction::Ingress => &self.ingress,
            Direction::Egress => &self.egress,
        }
    }
}

/// Compute the statistics of a port from counter snapshots `elapsed_ms` apart.
///
/// A zero interval or a down link is refused instead of yielding meaningless zeros.
pub fn compute_statistics(
    link: &PortLinkConfig,
    ingress: &CounterPair,
    egress: &CounterPair,
    elapsed_ms: u64,
) -> Result<DerivedStatistics> {
    if elapsed_ms == 0 {
        return Err(Error::InvalidInterval);
    }
    if link.width == 0 {
        return Err(Error::LinkDown);
    }

    let max_link_rate = link.max_rate_per_interval(elapsed_ms);
    let stats = |pair: &CounterPair, direction: Direction| {
        let d = decompose_direction(pair, link.family, direction);
        DirectionStatistics::from_decomposed(&d, elapsed_ms, max_link_rate)
    };

    Ok(DerivedStatistics {
        elapsed_ms,
        ingress: stats(ingress, Direction::Ingress),
        egress: stats(egress, Direction::Egress),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::CounterSnapshot;
    use crate::link::{ChipFamily, LinkSpeed};
    use rayon::prelude::*;

    fn gen3_x4(family: ChipFamily) -> PortLinkConfig {
        PortLinkConfig::new(family, 0, 4, LinkSpeed::Gen3)
    }

    fn posted(posted_header: u32, posted_dw: u32) -> CounterPair {
        CounterPair::new(
            CounterSnapshot {
                posted_header,
                posted_dw,
                ..Default::default()
            },
            CounterSnapshot::default(),
        )
    }

    #[test]
    fn test_end_to_end() {
        let link = gen3_x4(ChipFamily::Cygnus);
        let ingress = posted(1000, 6000);
        let stats = compute_statistics(&link, &ingress, &CounterPair::default(), 1000).unwrap();
        let ing = &stats.ingress;
        assert_eq!(ing.payload_write_bytes, 4000);
        assert_eq!(ing.payload_read_bytes, 0);
        assert_eq!(ing.total_bytes, 24000);
        assert_eq!(ing.total_byte_rate, 24000.0);
        assert_eq!(ing.payload_byte_rate, 4000.0);
        assert_eq!(ing.payload_avg_per_tlp, 4.0);
        assert!((ing.link_utilization - 0.0006).abs() < 1e-9);
        assert_eq!(ing.link_utilization as u32, 0);
        assert_eq!(stats.egress, DirectionStatistics::default());
    }

    #[test]
    fn test_rate_scales_to_seconds() {
        let link = gen3_x4(ChipFamily::Cygnus);
        let ingress = posted(1000, 6000);
        let stats = compute_statistics(&link, &ingress, &CounterPair::default(), 250).unwrap();
        assert_eq!(stats.ingress.total_byte_rate, 96000.0);
        assert_eq!(stats.ingress.payload_byte_rate, 16000.0);
    }

    #[test]
    fn test_refuse_zero_interval() {
        let link = gen3_x4(ChipFamily::Cygnus);
        let err = compute_statistics(&link, &posted(1, 10), &posted(1, 10), 0).unwrap_err();
        assert!(match err {
            Error::InvalidInterval => true,
            _ => false,
        });
        assert!(err.is_invalid_data());
    }

    #[test]
    fn test_refuse_link_down() {
        let link = PortLinkConfig::new(ChipFamily::Cygnus, 0, 0, LinkSpeed::Gen3);
        let err = compute_statistics(&link, &posted(1, 10), &posted(1, 10), 1000).unwrap_err();
        assert!(match err {
            Error::LinkDown => true,
            _ => false,
        });
        assert!(err.is_invalid_data());
    }

    #[test]
    fn test_zero_traffic() {
        let snap = CounterSnapshot::from_array([5, 50, 0, 7, 3, 30, 0xFFFF_FFFF]);
        let unchanged = CounterPair::new(snap, snap);
        let link = gen3_x4(ChipFamily::Atlas);
        let stats = compute_statistics(&link, &unchanged, &unchanged, 1000).unwrap();
        for d in &[stats.ingress, stats.egress] {
            assert_eq!(d.total_bytes, 0);
            assert_eq!(d.total_byte_rate, 0.0);
            assert_eq!(d.link_utilization, 0.0);
            assert_eq!(d.payload_avg_per_tlp, 0.0);
        }
    }

    #[test]
    fn test_utilization_saturates() {
        // x1 Gen1 over 1 ms carries at most 250000 bytes
        let link = PortLinkConfig::new(ChipFamily::Deneb, 0, 1, LinkSpeed::Gen1);
        let (ingress, egress) = (posted(0, 1_000_000), posted(0, 62_500));
        let stats = compute_statistics(&link, &ingress, &egress, 1).unwrap();
        assert_eq!(stats.ingress.link_utilization, 100.0);
        assert_eq!(stats.egress.link_utilization, 100.0);
    }

    #[test]
    fn test_capella2_egress_write_bytes() {
        let raw = posted(100, 1000);
        let capella = compute_statistics(&gen3_x4(ChipFamily::Capella2), &raw, &raw, 1000).unwrap();
        let other = compute_statistics(&gen3_x4(ChipFamily::Unknown), &raw, &raw, 1000).unwrap();
        assert!(capella.egress.payload_write_bytes > other.egress.payload_write_bytes);
        assert_eq!(capella.ingress, other.ingress);
        assert_eq!(capella.direction(Direction::Egress), &capella.egress);
        assert_eq!(capella.direction(Direction::Ingress), &other.ingress);
    }

    #[test]
    fn test_wrapped_counters() {
        let pair = CounterPair::new(
            CounterSnapshot {
                posted_header: 4,
                posted_dw: 40,
                ..Default::default()
            },
            CounterSnapshot {
                posted_header: 0xFFFF_FFFC,
                posted_dw: 0xFFFF_FFF0,
                ..Default::default()
            },
        );
        let stats = compute_statistics(&gen3_x4(ChipFamily::Cygnus), &pair, &pair, 1000).unwrap();
        assert_eq!(stats.ingress.total_bytes, 56 * 4);
        assert_eq!(stats.ingress.payload_write_bytes, 56 * 4 - 8 * 20);
    }

    #[test]
    fn test_utilization_bounded_parallel() {
        let speeds = [LinkSpeed::Gen1, LinkSpeed::Gen2, LinkSpeed::Gen3, LinkSpeed::Gen4];
        let results: Vec<DerivedStatistics> = (0u32..256)
            .into_par_iter()
            .map(|i| {
                let link = PortLinkConfig::new(
                    ChipFamily::Capella2,
                    (i % 24) as u8,
                    1 << (i % 5),
                    speeds[(i % 4) as usize],
                );
                let current = CounterSnapshot::from_array([
                    i * 7,
                    i * 1_000_003,
                    0,
                    i * 13,
                    i,
                    i * 50_000,
                    i * 3,
                ]);
                let previous = CounterSnapshot::from_array([u32::max_value() - i; 7]);
                let pair = CounterPair::new(current, previous);
                compute_statistics(&link, &pair, &pair, u64::from(i % 10 + 1)).unwrap()
            })
            .collect();
        assert_eq!(results.len(), 256);
        for s in results {
            for d in &[s.ingress, s.egress] {
                assert!(d.link_utilization >= 0.0 && d.link_utilization <= 100.0);
                assert!(d.total_byte_rate >= 0.0 && d.payload_byte_rate >= 0.0);
            }
        }
    }
}
