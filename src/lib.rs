//! Link statistics for PCI-Express switch ports computed from hardware performance counters.
//!
//! Switches expose free-running 32-bit counters of TLP headers, DWs and DLLPs per port and
//! direction. Two snapshots taken an interval apart yield throughput, payload and link
//! utilization of the port over that interval.

#![deny(missing_docs, missing_debug_implementations)]

mod errors;
pub use errors::{Error, Result};

pub mod counters;
pub use counters::{delta, CounterPair, CounterSnapshot, Direction};

pub mod link;
pub use link::{max_link_rate_bytes_per_interval, ChipFamily, LinkSpeed, PortLinkConfig};

pub mod stats;
pub use stats::{compute_statistics, DerivedStatistics, DirectionStatistics};

pub mod units;
pub use units::{format_bytes, scale, Unit};

pub mod source;
pub use source::{CounterSource, ReplaySource};

mod pci;
pub use pci::{sysfs_device_dir, PciCounterSource, PciHandle};

pub mod sampler;
pub use sampler::{PortSample, Sampler, SamplerBuilder};
