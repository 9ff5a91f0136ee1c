//! Link configuration of a switch port and the theoretical link rate model.

use crate::{Error, Result};
use derive_more::Display;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Usable bytes per second of one Gen1 lane (2.5 Gbps less 8b/10b coding).
pub const GEN1_BYTES_PER_SEC_PER_LANE: f64 = 250_000_000.0;

/// Switch chip families with distinct performance counter behaviour.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChipFamily {
    /// Family not known to this crate. No counter quirks are applied.
    #[display(fmt = "Unknown")]
    Unknown,
    /// 8612, 8616, 8624, 8632, 8647, 8648
    #[display(fmt = "Deneb")]
    Deneb,
    /// 8604 - 8619
    #[display(fmt = "Sirius")]
    Sirius,
    /// 8625, 8636, 8649, 8664, 8680, 8696
    #[display(fmt = "Cygnus")]
    Cygnus,
    /// 2380, 3380, 3382, 8603, 8605
    #[display(fmt = "Mira")]
    Mira,
    /// 8712, 8716, 8724, 8732, 8747, 8748, 8749
    #[display(fmt = "Draco-1")]
    Draco1,
    /// 8713, 8717, 8725, 8733
    #[display(fmt = "Draco-2")]
    Draco2,
    /// 8714, 8718, 8734, 8750, 8764, 8780, 8796
    #[display(fmt = "Capella-1")]
    Capella1,
    /// 9712, 9716, 9733, 9749, 9750, 9765, 9781, 9797
    #[display(fmt = "Capella-2")]
    Capella2,
    /// C010, C011, C012
    #[display(fmt = "Atlas")]
    Atlas,
}

impl Default for ChipFamily {
    fn default() -> Self {
        ChipFamily::Unknown
    }
}

impl ChipFamily {
    /// Number of ports per station used to split a port number into station and station port.
    ///
    /// Draco parts address 8 ports per station even though only 6 are populated.
    pub fn ports_per_station(self) -> Option<u8> {
        match self {
            ChipFamily::Deneb
            | ChipFamily::Cygnus
            | ChipFamily::Mira
            | ChipFamily::Capella1
            | ChipFamily::Capella2 => Some(4),
            ChipFamily::Sirius | ChipFamily::Atlas => Some(16),
            ChipFamily::Draco1 | ChipFamily::Draco2 => Some(8),
            ChipFamily::Unknown => None,
        }
    }

    /// Egress DW counters on this family exclude the 2 DW of per-TLP overhead.
    #[inline]
    pub fn egress_excludes_tlp_overhead(self) -> bool {
        self == ChipFamily::Capella2
    }

    /// Counters on this family may read back as spurious zeros or garbage.
    #[inline]
    pub fn has_counter_dropouts(self) -> bool {
        self == ChipFamily::Draco1
    }
}

/// PCIe link speed generation.
#[repr(u8)]
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LinkSpeed {
    /// 2.5 GT/s
    #[display(fmt = "Gen1")]
    Gen1 = 1,
    /// 5 GT/s
    #[display(fmt = "Gen2")]
    Gen2 = 2,
    /// 8 GT/s
    #[display(fmt = "Gen3")]
    Gen3 = 3,
    /// 16 GT/s
    #[display(fmt = "Gen4")]
    Gen4 = 4,
}

impl Default for LinkSpeed {
    fn default() -> Self {
        LinkSpeed::Gen1
    }
}

lazy_static! {
    /// Matches the transfer rate in sysfs `current_link_speed`, e.g. `8.0 GT/s PCIe`.
    static ref LINK_SPEED_RE: Regex = Regex::new(r"^\s*(\d+)(?:\.(\d+))?\s*GT/s").unwrap();
}

impl LinkSpeed {
    /// Generation number, starting at 1.
    #[inline]
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Per-lane rate of this generation relative to Gen1.
    #[inline]
    pub fn lane_multiplier(self) -> u32 {
        1 << (self.ordinal() - 1)
    }

    /// Parse the transfer rate format used by sysfs `current_link_speed`.
    pub fn from_sysfs_str(s: &str) -> Result<Self> {
        let caps = LINK_SPEED_RE
            .captures(s)
            .ok_or_else(|| Error::ParseLink(s.trim().to_string()))?;
        let whole: u32 = caps[1].parse()?;
        let frac: u32 = match caps.get(2) {
            Some(m) => m.as_str()[..1].parse()?,
            None => 0,
        };
        match (whole, frac) {
            (2, 5) => Ok(LinkSpeed::Gen1),
            (5, 0) => Ok(LinkSpeed::Gen2),
            (8, 0) => Ok(LinkSpeed::Gen3),
            (16, 0) => Ok(LinkSpeed::Gen4),
            _ => Err(Error::ParseLink(s.trim().to_string())),
        }
    }
}

/// Link properties of one switch port, valid for one sampling cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLinkConfig {
    /// Chip family of the switch.
    pub family: ChipFamily,
    /// Port number within the switch.
    pub port: u8,
    /// Station containing the port.
    pub station: u8,
    /// Port index within its station.
    pub station_port: u8,
    /// Negotiated lanes. Zero when the link is down.
    pub width: u32,
    /// Negotiated speed.
    pub speed: LinkSpeed,
}

impl PortLinkConfig {
    /// Create a link config, deriving station and station port from the family.
    pub fn new(family: ChipFamily, port: u8, width: u32, speed: LinkSpeed) -> Self {
        let (station, station_port) = match family.ports_per_station() {
            Some(n) => (port / n, port % n),
            None => (0, port),
        };
        PortLinkConfig {
            family,
            port,
            station,
            station_port,
            width,
            speed,
        }
    }

    /// Read `current_link_speed` and `current_link_width` from a sysfs PCI device directory.
    ///
    /// A down link reports width 0 and an unparseable speed, which is accepted here.
    pub fn from_sysfs_dir<P: AsRef<Path>>(dir: P, family: ChipFamily, port: u8) -> Result<Self> {
        let dir = dir.as_ref();
        let width: u32 = std::fs::read_to_string(dir.join("current_link_width"))?
            .trim()
            .parse()?;
        let speed_str = std::fs::read_to_string(dir.join("current_link_speed"))?;
        let speed = match LinkSpeed::from_sysfs_str(&speed_str) {
            Ok(s) => s,
            Err(_) if width == 0 => LinkSpeed::default(),
            Err(e) => return Err(e),
        };
        debug!("Port {} link x{} {} from {:?}", port, width, speed, dir);
        Ok(PortLinkConfig::new(family, port, width, speed))
    }

    /// Theoretical maximum bytes this link can carry in `interval_ms`.
    #[inline]
    pub fn max_rate_per_interval(&self, interval_ms: u64) -> f64 {
        max_link_rate_bytes_per_interval(self.width, self.speed, interval_ms)
    }
}

/// Theoretical maximum bytes a `width` lane link at `speed` carries in `interval_ms`.
///
/// Returns 0 for a down link (`width == 0`).
pub fn max_link_rate_bytes_per_interval(width: u32, speed: LinkSpeed, interval_ms: u64) -> f64 {
    let lanes = f64::from(width) * f64::from(speed.lane_multiplier());
    let per_sec = GEN1_BYTES_PER_SEC_PER_LANE * lanes;
    per_sec * interval_ms as f64 / 1000.0
}
