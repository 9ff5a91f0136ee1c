//! Layout of the performance counter RAM that a switch exposes through its FIFO register.
//!
//! Memory layout of one station (`P` = RAM ports per station, `N` = counters per port):
//! ```text
//! ┌──────── ingress ────────┐  P x (5|6) words
//! ├──────── egress  ────────┤  P x (5|6) words
//! ├──── DLLP ingress/egress ┤
//! └──────── padding ────────┘  up to P x N words
//! ```

use super::CounterSnapshot;
use crate::link::ChipFamily;
use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::error;

/// Size of the register window of one port.
pub const PORT_REGISTER_STRIDE: u32 = 0x1000;

/// Register base of Atlas PEX registers.
const ATLAS_PEX_REGS_BASE: u32 = 0x6080_0000;

/// Geometry of the counter RAM of a chip family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamLayout {
    /// Counter words per port.
    pub counters_per_port: usize,
    /// Number of stations.
    pub stations: usize,
    /// Ports per station in the register map.
    pub station_ports: usize,
    /// Ports per station in the counter RAM.
    pub ram_station_ports: usize,
    /// Ingress (and egress) words per port.
    pub words_per_port: usize,
    /// Each station has its own monitor and RAM.
    pub station_based: bool,
    /// RAM control register.
    pub ram_ctrl_offset: u32,
    /// RAM read FIFO register.
    pub fifo_offset: u32,
    /// Monitor control register.
    pub monitor_ctrl_offset: u32,
    /// DLLP counters are stored even ports first, then odd ports.
    pub dllp_interleaved: bool,
    /// Egress DLLP block starts one word late.
    pub egress_dllp_skip: bool,
}

impl RamLayout {
    /// Counter RAM geometry for `family`.
    pub fn for_family(family: ChipFamily) -> Result<Self> {
        let mut layout = RamLayout {
            counters_per_port: 14,
            stations: 1,
            station_ports: 4,
            ram_station_ports: 4,
            words_per_port: 5,
            station_based: false,
            ram_ctrl_offset: 0x3F0,
            fifo_offset: 0x3E4,
            monitor_ctrl_offset: 0x3E0,
            dllp_interleaved: false,
            egress_dllp_skip: false,
        };
        match family {
            ChipFamily::Deneb => {
                layout.ram_ctrl_offset = 0x618;
                layout.fifo_offset = 0x628;
                layout.monitor_ctrl_offset = 0x568;
                layout.stations = 3;
            }
            ChipFamily::Sirius => {
                layout.ram_ctrl_offset = 0x618;
                layout.fifo_offset = 0x628;
                layout.monitor_ctrl_offset = 0x568;
                layout.counters_per_port = 13;
                layout.station_ports = 16;
                layout.ram_station_ports = 16;
                layout.dllp_interleaved = true;
            }
            ChipFamily::Cygnus => {
                layout.stations = 6;
            }
            ChipFamily::Mira => {
                layout.ram_ctrl_offset = 0x618;
                layout.fifo_offset = 0x628;
                layout.monitor_ctrl_offset = 0x568;
                layout.counters_per_port = 12;
            }
            ChipFamily::Draco1 | ChipFamily::Draco2 => {
                layout.stations = 3;
                layout.station_ports = 6;
                layout.ram_station_ports = 6;
            }
            ChipFamily::Capella1 | ChipFamily::Capella2 => {
                layout.stations = 6;
                layout.ram_station_ports = 5;
                layout.station_based = true;
                layout.egress_dllp_skip = true;
            }
            ChipFamily::Atlas => {
                layout.ram_ctrl_offset += ATLAS_PEX_REGS_BASE;
                layout.fifo_offset += ATLAS_PEX_REGS_BASE;
                layout.monitor_ctrl_offset += ATLAS_PEX_REGS_BASE;
                layout.stations = 6;
                layout.station_ports = 16;
                layout.ram_station_ports = 16;
                layout.station_based = true;
                layout.words_per_port = 6;
            }
            ChipFamily::Unknown => {
                error!("No counter RAM layout for chip family {}", family);
                return Err(Error::UnsupportedFamily(family));
            }
        }
        Ok(layout)
    }

    /// Words in one station's RAM.
    #[inline]
    pub fn station_words(&self) -> usize {
        self.counters_per_port * self.ram_station_ports
    }

    /// Words in the whole RAM.
    #[inline]
    pub fn total_words(&self) -> usize {
        self.stations * self.station_words()
    }

    /// Offset of a per-station register for station `station`.
    ///
    /// Chips that are not station based only have the station 0 register.
    #[inline]
    pub fn station_register(&self, base: u32, station: usize) -> u32 {
        base + (station * self.station_ports) as u32 * PORT_REGISTER_STRIDE
    }
}

/// A full dump of the counter RAM.
#[derive(Debug, Clone)]
pub struct CounterRam {
    layout: RamLayout,
    words: Vec<u32>,
}

impl CounterRam {
    /// Wrap words read from the RAM FIFO.
    pub fn from_words(layout: RamLayout, words: Vec<u32>) -> Result<Self> {
        if words.len() < layout.total_words() {
            return Err(Error::ShortCounterRam {
                expected: layout.total_words(),
                actual: words.len(),
            });
        }
        Ok(CounterRam { layout, words })
    }

    /// Decode a little-endian byte dump of the RAM.
    pub fn from_bytes(layout: RamLayout, bytes: &[u8]) -> Result<Self> {
        let mut words = vec![0u32; bytes.len() / 4];
        LittleEndian::read_u32_into(&bytes[..words.len() * 4], &mut words);
        CounterRam::from_words(layout, words)
    }

    /// Geometry of this RAM.
    #[inline]
    pub fn layout(&self) -> &RamLayout {
        &self.layout
    }

    /// Raw words.
    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    fn word(&self, index: usize) -> u32 {
        // Bounded by the station/port check in `port_counters`
        self.words[index]
    }

    /// Read one direction's counters starting at `index`.
    fn direction_counters(&self, mut index: usize) -> CounterSnapshot {
        let mut s = CounterSnapshot::default();
        s.posted_header = self.word(index);
        s.posted_dw = self.word(index + 1);
        index += 2;
        if self.layout.words_per_port == 6 {
            s.nonposted_header = self.word(index);
            index += 1;
        }
        s.nonposted_dw = self.word(index);
        s.cpl_header = self.word(index + 1);
        s.cpl_dw = self.word(index + 2);
        s
    }

    /// Ingress and egress counters of the port at (`station`, `station_port`).
    pub fn port_counters(
        &self,
        station: u8,
        station_port: u8,
    ) -> Result<(CounterSnapshot, CounterSnapshot)> {
        let l = &self.layout;
        let (stn, sp) = (usize::from(station), usize::from(station_port));
        if stn >= l.stations || sp >= l.ram_station_ports {
            return Err(Error::InvalidPort {
                station,
                station_port,
            });
        }

        let base = stn * l.station_words();
        let mut ingress = self.direction_counters(base + sp * l.words_per_port);
        let mut egress = self.direction_counters(
            base + l.words_per_port * l.ram_station_ports + sp * l.words_per_port,
        );

        let mut index = base + 2 * l.words_per_port * l.ram_station_ports;
        if l.dllp_interleaved {
            index += sp / 2;
            if sp & 1 == 1 {
                index += l.ram_station_ports;
            }
        } else {
            index += sp;
        }
        ingress.dllp = self.word(index);

        if l.dllp_interleaved {
            index += l.ram_station_ports / 2;
        } else {
            index += l.ram_station_ports;
        }
        if l.egress_dllp_skip {
            index += 1;
        }
        egress.dllp = self.word(index);

        Ok((ingress, egress))
    }
}
