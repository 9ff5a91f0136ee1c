//! Register access to a switch through a PCI resource file, and a counter source built on it.

use crate::counters::{CounterRam, CounterSnapshot, RamLayout};
use crate::link::{ChipFamily, PortLinkConfig};
use crate::source::CounterSource;
use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// RAM control: capture type 2, reset read pointer, enable RAM.
const RAM_CTRL_READ: u32 = (2 << 4) | (1 << 2) | 1;

/// Monitor control: enable, reset, infinite sampling, start.
const MONITOR_CTRL_START: u32 = (1 << 31) | (1 << 30) | (1 << 28) | (1 << 27);

/// Sysfs directory of a PCI function.
pub fn sysfs_device_dir(domain: u32, bus: u32, device: u32, function: u32) -> PathBuf {
    PathBuf::from(format!(
        "/sys/bus/pci/devices/{:04x}:{:02x}:{:02x}.{:x}",
        domain, bus, device, function
    ))
}

#[derive(Debug)]
/// Handle to read and write 32-bit registers of a PCI device.
pub struct PciHandle {
    /// Underlying register window file
    file: std::fs::File,
}

impl PciHandle {
    /// Open a register window file, e.g. a sysfs `resourceN` BAR file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<PciHandle> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;
        Ok(PciHandle { file })
    }

    /// Open BAR `bar` of a PCI function through sysfs.
    pub fn from_sysfs_resource(
        domain: u32,
        bus: u32,
        device: u32,
        function: u32,
        bar: u8,
    ) -> Result<PciHandle> {
        let dir = sysfs_device_dir(domain, bus, device, function);
        PciHandle::open(dir.join(format!("resource{}", bar)))
    }

    /// Read the register at byte `offset`.
    pub fn read_u32(&self, offset: u32) -> Result<u32> {
        let mut buf = [0u8; 4];
        let n = nix::sys::uio::pread(self.file.as_raw_fd(), &mut buf, i64::from(offset))?;
        if n != buf.len() {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        Ok(LittleEndian::read_u32(&buf))
    }

    /// Write `value` to the register at byte `offset`.
    pub fn write_u32(&self, offset: u32, value: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        let n = nix::sys::uio::pwrite(self.file.as_raw_fd(), &buf, i64::from(offset))?;
        if n != buf.len() {
            return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
        }
        Ok(())
    }
}

/// Reads the performance counter RAM of a switch through its register window.
///
/// All ports sampled in one cycle are served from a single RAM dump.
#[derive(Debug)]
pub struct PciCounterSource {
    handle: PciHandle,
    family: ChipFamily,
    layout: RamLayout,
    /// Sysfs device directory of each monitored port, for link attributes.
    ports: HashMap<u8, PathBuf>,
    ram: Option<CounterRam>,
    /// Ports already served from `ram`.
    served: HashSet<u8>,
}

impl PciCounterSource {
    /// Create a source for a switch of `family` whose registers are reachable through `handle`.
    pub fn new(handle: PciHandle, family: ChipFamily) -> Result<Self> {
        Ok(PciCounterSource {
            handle,
            family,
            layout: RamLayout::for_family(family)?,
            ports: HashMap::new(),
            ram: None,
            served: HashSet::new(),
        })
    }

    /// Monitor `port`, reading its link attributes from the sysfs directory `link_dir`.
    pub fn add_port<P: Into<PathBuf>>(&mut self, port: u8, link_dir: P) {
        self.ports.insert(port, link_dir.into());
    }

    /// Drain the whole counter RAM through the FIFO register.
    pub fn read_ram(&self) -> Result<CounterRam> {
        let l = &self.layout;
        for stn in 0..l.stations {
            if stn == 0 || l.station_based {
                self.handle
                    .write_u32(l.station_register(l.ram_ctrl_offset, stn), RAM_CTRL_READ)?;
            }
        }

        let mut words = Vec::with_capacity(l.total_words());
        let mut fifo = l.fifo_offset;
        for i in 0..l.total_words() {
            if i != 0 && i % l.station_words() == 0 && l.station_based {
                fifo = l.station_register(fifo, 1);
            }
            words.push(self.handle.read_u32(fifo)?);
        }
        debug!("Read {} counter words for {}", words.len(), self.family);
        CounterRam::from_words(*l, words)
    }
}

impl CounterSource for PciCounterSource {
    fn fetch_link_config(&mut self, port: u8) -> Result<PortLinkConfig> {
        let dir = self.ports.get(&port).ok_or(Error::UnknownPort(port))?;
        PortLinkConfig::from_sysfs_dir(dir, self.family, port)
    }

    fn fetch_counters(&mut self, port: u8) -> Result<(CounterSnapshot, CounterSnapshot)> {
        if !self.ports.contains_key(&port) {
            return Err(Error::UnknownPort(port));
        }
        let ram = match self.ram.take() {
            Some(ram) if !self.served.contains(&port) => ram,
            _ => {
                self.served.clear();
                self.read_ram()?
            }
        };
        self.served.insert(port);

        let split = PortLinkConfig::new(self.family, port, 0, Default::default());
        let counters = ram.port_counters(split.station, split.station_port);
        self.ram = Some(ram);
        counters
    }

    fn reset_counters(&mut self) -> Result<()> {
        let l = &self.layout;
        for stn in 0..l.stations {
            if stn == 0 || l.station_based {
                self.handle
                    .write_u32(l.station_register(l.monitor_ctrl_offset, stn), MONITOR_CTRL_START)?;
            }
        }
        self.ram = None;
        self.served.clear();
        info!("Reset performance counters of {} switch", self.family);
        Ok(())
    }
}
