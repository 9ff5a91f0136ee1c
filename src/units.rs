//! Human readable byte quantities.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Binary byte magnitude.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Unit {
    /// Bytes.
    #[display(fmt = "B")]
    B,
    /// 2^10 bytes.
    #[display(fmt = "KiB")]
    KiB,
    /// 2^20 bytes.
    #[display(fmt = "MiB")]
    MiB,
    /// 2^30 bytes.
    #[display(fmt = "GiB")]
    GiB,
    /// 2^40 bytes.
    #[display(fmt = "TiB")]
    TiB,
}

/// Scale `value` bytes to the largest unit it reaches, up to TiB.
pub fn scale(value: u64) -> (f64, Unit) {
    let unit = match value {
        v if v < 1 << 10 => Unit::B,
        v if v < 1 << 20 => Unit::KiB,
        v if v < 1 << 30 => Unit::MiB,
        v if v < 1 << 40 => Unit::GiB,
        _ => Unit::TiB,
    };
    let shift = 10 * (unit as u32);
    (value as f64 / (1u64 << shift) as f64, unit)
}

/// Format `value` bytes like `1.50 MiB`, or `512 B` below one KiB.
pub fn format_bytes(value: u64) -> String {
    match scale(value) {
        (v, Unit::B) => format!("{} {}", v as u64, Unit::B),
        (v, unit) => format!("{:.2} {}", v, unit),
    }
}
