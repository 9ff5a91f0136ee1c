//! Utilities dealing with error handling in this crate.

use crate::link::ChipFamily;
use failure::Fail;

/// Errors produced by this crate.
#[derive(Debug, Fail)]
pub enum Error {
    /// Elapsed time between two counter snapshots was zero.
    #[fail(display = "Invalid data - elapsed interval is zero")]
    InvalidInterval,
    /// Link width is zero, so the port has no usable link.
    #[fail(display = "Invalid data - link is down")]
    LinkDown,
    /// No counter RAM geometry is known for this chip family.
    #[fail(display = "Unsupported chip family {:?}", _0)]
    UnsupportedFamily(ChipFamily),
    /// Station or station port lies outside the counter RAM.
    #[fail(display = "Station {} port {} outside counter RAM", station, station_port)]
    InvalidPort {
        /// Station index.
        station: u8,
        /// Port index within the station.
        station_port: u8,
    },
    /// Counter RAM dump holds fewer words than the layout needs.
    #[fail(display = "Counter RAM too short - expected {} words, got {}", expected, actual)]
    ShortCounterRam {
        /// Words required by the layout.
        expected: usize,
        /// Words actually supplied.
        actual: usize,
    },
    /// A counter source was asked for a port it does not monitor.
    #[fail(display = "Port {} is not monitored by this source", _0)]
    UnknownPort(u8),
    /// Link attributes could not be parsed.
    #[fail(display = "Parse Error - link attribute {:?}", _0)]
    ParseLink(String),
    /// A replayed trace has no more samples.
    #[fail(display = "Replay trace exhausted")]
    ReplayExhausted,
    /// Errors originating from calls to `std::io::*`.
    #[fail(display = "IO Error - {}", _0)]
    IO(#[cause] std::io::Error),
    /// Errors originating from calls to `std::env::*`.
    #[fail(display = "Env Error - {}", _0)]
    Env(#[cause] std::env::VarError),
    /// Errors caused by parsing integers from strings.
    #[fail(display = "Parse Error - {}", _0)]
    ParseInt(#[cause] std::num::ParseIntError),
    /// Errors originating from calls to `regex::*`.
    #[fail(display = "Regex Error - {}", _0)]
    Regex(#[cause] regex::Error),
    /// Errors reading or writing JSON traces.
    #[fail(display = "JSON Error - {}", _0)]
    Json(#[cause] serde_json::Error),
    /// Errors originating from calls to `libc` or other system utilties.
    #[fail(display = "System Error - {}", _0)]
    System(#[cause] nix::Error),
}

impl Error {
    /// Whether this error means the counter data could not produce statistics.
    ///
    /// Callers usually skip the interval in this case rather than abort.
    #[inline]
    pub fn is_invalid_data(&self) -> bool {
        match self {
            Error::InvalidInterval | Error::LinkDown => true,
            _ => false,
        }
    }
}

macro_rules! error_from {
    ($et: ty => $cet: expr) => {
        impl From<$et> for Error {
            #[inline]
            fn from(err: $et) -> Self {
                $cet(err)
            }
        }
    };
}

error_from!(std::io::Error => Error::IO);
error_from!(std::env::VarError => Error::Env);
error_from!(std::num::ParseIntError => Error::ParseInt);
error_from!(regex::Error => Error::Regex);
error_from!(serde_json::Error => Error::Json);
error_from!(nix::Error => Error::System);

/// Result type used in this crate.
pub type Result<T> = std::result::Result<T, Error>;
