//! SR-IOV topology discovery and VF statistics readers.
//!
//! This module provides the building blocks the collector drives each scrape:
//! PF discovery and NUMA lookup (`device`), VF resolution (`vf`), the two
//! backend readers (`reader`), backend selection with probing (`selector`) and
//! the optional driver support database (`drivers`).

pub mod device;
pub mod drivers;
pub mod reader;
pub mod selector;
pub mod vf;

pub use device::{PhysicalFunction, discover_pfs, interface_name, locate_numa};
pub use drivers::{DriverDbError, DriverInfo, SupportedDrivers};
pub use reader::{NetlinkReader, StatSample, StatsReader, SysfsReader};
pub use selector::{Backend, select_reader};
pub use vf::{VirtualFunction, resolve_vfs};

/// Error type for per-PF collection failures.
///
/// None of these abort a scrape: the affected PF is skipped for the current
/// cycle and the others proceed.
#[derive(Debug)]
pub enum SriovError {
    /// The PF has no `virtfn*` symlinks.
    NoVirtualFunctions(String),
    /// No backend in the priority list produced counters for the interface.
    NoStatsReader(String),
    /// The PF has no network interface under `net/`.
    NoInterfaceName(String),
    /// I/O error reading sysfs.
    Io(std::io::Error),
}

impl std::fmt::Display for SriovError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SriovError::NoVirtualFunctions(pf) => {
                write!(f, "no virtual functions found for pf '{}'", pf)
            }
            SriovError::NoStatsReader(pf) => write!(f, "no stats reader found for {}", pf),
            SriovError::NoInterfaceName(pf) => {
                write!(f, "could not get pf interface name for device '{}'", pf)
            }
            SriovError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for SriovError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SriovError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SriovError {
    fn from(e: std::io::Error) -> Self {
        SriovError::Io(e)
    }
}
