//! Per-PF backend selection with probing and fallback.
//!
//! The priority list is walked in order. A backend is committed only after a
//! read of VF `0` returns at least one counter; a backend whose interface is
//! present but yields nothing falls through to the next one.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info, warn};

use super::SriovError;
use super::reader::{NetlinkReader, StatsReader, SysfsReader};
use crate::collector::netlink::LinkQuery;
use crate::collector::traits::FileSystem;

/// VF read to validate a backend before committing to it.
pub const PROBE_VF_ID: &str = "0";

/// Kernel interface used to read VF counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Sysfs,
    Netlink,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Sysfs => "sysfs",
            Backend::Netlink => "netlink",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sysfs" => Ok(Backend::Sysfs),
            "netlink" => Ok(Backend::Netlink),
            other => Err(format!("'{}' collector not supported", other)),
        }
    }
}

/// Picks the first backend in `priority` that yields counters for `pf`.
///
/// `pf` is the interface name of the physical function. Unknown identifiers
/// are logged and skipped.
pub fn select_reader<'a, F: FileSystem, L: LinkQuery>(
    fs: &'a F,
    links: &L,
    net_root: &'a Path,
    pf: &str,
    priority: &[String],
) -> Result<StatsReader<'a, F>, SriovError> {
    for name in priority {
        let backend = match name.parse::<Backend>() {
            Ok(backend) => backend,
            Err(e) => {
                info!(pf = %pf, "{}", e);
                continue;
            }
        };

        let candidate = match backend {
            Backend::Sysfs => sysfs_candidate(fs, net_root, pf),
            Backend::Netlink => netlink_candidate(links, pf),
        };
        let Some(reader) = candidate else {
            continue;
        };

        if reader.read(pf, PROBE_VF_ID).is_empty() {
            info!(pf = %pf, backend = %backend, "backend returned no counters, trying next");
            continue;
        }

        info!(pf = %pf, backend = %backend, "selected stats reader");
        return Ok(reader);
    }

    warn!(pf = %pf, "no stats reader found");
    Err(SriovError::NoStatsReader(pf.to_string()))
}

fn sysfs_candidate<'a, F: FileSystem>(
    fs: &'a F,
    net_root: &'a Path,
    pf: &str,
) -> Option<StatsReader<'a, F>> {
    let dir = SysfsReader::<F>::sriov_dir(net_root, pf);
    if !fs.exists(&dir) {
        info!(pf = %pf, path = %dir.display(), "sysfs sriov directory not found");
        return None;
    }
    debug!(pf = %pf, "probing sysfs reader");
    Some(StatsReader::Sysfs(SysfsReader::new(fs, net_root)))
}

fn netlink_candidate<'a, F: FileSystem, L: LinkQuery>(
    links: &L,
    pf: &str,
) -> Option<StatsReader<'a, F>> {
    match links.vf_stats(pf) {
        Ok(snapshot) => {
            debug!(pf = %pf, vfs = snapshot.len(), "probing netlink reader");
            Some(StatsReader::Netlink(NetlinkReader::from_snapshot(snapshot)))
        }
        Err(e) => {
            info!(pf = %pf, error = %e, "netlink link lookup failed");
            None
        }
    }
}
