//! Backend readers producing per-VF counter samples.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use super::selector::Backend;
use crate::collector::netlink::VfLinkStats;
use crate::collector::traits::FileSystem;

/// Counter name to value, for one VF.
pub type StatSample = BTreeMap<String, i64>;

/// Reads `<net-root>/<pf>/device/sriov/<vf>/stats/<name>` files.
#[derive(Debug)]
pub struct SysfsReader<'a, F: FileSystem> {
    fs: &'a F,
    net_root: &'a Path,
}

impl<'a, F: FileSystem> SysfsReader<'a, F> {
    pub fn new(fs: &'a F, net_root: &'a Path) -> Self {
        Self { fs, net_root }
    }

    /// Directory holding the per-VF descriptors of `pf`.
    pub fn sriov_dir(net_root: &Path, pf: &str) -> PathBuf {
        net_root.join(pf).join("device").join("sriov")
    }

    fn stats_dir(&self, pf: &str, vf_id: &str) -> PathBuf {
        Self::sriov_dir(self.net_root, pf).join(vf_id).join("stats")
    }

    /// Reads every counter file of one VF.
    ///
    /// A missing statistics directory yields an empty sample. Entries that are
    /// symlinks, unreadable or not a decimal integer are skipped.
    pub fn read(&self, pf: &str, vf_id: &str) -> StatSample {
        let mut sample = StatSample::new();
        let dir = self.stats_dir(pf, vf_id);

        let entries = match self.fs.read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!(pf = %pf, vf = %vf_id, path = %dir.display(), error = %e,
                    "error reading stats for vf");
                return sample;
            }
        };

        for entry in entries {
            let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if self.fs.is_symlink(&entry) {
                warn!(path = %entry.display(), "skipping symlinked stat file");
                continue;
            }
            let content = match self.fs.read_to_string(&entry) {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %entry.display(), error = %e, "could not read stat file");
                    continue;
                }
            };
            match content.trim().parse::<i64>() {
                Ok(value) => {
                    sample.insert(name.to_string(), value);
                }
                Err(e) => {
                    warn!(path = %entry.display(), value = %content.trim(), error = %e,
                        "could not parse stat file");
                }
            }
        }

        debug!(pf = %pf, vf = %vf_id, counters = sample.len(), "read sysfs vf stats");
        sample
    }
}

/// Serves VF counters from one link snapshot taken at construction.
#[derive(Debug, Clone, Default)]
pub struct NetlinkReader {
    vfs: HashMap<u32, VfLinkStats>,
}

impl NetlinkReader {
    /// Builds a reader from the VF list of a single link query.
    pub fn from_snapshot(snapshot: Vec<VfLinkStats>) -> Self {
        Self {
            vfs: snapshot.into_iter().map(|vf| (vf.vf, vf)).collect(),
        }
    }

    /// Number of VFs in the snapshot.
    pub fn len(&self) -> usize {
        self.vfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vfs.is_empty()
    }

    /// Returns the eight link counters of `vf_id`.
    ///
    /// A VF missing from the snapshot reads as all zeros. An ID that is not a
    /// number yields an empty sample.
    pub fn read(&self, pf: &str, vf_id: &str) -> StatSample {
        let id = match vf_id.parse::<u32>() {
            Ok(id) => id,
            Err(e) => {
                warn!(pf = %pf, vf = %vf_id, error = %e, "invalid vf id");
                return StatSample::new();
            }
        };

        let vf = match self.vfs.get(&id) {
            Some(vf) => *vf,
            None => {
                debug!(pf = %pf, vf = id, "vf missing from link snapshot");
                VfLinkStats {
                    vf: id,
                    ..Default::default()
                }
            }
        };

        [
            ("tx_bytes", vf.tx_bytes),
            ("rx_bytes", vf.rx_bytes),
            ("tx_packets", vf.tx_packets),
            ("rx_packets", vf.rx_packets),
            ("tx_dropped", vf.tx_dropped),
            ("rx_dropped", vf.rx_dropped),
            ("rx_broadcast", vf.broadcast),
            ("rx_multicast", vf.multicast),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), saturating_i64(value)))
        .collect()
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// A reader committed to one PF for the current scrape.
#[derive(Debug)]
pub enum StatsReader<'a, F: FileSystem> {
    Sysfs(SysfsReader<'a, F>),
    Netlink(NetlinkReader),
}

impl<F: FileSystem> StatsReader<'_, F> {
    pub fn read(&self, pf: &str, vf_id: &str) -> StatSample {
        match self {
            StatsReader::Sysfs(reader) => reader.read(pf, vf_id),
            StatsReader::Netlink(reader) => reader.read(pf, vf_id),
        }
    }

    pub fn backend(&self) -> Backend {
        match self {
            StatsReader::Sysfs(_) => Backend::Sysfs,
            StatsReader::Netlink(_) => Backend::Netlink,
        }
    }
}
