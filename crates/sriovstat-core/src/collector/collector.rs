//! Per-scrape VF statistics collection.
//!
//! `SriovCollector` discovers physical functions once and, on every `collect`
//! call, selects a stats backend per PF, resolves VFs and reads counters.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::collector::netlink::LinkQuery;
use crate::collector::sriov::{
    PhysicalFunction, SriovError, SupportedDrivers, discover_pfs, interface_name, locate_numa,
    resolve_vfs, select_reader,
};
use crate::collector::traits::FileSystem;

/// Default PCI device directory.
pub const DEFAULT_PCI_ROOT: &str = "/sys/bus/pci/devices";
/// Default network class directory.
pub const DEFAULT_NET_ROOT: &str = "/sys/class/net";
/// Default backend priority.
pub const DEFAULT_PRIORITY: [&str; 2] = ["sysfs", "netlink"];

/// Settings for `SriovCollector::new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// PCI device root (`/sys/bus/pci/devices`).
    pub pci_root: PathBuf,
    /// Network class root (`/sys/class/net`).
    pub net_root: PathBuf,
    /// Backend identifiers in the order they are tried.
    pub priority: Vec<String>,
    /// Drivers allowed to contribute PFs.
    pub supported_drivers: SupportedDrivers,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            pci_root: PathBuf::from(DEFAULT_PCI_ROOT),
            net_root: PathBuf::from(DEFAULT_NET_ROOT),
            priority: DEFAULT_PRIORITY.iter().map(|s| s.to_string()).collect(),
            supported_drivers: SupportedDrivers::allow_all(),
        }
    }
}

/// One counter value of one VF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfSample {
    /// Counter name, e.g. `rx_packets`.
    pub name: String,
    pub value: i64,
    /// Interface name of the owning PF.
    pub pf: String,
    /// VF index on the PF.
    pub vf: u32,
    /// PCI address of the VF.
    pub pci_address: String,
    /// NUMA node of the PF, empty when unknown.
    pub numa_node: String,
}

/// Summary of the last `collect` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// PFs known to the collector.
    pub pfs: usize,
    /// PFs that contributed nothing this scrape.
    pub pfs_skipped: usize,
    /// VFs read.
    pub vfs: usize,
    /// Samples emitted.
    pub samples: usize,
    pub elapsed: Duration,
}

/// Collects SR-IOV VF counters.
///
/// The PF set is fixed at construction. Everything else (interface name,
/// backend, VF list) is re-derived on each `collect` call.
pub struct SriovCollector<F: FileSystem, L: LinkQuery> {
    fs: F,
    links: L,
    pci_root: PathBuf,
    net_root: PathBuf,
    priority: RwLock<Vec<String>>,
    pfs: Vec<PhysicalFunction>,
    last_stats: Mutex<Option<CollectStats>>,
}

impl<F: FileSystem, L: LinkQuery> SriovCollector<F, L> {
    /// Creates a collector and discovers the PF set.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `links` - Netlink link query (real or mock)
    /// * `config` - Roots, backend priority and driver database
    pub fn new(fs: F, links: L, config: CollectorConfig) -> Self {
        let CollectorConfig {
            pci_root,
            net_root,
            priority,
            supported_drivers,
        } = config;

        let addresses = discover_pfs(&fs, &pci_root, &supported_drivers);
        let mut numa = locate_numa(&fs, &pci_root, &addresses);
        let pfs = addresses
            .into_iter()
            .map(|pci_address| {
                let numa_node = numa.remove(&pci_address).unwrap_or_default();
                PhysicalFunction {
                    pci_address,
                    numa_node,
                }
            })
            .collect();

        Self {
            fs,
            links,
            pci_root,
            net_root,
            priority: RwLock::new(priority),
            pfs,
            last_stats: Mutex::new(None),
        }
    }

    /// PFs discovered at construction.
    pub fn physical_functions(&self) -> &[PhysicalFunction] {
        &self.pfs
    }

    /// Current backend priority.
    pub fn priority(&self) -> Vec<String> {
        self.priority
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the backend priority. Takes effect on the next scrape.
    pub fn set_priority(&self, priority: Vec<String>) {
        info!(priority = ?priority, "vf stats priority updated");
        *self.priority.write().unwrap_or_else(PoisonError::into_inner) = priority;
    }

    /// Summary of the last completed `collect` call.
    pub fn last_stats(&self) -> Option<CollectStats> {
        self.last_stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs one scrape cycle over every PF.
    ///
    /// Never fails: a PF that cannot be read is logged and left out.
    pub fn collect(&self) -> Vec<VfSample> {
        let start = Instant::now();
        let priority = self.priority();
        let mut samples = Vec::new();
        let mut stats = CollectStats {
            pfs: self.pfs.len(),
            ..Default::default()
        };

        for pf in &self.pfs {
            match self.collect_pf(pf, &priority, &mut samples) {
                Ok(vfs) => stats.vfs += vfs,
                Err(e) => {
                    stats.pfs_skipped += 1;
                    warn!(pf = %pf.pci_address, error = %e, "skipping pf");
                }
            }
        }

        stats.samples = samples.len();
        stats.elapsed = start.elapsed();
        debug!(
            pfs = stats.pfs,
            skipped = stats.pfs_skipped,
            vfs = stats.vfs,
            samples = stats.samples,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "sriov collect finished"
        );
        *self.last_stats.lock().unwrap_or_else(PoisonError::into_inner) = Some(stats);

        samples
    }

    /// Reads every VF of one PF into `samples`. Returns the VF count.
    fn collect_pf(
        &self,
        pf: &PhysicalFunction,
        priority: &[String],
        samples: &mut Vec<VfSample>,
    ) -> Result<usize, SriovError> {
        let ifname = interface_name(&self.fs, &self.pci_root, &pf.pci_address)
            .ok_or_else(|| SriovError::NoInterfaceName(pf.pci_address.clone()))?;
        let reader = select_reader(&self.fs, &self.links, &self.net_root, &ifname, priority)?;
        let vfs = resolve_vfs(&self.fs, &self.pci_root, &pf.pci_address)?;

        for (id, pci_address) in &vfs {
            let sample = reader.read(&ifname, &id.to_string());
            debug!(pf = %ifname, vf = id, backend = %reader.backend(), counters = sample.len(),
                "read vf stats");
            samples.extend(sample.into_iter().map(|(name, value)| VfSample {
                name,
                value,
                pf: ifname.clone(),
                vf: *id,
                pci_address: pci_address.clone(),
                numa_node: pf.numa_node.clone(),
            }));
        }

        Ok(vfs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockFs, MockLinks};
    use crate::collector::netlink::VfLinkStats;
    use crate::collector::sriov::DriverInfo;

    fn find<'a>(samples: &'a [VfSample], vf: u32, name: &str) -> &'a VfSample {
        samples
            .iter()
            .find(|s| s.vf == vf && s.name == name)
            .unwrap()
    }

    #[test]
    fn test_single_vf_end_to_end() {
        let mut fs = MockFs::new();
        fs.add_pf("0000:1d:00.0", "t_ens785f0", "0");
        fs.add_vf("0000:1d:00.0", 0, "0000:1d:01.0");
        fs.add_vf_stats("t_ens785f0", 0, &[("rx_packets", 4), ("tx_packets", 8)]);

        let collector = SriovCollector::new(fs, MockLinks::new(), CollectorConfig::default());
        let mut samples = collector.collect();
        samples.sort_by(|a, b| a.name.cmp(&b.name));

        let expected = |name: &str, value| VfSample {
            name: name.to_string(),
            value,
            pf: "t_ens785f0".to_string(),
            vf: 0,
            pci_address: "0000:1d:01.0".to_string(),
            numa_node: "0".to_string(),
        };
        assert_eq!(
            samples,
            vec![expected("rx_packets", 4), expected("tx_packets", 8)]
        );
    }

    #[test]
    fn test_sysfs_host() {
        let collector = SriovCollector::new(
            MockFs::sriov_sysfs_host(),
            MockLinks::new(),
            CollectorConfig::default(),
        );
        assert_eq!(collector.physical_functions().len(), 1);

        let samples = collector.collect();
        assert_eq!(samples.len(), 4);
        assert_eq!(find(&samples, 1, "tx_packets").value, 32);
        assert_eq!(find(&samples, 1, "tx_packets").pci_address, "0000:1d:01.1");

        let stats = collector.last_stats().unwrap();
        assert_eq!(stats.pfs, 1);
        assert_eq!(stats.pfs_skipped, 0);
        assert_eq!(stats.vfs, 2);
        assert_eq!(stats.samples, 4);
    }

    #[test]
    fn test_netlink_host() {
        let collector = SriovCollector::new(
            MockFs::netlink_host(),
            MockLinks::netlink_host(),
            CollectorConfig::default(),
        );
        let samples = collector.collect();

        // Three VFs, eight counters each
        assert_eq!(samples.len(), 24);
        let s = find(&samples, 2, "rx_packets");
        assert_eq!(s.value, 30);
        assert_eq!(s.pf, "t_ens801f0");
        assert_eq!(s.pci_address, "0000:2e:00.4");
        assert_eq!(s.numa_node, "");
    }

    #[test]
    fn test_mixed_bus_skips_pf_without_vfs() {
        let collector = SriovCollector::new(
            MockFs::mixed_pci_bus(),
            MockLinks::new(),
            CollectorConfig::default(),
        );
        let addresses: Vec<_> = collector
            .physical_functions()
            .iter()
            .map(|pf| pf.pci_address.as_str())
            .collect();
        assert_eq!(addresses, vec!["0000:1d:00.0", "0000:3b:00.0"]);

        let samples = collector.collect();
        assert_eq!(samples.len(), 2);
        assert!(samples.iter().all(|s| s.pf == "t_ens785f0"));

        let stats = collector.last_stats().unwrap();
        assert_eq!(stats.pfs, 2);
        assert_eq!(stats.pfs_skipped, 1);
    }

    #[test]
    fn test_no_reader_skips_pf() {
        let mut fs = MockFs::sriov_sysfs_host();
        fs.add_pf("0000:3b:00.0", "t_ens3f0", "1");
        fs.add_vf("0000:3b:00.0", 0, "0000:3b:02.0");

        let collector = SriovCollector::new(fs, MockLinks::new(), CollectorConfig::default());
        let samples = collector.collect();
        assert_eq!(samples.len(), 4);
        assert!(samples.iter().all(|s| s.pf == "t_ens785f0"));
        assert_eq!(collector.last_stats().unwrap().pfs_skipped, 1);
    }

    #[test]
    fn test_missing_interface_skips_pf() {
        let mut fs = MockFs::new();
        fs.add_file("/sys/bus/pci/devices/0000:1d:00.0/class", "0x020000\n");
        fs.add_file("/sys/bus/pci/devices/0000:1d:00.0/sriov_totalvfs", "8\n");
        fs.add_vf("0000:1d:00.0", 0, "0000:1d:01.0");

        let collector = SriovCollector::new(fs, MockLinks::new(), CollectorConfig::default());
        assert!(collector.collect().is_empty());
        assert_eq!(collector.last_stats().unwrap().pfs_skipped, 1);
    }

    #[test]
    fn test_set_priority_applies_next_scrape() {
        let fs = MockFs::sriov_sysfs_host();
        let links = MockLinks::new().with_link(
            "t_ens785f0",
            vec![VfLinkStats {
                vf: 0,
                rx_packets: 99,
                ..Default::default()
            }],
        );

        let collector = SriovCollector::new(fs, links, CollectorConfig::default());
        assert_eq!(find(&collector.collect(), 0, "rx_packets").value, 4);

        collector.set_priority(vec!["netlink".to_string(), "sysfs".to_string()]);
        assert_eq!(collector.priority(), vec!["netlink", "sysfs"]);
        assert_eq!(find(&collector.collect(), 0, "rx_packets").value, 99);

        collector.set_priority(vec!["bogus".to_string()]);
        assert!(collector.collect().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_vf_changes_between_scrapes_are_picked_up() {
        use crate::collector::traits::RealFs;
        use std::fs;
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let pci_root = dir.path().join("pci");
        let net_root = dir.path().join("net");
        let pf = pci_root.join("0000:1d:00.0");
        fs::create_dir_all(pf.join("net/t_ens785f0")).unwrap();
        fs::write(pf.join("class"), "0x020000\n").unwrap();
        fs::write(pf.join("sriov_totalvfs"), "8\n").unwrap();
        fs::write(pf.join("numa_node"), "1\n").unwrap();

        let add_vf = |id: u32, addr: &str, rx: i64| {
            fs::create_dir_all(pci_root.join(addr)).unwrap();
            symlink(format!("../{}", addr), pf.join(format!("virtfn{}", id))).unwrap();
            let stats = net_root.join(format!("t_ens785f0/device/sriov/{}/stats", id));
            fs::create_dir_all(&stats).unwrap();
            fs::write(stats.join("rx_packets"), format!("{}\n", rx)).unwrap();
        };
        add_vf(0, "0000:1d:01.0", 4);

        let config = CollectorConfig {
            pci_root: pci_root.clone(),
            net_root: net_root.clone(),
            ..Default::default()
        };
        let collector = SriovCollector::new(RealFs::new(), MockLinks::new(), config);
        let samples = collector.collect();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].numa_node, "1");

        // VF created after startup shows up on the next scrape
        add_vf(1, "0000:1d:01.1", 7);
        let samples = collector.collect();
        assert_eq!(samples.len(), 2);
        assert_eq!(find(&samples, 1, "rx_packets").value, 7);
        assert_eq!(find(&samples, 1, "rx_packets").pci_address, "0000:1d:01.1");
    }

    #[test]
    fn test_unsupported_driver_excluded() {
        let mut fs = MockFs::sriov_sysfs_host();
        fs.add_driver("0000:1d:00.0", "ice", "1.8.3");

        let config = CollectorConfig {
            supported_drivers: SupportedDrivers::from_list(vec![DriverInfo {
                name: "ice".to_string(),
                version: "1.9.11".to_string(),
            }]),
            ..Default::default()
        };
        let collector = SriovCollector::new(fs, MockLinks::new(), config);
        assert!(collector.physical_functions().is_empty());
        assert!(collector.collect().is_empty());
    }

    #[test]
    fn test_empty_host() {
        let collector =
            SriovCollector::new(MockFs::new(), MockLinks::new(), CollectorConfig::default());
        assert!(collector.collect().is_empty());
        let stats = collector.last_stats().unwrap();
        assert_eq!(stats.pfs, 0);
        assert_eq!(stats.samples, 0);
    }
}
