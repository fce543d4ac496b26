//! Physical function discovery from the PCI device tree.
//!
//! Reads `<pci-root>/<addr>/{sriov_totalvfs,class,numa_node,net/}`.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use super::drivers::SupportedDrivers;
use crate::collector::traits::FileSystem;

/// PCI class code of an Ethernet network controller.
pub const NET_CLASS: i64 = 0x020000;

const TOTAL_VFS_FILE: &str = "sriov_totalvfs";
const CLASS_FILE: &str = "class";
const NUMA_NODE_FILE: &str = "numa_node";
const NET_DIR: &str = "net";

/// Value of `numa_node` on hosts without NUMA information.
const NO_NUMA_INFO: &str = "-1";

/// An SR-IOV capable network device, discovered once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalFunction {
    /// PCI address as named in sysfs, e.g. `0000:1d:00.0` or `10000:e1:00.0`.
    pub pci_address: String,
    /// NUMA node, or empty when unknown.
    pub numa_node: String,
}

/// Parses a PCI class file (`0x020000`). The `0x` prefix is optional.
pub fn parse_class(content: &str) -> Option<i64> {
    let hex = content.trim();
    let hex = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    i64::from_str_radix(hex, 16).ok()
}

/// Finds every SR-IOV capable network PF under `pci_root`.
///
/// A device qualifies when it has a `sriov_totalvfs` file and its class code is
/// `NET_CLASS`, whatever its entry is named. Devices whose driver is known to be unsupported are dropped.
/// The result is sorted. An empty result is logged but is not an error.
pub fn discover_pfs<F: FileSystem>(
    fs: &F,
    pci_root: &Path,
    drivers: &SupportedDrivers,
) -> Vec<String> {
    let devices = match fs.read_dir(pci_root) {
        Ok(devices) => devices,
        Err(e) => {
            warn!(path = %pci_root.display(), error = %e, "could not list pci devices");
            Vec::new()
        }
    };

    let mut pfs: Vec<String> = devices
        .iter()
        .filter_map(|dev| dev.file_name()?.to_str().map(str::to_string))
        .filter(|addr| is_sriov_net_pf(fs, pci_root, addr))
        .filter(|addr| drivers.is_pf_supported(fs, pci_root, addr))
        .collect();
    pfs.sort();

    if pfs.is_empty() {
        info!(path = %pci_root.display(), "no sriov net devices found");
    } else {
        info!(count = pfs.len(), "discovered sriov net devices");
    }

    pfs
}

fn is_sriov_net_pf<F: FileSystem>(fs: &F, pci_root: &Path, addr: &str) -> bool {
    let dev = pci_root.join(addr);
    if !fs.exists(&dev.join(TOTAL_VFS_FILE)) {
        return false;
    }
    is_net_device(fs, &dev.join(CLASS_FILE))
}

fn is_net_device<F: FileSystem>(fs: &F, class_path: &Path) -> bool {
    if fs.is_symlink(class_path) {
        warn!(path = %class_path.display(), "refusing to read class file through a symlink");
        return false;
    }
    let Ok(content) = fs.read_to_string(class_path) else {
        return false;
    };
    match parse_class(&content) {
        Some(class) => class == NET_CLASS,
        None => {
            warn!(path = %class_path.display(), value = %content.trim(), "could not parse class file");
            false
        }
    }
}

/// Reads the NUMA node of one device.
///
/// Returns an empty string when the file is missing, is a symlink, or holds
/// the kernel's `-1` "no NUMA" value.
pub fn numa_node<F: FileSystem>(fs: &F, pci_root: &Path, addr: &str) -> String {
    let path = pci_root.join(addr).join(NUMA_NODE_FILE);
    if fs.is_symlink(&path) {
        warn!(path = %path.display(), "refusing to read numa_node through a symlink");
        return String::new();
    }
    match fs.read_to_string(&path) {
        Ok(content) => {
            let node = content.trim();
            if node == NO_NUMA_INFO || node.is_empty() {
                info!(device = %addr, "no numa node information for device");
                String::new()
            } else {
                node.to_string()
            }
        }
        Err(e) => {
            warn!(device = %addr, error = %e, "could not read numa_node file for device");
            String::new()
        }
    }
}

/// Resolves the NUMA node of every address. Per-device failures map to the
/// unknown value and never abort the batch.
pub fn locate_numa<F: FileSystem>(
    fs: &F,
    pci_root: &Path,
    addresses: &[String],
) -> HashMap<String, String> {
    addresses
        .iter()
        .map(|addr| (addr.clone(), numa_node(fs, pci_root, addr)))
        .collect()
}

/// Returns the OS interface name of a PF: the first entry of `<addr>/net/`.
pub fn interface_name<F: FileSystem>(fs: &F, pci_root: &Path, addr: &str) -> Option<String> {
    let net_dir = pci_root.join(addr).join(NET_DIR);
    let mut entries = match fs.read_dir(&net_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(device = %addr, path = %net_dir.display(), error = %e,
                "could not get pf interface name");
            return None;
        }
    };
    entries.sort();
    let name = entries
        .first()
        .and_then(|entry| entry.file_name())
        .and_then(|name| name.to_str())
        .map(str::to_string);
    if name.is_none() {
        warn!(device = %addr, path = %net_dir.display(), "pf has no network interface");
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    const ROOT: &str = "/sys/bus/pci/devices";

    fn add_device(fs: &mut MockFs, addr: &str, totalvfs: bool, class: &str) {
        let dev = Path::new(ROOT).join(addr);
        fs.add_dir(&dev);
        if totalvfs {
            fs.add_file(dev.join("sriov_totalvfs"), "64\n");
        }
        if !class.is_empty() {
            fs.add_file(dev.join("class"), format!("{}\n", class));
        }
    }

    #[test]
    fn test_discover_wide_pci_domains() {
        let mut fs = MockFs::new();
        // Domains behind Intel VMD start at 0x10000
        add_device(&mut fs, "10000:e1:00.0", true, "0x020000");
        add_device(&mut fs, "0000:1d:00.0", true, "0x020000");
        add_device(&mut fs, "10000:e0:00.0", false, "0x060400");

        let pfs = discover_pfs(&fs, Path::new(ROOT), &SupportedDrivers::allow_all());
        assert_eq!(pfs, vec!["0000:1d:00.0", "10000:e1:00.0"]);
    }

    #[test]
    fn test_parse_class() {
        assert_eq!(parse_class("0x020000\n"), Some(NET_CLASS));
        assert_eq!(parse_class("020000"), Some(NET_CLASS));
        assert_eq!(parse_class("0x030000"), Some(0x030000));
        assert_eq!(parse_class("garbage"), None);
    }

    #[test]
    fn test_discover_only_sriov_net_devices() {
        let mut fs = MockFs::new();
        add_device(&mut fs, "0000:7b:00.1", true, "0x020000");
        add_device(&mut fs, "0000:6f:00.0", true, "0x020000");
        add_device(&mut fs, "0000:6f:00.1", true, "0x020000");
        // Not SR-IOV capable
        add_device(&mut fs, "0000:00:1f.0", false, "0x020000");
        // SR-IOV capable accelerator, not a network device
        add_device(&mut fs, "0000:3d:00.0", true, "0x120000");
        // No class file at all
        add_device(&mut fs, "0000:3e:00.0", true, "");

        let pfs = discover_pfs(&fs, Path::new(ROOT), &SupportedDrivers::allow_all());
        assert_eq!(pfs, vec!["0000:6f:00.0", "0000:6f:00.1", "0000:7b:00.1"]);
    }

    #[test]
    fn test_discover_skips_unparsable_and_linked_class() {
        let mut fs = MockFs::new();
        add_device(&mut fs, "0000:1a:00.0", true, "net");
        add_device(&mut fs, "0000:1a:00.1", true, "");
        fs.add_file("/tmp/class", "0x020000");
        fs.add_symlink(Path::new(ROOT).join("0000:1a:00.1/class"), "/tmp/class");

        let pfs = discover_pfs(&fs, Path::new(ROOT), &SupportedDrivers::allow_all());
        assert!(pfs.is_empty());
    }

    #[test]
    fn test_discover_no_devices() {
        let mut fs = MockFs::new();
        add_device(&mut fs, "0000:5e:00.0", false, "");
        add_device(&mut fs, "0000:5e:00.1", false, "");
        assert!(discover_pfs(&fs, Path::new(ROOT), &SupportedDrivers::allow_all()).is_empty());

        // Missing pci root is not fatal either
        let empty = MockFs::new();
        assert!(discover_pfs(&empty, Path::new(ROOT), &SupportedDrivers::allow_all()).is_empty());
    }

    #[test]
    fn test_locate_numa() {
        let mut fs = MockFs::new();
        fs.add_file(format!("{ROOT}/0000:2c:00.0/numa_node"), "0\n");
        fs.add_file(format!("{ROOT}/0000:3d:00.0/numa_node"), " 1 \n");
        fs.add_file(format!("{ROOT}/0000:5f:00.0/numa_node"), "-1\n");
        fs.add_dir(format!("{ROOT}/0000:4e:00.0"));

        let addresses: Vec<String> = ["0000:2c:00.0", "0000:3d:00.0", "0000:5f:00.0", "0000:4e:00.0"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let numa = locate_numa(&fs, Path::new(ROOT), &addresses);

        assert_eq!(numa.len(), 4);
        assert_eq!(numa["0000:2c:00.0"], "0");
        assert_eq!(numa["0000:3d:00.0"], "1");
        assert_eq!(numa["0000:5f:00.0"], "");
        assert_eq!(numa["0000:4e:00.0"], "");
    }

    #[test]
    fn test_interface_name() {
        let mut fs = MockFs::new();
        fs.add_dir(format!("{ROOT}/0000:2d:00.0/net/ens785f0"));
        fs.add_dir(format!("{ROOT}/0000:2e:00.0/net"));

        let root = Path::new(ROOT);
        assert_eq!(
            interface_name(&fs, root, "0000:2d:00.0"),
            Some("ens785f0".to_string())
        );
        assert_eq!(interface_name(&fs, root, "0000:2e:00.0"), None);
        assert_eq!(interface_name(&fs, root, "0000:3e:00.0"), None);
    }
}
