//! Pre-built mock sysfs scenarios for testing.
//!
//! These scenarios lay out realistic `/sys/bus/pci/devices` and
//! `/sys/class/net` trees under the default roots, so they can be fed to a
//! collector built from `CollectorConfig::default()`.

use std::path::{Path, PathBuf};

use super::filesystem::MockFs;
use super::links::MockLinks;
use crate::collector::netlink::VfLinkStats;
use crate::collector::{DEFAULT_NET_ROOT, DEFAULT_PCI_ROOT};

impl MockFs {
    /// One Intel E810 PF with two VFs and working sysfs VF statistics.
    ///
    /// PF `0000:1d:00.0` (`t_ens785f0`, NUMA 0), VFs `0000:1d:01.0` and
    /// `0000:1d:01.1`. Each VF exposes `rx_packets` and `tx_packets`.
    pub fn sriov_sysfs_host() -> Self {
        let mut fs = Self::new();
        fs.add_pf("0000:1d:00.0", "t_ens785f0", "0");
        fs.add_vf("0000:1d:00.0", 0, "0000:1d:01.0");
        fs.add_vf("0000:1d:00.0", 1, "0000:1d:01.1");
        fs.add_vf_stats("t_ens785f0", 0, &[("rx_packets", 4), ("tx_packets", 8)]);
        fs.add_vf_stats("t_ens785f0", 1, &[("rx_packets", 16), ("tx_packets", 32)]);
        fs
    }

    /// One Mellanox PF whose counters are only reachable over netlink.
    ///
    /// PF `0000:2e:00.0` (`t_ens801f0`), no NUMA information, three VFs. The
    /// sysfs `sriov` directory exists but holds no statistics, as seen with
    /// some driver and firmware combinations. Pair with
    /// `MockLinks::netlink_host()`.
    pub fn netlink_host() -> Self {
        let mut fs = Self::new();
        fs.add_pf("0000:2e:00.0", "t_ens801f0", "-1");
        for vf in 0..3u32 {
            fs.add_vf("0000:2e:00.0", vf, &format!("0000:2e:00.{}", vf + 2));
        }
        fs.add_dir(Path::new(DEFAULT_NET_ROOT).join("t_ens801f0/device/sriov"));
        fs
    }

    /// A PCI bus mixing SR-IOV PFs with devices the exporter must ignore.
    ///
    /// - `0000:1d:00.0`: sysfs-capable PF with one VF (`t_ens785f0`)
    /// - `0000:3b:00.0`: SR-IOV PF with VFs disabled (`t_ens3f0`)
    /// - `0000:5e:00.0`: plain NIC without SR-IOV
    /// - `0000:6a:00.0`: SR-IOV capable accelerator (class `0x120000`)
    pub fn mixed_pci_bus() -> Self {
        let mut fs = Self::new();

        fs.add_pf("0000:1d:00.0", "t_ens785f0", "0");
        fs.add_vf("0000:1d:00.0", 0, "0000:1d:01.0");
        fs.add_vf_stats("t_ens785f0", 0, &[("rx_packets", 4), ("tx_packets", 8)]);

        fs.add_pf("0000:3b:00.0", "t_ens3f0", "1");
        fs.add_vf_stats("t_ens3f0", 0, &[("rx_packets", 1)]);

        let nic = pci_dir("0000:5e:00.0");
        fs.add_file(nic.join("class"), "0x020000\n");
        fs.add_file(nic.join("numa_node"), "0\n");
        fs.add_dir(nic.join("net/eno1"));

        let accel = pci_dir("0000:6a:00.0");
        fs.add_file(accel.join("class"), "0x120000\n");
        fs.add_file(accel.join("sriov_totalvfs"), "16\n");
        fs.add_file(accel.join("numa_node"), "0\n");

        fs
    }

    /// Adds an SR-IOV network PF under the default PCI root.
    pub fn add_pf(&mut self, addr: &str, ifname: &str, numa_node: &str) {
        let dev = pci_dir(addr);
        self.add_file(dev.join("class"), "0x020000\n");
        self.add_file(dev.join("sriov_totalvfs"), "64\n");
        self.add_file(dev.join("numa_node"), format!("{}\n", numa_node));
        self.add_dir(dev.join("net").join(ifname));
    }

    /// Adds `virtfn<id>` to a PF, linking to the VF's own device directory.
    pub fn add_vf(&mut self, pf_addr: &str, id: u32, vf_addr: &str) {
        let vf_dev = pci_dir(vf_addr);
        self.add_file(vf_dev.join("class"), "0x020000\n");
        self.add_symlink(
            pci_dir(pf_addr).join(format!("virtfn{}", id)),
            format!("../{}", vf_addr),
        );
    }

    /// Adds sysfs VF counters under the default net root.
    pub fn add_vf_stats(&mut self, ifname: &str, id: u32, counters: &[(&str, i64)]) {
        let dir = Path::new(DEFAULT_NET_ROOT)
            .join(ifname)
            .join("device/sriov")
            .join(id.to_string())
            .join("stats");
        for (name, value) in counters {
            self.add_file(dir.join(name), format!("{}\n", value));
        }
    }

    /// Binds a driver with the given module version to a device.
    pub fn add_driver(&mut self, addr: &str, driver: &str, version: &str) {
        let driver_dir = Path::new("/sys/bus/pci/drivers").join(driver);
        self.add_file(driver_dir.join("module/version"), format!("{}\n", version));
        self.add_symlink(pci_dir(addr).join("driver"), driver_dir);
    }
}

impl MockLinks {
    /// Netlink side of `MockFs::netlink_host()`.
    pub fn netlink_host() -> Self {
        let vfs = (0..3u64)
            .map(|vf| VfLinkStats {
                vf: vf as u32,
                rx_bytes: 1000 * (vf + 1),
                tx_bytes: 2000 * (vf + 1),
                rx_packets: 10 * (vf + 1),
                tx_packets: 20 * (vf + 1),
                broadcast: vf,
                multicast: 2 * vf,
                rx_dropped: 0,
                tx_dropped: 0,
            })
            .collect();
        Self::new().with_link("t_ens801f0", vfs)
    }
}

fn pci_dir(addr: &str) -> PathBuf {
    Path::new(DEFAULT_PCI_ROOT).join(addr)
}
