//! SR-IOV virtual function statistics collector.
//!
//! This module discovers SR-IOV capable network physical functions (PFs) in the
//! PCI sysfs tree, resolves their virtual functions (VFs) every scrape, and reads
//! per-VF counters through whichever kernel interface actually returns data.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        SriovCollector                        │
//! │  ┌──────────────────────┐   ┌─────────────────────────────┐  │
//! │  │  discovery (once)    │   │  per scrape, per PF         │  │
//! │  │  - sriov_totalvfs    │   │  - net/<ifname>             │  │
//! │  │  - class             │   │  - select_reader (probe)    │  │
//! │  │  - numa_node         │   │  - virtfn* symlinks         │  │
//! │  │  - driver support    │   │  - StatsReader::read        │  │
//! │  └──────────┬───────────┘   └──────┬───────────────┬──────┘  │
//! │             └──────────────┬───────┘               │         │
//! │                     ┌──────▼──────┐         ┌──────▼──────┐  │
//! │                     │  FileSystem │ (trait) │  LinkQuery  │  │
//! │                     └──────┬──────┘         └──────┬──────┘  │
//! └────────────────────────────┼───────────────────────┼─────────┘
//!                    ┌─────────┴───────┐       ┌───────┴─────────┐
//!             ┌──────▼──────┐ ┌────────▼──┐ ┌──▼───────────┐ ┌───▼───────┐
//!             │   RealFs    │ │  MockFs   │ │RtnetlinkQuery│ │ MockLinks │
//!             └─────────────┘ └───────────┘ └──────────────┘ └───────────┘
//! ```
//!
//! # Usage
//!
//! ## Testing (with MockFs)
//!
//! ```
//! use sriovstat_core::collector::mock::MockLinks;
//! use sriovstat_core::collector::{CollectorConfig, MockFs, SriovCollector};
//!
//! let fs = MockFs::sriov_sysfs_host();
//! let collector = SriovCollector::new(fs, MockLinks::new(), CollectorConfig::default());
//! let samples = collector.collect();
//! assert_eq!(samples.len(), 4);
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod mock;
pub mod netlink;
pub mod sriov;
pub mod traits;

pub use collector::{
    CollectStats, CollectorConfig, DEFAULT_NET_ROOT, DEFAULT_PCI_ROOT, DEFAULT_PRIORITY,
    SriovCollector, VfSample,
};
pub use mock::{MockFs, MockLinks};
#[cfg(target_os = "linux")]
pub use netlink::RtnetlinkQuery;
pub use netlink::{LinkQuery, NetlinkError, VfLinkStats};
pub use sriov::SriovError;
pub use traits::{FileSystem, RealFs};
