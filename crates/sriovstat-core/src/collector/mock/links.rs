//! In-memory netlink link table for testing reader selection.

use std::collections::HashMap;

use crate::collector::netlink::{LinkQuery, NetlinkError, VfLinkStats};

/// Mock `LinkQuery` backed by a map from interface name to VF counters.
///
/// Interfaces that were never added fail to resolve, like a link that does
/// not exist in the kernel.
#[derive(Debug, Clone, Default)]
pub struct MockLinks {
    links: HashMap<String, Vec<VfLinkStats>>,
}

impl MockLinks {
    /// Creates an empty link table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a link with the given VF counters.
    pub fn add_link(&mut self, ifname: impl Into<String>, vfs: Vec<VfLinkStats>) {
        self.links.insert(ifname.into(), vfs);
    }

    /// Builder form of `add_link`.
    pub fn with_link(mut self, ifname: impl Into<String>, vfs: Vec<VfLinkStats>) -> Self {
        self.add_link(ifname, vfs);
        self
    }
}

impl LinkQuery for MockLinks {
    fn vf_stats(&self, ifname: &str) -> Result<Vec<VfLinkStats>, NetlinkError> {
        self.links
            .get(ifname)
            .cloned()
            .ok_or_else(|| NetlinkError::Link {
                ifname: ifname.to_string(),
                reason: "Link not found".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_links_unknown_link() {
        let links = MockLinks::new();
        assert!(matches!(
            links.vf_stats("ens785f0"),
            Err(NetlinkError::Link { .. })
        ));
    }

    #[test]
    fn test_mock_links_returns_snapshot() {
        let links = MockLinks::new().with_link(
            "ens801f0",
            vec![VfLinkStats {
                vf: 3,
                rx_bytes: 10,
                ..Default::default()
            }],
        );
        let vfs = links.vf_stats("ens801f0").unwrap();
        assert_eq!(vfs.len(), 1);
        assert_eq!(vfs[0].vf, 3);
        assert_eq!(vfs[0].rx_bytes, 10);
    }
}
