//! Netlink access to per-VF link counters.
//!
//! `LinkQuery` hides the rtnetlink socket behind a trait so that reader
//! selection can be tested with `MockLinks`. The nested attribute decoding of
//! `IFLA_VFINFO_LIST` is plain byte parsing and lives here, independent of the
//! socket library.

#[cfg(target_os = "linux")]
mod rtnetlink;

#[cfg(target_os = "linux")]
pub use rtnetlink::RtnetlinkQuery;

/// `IFLA_IFNAME` link attribute.
pub const IFLA_IFNAME: u16 = 3;
/// `IFLA_VFINFO_LIST` link attribute (nested list of `IFLA_VF_INFO`).
pub const IFLA_VFINFO_LIST: u16 = 22;
/// `IFLA_EXT_MASK` link attribute.
pub const IFLA_EXT_MASK: u16 = 29;
/// Request VF info in `RTM_GETLINK` replies.
pub const RTEXT_FILTER_VF: u32 = 1;

const IFLA_VF_INFO: u16 = 1;
const IFLA_VF_MAC: u16 = 1;
const IFLA_VF_STATS: u16 = 8;

const IFLA_VF_STATS_RX_PACKETS: u16 = 0;
const IFLA_VF_STATS_TX_PACKETS: u16 = 1;
const IFLA_VF_STATS_RX_BYTES: u16 = 2;
const IFLA_VF_STATS_TX_BYTES: u16 = 3;
const IFLA_VF_STATS_BROADCAST: u16 = 4;
const IFLA_VF_STATS_MULTICAST: u16 = 5;
const IFLA_VF_STATS_RX_DROPPED: u16 = 7;
const IFLA_VF_STATS_TX_DROPPED: u16 = 8;

/// Netlink attribute header size (`struct nlattr`).
const NLA_HDRLEN: usize = 4;
/// Strips `NLA_F_NESTED` and `NLA_F_NET_BYTEORDER` from the attribute type.
const NLA_TYPE_MASK: u16 = 0x3fff;

/// Counters the kernel reports for one virtual function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VfLinkStats {
    /// VF index on the owning link.
    pub vf: u32,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub broadcast: u64,
    pub multicast: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
}

/// Error type for netlink queries.
#[derive(Debug)]
pub enum NetlinkError {
    /// The socket could not be opened or configured.
    Socket(String),
    /// The kernel could not resolve the link by name.
    Link { ifname: String, reason: String },
    /// The request could not be built or the reply could not be decoded.
    Protocol(String),
}

impl std::fmt::Display for NetlinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetlinkError::Socket(msg) => write!(f, "netlink socket error: {}", msg),
            NetlinkError::Link { ifname, reason } => {
                write!(f, "could not resolve link '{}': {}", ifname, reason)
            }
            NetlinkError::Protocol(msg) => write!(f, "netlink protocol error: {}", msg),
        }
    }
}

impl std::error::Error for NetlinkError {}

/// Source of per-VF link counters.
///
/// One call is one snapshot: all VFs of the link are returned together.
pub trait LinkQuery: Send + Sync {
    /// Looks up `ifname` and returns the counters of every VF attached to it.
    ///
    /// An `Err` means the link itself could not be resolved; a link without
    /// VFs yields `Ok` with an empty list.
    fn vf_stats(&self, ifname: &str) -> Result<Vec<VfLinkStats>, NetlinkError>;
}

/// Iterates `(type, payload)` pairs of a netlink attribute stream.
///
/// Stops at the first truncated or malformed header instead of failing.
pub fn attributes(mut buf: &[u8]) -> impl Iterator<Item = (u16, &[u8])> {
    std::iter::from_fn(move || {
        if buf.len() < NLA_HDRLEN {
            return None;
        }
        let len = u16::from_ne_bytes([buf[0], buf[1]]) as usize;
        let kind = u16::from_ne_bytes([buf[2], buf[3]]) & NLA_TYPE_MASK;
        if len < NLA_HDRLEN || len > buf.len() {
            return None;
        }
        let payload = &buf[NLA_HDRLEN..len];
        let aligned = (len + 3) & !3;
        buf = &buf[aligned.min(buf.len())..];
        Some((kind, payload))
    })
}

fn read_u32(payload: &[u8]) -> Option<u32> {
    Some(u32::from_ne_bytes(payload.get(..4)?.try_into().ok()?))
}

fn read_u64(payload: &[u8]) -> Option<u64> {
    Some(u64::from_ne_bytes(payload.get(..8)?.try_into().ok()?))
}

/// Decodes the payload of an `IFLA_VFINFO_LIST` attribute.
///
/// The VF index comes from `IFLA_VF_MAC` (`struct ifla_vf_mac` starts with the
/// index); entries without it fall back to their position in the list.
pub fn parse_vfinfo_list(payload: &[u8]) -> Vec<VfLinkStats> {
    attributes(payload)
        .filter(|(kind, _)| *kind == IFLA_VF_INFO)
        .enumerate()
        .map(|(position, (_, info))| parse_vf_info(info, position as u32))
        .collect()
}

fn parse_vf_info(info: &[u8], position: u32) -> VfLinkStats {
    let mut vf = VfLinkStats {
        vf: position,
        ..Default::default()
    };

    for (kind, payload) in attributes(info) {
        match kind {
            IFLA_VF_MAC => {
                if let Some(index) = read_u32(payload) {
                    vf.vf = index;
                }
            }
            IFLA_VF_STATS => parse_vf_stats(payload, &mut vf),
            _ => {}
        }
    }

    vf
}

fn parse_vf_stats(payload: &[u8], vf: &mut VfLinkStats) {
    for (kind, value) in attributes(payload) {
        let Some(value) = read_u64(value) else {
            continue;
        };
        match kind {
            IFLA_VF_STATS_RX_PACKETS => vf.rx_packets = value,
            IFLA_VF_STATS_TX_PACKETS => vf.tx_packets = value,
            IFLA_VF_STATS_RX_BYTES => vf.rx_bytes = value,
            IFLA_VF_STATS_TX_BYTES => vf.tx_bytes = value,
            IFLA_VF_STATS_BROADCAST => vf.broadcast = value,
            IFLA_VF_STATS_MULTICAST => vf.multicast = value,
            IFLA_VF_STATS_RX_DROPPED => vf.rx_dropped = value,
            IFLA_VF_STATS_TX_DROPPED => vf.tx_dropped = value,
            _ => {}
        }
    }
}
