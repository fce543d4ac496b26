//! `RTM_GETLINK` over a `NETLINK_ROUTE` socket.

use neli::consts::nl::NlmF;
use neli::consts::rtnl::{Arphrd, Iff, Ifla, RtAddrFamily, Rtm};
use neli::consts::socket::NlFamily;
use neli::err::RouterError;
use neli::nl::NlPayload;
use neli::router::synchronous::NlRouter;
use neli::rtnl::{Ifinfomsg, IfinfomsgBuilder, RtattrBuilder};
use neli::types::{Buffer, RtBuffer};
use neli::utils::Groups;

use super::{
    IFLA_EXT_MASK, IFLA_IFNAME, IFLA_VFINFO_LIST, LinkQuery, NetlinkError, RTEXT_FILTER_VF,
    VfLinkStats, parse_vfinfo_list,
};

/// Queries the kernel for VF counters with one `RTM_GETLINK` request per call.
///
/// A fresh socket is opened for every query; scrapes are infrequent and this
/// keeps the type free of shared mutable state.
#[derive(Debug, Default, Clone, Copy)]
pub struct RtnetlinkQuery;

impl RtnetlinkQuery {
    /// Creates a new `RtnetlinkQuery`.
    pub fn new() -> Self {
        Self
    }

    fn request(ifname: &str) -> Result<Ifinfomsg, NetlinkError> {
        let mut name = ifname.as_bytes().to_vec();
        name.push(0);

        let attrs: RtBuffer<Ifla, Buffer> = [
            RtattrBuilder::default()
                .rta_type(Ifla::from(IFLA_IFNAME))
                .rta_payload(Buffer::from(name))
                .build(),
            RtattrBuilder::default()
                .rta_type(Ifla::from(IFLA_EXT_MASK))
                .rta_payload(Buffer::from(RTEXT_FILTER_VF.to_ne_bytes().to_vec()))
                .build(),
        ]
        .into_iter()
        .collect::<Result<_, _>>()
        .map_err(|e| NetlinkError::Protocol(e.to_string()))?;

        IfinfomsgBuilder::default()
            .ifi_family(RtAddrFamily::Unspecified)
            .ifi_type(Arphrd::from(0u16))
            .ifi_index(0)
            .ifi_flags(Iff::empty())
            .ifi_change(Iff::empty())
            .rtattrs(attrs)
            .build()
            .map_err(|e| NetlinkError::Protocol(e.to_string()))
    }
}

impl LinkQuery for RtnetlinkQuery {
    fn vf_stats(&self, ifname: &str) -> Result<Vec<VfLinkStats>, NetlinkError> {
        let (router, _) = NlRouter::connect(NlFamily::Route, None, Groups::empty())
            .map_err(|e| NetlinkError::Socket(e.to_string()))?;

        let request = Self::request(ifname)?;
        let replies = router
            .send::<_, _, Rtm, Ifinfomsg>(Rtm::Getlink, NlmF::REQUEST, NlPayload::Payload(request))
            .map_err(|e| NetlinkError::Socket(e.to_string()))?;

        let vfinfo_list = Ifla::from(IFLA_VFINFO_LIST);
        let mut stats = Vec::new();
        for reply in replies {
            let reply = reply.map_err(|e| reply_error(ifname, e))?;
            let Some(link) = reply.get_payload() else {
                continue;
            };
            for attr in link.rtattrs().iter() {
                if attr.rta_type() == &vfinfo_list {
                    stats.extend(parse_vfinfo_list(attr.rta_payload().as_ref()));
                }
            }
        }

        Ok(stats)
    }
}

/// Only an error packet from the kernel means the link lookup failed. Anything
/// else, a truncated or undecodable reply included, is a protocol error.
fn reply_error<T, P>(ifname: &str, err: RouterError<T, P>) -> NetlinkError
where
    T: std::fmt::Debug,
    P: std::fmt::Debug,
{
    match err {
        RouterError::Nlmsgerr(nlmsgerr) => NetlinkError::Link {
            ifname: ifname.to_string(),
            reason: nlmsgerr.to_string(),
        },
        other => NetlinkError::Protocol(format!("reply for link '{}': {}", ifname, other)),
    }
}
