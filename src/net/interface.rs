//! Bridged interface records, OS validation, and peer fan-out tables.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use nix::ifaddrs::getifaddrs;
use nix::net::if_::{if_nametoindex, InterfaceFlags};
use socket2::Socket;
use tracing::warn;

use crate::error::{Error, Result};
use crate::filter::FilterList;

/// Address family of a bridge worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Both families, worker order.
    pub const ALL: [IpFamily; 2] = [IpFamily::V4, IpFamily::V6];

    /// Index into per-family arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => write!(f, "IPv4"),
            IpFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// One bridged interface.
///
/// Created from the configuration, validated against the OS interface
/// list, then populated with bound sockets and per-family fan-out tables.
/// Immutable once the bridge workers start.
pub struct Interface {
    /// Symbolic name from the configuration.
    pub name: String,
    /// OS interface index.
    pub if_index: u32,
    /// Per-family disabled flags.
    pub disabled: [bool; 2],
    /// Validated addresses.
    pub ipv4_addr: Option<Ipv4Addr>,
    pub ipv6_addr: Option<Ipv6Addr>,
    /// Per-family bound multicast sockets.
    pub sockets: [Option<Socket>; 2],
    /// Inbound filter list, if configured.
    pub inbound_filter: Option<Arc<FilterList>>,
    /// Outbound filter list, if configured.
    pub outbound_filter: Option<Arc<FilterList>>,
    /// Per-family peers: every other enabled interface in the family,
    /// as indices into the interface table.
    pub peers: [Vec<usize>; 2],
    /// How many peers have no outbound filter.
    pub peer_nofilter_count: [usize; 2],
    /// Distinct outbound filter lists among peers, by identity.
    pub peer_filter_variants: [Vec<Arc<FilterList>>; 2],
}

impl Interface {
    /// Create an interface record with no OS state yet.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            if_index: 0,
            disabled: [false; 2],
            ipv4_addr: None,
            ipv6_addr: None,
            sockets: [None, None],
            inbound_filter: None,
            outbound_filter: None,
            peers: [Vec::new(), Vec::new()],
            peer_nofilter_count: [0; 2],
            peer_filter_variants: [Vec::new(), Vec::new()],
        }
    }

    /// The bound socket for `family`, when the interface is enabled there.
    pub fn socket(&self, family: IpFamily) -> Option<&Socket> {
        self.sockets[family.index()].as_ref()
    }
}

/// IPv4 link-local: 169.254/16.
fn is_ipv4_link_local(addr: Ipv4Addr) -> bool {
    addr.octets()[0] == 169 && addr.octets()[1] == 254
}

/// IPv6 link-local (fe80::/10) or unique-local (fc00::/7).
fn is_ipv6_local(addr: Ipv6Addr) -> bool {
    let seg = addr.segments()[0];
    (seg & 0xffc0) == 0xfe80 || (seg & 0xfe00) == 0xfc00
}

/// Validate the configured interfaces against the OS interface list,
/// resolving indices and per-family addresses. Interfaces without an
/// address in a family are disabled for that family.
pub fn validate_interfaces(interfaces: &mut [Interface]) -> Result<()> {
    if interfaces.is_empty() {
        return Err(Error::Config("no interface list defined".to_string()));
    }

    // Resolve OS indices and reject duplicates.
    for index in 0..interfaces.len() {
        let if_index = if_nametoindex(interfaces[index].name.as_str())
            .map_err(|_| Error::InterfaceNotFound(interfaces[index].name.clone()))?;
        interfaces[index].if_index = if_index;

        for earlier in &interfaces[..index] {
            if earlier.if_index == if_index {
                return Err(Error::Config(format!(
                    "interface \"{}\" and \"{}\" are identical",
                    interfaces[index].name, earlier.name
                )));
            }
        }
    }

    let addrs = getifaddrs().map_err(|e| Error::Network(std::io::Error::other(e)))?;
    for ifaddr in addrs {
        let Some(interface) = interfaces
            .iter_mut()
            .find(|i| i.name == ifaddr.interface_name)
        else {
            continue;
        };

        if !ifaddr.flags.contains(InterfaceFlags::IFF_UP) {
            warn!("Interface \"{}\" is not up", interface.name);
        }
        if !ifaddr.flags.contains(InterfaceFlags::IFF_MULTICAST) {
            warn!("Interface \"{}\" does not support multicast", interface.name);
        }

        let Some(address) = ifaddr.address else {
            continue;
        };

        if let Some(sin) = address.as_sockaddr_in() {
            if !interface.disabled[IpFamily::V4.index()] {
                // Favor global addresses over link-local ones.
                let ip = sin.ip();
                if interface.ipv4_addr.is_none() || !is_ipv4_link_local(ip) {
                    interface.ipv4_addr = Some(ip);
                }
            }
        } else if let Some(sin6) = address.as_sockaddr_in6() {
            if !interface.disabled[IpFamily::V6.index()] {
                // Favor global addresses over link-local or unique-local.
                let ip = sin6.ip();
                if interface.ipv6_addr.is_none() || !is_ipv6_local(ip) {
                    interface.ipv6_addr = Some(ip);
                }
            }
        }
    }

    for interface in interfaces.iter_mut() {
        if interface.ipv4_addr.is_none() && !interface.disabled[IpFamily::V4.index()] {
            warn!(
                "Interface \"{}\" does not have an IPv4 address (disabled)",
                interface.name
            );
            interface.disabled[IpFamily::V4.index()] = true;
        }
        if interface.ipv6_addr.is_none() && !interface.disabled[IpFamily::V6.index()] {
            warn!(
                "Interface \"{}\" does not have an IPv6 address (disabled)",
                interface.name
            );
            interface.disabled[IpFamily::V6.index()] = true;
        }
    }

    Ok(())
}

/// Build the per-family enabled interface lists. A family with fewer than
/// two enabled interfaces has them all disabled; at least one family must
/// retain two or more.
pub fn build_family_lists(interfaces: &mut [Interface]) -> Result<[Vec<usize>; 2]> {
    let mut lists: [Vec<usize>; 2] = [Vec::new(), Vec::new()];

    for family in IpFamily::ALL {
        let enabled: Vec<usize> = (0..interfaces.len())
            .filter(|&i| !interfaces[i].disabled[family.index()])
            .collect();

        if enabled.len() < 2 {
            for &i in &enabled {
                warn!(
                    "Interface \"{}\" does not have any {} peers (disabled)",
                    interfaces[i].name, family
                );
                interfaces[i].disabled[family.index()] = true;
            }
        } else {
            lists[family.index()] = enabled;
        }
    }

    if lists[0].is_empty() && lists[1].is_empty() {
        return Err(Error::Config(
            "no active IPv4 or IPv6 interfaces".to_string(),
        ));
    }

    Ok(lists)
}

/// Populate each enabled interface's peer list, no-filter peer count, and
/// distinct outbound filter variants (deduplicated by identity).
pub fn build_peer_tables(interfaces: &mut [Interface], family_lists: &[Vec<usize>; 2]) {
    for family in IpFamily::ALL {
        let list = &family_lists[family.index()];
        for &index in list {
            let mut peers = Vec::with_capacity(list.len() - 1);
            let mut nofilter_count = 0;
            let mut variants: Vec<Arc<FilterList>> = Vec::new();

            for &peer in list {
                if peer == index {
                    continue;
                }
                peers.push(peer);

                match &interfaces[peer].outbound_filter {
                    Some(filter) => {
                        if !variants.iter().any(|v| Arc::ptr_eq(v, filter)) {
                            variants.push(Arc::clone(filter));
                        }
                    }
                    None => nofilter_count += 1,
                }
            }

            interfaces[index].peers[family.index()] = peers;
            interfaces[index].peer_nofilter_count[family.index()] = nofilter_count;
            interfaces[index].peer_filter_variants[family.index()] = variants;
        }
    }
}
