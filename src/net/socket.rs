//! Multicast socket creation and binding.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

use socket2::{Domain, Protocol, Socket, Type};

use crate::dns::{MDNS_PORT, MDNS_V4_GROUP, MDNS_V6_GROUP};
use crate::error::{Error, Result};
use crate::net::interface::{Interface, IpFamily};

/// Create the IPv4 multicast socket for an interface.
///
/// The socket is configured the way the bridge expects:
/// - bound to the mDNS port with address reuse, pinned to the interface
/// - outgoing multicast on the interface address with TTL 255
/// - multicast loopback disabled (never receive our own packets)
/// - joined to 224.0.0.251 on the interface
/// - non-blocking
pub fn create_ipv4_socket(interface: &Interface) -> Result<Socket> {
    let addr = interface.ipv4_addr.ok_or_else(|| {
        Error::Config(format!(
            "interface \"{}\" has no IPv4 address",
            interface.name
        ))
    })?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;
    #[cfg(target_os = "linux")]
    {
        socket.set_reuse_port(true)?;
        socket.bind_device(Some(interface.name.as_bytes()))?;
    }

    socket.set_multicast_ttl_v4(255)?;
    socket.set_multicast_if_v4(&addr)?;
    socket.set_multicast_loop_v4(false)?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MDNS_PORT);
    socket.bind(&bind_addr.into())?;

    socket.join_multicast_v4(&MDNS_V4_GROUP, &addr)?;

    socket.set_nonblocking(true)?;

    Ok(socket)
}

/// Create the IPv6 multicast socket for an interface: as above, but v6
/// only, with the outgoing interface and group join by interface index.
pub fn create_ipv6_socket(interface: &Interface) -> Result<Socket> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_only_v6(true)?;
    socket.set_reuse_address(true)?;
    #[cfg(target_os = "linux")]
    {
        socket.set_reuse_port(true)?;
        socket.bind_device(Some(interface.name.as_bytes()))?;
    }

    socket.set_multicast_hops_v6(255)?;
    socket.set_multicast_if_v6(interface.if_index)?;
    socket.set_multicast_loop_v6(false)?;

    let bind_addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, MDNS_PORT, 0, 0);
    socket.bind(&bind_addr.into())?;

    socket.join_multicast_v6(&MDNS_V6_GROUP, interface.if_index)?;

    socket.set_nonblocking(true)?;

    Ok(socket)
}

/// Bind sockets for every enabled interface in every active family.
pub fn bind_sockets(interfaces: &mut [Interface], family_lists: &[Vec<usize>; 2]) -> Result<()> {
    for &index in &family_lists[IpFamily::V4.index()] {
        let socket = create_ipv4_socket(&interfaces[index])?;
        interfaces[index].sockets[IpFamily::V4.index()] = Some(socket);
    }
    for &index in &family_lists[IpFamily::V6.index()] {
        let socket = create_ipv6_socket(&interfaces[index])?;
        interfaces[index].sockets[IpFamily::V6.index()] = Some(socket);
    }
    Ok(())
}
