//! The bridge itself: shared immutable state plus one worker per address
//! family, each running an event loop over its interface sockets.

use std::future::poll_fn;
use std::net::{SocketAddrV4, SocketAddrV6};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::task::Poll;

use socket2::SockAddr;
use tokio::io::unix::{AsyncFd, AsyncFdReadyGuard};
use tokio::io::Interest;
use tracing::{error, info, warn};

use crate::config::ResolvedConfig;
use crate::dns::{DnsState, Packet, MDNS_PORT, MDNS_V4_GROUP, MDNS_V6_GROUP};
use crate::error::Result;
use crate::filter::{FilterList, InboundFilters};
use crate::net::interface::{Interface, IpFamily};
use crate::net::{interface, socket};

/// Immutable state shared by all workers: the interface table with bound
/// sockets and peer fan-out, the global filter, and the run flags.
pub struct SharedState {
    pub interfaces: Vec<Interface>,
    pub family_interfaces: [Vec<usize>; 2],
    pub global_filter: Option<Arc<FilterList>>,
    pub filtering_enabled: bool,
    pub warn: bool,
}

impl SharedState {
    /// Validate a resolved configuration against the OS, bind the
    /// multicast sockets, and build the peer fan-out tables.
    pub fn initialize(config: ResolvedConfig, warn: bool) -> Result<Self> {
        let ResolvedConfig {
            mut interfaces,
            global_filter,
            filtering_enabled,
        } = config;

        interface::validate_interfaces(&mut interfaces)?;
        let family_interfaces = interface::build_family_lists(&mut interfaces)?;
        socket::bind_sockets(&mut interfaces, &family_interfaces)?;
        interface::build_peer_tables(&mut interfaces, &family_interfaces);

        Ok(Self {
            interfaces,
            family_interfaces,
            global_filter,
            filtering_enabled,
            warn,
        })
    }

    /// Log the effective configuration.
    pub fn dump(&self) {
        match &self.global_filter {
            Some(list) => info!(
                "global filter ({:?}): {}",
                list.action(),
                list.names()
                    .iter()
                    .map(|n| n.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            None => info!("global filter: (none)"),
        }
        if !self.filtering_enabled {
            info!("packet filtering disabled");
        }

        for interface in &self.interfaces {
            info!("interface {} (index {})", interface.name, interface.if_index);
            for family in IpFamily::ALL {
                if interface.disabled[family.index()] {
                    info!("  {} disabled", family);
                    continue;
                }
                let addr = match family {
                    IpFamily::V4 => interface.ipv4_addr.map(|a| a.to_string()),
                    IpFamily::V6 => interface.ipv6_addr.map(|a| a.to_string()),
                };
                let peers: Vec<&str> = interface.peers[family.index()]
                    .iter()
                    .map(|&i| self.interfaces[i].name.as_str())
                    .collect();
                info!(
                    "  {} address {} peers [{}]",
                    family,
                    addr.unwrap_or_default(),
                    peers.join(", ")
                );
            }
            if let Some(list) = &interface.inbound_filter {
                info!("  inbound filter: {:?}", list.action());
            }
            if let Some(list) = &interface.outbound_filter {
                info!("  outbound filter: {:?}", list.action());
            }
        }
    }
}

/// The bridge: spawns one worker per active address family and waits for
/// a termination signal. There is no graceful drain; in-flight sends may
/// be lost on exit.
pub struct MdnsBridge {
    shared: Arc<SharedState>,
}

impl MdnsBridge {
    pub fn new(shared: SharedState) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Run the bridge until a termination signal arrives.
    pub async fn run(&self) -> Result<()> {
        for family in IpFamily::ALL {
            let members = &self.shared.family_interfaces[family.index()];
            if members.is_empty() {
                continue;
            }
            info!("{} bridge starting on {} interfaces", family, members.len());
            let worker = Worker::new(Arc::clone(&self.shared), family);
            tokio::spawn(worker.run());
        }

        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal, exiting");
        Ok(())
    }
}

/// Readiness notifier over a worker's interface sockets, keyed by
/// interface table index. Readiness is scanned round-robin so one busy
/// interface cannot starve its peers.
struct Notifier {
    fds: Vec<(usize, AsyncFd<RawFd>)>,
    next: usize,
}

impl Notifier {
    fn new() -> Self {
        Self {
            fds: Vec::new(),
            next: 0,
        }
    }

    fn add(&mut self, index: usize, fd: RawFd) -> std::io::Result<()> {
        let fd = AsyncFd::with_interest(fd, Interest::READABLE)?;
        self.fds.push((index, fd));
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Wait until some registered socket is readable, returning its
    /// interface index and the readiness guard.
    async fn ready(&mut self) -> (usize, std::io::Result<AsyncFdReadyGuard<'_, RawFd>>) {
        let fds = &self.fds;
        let next = &mut self.next;
        poll_fn(move |cx| {
            for n in 0..fds.len() {
                let slot = (*next + n) % fds.len();
                let (index, fd) = &fds[slot];
                if let Poll::Ready(result) = fd.poll_read_ready(cx) {
                    *next = (slot + 1) % fds.len();
                    return Poll::Ready((*index, result));
                }
            }
            Poll::Pending
        })
        .await
    }
}

/// One bridge worker, bound to a single address family. All hot-path
/// state is worker-local; the shared state is only ever read.
struct Worker {
    shared: Arc<SharedState>,
    family: IpFamily,
    recv: Packet,
    send: Packet,
    state: DnsState,
}

impl Worker {
    fn new(shared: Arc<SharedState>, family: IpFamily) -> Self {
        Self {
            shared,
            family,
            recv: Packet::new(),
            send: Packet::new(),
            state: DnsState::new(),
        }
    }

    async fn run(mut self) {
        let mut notifier = Notifier::new();
        for &index in &self.shared.family_interfaces[self.family.index()] {
            let interface = &self.shared.interfaces[index];
            let Some(socket) = interface.socket(self.family) else {
                continue;
            };
            if let Err(err) = notifier.add(index, socket.as_raw_fd()) {
                error!(
                    "cannot register interface {} with the {} notifier: {}",
                    interface.name, self.family, err
                );
                return;
            }
        }

        if notifier.is_empty() {
            error!("{} bridge has no sockets to wait on", self.family);
            return;
        }

        loop {
            let (index, guard) = notifier.ready().await;
            let mut guard = match guard {
                Ok(guard) => guard,
                Err(err) => {
                    error!("{} notifier wait failed: {}", self.family, err);
                    continue;
                }
            };

            let interface = &self.shared.interfaces[index];
            let Some(socket) = interface.socket(self.family) else {
                continue;
            };

            match self.recv.recv_from(socket) {
                Ok(_) => {
                    // Leave readiness asserted: there may be more
                    // datagrams queued on this socket.
                    drop(guard);
                    self.process(index);
                }
                Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    guard.clear_ready();
                }
                Err(err) => {
                    guard.clear_ready();
                    warn!("recvfrom error on interface {}: {}", interface.name, err);
                }
            }
        }
    }

    /// Handle one received datagram: decode and filter, then fan out to
    /// peers, encoding once per distinct outbound filter variant.
    fn process(&mut self, ingress: usize) {
        let fi = self.family.index();
        let interfaces = &self.shared.interfaces;
        let iface = &interfaces[ingress];

        if self.shared.filtering_enabled {
            let inbound = InboundFilters {
                global: self.shared.global_filter.as_deref(),
                interface: iface.inbound_filter.as_deref(),
            };
            if let Err(err) = self.state.decode(&self.recv, inbound, self.shared.warn) {
                warn!(
                    "host {} error decoding packet: {}",
                    self.recv.src_display(),
                    err
                );
                return;
            }
            if self.state.is_empty() {
                return;
            }
        }

        // Peers without outbound filters get the received bytes as-is,
        // unless decoding dropped something: then the datagram is
        // re-encoded so only the kept records go out.
        if iface.peer_nofilter_count[fi] > 0 {
            let needs_clean = self.shared.filtering_enabled && self.state.any_filtered();
            let mut clean_ok = true;
            if needs_clean {
                if let Err(err) = self.state.encode(&self.recv, &mut self.send, None) {
                    warn!(
                        "host {} error re-encoding packet: {}",
                        self.recv.src_display(),
                        err
                    );
                    clean_ok = false;
                }
            }

            if clean_ok {
                for &peer_index in &iface.peers[fi] {
                    let peer = &interfaces[peer_index];
                    if peer.outbound_filter.is_some() {
                        continue;
                    }
                    let payload = if needs_clean {
                        self.send.data()
                    } else {
                        self.recv.data()
                    };
                    self.dispatch(peer, payload);
                }
            }
        }

        // One encode per distinct outbound filter variant, shared by
        // every peer carrying that variant.
        for variant in &iface.peer_filter_variants[fi] {
            match self.state.encode(&self.recv, &mut self.send, Some(variant.as_ref())) {
                Ok(0) => continue,
                Ok(_) => {
                    for &peer_index in &iface.peers[fi] {
                        let peer = &interfaces[peer_index];
                        let matches = peer
                            .outbound_filter
                            .as_ref()
                            .is_some_and(|list| Arc::ptr_eq(list, variant));
                        if matches {
                            self.dispatch(peer, self.send.data());
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "host {} error encoding packet: {}",
                        self.recv.src_display(),
                        err
                    );
                }
            }
        }
    }

    /// Send one datagram to a peer's multicast group.
    fn dispatch(&self, peer: &Interface, payload: &[u8]) {
        let Some(socket) = peer.socket(self.family) else {
            return;
        };
        let dst: SockAddr = match self.family {
            IpFamily::V4 => SocketAddrV4::new(MDNS_V4_GROUP, MDNS_PORT).into(),
            // The scope id routes the datagram out the peer's link.
            IpFamily::V6 => SocketAddrV6::new(MDNS_V6_GROUP, MDNS_PORT, 0, peer.if_index).into(),
        };
        if let Err(err) = socket.send_to(payload, &dst) {
            warn!("sendto error on interface {}: {}", peer.name, err);
        }
    }
}
