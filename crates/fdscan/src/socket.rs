#![forbid(unsafe_code)]

use crate::error::Error;
use crate::sockaddr::{SocketAddress, format_address};
use crate::sys;
use nix::errno::Errno;
use std::borrow::Cow;
use std::fmt;
use std::os::fd::{BorrowedFd, RawFd};
use tracing::trace;

/// Integer socket options (at `SOL_SOCKET` level) needed to describe a
/// socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketOption {
    Domain,
    Type,
    Protocol,
    AcceptConn,
}

impl fmt::Display for SocketOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SocketOption::Domain => "SO_DOMAIN",
            SocketOption::Type => "SO_TYPE",
            SocketOption::Protocol => "SO_PROTOCOL",
            SocketOption::AcceptConn => "SO_ACCEPTCONN",
        })
    }
}

/// Source of socket parameters for a usable (local) socket fd.
///
/// [`SystemProbe`] asks the kernel; tests substitute probes that fail on
/// purpose.
pub trait SocketProbe {
    fn int_option(&self, fd: BorrowedFd<'_>, option: SocketOption) -> Result<i32, Errno>;

    /// Local name of the socket, `None` when the kernel reports no family.
    fn local_address(&self, fd: BorrowedFd<'_>) -> Result<Option<SocketAddress>, Errno>;

    /// Name of the connected peer. Unconnected sockets fail with `ENOTCONN`.
    fn peer_address(&self, fd: BorrowedFd<'_>) -> Result<Option<SocketAddress>, Errno>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl SocketProbe for SystemProbe {
    fn int_option(&self, fd: BorrowedFd<'_>, option: SocketOption) -> Result<i32, Errno> {
        sys::socket_option(fd, option)
    }

    fn local_address(&self, fd: BorrowedFd<'_>) -> Result<Option<SocketAddress>, Errno> {
        sys::getsockname(fd).map(|raw| SocketAddress::from_raw(&raw))
    }

    fn peer_address(&self, fd: BorrowedFd<'_>) -> Result<Option<SocketAddress>, Errno> {
        sys::getpeername(fd).map(|raw| SocketAddress::from_raw(&raw))
    }
}

/// Communication domain (address family) of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Domain(pub i32);

/// Communication semantics of a socket, the `type` argument of socket(2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketType(pub i32);

/// Protocol number; only meaningful within its [`Domain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Protocol(pub i32);

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match lookup(DOMAIN_NAMES, self.0) {
            Some(name) => f.write_str(name),
            None => write!(f, "domain {}", self.0),
        }
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match lookup(TYPE_NAMES, self.0) {
            Some(name) => f.write_str(name),
            None => write!(f, "type {}", self.0),
        }
    }
}

impl Protocol {
    pub fn name(self, domain: Domain) -> Cow<'static, str> {
        let table = match domain.0 {
            AF_INET | AF_INET6 => IPPROTO_NAMES,
            AF_NETLINK => NETLINK_NAMES,
            _ => &[],
        };
        match lookup(table, self.0) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("protocol {}", self.0)),
        }
    }
}

/// Socket-specific part of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketDetails {
    pub ino: u64,
    pub domain: Domain,
    pub sock_type: SocketType,
    pub protocol: Protocol,
    pub listening: bool,
    pub local: Option<SocketAddress>,
    pub peer: Option<SocketAddress>,
}

impl SocketDetails {
    /// Queries the socket parameters of `fd`, which is reported as `number`
    /// (they differ for sockets duplicated from other processes).
    ///
    /// Domain, type and protocol must be available for every socket. Whether
    /// the socket listens and its addresses are left unset when the socket's
    /// family doesn't support the query or the socket is unbound or
    /// unconnected.
    pub fn query<P: SocketProbe + ?Sized>(
        probe: &P,
        number: RawFd,
        fd: BorrowedFd<'_>,
        ino: u64,
    ) -> Result<Self, Error> {
        let option = |option| {
            probe
                .int_option(fd, option)
                .map_err(|source| Error::SocketOption {
                    fd: number,
                    option,
                    source,
                })
        };
        let domain = Domain(option(SocketOption::Domain)?);
        let sock_type = SocketType(option(SocketOption::Type)?);
        let protocol = Protocol(option(SocketOption::Protocol)?);

        let listening = match probe.int_option(fd, SocketOption::AcceptConn) {
            Ok(value) => value > 0,
            Err(err) => {
                trace!(fd = number, ?err, "SO_ACCEPTCONN not available");
                false
            }
        };
        let local = probe.local_address(fd).unwrap_or_else(|err| {
            trace!(fd = number, ?err, "Socket has no local address");
            None
        });
        let peer = probe.peer_address(fd).unwrap_or_else(|err| {
            trace!(fd = number, ?err, "Socket has no peer address");
            None
        });

        Ok(Self {
            ino,
            domain,
            sock_type,
            protocol,
            listening,
            local,
            peer,
        })
    }

    /// Detail lines describing this socket, without indentation.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(3);
        lines.push(format!(
            "{}socket({}, {}, {}), ino {}",
            if self.listening { "listening " } else { "" },
            self.domain,
            self.sock_type,
            self.protocol.name(self.domain),
            self.ino
        ));
        lines.push(format!("local {:?}", format_address(self.local.as_ref())));
        if let Some(peer) = &self.peer {
            lines.push(format!("peer {:?}", peer.to_string()));
        }
        lines
    }
}

fn lookup(table: &[(i32, &'static str)], value: i32) -> Option<&'static str> {
    table
        .iter()
        .find(|(known, _)| *known == value)
        .map(|(_, name)| *name)
}

const AF_INET: i32 = 2;
const AF_INET6: i32 = 10;
const AF_NETLINK: i32 = 16;

// <linux/socket.h>
const DOMAIN_NAMES: &[(i32, &str)] = &[
    (0, "AF_UNSPEC"),
    (1, "AF_UNIX"),
    (2, "AF_INET"),
    (3, "AF_AX25"),
    (4, "AF_IPX"),
    (5, "AF_APPLETALK"),
    (6, "AF_NETROM"),
    (7, "AF_BRIDGE"),
    (8, "AF_ATMPVC"),
    (9, "AF_X25"),
    (10, "AF_INET6"),
    (11, "AF_ROSE"),
    (12, "AF_DECnet"),
    (13, "AF_NETBEUI"),
    (14, "AF_SECURITY"),
    (15, "AF_KEY"),
    (16, "AF_NETLINK"),
    (17, "AF_PACKET"),
    (18, "AF_ASH"),
    (19, "AF_ECONET"),
    (20, "AF_ATMSVC"),
    (21, "AF_RDS"),
    (22, "AF_SNA"),
    (23, "AF_IRDA"),
    (24, "AF_PPPOX"),
    (25, "AF_WANPIPE"),
    (26, "AF_LLC"),
    (27, "AF_IB"),
    (28, "AF_MPLS"),
    (29, "AF_CAN"),
    (30, "AF_TIPC"),
    (31, "AF_BLUETOOTH"),
    (32, "AF_IUCV"),
    (33, "AF_RXRPC"),
    (34, "AF_ISDN"),
    (35, "AF_PHONET"),
    (36, "AF_IEEE802154"),
    (37, "AF_CAIF"),
    (38, "AF_ALG"),
    (39, "AF_NFC"),
    (40, "AF_VSOCK"),
    (41, "AF_KCM"),
    (42, "AF_QIPCRTR"),
    (43, "AF_SMC"),
    (44, "AF_XDP"),
    (45, "AF_MCTP"),
];

const TYPE_NAMES: &[(i32, &str)] = &[
    (1, "SOCK_STREAM"),
    (2, "SOCK_DGRAM"),
    (3, "SOCK_RAW"),
    (4, "SOCK_RDM"),
    (5, "SOCK_SEQPACKET"),
    (6, "SOCK_DCCP"),
    (10, "SOCK_PACKET"),
];

// <linux/in.h>, <linux/in6.h>
const IPPROTO_NAMES: &[(i32, &str)] = &[
    (0, "IPPROTO_IP"),
    (1, "IPPROTO_ICMP"),
    (2, "IPPROTO_IGMP"),
    (4, "IPPROTO_IPIP"),
    (6, "IPPROTO_TCP"),
    (8, "IPPROTO_EGP"),
    (12, "IPPROTO_PUP"),
    (17, "IPPROTO_UDP"),
    (22, "IPPROTO_IDP"),
    (29, "IPPROTO_TP"),
    (33, "IPPROTO_DCCP"),
    (41, "IPPROTO_IPV6"),
    (43, "IPPROTO_ROUTING"),
    (44, "IPPROTO_FRAGMENT"),
    (46, "IPPROTO_RSVP"),
    (47, "IPPROTO_GRE"),
    (50, "IPPROTO_ESP"),
    (51, "IPPROTO_AH"),
    (58, "IPPROTO_ICMPV6"),
    (59, "IPPROTO_NONE"),
    (60, "IPPROTO_DSTOPTS"),
    (92, "IPPROTO_MTP"),
    (94, "IPPROTO_BEETPH"),
    (98, "IPPROTO_ENCAP"),
    (103, "IPPROTO_PIM"),
    (108, "IPPROTO_COMP"),
    (115, "IPPROTO_L2TP"),
    (132, "IPPROTO_SCTP"),
    (135, "IPPROTO_MH"),
    (136, "IPPROTO_UDPLITE"),
    (137, "IPPROTO_MPLS"),
    (143, "IPPROTO_ETHERNET"),
    (255, "IPPROTO_RAW"),
    (262, "IPPROTO_MPTCP"),
];

// <linux/netlink.h>
const NETLINK_NAMES: &[(i32, &str)] = &[
    (0, "NETLINK_ROUTE"),
    (1, "NETLINK_UNUSED"),
    (2, "NETLINK_USERSOCK"),
    (3, "NETLINK_FIREWALL"),
    (4, "NETLINK_SOCK_DIAG"),
    (5, "NETLINK_NFLOG"),
    (6, "NETLINK_XFRM"),
    (7, "NETLINK_SELINUX"),
    (8, "NETLINK_ISCSI"),
    (9, "NETLINK_AUDIT"),
    (10, "NETLINK_FIB_LOOKUP"),
    (11, "NETLINK_CONNECTOR"),
    (12, "NETLINK_NETFILTER"),
    (13, "NETLINK_IP6_FW"),
    (14, "NETLINK_DNRTMSG"),
    (15, "NETLINK_KOBJECT_UEVENT"),
    (16, "NETLINK_GENERIC"),
    (18, "NETLINK_SCSITRANSPORT"),
    (19, "NETLINK_ECRYPTFS"),
    (20, "NETLINK_RDMA"),
    (21, "NETLINK_CRYPTO"),
    (22, "NETLINK_SMC"),
];
