#![forbid(unsafe_code)]

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

// Address family numbers from <linux/socket.h>.
pub(crate) const AF_UNIX: u16 = 1;
pub(crate) const AF_INET: u16 = 2;
pub(crate) const AF_INET6: u16 = 10;
pub(crate) const AF_NETLINK: u16 = 16;
pub(crate) const AF_PACKET: u16 = 17;
pub(crate) const AF_VSOCK: u16 = 40;
pub(crate) const AF_XDP: u16 = 44;

/// A socket address ("name") as returned by getsockname(2) and
/// getpeername(2), for the address families we know how to render.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SocketAddress {
    Inet(SocketAddrV4),
    Inet6(SocketAddrV6),
    /// Path name of a unix domain socket; abstract names start with `@`,
    /// unnamed sockets are just `@`.
    Unix(String),
    LinkLayer(LinkLayerAddress),
    Netlink(NetlinkAddress),
    Vsock(VsockAddress),
    Xdp(XdpAddress),
    Other { family: u16, data: Vec<u8> },
}

/// `sockaddr_ll`, see packet(7).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkLayerAddress {
    /// Ethernet protocol type, in host byte order.
    pub protocol: u16,
    pub ifindex: i32,
    pub hatype: u16,
    pub pkttype: u8,
    /// Physical-layer address, `sll_halen` bytes long.
    pub addr: Vec<u8>,
}

/// `sockaddr_nl`, see netlink(7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetlinkAddress {
    pub pid: u32,
    pub groups: u32,
}

/// `sockaddr_vm`, see vsock(7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VsockAddress {
    pub port: u32,
    pub cid: u32,
    pub flags: u8,
}

/// `sockaddr_xdp`, see `<linux/if_xdp.h>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XdpAddress {
    pub flags: u16,
    pub ifindex: u32,
    pub queue_id: u32,
    pub shared_umem_fd: u32,
}

impl SocketAddress {
    /// Decodes the first `addrlen` bytes of a kernel `sockaddr_storage`.
    /// Returns `None` when the buffer doesn't even carry an address family.
    pub fn from_raw(buf: &[u8]) -> Option<Self> {
        let family = u16::from_ne_bytes(read(buf, 0)?);
        let decoded = match family {
            AF_INET => decode_inet(buf),
            AF_INET6 => decode_inet6(buf),
            AF_UNIX => Some(SocketAddress::Unix(decode_unix(buf))),
            AF_PACKET => decode_link_layer(buf),
            AF_NETLINK => decode_netlink(buf),
            AF_VSOCK => decode_vsock(buf),
            AF_XDP => decode_xdp(buf),
            _ => None,
        };
        Some(decoded.unwrap_or_else(|| SocketAddress::Other {
            family,
            data: buf[2..].to_vec(),
        }))
    }

    pub fn family(&self) -> u16 {
        match self {
            SocketAddress::Inet(_) => AF_INET,
            SocketAddress::Inet6(_) => AF_INET6,
            SocketAddress::Unix(_) => AF_UNIX,
            SocketAddress::LinkLayer(_) => AF_PACKET,
            SocketAddress::Netlink(_) => AF_NETLINK,
            SocketAddress::Vsock(_) => AF_VSOCK,
            SocketAddress::Xdp(_) => AF_XDP,
            SocketAddress::Other { family, .. } => *family,
        }
    }
}

/// Renders an optional address, an absent address being the empty string.
pub fn format_address(addr: Option<&SocketAddress>) -> String {
    addr.map(ToString::to_string).unwrap_or_default()
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketAddress::Inet(addr) => write!(f, "{}:{}", addr.ip(), addr.port()),
            SocketAddress::Inet6(addr) => {
                // Zones only exist at runtime, typically for link-local
                // addresses; the scope is part of the address itself.
                if addr.scope_id() == 0 {
                    write!(f, "[{}]:{}", addr.ip(), addr.port())
                } else {
                    write!(f, "[{}%{}]:{}", addr.ip(), addr.scope_id(), addr.port())
                }
            }
            SocketAddress::Unix(name) => f.write_str(name),
            SocketAddress::LinkLayer(addr) => addr.fmt(f),
            SocketAddress::Netlink(addr) => addr.fmt(f),
            SocketAddress::Vsock(addr) => addr.fmt(f),
            SocketAddress::Xdp(addr) => addr.fmt(f),
            other @ SocketAddress::Other { .. } => write!(f, "{other:?}"),
        }
    }
}

impl fmt::Display for LinkLayerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hw = self
            .addr
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":");
        write!(f, "{hw} (HW address type 0x{:x})\nprotocol ", self.hatype)?;
        match lookup(ETH_P_NAMES, self.protocol) {
            Some(name) => f.write_str(name)?,
            None => write!(f, "0x{:x}", self.protocol)?,
        }
        write!(f, ", interface index {}, packet type ", self.ifindex)?;
        match lookup(PACKET_TYPE_NAMES, self.pkttype) {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.pkttype),
        }
    }
}

impl fmt::Display for NetlinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pid == 0 {
            f.write_str("kernel")?;
        } else {
            write!(f, "(p)id {}", self.pid)?;
        }
        write!(f, ", multicast groups mask 0x{:x}", self.groups)
    }
}

impl fmt::Display for VsockAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {}, ", self.port)?;
        match self.cid {
            VMADDR_CID_HYPERVISOR => f.write_str("VMADDR_CID_HYPERVISOR")?,
            VMADDR_CID_LOCAL => f.write_str("VMADDR_CID_LOCAL")?,
            VMADDR_CID_HOST => f.write_str("VMADDR_CID_HOST")?,
            VMADDR_CID_ANY => f.write_str("VMADDR_CID_ANY")?,
            cid => write!(f, "CID {cid}")?,
        }
        write!(f, ", flags {}", self.flags)
    }
}

impl fmt::Display for XdpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = XDP_FLAG_NAMES
            .iter()
            .enumerate()
            .filter(|(bit, _)| self.flags & (1 << bit) != 0)
            .map(|(_, name)| *name)
            .collect::<Vec<_>>();
        write!(f, "flags: 0x{:x}", self.flags)?;
        if !names.is_empty() {
            write!(f, " ({})", names.join(","))?;
        }
        write!(
            f,
            ", ifindex: {}, queue ID: {}, shared umem fd: {}",
            self.ifindex, self.queue_id, self.shared_umem_fd
        )
    }
}

fn read<const N: usize>(buf: &[u8], offset: usize) -> Option<[u8; N]> {
    buf.get(offset..offset + N)?.try_into().ok()
}

fn decode_inet(buf: &[u8]) -> Option<SocketAddress> {
    let port = u16::from_be_bytes(read(buf, 2)?);
    let ip = Ipv4Addr::from(read::<4>(buf, 4)?);
    Some(SocketAddress::Inet(SocketAddrV4::new(ip, port)))
}

fn decode_inet6(buf: &[u8]) -> Option<SocketAddress> {
    let port = u16::from_be_bytes(read(buf, 2)?);
    let flowinfo = u32::from_be_bytes(read(buf, 4)?);
    let ip = Ipv6Addr::from(read::<16>(buf, 8)?);
    let scope_id = u32::from_ne_bytes(read(buf, 24)?);
    Some(SocketAddress::Inet6(SocketAddrV6::new(
        ip, port, flowinfo, scope_id,
    )))
}

fn decode_unix(buf: &[u8]) -> String {
    let path = buf.get(2..).unwrap_or_default();
    let (prefix, rest) = match path.split_first() {
        None => ("@", path),
        Some((0, rest)) => ("@", rest),
        Some(_) => ("", path),
    };
    let end = rest.iter().position(|b| *b == 0).unwrap_or(rest.len());
    format!("{prefix}{}", String::from_utf8_lossy(&rest[..end]))
}

fn decode_link_layer(buf: &[u8]) -> Option<SocketAddress> {
    let protocol = u16::from_be_bytes(read(buf, 2)?);
    let ifindex = i32::from_ne_bytes(read(buf, 4)?);
    let hatype = u16::from_ne_bytes(read(buf, 8)?);
    let [pkttype, halen] = read::<2>(buf, 10)?;
    let halen = usize::from(halen).min(8);
    let addr = buf.get(12..12 + halen)?.to_vec();
    Some(SocketAddress::LinkLayer(LinkLayerAddress {
        protocol,
        ifindex,
        hatype,
        pkttype,
        addr,
    }))
}

fn decode_netlink(buf: &[u8]) -> Option<SocketAddress> {
    Some(SocketAddress::Netlink(NetlinkAddress {
        pid: u32::from_ne_bytes(read(buf, 4)?),
        groups: u32::from_ne_bytes(read(buf, 8)?),
    }))
}

fn decode_vsock(buf: &[u8]) -> Option<SocketAddress> {
    Some(SocketAddress::Vsock(VsockAddress {
        port: u32::from_ne_bytes(read(buf, 4)?),
        cid: u32::from_ne_bytes(read(buf, 8)?),
        flags: read::<1>(buf, 12)?[0],
    }))
}

fn decode_xdp(buf: &[u8]) -> Option<SocketAddress> {
    Some(SocketAddress::Xdp(XdpAddress {
        flags: u16::from_ne_bytes(read(buf, 2)?),
        ifindex: u32::from_ne_bytes(read(buf, 4)?),
        queue_id: u32::from_ne_bytes(read(buf, 8)?),
        shared_umem_fd: u32::from_ne_bytes(read(buf, 12)?),
    }))
}

fn lookup<T: PartialEq + Copy>(table: &[(T, &'static str)], value: T) -> Option<&'static str> {
    table
        .iter()
        .find(|(known, _)| *known == value)
        .map(|(_, name)| *name)
}

const VMADDR_CID_HYPERVISOR: u32 = 0;
const VMADDR_CID_LOCAL: u32 = 1;
const VMADDR_CID_HOST: u32 = 2;
const VMADDR_CID_ANY: u32 = u32::MAX;

/// AF_XDP socket address flags, indexed by bit number.
const XDP_FLAG_NAMES: &[&str] = &[
    "XDP_SHARED_UMEM",
    "XDP_COPY",
    "XDP_ZEROCOPY",
    "XDP_USE_NEED_WAKEUP",
    "XDP_USE_SG",
];

// <linux/if_packet.h>
const PACKET_TYPE_NAMES: &[(u8, &str)] = &[
    (0, "PACKET_HOST"),
    (1, "PACKET_BROADCAST"),
    (2, "PACKET_MULTICAST"),
    (3, "PACKET_OTHERHOST"),
    (4, "PACKET_OUTGOING"),
    (5, "PACKET_LOOPBACK"),
    (6, "PACKET_USER"),
    (7, "PACKET_KERNEL"),
];

// <linux/if_ether.h>
const ETH_P_NAMES: &[(u16, &str)] = &[
    (0x0001, "ETH_P_802_3"),
    (0x0002, "ETH_P_AX25"),
    (0x0003, "ETH_P_ALL"),
    (0x0004, "ETH_P_802_2"),
    (0x0005, "ETH_P_SNAP"),
    (0x0006, "ETH_P_DDCMP"),
    (0x0007, "ETH_P_WAN_PPP"),
    (0x0008, "ETH_P_PPP_MP"),
    (0x0009, "ETH_P_LOCALTALK"),
    (0x000C, "ETH_P_CAN"),
    (0x000D, "ETH_P_CANFD"),
    (0x0010, "ETH_P_PPPTALK"),
    (0x0011, "ETH_P_TR_802_2"),
    (0x0015, "ETH_P_MOBITEX"),
    (0x0016, "ETH_P_CONTROL"),
    (0x0017, "ETH_P_IRDA"),
    (0x0018, "ETH_P_ECONET"),
    (0x0019, "ETH_P_HDLC"),
    (0x001A, "ETH_P_ARCNET"),
    (0x001B, "ETH_P_DSA"),
    (0x001C, "ETH_P_TRAILER"),
    (0x0060, "ETH_P_LOOP"),
    (0x00F5, "ETH_P_PHONET"),
    (0x00F6, "ETH_P_IEEE802154"),
    (0x00F7, "ETH_P_CAIF"),
    (0x00F8, "ETH_P_XDSA"),
    (0x00F9, "ETH_P_MAP"),
    (0x00FA, "ETH_P_MCTP"),
    (0x0200, "ETH_P_PUP"),
    (0x0201, "ETH_P_PUPAT"),
    (0x0600, "ETH_P_802_3_MIN"),
    (0x0800, "ETH_P_IP"),
    (0x0805, "ETH_P_X25"),
    (0x0806, "ETH_P_ARP"),
    (0x08FF, "ETH_P_BPQ"),
    (0x0A00, "ETH_P_IEEEPUP"),
    (0x0A01, "ETH_P_IEEEPUPAT"),
    (0x22EB, "ETH_P_ERSPAN2"),
    (0x22F0, "ETH_P_TSN"),
    (0x4305, "ETH_P_BATMAN"),
    (0x6000, "ETH_P_DEC"),
    (0x6001, "ETH_P_DNA_DL"),
    (0x6002, "ETH_P_DNA_RC"),
    (0x6003, "ETH_P_DNA_RT"),
    (0x6004, "ETH_P_LAT"),
    (0x6005, "ETH_P_DIAG"),
    (0x6006, "ETH_P_CUST"),
    (0x6007, "ETH_P_SCA"),
    (0x6558, "ETH_P_TEB"),
    (0x8035, "ETH_P_RARP"),
    (0x809B, "ETH_P_ATALK"),
    (0x80F3, "ETH_P_AARP"),
    (0x8100, "ETH_P_8021Q"),
    (0x8137, "ETH_P_IPX"),
    (0x86DD, "ETH_P_IPV6"),
    (0x8808, "ETH_P_PAUSE"),
    (0x8809, "ETH_P_SLOW"),
    (0x883E, "ETH_P_WCCP"),
    (0x8847, "ETH_P_MPLS_UC"),
    (0x8848, "ETH_P_MPLS_MC"),
    (0x884C, "ETH_P_ATMMPOA"),
    (0x8863, "ETH_P_PPP_DISC"),
    (0x8864, "ETH_P_PPP_SES"),
    (0x886C, "ETH_P_LINK_CTL"),
    (0x8884, "ETH_P_ATMFATE"),
    (0x888E, "ETH_P_PAE"),
    (0x88A2, "ETH_P_AOE"),
    (0x88A8, "ETH_P_8021AD"),
    (0x88B5, "ETH_P_802_EX1"),
    (0x88BE, "ETH_P_ERSPAN"),
    (0x88C7, "ETH_P_PREAUTH"),
    (0x88CA, "ETH_P_TIPC"),
    (0x88CC, "ETH_P_LLDP"),
    (0x88E3, "ETH_P_MRP"),
    (0x88E5, "ETH_P_MACSEC"),
    (0x88E7, "ETH_P_8021AH"),
    (0x88F5, "ETH_P_MVRP"),
    (0x88F7, "ETH_P_1588"),
    (0x88F8, "ETH_P_NCSI"),
    (0x88FB, "ETH_P_PRP"),
    (0x8902, "ETH_P_CFM"),
    (0x8906, "ETH_P_FCOE"),
    (0x890D, "ETH_P_TDLS"),
    (0x8914, "ETH_P_FIP"),
    (0x8915, "ETH_P_IBOE"),
    (0x8917, "ETH_P_80221"),
    (0x892F, "ETH_P_HSR"),
    (0x894F, "ETH_P_NSH"),
    (0x9000, "ETH_P_LOOPBACK"),
    (0x9100, "ETH_P_QINQ1"),
    (0x9200, "ETH_P_QINQ2"),
    (0x9300, "ETH_P_QINQ3"),
    (0xDADA, "ETH_P_EDSA"),
    (0xDADB, "ETH_P_DSA_8021Q"),
    (0xED3E, "ETH_P_IFE"),
    (0xFBFB, "ETH_P_AF_IUCV"),
];
