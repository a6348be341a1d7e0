//! Link-layer slicing down to TCP payloads.
//!
//! Supported link types:
//!
//! | Link type | Value         | Handling                            |
//! |-----------|---------------|-------------------------------------|
//! | Ethernet  | 1             | 802.1Q / 802.1ad tags are skipped   |
//! | Raw IP    | 101, 228, 229 | version taken from the first nibble |
//! | Linux SLL | 113           | 16-byte cooked header               |

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use etherparse::{Ethernet2HeaderSlice, Ipv4HeaderSlice, Ipv6HeaderSlice, TcpHeaderSlice};

/// Link-layer header types we can slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    RawIp,
    LinuxSll,
}

impl LinkType {
    pub const ETHERNET: u32 = 1;
    pub const RAW: u32 = 101;
    pub const LINUX_SLL: u32 = 113;
    pub const IPV4: u32 = 228;
    pub const IPV6: u32 = 229;

    pub fn from_pcap(link_type: u32) -> Option<Self> {
        match link_type {
            Self::ETHERNET => Some(LinkType::Ethernet),
            Self::RAW | Self::IPV4 | Self::IPV6 => Some(LinkType::RawIp),
            Self::LINUX_SLL => Some(LinkType::LinuxSll),
            _ => None,
        }
    }
}

mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const IPV6: u16 = 0x86DD;
    pub const VLAN: u16 = 0x8100;
    pub const QINQ: u16 = 0x88A8;
}

const TCP: u8 = 6;
const VLAN_TAG_LEN: usize = 4;
const LINUX_SLL_HEADER_LEN: usize = 16;

/// A TCP segment with its endpoints and (possibly empty) payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegment<'a> {
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub payload: &'a [u8],
}

impl TcpSegment<'_> {
    /// Whether either endpoint uses `port`.
    pub fn touches_port(&self, port: u16) -> bool {
        self.src.port() == port || self.dst.port() == port
    }
}

/// Why a packet yielded no segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// Well-formed, but not IP/TCP
    NotTcp,
    /// Header could not be parsed
    Malformed(String),
}

/// Slice a link-layer packet down to its TCP segment.
pub fn slice_tcp(link: LinkType, data: &[u8]) -> Result<TcpSegment<'_>, Skip> {
    match link {
        LinkType::Ethernet => {
            let eth = Ethernet2HeaderSlice::from_slice(data)
                .map_err(|e| Skip::Malformed(format!("Ethernet: {e}")))?;
            let mut ether_type = eth.ether_type().0;
            let mut rest = &data[eth.slice().len()..];
            while matches!(ether_type, ethertype::VLAN | ethertype::QINQ) {
                if rest.len() < VLAN_TAG_LEN {
                    return Err(Skip::Malformed("truncated VLAN tag".into()));
                }
                ether_type = u16::from_be_bytes([rest[2], rest[3]]);
                rest = &rest[VLAN_TAG_LEN..];
            }
            slice_ether_type(ether_type, rest)
        }
        LinkType::LinuxSll => {
            if data.len() < LINUX_SLL_HEADER_LEN {
                return Err(Skip::Malformed("truncated Linux SLL header".into()));
            }
            let protocol = u16::from_be_bytes([data[14], data[15]]);
            slice_ether_type(protocol, &data[LINUX_SLL_HEADER_LEN..])
        }
        LinkType::RawIp => match data.first().map(|b| b >> 4) {
            Some(4) => slice_ipv4(data),
            Some(6) => slice_ipv6(data),
            Some(_) => Err(Skip::NotTcp),
            None => Err(Skip::Malformed("empty packet".into())),
        },
    }
}

fn slice_ether_type(ether_type: u16, data: &[u8]) -> Result<TcpSegment<'_>, Skip> {
    match ether_type {
        ethertype::IPV4 => slice_ipv4(data),
        ethertype::IPV6 => slice_ipv6(data),
        _ => Err(Skip::NotTcp),
    }
}

fn slice_ipv4(data: &[u8]) -> Result<TcpSegment<'_>, Skip> {
    let ip =
        Ipv4HeaderSlice::from_slice(data).map_err(|e| Skip::Malformed(format!("IPv4: {e}")))?;
    if ip.protocol().0 != TCP {
        return Err(Skip::NotTcp);
    }
    // total_len excludes link-layer padding
    let end = usize::from(ip.total_len()).clamp(ip.slice().len(), data.len());
    let body = &data[ip.slice().len()..end];
    let src = IpAddr::V4(Ipv4Addr::from(ip.source()));
    let dst = IpAddr::V4(Ipv4Addr::from(ip.destination()));
    slice_tcp_header(src, dst, body)
}

fn slice_ipv6(data: &[u8]) -> Result<TcpSegment<'_>, Skip> {
    let ip =
        Ipv6HeaderSlice::from_slice(data).map_err(|e| Skip::Malformed(format!("IPv6: {e}")))?;
    // Extension headers are not followed
    if ip.next_header().0 != TCP {
        return Err(Skip::NotTcp);
    }
    let start = ip.slice().len();
    let end = (start + usize::from(ip.payload_length())).min(data.len());
    let src = IpAddr::V6(Ipv6Addr::from(ip.source()));
    let dst = IpAddr::V6(Ipv6Addr::from(ip.destination()));
    slice_tcp_header(src, dst, &data[start..end])
}

fn slice_tcp_header(src: IpAddr, dst: IpAddr, data: &[u8]) -> Result<TcpSegment<'_>, Skip> {
    let tcp =
        TcpHeaderSlice::from_slice(data).map_err(|e| Skip::Malformed(format!("TCP: {e}")))?;
    Ok(TcpSegment {
        src: SocketAddr::new(src, tcp.source_port()),
        dst: SocketAddr::new(dst, tcp.destination_port()),
        payload: &data[tcp.slice().len()..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TcpPacketBuilder;

    #[test]
    fn test_link_type_mapping() {
        assert_eq!(LinkType::from_pcap(1), Some(LinkType::Ethernet));
        assert_eq!(LinkType::from_pcap(101), Some(LinkType::RawIp));
        assert_eq!(LinkType::from_pcap(228), Some(LinkType::RawIp));
        assert_eq!(LinkType::from_pcap(229), Some(LinkType::RawIp));
        assert_eq!(LinkType::from_pcap(113), Some(LinkType::LinuxSll));
        assert_eq!(LinkType::from_pcap(127), None);
    }

    #[test]
    fn test_slice_ethernet_ipv4_tcp() {
        let packet = TcpPacketBuilder::to_server(b"hello".to_vec()).build();
        let segment = slice_tcp(LinkType::Ethernet, &packet).unwrap();

        assert_eq!(segment.src, "10.0.0.5:50123".parse::<SocketAddr>().unwrap());
        assert_eq!(segment.dst, "10.0.0.9:27017".parse::<SocketAddr>().unwrap());
        assert_eq!(segment.payload, b"hello");
        assert!(segment.touches_port(27017));
        assert!(!segment.touches_port(80));
    }

    #[test]
    fn test_ethernet_padding_is_trimmed() {
        let mut packet = TcpPacketBuilder::to_server(b"x".to_vec()).build();
        packet.extend_from_slice(&[0u8; 6]);
        let segment = slice_tcp(LinkType::Ethernet, &packet).unwrap();
        assert_eq!(segment.payload, b"x");
    }

    #[test]
    fn test_vlan_tag_skipped() {
        let plain = TcpPacketBuilder::to_client(b"reply".to_vec()).build();
        let mut tagged = plain[..12].to_vec();
        tagged.extend_from_slice(&[0x81, 0x00, 0x00, 0x64, 0x08, 0x00]);
        tagged.extend_from_slice(&plain[14..]);

        let segment = slice_tcp(LinkType::Ethernet, &tagged).unwrap();
        assert_eq!(segment.src.port(), 27017);
        assert_eq!(segment.payload, b"reply");
    }

    #[test]
    fn test_linux_sll_and_raw_ip() {
        let eth = TcpPacketBuilder::to_server(b"abc".to_vec()).build();
        let ip = &eth[14..];

        let mut sll = vec![0u8; 14];
        sll.extend_from_slice(&[0x08, 0x00]);
        sll.extend_from_slice(ip);
        assert_eq!(slice_tcp(LinkType::LinuxSll, &sll).unwrap().payload, b"abc");

        assert_eq!(slice_tcp(LinkType::RawIp, ip).unwrap().payload, b"abc");
    }

    #[test]
    fn test_ipv6_tcp() {
        let mut packet = vec![0x60, 0, 0, 0];
        packet.extend_from_slice(&(20u16 + 2).to_be_bytes()); // payload length
        packet.push(6); // next header: TCP
        packet.push(64);
        packet.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        packet.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        // TCP header
        packet.extend_from_slice(&40000u16.to_be_bytes());
        packet.extend_from_slice(&27017u16.to_be_bytes());
        packet.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 0, 0x50, 0x18, 0xff, 0xff, 0, 0, 0, 0]);
        packet.extend_from_slice(b"hi");

        let segment = slice_tcp(LinkType::RawIp, &packet).unwrap();
        assert_eq!(segment.dst, "[::1]:27017".parse::<SocketAddr>().unwrap());
        assert_eq!(segment.payload, b"hi");
    }

    #[test]
    fn test_non_tcp_and_malformed() {
        let mut udp = TcpPacketBuilder::to_server(vec![]).build();
        udp[23] = 17;
        assert_eq!(slice_tcp(LinkType::Ethernet, &udp), Err(Skip::NotTcp));

        let mut arp = TcpPacketBuilder::to_server(vec![]).build();
        arp[12..14].copy_from_slice(&[0x08, 0x06]);
        assert_eq!(slice_tcp(LinkType::Ethernet, &arp), Err(Skip::NotTcp));

        assert!(matches!(
            slice_tcp(LinkType::Ethernet, &[0u8; 5]),
            Err(Skip::Malformed(_))
        ));
        assert!(matches!(
            slice_tcp(LinkType::LinuxSll, &[0u8; 10]),
            Err(Skip::Malformed(_))
        ));
    }
}
