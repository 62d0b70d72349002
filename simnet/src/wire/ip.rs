use core::{fmt, str::FromStr};

use super::{EthernetAddress, Ipv4Address, Ipv6Address};
use super::error::{ParseAddressError, ParseAddressErrorKind};

enum_with_unknown! {
    /// IP datagram encapsulated protocol.
    pub enum Protocol(u8) {
        Icmp      = 0x01,
        Tcp       = 0x06,
        Udp       = 0x11,
        Icmpv6    = 0x3a,
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Icmp        => write!(f, "ICMP"),
            Protocol::Tcp         => write!(f, "TCP"),
            Protocol::Udp         => write!(f, "UDP"),
            Protocol::Icmpv6      => write!(f, "ICMPv6"),
            Protocol::Unknown(id) => write!(f, "0x{:02x}", id)
        }
    }
}

/// The family of an address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Family {
    /// Six-octet hardware addresses.
    Mac,
    /// Internet Protocol version 4.
    Ipv4,
    /// Internet Protocol version 6.
    Ipv6,
}

impl Family {
    /// The number of octets of an address of this family.
    pub fn byte_len(self) -> usize {
        match self {
            Family::Mac => 6,
            Family::Ipv4 => 4,
            Family::Ipv6 => 16,
        }
    }

    /// The number of bits of an address of this family.
    pub fn bits(self) -> usize {
        self.byte_len() * 8
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Family::Mac => write!(f, "MAC"),
            Family::Ipv4 => write!(f, "IPv4"),
            Family::Ipv6 => write!(f, "IPv6"),
        }
    }
}

/// An address of any supported family.
///
/// Neighbor caches, routes and contacts store addresses of different families side by side.
/// Equality and ordering compare the family first and then the octets.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Address {
    /// A hardware address.
    Mac(EthernetAddress),
    /// An IPv4 address.
    Ipv4(Ipv4Address),
    /// An IPv6 address.
    Ipv6(Ipv6Address),
}

impl Address {
    /// The all-zero address of a family, which acts as the wildcard.
    pub fn unspecified(family: Family) -> Address {
        match family {
            Family::Mac => Address::Mac(EthernetAddress::default()),
            Family::Ipv4 => Address::Ipv4(Ipv4Address::UNSPECIFIED),
            Family::Ipv6 => Address::Ipv6(Ipv6Address::UNSPECIFIED),
        }
    }

    /// Construct an address from its octets.
    ///
    /// Fails if the slice does not have the length of the family.
    pub fn from_bytes(family: Family, data: &[u8]) -> Result<Address, ParseAddressError> {
        if data.len() != family.byte_len() {
            return Err(ParseAddressErrorKind::Length.into());
        }
        Ok(match family {
            Family::Mac => Address::Mac(EthernetAddress::from_bytes(data)),
            Family::Ipv4 => Address::Ipv4(Ipv4Address::from_bytes(data)),
            Family::Ipv6 => Address::Ipv6(Ipv6Address::from_bytes(data)),
        })
    }

    /// The family of this address.
    pub fn family(&self) -> Family {
        match self {
            Address::Mac(_) => Family::Mac,
            Address::Ipv4(_) => Family::Ipv4,
            Address::Ipv6(_) => Family::Ipv6,
        }
    }

    /// The octets, most significant first.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Address::Mac(addr) => addr.as_bytes(),
            Address::Ipv4(addr) => addr.as_bytes(),
            Address::Ipv6(addr) => addr.as_bytes(),
        }
    }

    /// Query whether every octet is zero.
    pub fn is_unspecified(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }

    /// Query whether this is the limited broadcast of its family.
    ///
    /// IPv6 has no broadcast address.
    pub fn is_broadcast(&self) -> bool {
        match self {
            Address::Mac(addr) => addr.is_broadcast(),
            Address::Ipv4(addr) => addr.is_broadcast(),
            Address::Ipv6(_) => false,
        }
    }

    /// Query whether this is a multicast address.
    pub fn is_multicast(&self) -> bool {
        match self {
            Address::Mac(addr) => addr.is_multicast(),
            Address::Ipv4(addr) => addr.is_multicast(),
            Address::Ipv6(addr) => addr.is_multicast(),
        }
    }

    /// The number of leading bits both addresses share.
    ///
    /// Addresses of different families share no bits.
    pub fn common_prefix_len(&self, other: &Address) -> usize {
        if self.family() != other.family() {
            return 0;
        }

        let mut bits = 0;
        for (a, b) in self.as_bytes().iter().zip(other.as_bytes()) {
            let diff = a ^ b;
            bits += diff.leading_zeros() as usize;
            if diff != 0 {
                break;
            }
        }
        bits
    }

    /// Check if the text is an address of any family.
    pub fn validate(text: &str) -> bool {
        text.parse::<Address>().is_ok()
    }
}

impl From<EthernetAddress> for Address {
    fn from(addr: EthernetAddress) -> Self {
        Address::Mac(addr)
    }
}

impl From<Ipv4Address> for Address {
    fn from(addr: Ipv4Address) -> Self {
        Address::Ipv4(addr)
    }
}

impl From<Ipv6Address> for Address {
    fn from(addr: Ipv6Address) -> Self {
        Address::Ipv6(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Address::Mac(addr) => fmt::Display::fmt(addr, f),
            Address::Ipv4(addr) => fmt::Display::fmt(addr, f),
            Address::Ipv6(addr) => fmt::Display::fmt(addr, f),
        }
    }
}

/// Tries IPv4, then IPv6, then the hardware notations.
impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(src: &str) -> Result<Self, ParseAddressError> {
        if let Ok(addr) = src.parse::<Ipv4Address>() {
            return Ok(Address::Ipv4(addr));
        }
        if let Ok(addr) = src.parse::<Ipv6Address>() {
            return Ok(Address::Ipv6(addr));
        }
        if let Ok(addr) = src.parse::<EthernetAddress>() {
            return Ok(Address::Mac(addr));
        }
        Err(ParseAddressErrorKind::Family.into())
    }
}

pub(crate) mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};

    use super::*;

    fn propagate_carries(word: u32) -> u16 {
        let sum = (word >> 16) + (word & 0xffff);
        ((sum >> 16) as u16) + (sum as u16)
    }

    /// Compute an RFC 1071 compliant checksum (without the final complement).
    pub(crate) fn data(mut data: &[u8]) -> u16 {
        let mut accum = 0;

        const CHUNK_SIZE: usize = 32;
        while data.len() >= CHUNK_SIZE {
            let mut d = &data[..CHUNK_SIZE];
            while d.len() >= 2 {
                accum += NetworkEndian::read_u16(d) as u32;
                d = &d[2..];
            }

            data = &data[CHUNK_SIZE..];
        }

        while data.len() >= 2 {
            accum += NetworkEndian::read_u16(data) as u32;
            data = &data[2..];
        }

        // The odd byte is padded with zero.
        if let Some(&value) = data.first() {
            accum += (value as u32) << 8;
        }

        propagate_carries(accum)
    }

    /// Combine several RFC 1071 compliant checksums.
    pub(crate) fn combine(checksums: &[u16]) -> u16 {
        let mut accum: u32 = 0;
        for &word in checksums {
            accum += word as u32;
        }
        propagate_carries(accum)
    }

    /// Compute an IP pseudo header checksum.
    ///
    /// # Panics
    /// This function panics when the addresses are not both IPv4 or both IPv6.
    pub(crate) fn pseudo_header(src_addr: &Address, dst_addr: &Address,
                         protocol: Protocol, length: u32) -> u16 {
        match (src_addr, dst_addr) {
            (Address::Ipv4(src_addr), Address::Ipv4(dst_addr)) => {
                let mut proto_len = [0u8; 4];
                proto_len[1] = protocol.into();
                NetworkEndian::write_u16(&mut proto_len[2..4], length as u16);

                combine(&[
                    data(src_addr.as_bytes()),
                    data(dst_addr.as_bytes()),
                    data(&proto_len[..])
                ])
            },

            (Address::Ipv6(src_addr), Address::Ipv6(dst_addr)) => {
                let mut proto_len = [0u8; 8];
                proto_len[7] = protocol.into();
                NetworkEndian::write_u32(&mut proto_len[0..4], length);
                combine(&[
                    data(src_addr.as_bytes()),
                    data(dst_addr.as_bytes()),
                    data(&proto_len[..])
                ])
            }

            _ => panic!("Unexpected pseudo header addresses: {}, {}",
                        src_addr, dst_addr)
        }
    }

    /// Checksum of an upper layer packet including its pseudo header, complemented.
    pub(crate) fn upper_layer(src_addr: &Address, dst_addr: &Address,
                              protocol: Protocol, packet: &[u8]) -> u16 {
        !combine(&[
            pseudo_header(src_addr, dst_addr, protocol, packet.len() as u32),
            data(packet),
        ])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn checksum_of_known_header() {
        // Header from RFC 1071 examples, checksum field zeroed.
        let header = [0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00,
                      0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8, 0x00, 0x01,
                      0xc0, 0xa8, 0x00, 0xc7];
        assert_eq!(!checksum::data(&header), 0xb861);
    }

    #[test]
    fn checksum_odd_length() {
        assert_eq!(checksum::data(&[0x01]), 0x0100);
        assert_eq!(checksum::data(&[0x01, 0x02, 0x03]), 0x0402);
    }

    #[test]
    fn tagged_parse() {
        assert_eq!("10.0.0.1".parse(), Ok(Address::Ipv4(Ipv4Address::new(10, 0, 0, 1))));
        assert_eq!("::1".parse(), Ok(Address::Ipv6(Ipv6Address::LOOPBACK)));
        assert_eq!("fe-00-32-43-00-e1".parse(),
                   Ok(Address::Mac(EthernetAddress([0xfe, 0x00, 0x32, 0x43, 0x00, 0xe1]))));
        assert_eq!("fe:00:32:43:00:e1".parse::<Address>().map(|a| a.family()), Ok(Family::Mac));

        let err = "not an address".parse::<Address>().unwrap_err();
        assert_eq!(err.kind(), ParseAddressErrorKind::Family);
    }

    #[test]
    fn from_bytes_length() {
        assert!(Address::from_bytes(Family::Ipv4, &[1, 2, 3, 4]).is_ok());
        let err = Address::from_bytes(Family::Ipv4, &[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), ParseAddressErrorKind::Length);
        assert_eq!(Address::from_bytes(Family::Mac, &[0; 6]),
                   Ok(Address::unspecified(Family::Mac)));
    }

    #[test]
    fn prefix_len() {
        let a = Address::Ipv4(Ipv4Address::new(127, 0, 20, 254));
        let b = Address::Ipv4(Ipv4Address::new(127, 0, 20, 128));
        let c = Address::Ipv4(Ipv4Address::new(127, 0, 20, 0));
        assert_eq!(a.common_prefix_len(&b), 25);
        assert_eq!(a.common_prefix_len(&c), 24);
        assert_eq!(a.common_prefix_len(&a), 32);
        assert_eq!(a.common_prefix_len(&Address::Ipv6(Ipv6Address::LOOPBACK)), 0);
    }
}
