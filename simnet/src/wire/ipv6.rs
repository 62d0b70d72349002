use core::{fmt, str::FromStr};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use super::error::{ParseAddressError, ParseAddressErrorKind};
use super::ip::Protocol;

/// Minimum MTU required of all links supporting IPv6. See [RFC 8200 § 5].
///
/// [RFC 8200 § 5]: https://tools.ietf.org/html/rfc8200#section-5
pub const MIN_MTU: usize = 1280;

/// A sixteen-octet IPv6 address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 16]);

impl Address {
    /// The [unspecified address].
    ///
    /// [unspecified address]: https://tools.ietf.org/html/rfc4291#section-2.5.2
    pub const UNSPECIFIED: Address = Address([0x00; 16]);

    /// The link-local [all nodes multicast address].
    ///
    /// [all nodes multicast address]: https://tools.ietf.org/html/rfc4291#section-2.7.1
    pub const LINK_LOCAL_ALL_NODES: Address =
        Address([0xff, 0x02, 0x00, 0x0, 0x00, 0x00, 0x00, 0x00,
                 0x00, 0x00, 0x00, 0x0, 0x00, 0x00, 0x00, 0x01]);

    /// The [loopback address].
    ///
    /// [loopback address]: https://tools.ietf.org/html/rfc4291#section-2.5.3
    pub const LOOPBACK: Address =
        Address([0x00, 0x00, 0x00, 0x0, 0x00, 0x00, 0x00, 0x00,
                 0x00, 0x00, 0x00, 0x0, 0x00, 0x00, 0x00, 0x01]);

    /// Construct an IPv6 address from parts.
    pub fn new(a0: u16, a1: u16, a2: u16, a3: u16,
               a4: u16, a5: u16, a6: u16, a7: u16) -> Address {
        let mut addr = [0u8; 16];
        NetworkEndian::write_u16_into(&[a0, a1, a2, a3, a4, a5, a6, a7], &mut addr);
        Address(addr)
    }

    /// Construct an IPv6 address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not sixteen octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 16];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Return an IPv6 address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The eight sixteen-bit groups of the address.
    pub fn segments(&self) -> [u16; 8] {
        let mut groups = [0u16; 8];
        NetworkEndian::read_u16_into(&self.0, &mut groups);
        groups
    }

    /// Query whether the IPv6 address is an unicast address.
    pub fn is_unicast(&self) -> bool {
        !(self.is_multicast() || self.is_unspecified())
    }

    /// Query whether the IPv6 address is a multicast address.
    pub fn is_multicast(&self) -> bool {
        self.0[0] == 0xff
    }

    /// Query whether the IPv6 address is the "unspecified" address.
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0x00; 16]
    }

    /// Query whether the IPv6 address is in the "link-local" range.
    pub fn is_link_local(&self) -> bool {
        self.0[0..8] == [0xfe, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
    }

    /// Query whether the IPv6 address is the "loopback" address.
    pub fn is_loopback(&self) -> bool {
        *self == Self::LOOPBACK
    }

    /// Check if the text is an IPv6 address.
    pub fn validate(text: &str) -> bool {
        text.parse::<Address>().is_ok()
    }
}

/// The canonical compressed notation, or with `{:#}` all eight groups zero padded.
impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let groups = self.segments();

        if f.alternate() {
            for (idx, group) in groups.iter().enumerate() {
                if idx > 0 {
                    f.write_str(":")?;
                }
                write!(f, "{:04x}", group)?;
            }
            return Ok(());
        }

        // Longest run of at least two zero groups, the first one on ties.
        let mut elided = None::<(usize, usize)>;
        let mut idx = 0;
        while idx < groups.len() {
            if groups[idx] != 0 {
                idx += 1;
                continue;
            }
            let start = idx;
            while idx < groups.len() && groups[idx] == 0 {
                idx += 1;
            }
            let len = idx - start;
            if len >= 2 && elided.map_or(true, |(_, best)| len > best) {
                elided = Some((start, len));
            }
        }

        let write_groups = |f: &mut fmt::Formatter, groups: &[u16]| -> fmt::Result {
            for (idx, group) in groups.iter().enumerate() {
                if idx > 0 {
                    f.write_str(":")?;
                }
                write!(f, "{:x}", group)?;
            }
            Ok(())
        };

        match elided {
            None => write_groups(f, &groups),
            Some((start, len)) => {
                write_groups(f, &groups[..start])?;
                f.write_str("::")?;
                write_groups(f, &groups[start + len..])
            }
        }
    }
}

fn parse_groups(text: &str, into: &mut [u16]) -> core::result::Result<usize, ParseAddressError> {
    if text.is_empty() {
        return Ok(0);
    }

    let mut count = 0;
    for part in text.split(':') {
        let slot = into.get_mut(count).ok_or(ParseAddressErrorKind::Separator)?;
        if part.is_empty() || part.len() > 4 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseAddressErrorKind::Component.into());
        }
        *slot = u16::from_str_radix(part, 16).map_err(|_| ParseAddressErrorKind::Component)?;
        count += 1;
    }
    Ok(count)
}

impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(src: &str) -> core::result::Result<Self, ParseAddressError> {
        let mut groups = [0u16; 8];
        let mut halves = src.split("::");
        let head = halves.next().unwrap_or("");

        match (halves.next(), halves.next()) {
            (None, _) => {
                if parse_groups(head, &mut groups)? != 8 {
                    return Err(ParseAddressErrorKind::Separator.into());
                }
            },
            (Some(tail), None) => {
                let mut tail_groups = [0u16; 8];
                let head_len = parse_groups(head, &mut groups)?;
                let tail_len = parse_groups(tail, &mut tail_groups)?;
                // The elision must stand for at least one group.
                if head_len + tail_len > 7 {
                    return Err(ParseAddressErrorKind::Compression.into());
                }
                groups[8 - tail_len..].copy_from_slice(&tail_groups[..tail_len]);
            },
            (Some(_), Some(_)) => return Err(ParseAddressErrorKind::Compression.into()),
        }

        Ok(Address::new(groups[0], groups[1], groups[2], groups[3],
                        groups[4], groups[5], groups[6], groups[7]))
    }
}

byte_wrapper! {
    /// A byte sequence representing an IPv6 packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct ipv6([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const VER_TC_FLOW: Field = 0..4;
    pub(crate) const LENGTH:      Field = 4..6;
    pub(crate) const NXT_HDR:     usize = 6;
    pub(crate) const HOP_LIMIT:   usize = 7;
    pub(crate) const SRC_ADDR:    Field = 8..24;
    pub(crate) const DST_ADDR:    Field = 24..40;
}

/// Length of the fixed header.
pub const HEADER_LEN: usize = field::DST_ADDR.end;

impl ipv6 {
    /// Imbue a raw octet buffer with IPv6 packet structure.
    pub fn new_unchecked(buffer: &[u8]) -> &ipv6 {
        Self::__from_macro_new_unchecked(buffer)
    }

    /// Imbue a mutable octet buffer with IPv6 packet structure.
    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut ipv6 {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// Shorthand for a combination of `new_unchecked` and `check_len`.
    pub fn new_checked(data: &[u8]) -> Result<&ipv6> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// Shorthand for a combination of `new_unchecked_mut` and `check_len`.
    pub fn new_checked_mut(data: &mut [u8]) -> Result<&mut ipv6> {
        Self::new_checked(&data[..])?;
        Ok(Self::new_unchecked_mut(data))
    }

    /// Return the whole buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is shorter than the header plus the payload
    /// length field.
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < field::DST_ADDR.end || len < self.total_len() {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// The header length plus the payload length field.
    pub fn total_len(&self) -> usize {
        HEADER_LEN + usize::from(self.payload_len())
    }

    /// Return the version field.
    #[inline]
    pub fn version(&self) -> u8 {
        self.0[field::VER_TC_FLOW.start] >> 4
    }

    /// Return the traffic class.
    #[inline]
    pub fn traffic_class(&self) -> u8 {
        ((NetworkEndian::read_u16(&self.0[0..2]) & 0x0ff0) >> 4) as u8
    }

    /// Return the flow label field.
    #[inline]
    pub fn flow_label(&self) -> u32 {
        NetworkEndian::read_u24(&self.0[1..4]) & 0x000fffff
    }

    /// Return the payload length field.
    #[inline]
    pub fn payload_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::LENGTH])
    }

    /// Return the next header field.
    #[inline]
    pub fn next_header(&self) -> Protocol {
        Protocol::from(self.0[field::NXT_HDR])
    }

    /// Return the hop limit field.
    #[inline]
    pub fn hop_limit(&self) -> u8 {
        self.0[field::HOP_LIMIT]
    }

    /// Return the source address field.
    #[inline]
    pub fn src_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::SRC_ADDR])
    }

    /// Return the destination address field.
    #[inline]
    pub fn dst_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::DST_ADDR])
    }

    /// Set the version field.
    #[inline]
    pub fn set_version(&mut self, value: u8) {
        let byte = &mut self.0[field::VER_TC_FLOW.start];
        *byte = (*byte & 0x0f) | (value << 4);
    }

    /// Set the traffic class field.
    #[inline]
    pub fn set_traffic_class(&mut self, value: u8) {
        let data = &mut self.0[0..2];
        let raw = NetworkEndian::read_u16(data);
        let raw = (raw & 0xf00f) | ((value as u16) << 4);
        NetworkEndian::write_u16(data, raw);
    }

    /// Set the flow label field.
    #[inline]
    pub fn set_flow_label(&mut self, value: u32) {
        let data = &mut self.0[1..4];
        let raw = (NetworkEndian::read_u24(data) & 0xfff00000) | (value & 0x000fffff);
        NetworkEndian::write_u24(data, raw);
    }

    /// Set the payload length field.
    #[inline]
    pub fn set_payload_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::LENGTH], value);
    }

    /// Set the next header field.
    #[inline]
    pub fn set_next_header(&mut self, value: Protocol) {
        self.0[field::NXT_HDR] = value.into();
    }

    /// Set the hop limit field.
    #[inline]
    pub fn set_hop_limit(&mut self, value: u8) {
        self.0[field::HOP_LIMIT] = value;
    }

    /// Set the source address field.
    #[inline]
    pub fn set_src_addr(&mut self, value: Address) {
        self.0[field::SRC_ADDR].copy_from_slice(value.as_bytes());
    }

    /// Set the destination address field.
    #[inline]
    pub fn set_dst_addr(&mut self, value: Address) {
        self.0[field::DST_ADDR].copy_from_slice(value.as_bytes());
    }

    /// Return the payload as a byte slice, bounded by the payload length field.
    pub fn payload_slice(&self) -> &[u8] {
        &self.0[HEADER_LEN..self.total_len()]
    }

    /// Return the payload as a mutable byte slice.
    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let end = self.total_len();
        &mut self.0[HEADER_LEN..end]
    }
}

impl AsRef<[u8]> for ipv6 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A high-level representation of an Internet Protocol version 6 packet header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_addr:    Address,
    pub dst_addr:    Address,
    pub next_header: Protocol,
    pub payload_len: usize,
    pub hop_limit:   u8,
}

impl Repr {
    /// Parse an Internet Protocol version 6 packet and return a high-level representation.
    pub fn parse(packet: &ipv6) -> Result<Repr> {
        packet.check_len()?;
        if packet.version() != 6 { return Err(Error::Malformed); }
        Ok(Repr {
            src_addr:    packet.src_addr(),
            dst_addr:    packet.dst_addr(),
            next_header: packet.next_header(),
            payload_len: packet.payload_len() as usize,
            hop_limit:   packet.hop_limit()
        })
    }

    /// Return the length of a header that will be emitted from this high-level representation.
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    /// Emit a high-level representation into an Internet Protocol version 6 packet.
    pub fn emit(&self, packet: &mut ipv6) {
        packet.set_version(6);
        packet.set_traffic_class(0);
        packet.set_flow_label(0);
        packet.set_payload_len(self.payload_len as u16);
        packet.set_hop_limit(self.hop_limit);
        packet.set_next_header(self.next_header);
        packet.set_src_addr(self.src_addr);
        packet.set_dst_addr(self.dst_addr);
    }

    /// Allocate a packet with this header around a payload.
    pub fn encapsulate(&self, payload: &[u8]) -> Vec<u8> {
        let repr = Repr { payload_len: payload.len(), ..*self };
        let mut buffer = vec![0; HEADER_LEN + payload.len()];
        let packet = ipv6::new_unchecked_mut(&mut buffer);
        repr.emit(packet);
        packet.payload_mut_slice().copy_from_slice(payload);
        buffer
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IPv6 src={} dst={} nxt_hdr={} hop_limit={}",
               self.src_addr, self.dst_addr, self.next_header, self.hop_limit)
    }
}
