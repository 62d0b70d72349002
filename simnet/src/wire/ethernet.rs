use core::{fmt, str::FromStr};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use super::error::{ParseAddressError, ParseAddressErrorKind};

enum_with_unknown! {
    /// Ethernet protocol type.
    pub enum EtherType(u16) {
        Ipv4 = 0x0800,
        Arp  = 0x0806,
        Vlan = 0x8100,
        Ipv6 = 0x86DD,
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EtherType::Ipv4 => write!(f, "IPv4"),
            EtherType::Ipv6 => write!(f, "IPv6"),
            EtherType::Arp  => write!(f, "ARP"),
            EtherType::Vlan => write!(f, "802.1Q"),
            EtherType::Unknown(id) => write!(f, "0x{:04x}", id)
        }
    }
}

/// A six-octet Ethernet II address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 6]);

impl Address {
    /// The broadcast address.
    pub const BROADCAST: Address = Address([0xff; 6]);

    /// Construct an Ethernet address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not six octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 6];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Return an Ethernet address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Query whether the address is an unicast address.
    pub fn is_unicast(&self) -> bool {
        !(self.is_broadcast() ||
          self.is_multicast())
    }

    /// Query whether this address is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Query whether the "multicast" bit in the OUI is set.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Query whether the "locally administered" bit in the OUI is set.
    pub fn is_local(&self) -> bool {
        self.0[0] & 0x02 != 0
    }

    /// Check if the text is a hardware address in one of the accepted notations.
    pub fn validate(text: &str) -> bool {
        text.parse::<Address>().is_ok()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.0;
        write!(f, "{:02x}-{:02x}-{:02x}-{:02x}-{:02x}-{:02x}",
               bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5])
    }
}

/// Parses `fe-00-32-43-00-e1`, `fe:00:32:43:00:e1`, `fe00.3243.00e1` and `fe00324300e1`.
impl FromStr for Address {
    type Err = ParseAddressError;

    fn from_str(src: &str) -> core::result::Result<Self, ParseAddressError> {
        let mut parsed = [0; 6];
        let mut digits = src.chars()
            .filter(|c| !matches!(c, '-' | ':' | '.'));

        for byte in parsed.iter_mut() {
            let mut value = 0;
            for _ in 0..2 {
                let digit = digits.next()
                    .ok_or(ParseAddressErrorKind::Length)?
                    .to_digit(16)
                    .ok_or(ParseAddressErrorKind::Component)?;
                value = (value << 4) | digit as u8;
            }
            *byte = value;
        }

        match digits.next() {
            Some(_) => Err(ParseAddressErrorKind::Length.into()),
            None => Ok(Address(parsed)),
        }
    }
}

byte_wrapper! {
    /// A byte sequence representing an Ethernet II frame.
    #[derive(Debug, PartialEq, Eq)]
    pub struct ethernet([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const DESTINATION: Field =  0..6;
    pub(crate) const SOURCE:      Field =  6..12;
    pub(crate) const ETHERTYPE:   Field = 12..14;
    pub(crate) const PAYLOAD:     Rest  = 14..;

    // Only present with an 802.1Q tag, replacing the ethertype.
    pub(crate) const VLAN_TCI:    Field = 14..16;
    pub(crate) const VLAN_INNER:  Field = 16..18;
    pub(crate) const VLAN_PAYLOAD: Rest = 18..;
}

/// Length of the 802.1Q tag inserted after the source address.
pub const VLAN_TAG_LEN: usize = 4;

impl ethernet {
    /// Imbue a raw octet buffer with Ethernet frame structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with Ethernet frame structure.
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// Shorthand for a combination of `new_unchecked` and `check_len`.
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        Self::new_unchecked(data).check_len()?;
        Ok(Self::new_unchecked(data))
    }

    /// Shorthand for a combination of `new_unchecked_mut` and `check_len`.
    pub fn new_checked_mut(data: &mut [u8]) -> Result<&mut Self> {
        Self::new_checked(&data[..])?;
        Ok(Self::new_unchecked_mut(data))
    }

    /// Unwrap the frame as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error::Truncated)` if the buffer is too short.
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < field::PAYLOAD.start {
            Err(Error::Truncated)
        } else if self.ethertype() == EtherType::Vlan && len < field::VLAN_PAYLOAD.start {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Return the length of a frame header.
    pub fn header_len() -> usize {
        field::PAYLOAD.start
    }

    /// Return the length of a buffer required to hold a packet with the payload
    /// of a given length.
    pub fn buffer_len(payload_len: usize) -> usize {
        field::PAYLOAD.start + payload_len
    }

    /// Return the destination address field.
    pub fn dst_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::DESTINATION])
    }

    /// Return the source address field.
    pub fn src_addr(&self) -> Address {
        Address::from_bytes(&self.0[field::SOURCE])
    }

    /// Return the EtherType field, without checking for 802.1Q.
    pub fn ethertype(&self) -> EtherType {
        let raw = NetworkEndian::read_u16(&self.0[field::ETHERTYPE]);
        EtherType::from(raw)
    }

    /// The VLAN identifier of a tagged frame.
    pub fn vlan_id(&self) -> Option<u16> {
        if self.ethertype() != EtherType::Vlan {
            return None;
        }
        Some(NetworkEndian::read_u16(&self.0[field::VLAN_TCI]) & 0x0fff)
    }

    /// The EtherType of the payload, looking through an 802.1Q tag.
    pub fn inner_ethertype(&self) -> EtherType {
        match self.ethertype() {
            EtherType::Vlan => EtherType::from(NetworkEndian::read_u16(&self.0[field::VLAN_INNER])),
            other => other,
        }
    }

    /// Set the destination address field.
    pub fn set_dst_addr(&mut self, value: Address) {
        self.0[field::DESTINATION].copy_from_slice(value.as_bytes())
    }

    /// Set the source address field.
    pub fn set_src_addr(&mut self, value: Address) {
        self.0[field::SOURCE].copy_from_slice(value.as_bytes())
    }

    /// Set the EtherType field.
    pub fn set_ethertype(&mut self, value: EtherType) {
        NetworkEndian::write_u16(&mut self.0[field::ETHERTYPE], value.into())
    }

    /// Return the payload as a byte slice.
    pub fn payload(&self) -> &[u8] {
        &self.0[field::PAYLOAD]
    }

    /// The payload behind an 802.1Q tag if there is one.
    pub fn inner_payload(&self) -> &[u8] {
        match self.ethertype() {
            EtherType::Vlan => &self.0[field::VLAN_PAYLOAD],
            _ => self.payload(),
        }
    }

    /// Return the payload as a mutable byte slice.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.0[field::PAYLOAD]
    }
}

impl AsRef<[u8]> for ethernet {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A high-level representation of an Ethernet II header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    /// The source hardware address.
    pub src_addr: Address,
    /// The destination hardware address.
    pub dst_addr: Address,
    /// The protocol of the payload.
    pub ethertype: EtherType,
}

impl Repr {
    /// Parse an Ethernet II frame and return a high-level representation.
    pub fn parse(frame: &ethernet) -> Result<Repr> {
        frame.check_len()?;
        Ok(Repr {
            src_addr: frame.src_addr(),
            dst_addr: frame.dst_addr(),
            ethertype: frame.ethertype(),
        })
    }

    /// Return the length of a header that will be emitted from this high-level representation.
    pub fn header_len(&self) -> usize {
        field::PAYLOAD.start
    }

    /// Emit a high-level representation into an Ethernet II frame.
    pub fn emit(&self, frame: &mut ethernet) {
        frame.set_src_addr(self.src_addr);
        frame.set_dst_addr(self.dst_addr);
        frame.set_ethertype(self.ethertype);
    }

    /// Allocate a frame with this header around a payload.
    pub fn encapsulate(&self, payload: &[u8]) -> Vec<u8> {
        let mut buffer = vec![0; ethernet::buffer_len(payload.len())];
        let frame = ethernet::new_unchecked_mut(&mut buffer);
        self.emit(frame);
        frame.payload_mut().copy_from_slice(payload);
        buffer
    }
}

/// Insert an 802.1Q tag for `vid` into an untagged frame.
///
/// # Panics
/// The function panics if the buffer is shorter than an Ethernet header.
pub fn push_vlan_tag(frame: &mut Vec<u8>, vid: u16) {
    let ethertype = field::ETHERTYPE;
    let mut tag = [0u8; VLAN_TAG_LEN];
    NetworkEndian::write_u16(&mut tag[0..2], EtherType::Vlan.into());
    NetworkEndian::write_u16(&mut tag[2..4], vid & 0x0fff);
    frame.splice(ethertype.start..ethertype.start, tag.iter().cloned());
}

/// Remove the 802.1Q tag of a frame, returning its VLAN identifier.
///
/// Untagged or truncated frames are left alone.
pub fn pop_vlan_tag(frame: &mut Vec<u8>) -> Option<u16> {
    let vid = ethernet::new_checked(frame).ok()?.vlan_id()?;
    let start = field::ETHERTYPE.start;
    frame.drain(start..start + VLAN_TAG_LEN);
    Some(vid)
}
