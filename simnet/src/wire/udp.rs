use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};
use super::ip::{checksum, Address as IpAddress, Protocol as IpProtocol};

byte_wrapper! {
    /// A byte sequence representing a UDP packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct udp([u8]);
}

mod field {
    #![allow(non_snake_case)]
    use crate::wire::field::Field;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const LENGTH:   Field = 4..6;
    pub(crate) const CHECKSUM: Field = 6..8;

    pub(crate) fn PAYLOAD(length: u16) -> Field {
        CHECKSUM.end..(length as usize)
    }
}

/// Length of the header.
pub const HEADER_LEN: usize = field::CHECKSUM.end;

impl udp {
    /// Imbue a raw octet buffer with UDP packet structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with UDP packet structure.
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// Shorthand for a combination of `new_unchecked` and `check_len`.
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// Return the whole buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error::Truncated)` if the buffer is too short.
    /// Returns `Err(Error::Malformed)` if the length field has a value smaller
    /// than the header length.
    ///
    /// The result of this check is invalidated by calling [set_len].
    ///
    /// [set_len]: #method.set_len
    pub fn check_len(&self) -> Result<()> {
        let buffer_len = self.0.len();
        if buffer_len < field::CHECKSUM.end {
            Err(Error::Truncated)
        } else {
            let field_len = self.len() as usize;
            if buffer_len < field_len {
                Err(Error::Truncated)
            } else if field_len < field::CHECKSUM.end {
                Err(Error::Malformed)
            } else {
                Ok(())
            }
        }
    }

    /// Return the source port field.
    #[inline]
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::SRC_PORT])
    }

    /// Return the destination port field.
    #[inline]
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::DST_PORT])
    }

    /// Return the length field.
    #[inline]
    pub fn len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::LENGTH])
    }

    /// Return the checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Set the source port field.
    #[inline]
    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::SRC_PORT], value)
    }

    /// Set the destination port field.
    #[inline]
    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::DST_PORT], value)
    }

    /// Set the length field.
    #[inline]
    pub fn set_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::LENGTH], value)
    }

    /// Set the checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    /// Compute and fill in the header checksum.
    ///
    /// # Panics
    /// This function panics unless `src_addr` and `dst_addr` belong to the same family,
    /// and that family is IPv4 or IPv6.
    pub fn fill_checksum(&mut self, src_addr: IpAddress, dst_addr: IpAddress) {
        self.set_checksum(0);
        let checksum = checksum::upper_layer(
            &src_addr, &dst_addr, IpProtocol::Udp, &self.0[..self.len() as usize]);
        // Zero means no checksum and is sent as all-ones instead.
        self.set_checksum(if checksum == 0 { 0xffff } else { checksum })
    }

    /// Validate the packet checksum.
    ///
    /// # Panics
    /// This function panics unless `src_addr` and `dst_addr` belong to the same family,
    /// and that family is IPv4 or IPv6.
    pub fn verify_checksum(&self, src_addr: IpAddress, dst_addr: IpAddress) -> bool {
        checksum::combine(&[
            checksum::pseudo_header(&src_addr, &dst_addr, IpProtocol::Udp,
                                    self.len() as u32),
            checksum::data(&self.0[..self.len() as usize])
        ]) == !0
    }

    /// Return the payload, bounded by the length field.
    pub fn payload_slice(&self) -> &[u8] {
        let len = self.len();
        &self.0[field::PAYLOAD(len)]
    }

    /// Return the payload mutably, bounded by the length field.
    pub fn payload_mut_slice(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.0[field::PAYLOAD(len)]
    }
}

impl AsRef<[u8]> for udp {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A high-level representation of an User Datagram Protocol packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
}

/// How the checksum of a packet is handled.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Checksum {
    /// Computed over the pseudo header of these addresses.
    Manual {
        src_addr: IpAddress,
        dst_addr: IpAddress,
    },
    Ignored,
}

impl Repr {
    /// Parse an User Datagram Protocol packet and return a high-level representation.
    pub fn parse(packet: &udp, checksum: Checksum) -> Result<Repr> {
        packet.check_len()?;

        // Destination port cannot be omitted (but source port can be).
        if packet.dst_port() == 0 { return Err(Error::Malformed) }
        if let Checksum::Manual { src_addr, dst_addr } = checksum {
            match (src_addr, dst_addr) {
                // Omitted checksums are allowed over IPv4.
                (IpAddress::Ipv4(_), IpAddress::Ipv4(_)) if packet.checksum() == 0 => { }
                _ if !packet.verify_checksum(src_addr, dst_addr) => return Err(Error::WrongChecksum),
                _ => (),
            }
        }

        Ok(Repr {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            length: packet.len(),
        })
    }

    /// Return the length of a packet that will be emitted from this high-level representation.
    pub fn buffer_len(&self) -> usize {
        self.length.into()
    }

    /// Emit a high-level representation into an User Datagram Protocol packet.
    ///
    /// The payload must already be in place for the checksum to be correct.
    pub fn emit(&self, packet: &mut udp, checksum: Checksum) {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_len(self.length);

        if let Checksum::Manual { src_addr, dst_addr, } = checksum {
            packet.fill_checksum(src_addr, dst_addr)
        } else {
            packet.set_checksum(0);
        }
    }

    /// Allocate a packet with this header around a payload.
    pub fn encapsulate(src_port: u16, dst_port: u16, payload: &[u8], checksum: Checksum) -> Vec<u8> {
        let repr = Repr {
            src_port,
            dst_port,
            length: (HEADER_LEN + payload.len()) as u16,
        };
        let mut buffer = vec![0; repr.buffer_len()];
        let packet = udp::new_unchecked_mut(&mut buffer);
        packet.set_len(repr.length);
        packet.payload_mut_slice().copy_from_slice(payload);
        repr.emit(packet, checksum);
        buffer
    }
}

impl Checksum {
    /// Compute the checksum over the pseudo header of these addresses.
    pub fn for_pseudo_header<A, B>(src_addr: A, dst_addr: B) -> Self
        where A: Into<IpAddress>, B: Into<IpAddress>
    {
        Checksum::Manual {
            src_addr: src_addr.into(),
            dst_addr: dst_addr.into(),
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let payload_len = usize::from(self.length)
            .checked_sub(field::CHECKSUM.end);
        if let Some(payload_len) = payload_len {
            write!(f, "UDP src={} dst={} len={}",
                self.src_port, self.dst_port, payload_len)
        } else {
            write!(f, "UDP src={} dst={} len=??",
                self.src_port, self.dst_port)
        }
    }
}
