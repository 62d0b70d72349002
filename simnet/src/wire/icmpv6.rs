use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Checksum, Result};
use super::{EthernetAddress, IpAddress, Ipv6Address};
use super::ip::{checksum, Protocol};

enum_with_unknown! {
    /// Internet protocol control message type.
    pub doc enum Message(u8) {
        /// Destination Unreachable.
        DstUnreachable  = 0x01,
        /// Packet Too Big.
        PktTooBig       = 0x02,
        /// Time Exceeded.
        TimeExceeded    = 0x03,
        /// Parameter Problem.
        ParamProblem    = 0x04,
        /// Echo Request
        EchoRequest     = 0x80,
        /// Echo Reply
        EchoReply       = 0x81,
        /// Neighbor Solicitation
        NeighborSolicit = 0x87,
        /// Neighbor Advertisement
        NeighborAdvert  = 0x88,
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Message::DstUnreachable  => write!(f, "destination unreachable"),
            Message::PktTooBig       => write!(f, "packet too big"),
            Message::TimeExceeded    => write!(f, "time exceeded"),
            Message::ParamProblem    => write!(f, "parameter problem"),
            Message::EchoRequest     => write!(f, "echo request"),
            Message::EchoReply       => write!(f, "echo reply"),
            Message::NeighborSolicit => write!(f, "neighbor solicitation"),
            Message::NeighborAdvert  => write!(f, "neighbor advert"),
            Message::Unknown(id)     => write!(f, "{}", id)
        }
    }
}

/// Flags of a neighbor advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NeighborFlags(u8);

impl NeighborFlags {
    /// The sender is a router.
    pub const ROUTER: Self = NeighborFlags(0x80);
    /// The advertisement answers a solicitation.
    pub const SOLICITED: Self = NeighborFlags(0x40);
    /// The advertisement should replace existing cache entries.
    pub const OVERRIDE: Self = NeighborFlags(0x20);

    /// No flag set.
    pub fn empty() -> Self {
        NeighborFlags(0)
    }

    /// The raw octet.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Query whether all flags of `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for NeighborFlags {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        NeighborFlags(self.0 | other.0)
    }
}

/// Option type of a source link-layer address.
const OPT_SOURCE_LLADDR: u8 = 1;
/// Option type of a target link-layer address.
const OPT_TARGET_LLADDR: u8 = 2;

byte_wrapper! {
    /// A byte sequence representing an ICMPv6 packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct icmpv6([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const TYPE:       usize = 0;
    pub(crate) const CODE:       usize = 1;
    pub(crate) const CHECKSUM:   Field = 2..4;

    pub(crate) const ECHO_IDENT: Field = 4..6;
    pub(crate) const ECHO_SEQNO: Field = 6..8;

    pub(crate) const NDP_FLAGS:  usize = 4;
    pub(crate) const NDP_TARGET: Field = 8..24;
    pub(crate) const NDP_OPTS:   Rest  = 24..;

    pub(crate) const DATA:       Rest  = 8..;
}

/// Length of the fixed part of every message.
pub const HEADER_LEN: usize = field::DATA.start;

impl icmpv6 {
    /// Imbue a raw octet buffer with ICMPv6 packet structure.
    pub fn new_unchecked(buffer: &[u8]) -> &icmpv6 {
        Self::__from_macro_new_unchecked(buffer)
    }

    /// Imbue a mutable octet buffer with ICMPv6 packet structure.
    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut icmpv6 {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// Shorthand for a combination of `new_unchecked` and `check_len`.
    pub fn new_checked(data: &[u8]) -> Result<&icmpv6> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic if called.
    ///
    /// Neighbor discovery messages must contain the target address.
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < HEADER_LEN {
            return Err(Error::Truncated);
        }
        match self.msg_type() {
            Message::NeighborSolicit | Message::NeighborAdvert if len < field::NDP_TARGET.end => {
                Err(Error::Truncated)
            },
            _ => Ok(()),
        }
    }

    /// Return the whole buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Return the message type field.
    #[inline]
    pub fn msg_type(&self) -> Message {
        Message::from(self.0[field::TYPE])
    }

    /// Return the message code field.
    #[inline]
    pub fn msg_code(&self) -> u8 {
        self.0[field::CODE]
    }

    /// Return the checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    /// Return the identifier field (for echo request and reply packets).
    #[inline]
    pub fn echo_ident(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::ECHO_IDENT])
    }

    /// Return the sequence number field (for echo request and reply packets).
    #[inline]
    pub fn echo_seq_no(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::ECHO_SEQNO])
    }

    /// Return the flags of a neighbor advertisement.
    #[inline]
    pub fn neighbor_flags(&self) -> NeighborFlags {
        NeighborFlags(self.0[field::NDP_FLAGS])
    }

    /// Return the target address of a neighbor discovery message.
    #[inline]
    pub fn target_addr(&self) -> Ipv6Address {
        Ipv6Address::from_bytes(&self.0[field::NDP_TARGET])
    }

    /// Return the first link-layer address option of a neighbor discovery message.
    pub fn lladdr_option(&self) -> Option<EthernetAddress> {
        let mut opts = self.0.get(field::NDP_OPTS)?;
        while opts.len() >= 8 {
            let (kind, units) = (opts[0], opts[1] as usize);
            if units == 0 || opts.len() < units * 8 {
                return None;
            }
            if (kind == OPT_SOURCE_LLADDR || kind == OPT_TARGET_LLADDR) && units == 1 {
                return Some(EthernetAddress::from_bytes(&opts[2..8]));
            }
            opts = &opts[units * 8..];
        }
        None
    }

    /// Return the data following the fixed header.
    pub fn data(&self) -> &[u8] {
        &self.0[field::DATA]
    }

    /// Validate the checksum including the pseudo header.
    pub fn verify_checksum(&self, src_addr: &Ipv6Address, dst_addr: &Ipv6Address) -> bool {
        let src = IpAddress::Ipv6(*src_addr);
        let dst = IpAddress::Ipv6(*dst_addr);
        checksum::combine(&[
            checksum::pseudo_header(&src, &dst, Protocol::Icmpv6, self.0.len() as u32),
            checksum::data(&self.0),
        ]) == !0
    }

    /// Set the message type field.
    #[inline]
    pub fn set_msg_type(&mut self, value: Message) {
        self.0[field::TYPE] = value.into()
    }

    /// Set the message code field.
    #[inline]
    pub fn set_msg_code(&mut self, value: u8) {
        self.0[field::CODE] = value
    }

    /// Set the checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    /// Compute and fill in the checksum including the pseudo header.
    pub fn fill_checksum(&mut self, src_addr: &Ipv6Address, dst_addr: &Ipv6Address) {
        self.set_checksum(0);
        let src = IpAddress::Ipv6(*src_addr);
        let dst = IpAddress::Ipv6(*dst_addr);
        let checksum = checksum::upper_layer(&src, &dst, Protocol::Icmpv6, &self.0);
        self.set_checksum(checksum)
    }
}

impl AsRef<[u8]> for icmpv6 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A high-level representation of the ICMPv6 messages handled by the stack.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Repr<'a> {
    EchoRequest {
        ident:  u16,
        seq_no: u16,
        data:   &'a [u8],
    },
    EchoReply {
        ident:  u16,
        seq_no: u16,
        data:   &'a [u8],
    },
    NeighborSolicit {
        target_addr: Ipv6Address,
        lladdr:      Option<EthernetAddress>,
    },
    NeighborAdvert {
        flags:       NeighborFlags,
        target_addr: Ipv6Address,
        lladdr:      Option<EthernetAddress>,
    },
}

impl<'a> Repr<'a> {
    /// Parse an ICMPv6 message and return a high-level representation.
    ///
    /// The checksum is verified against the pseudo header of the enclosing packet.
    pub fn parse(
        src_addr: &Ipv6Address,
        dst_addr: &Ipv6Address,
        packet: &'a icmpv6,
        checksum: Checksum,
    ) -> Result<Repr<'a>> {
        packet.check_len()?;
        if checksum.manual() && !packet.verify_checksum(src_addr, dst_addr) {
            return Err(Error::WrongChecksum);
        }

        match (packet.msg_type(), packet.msg_code()) {
            (Message::EchoRequest, 0) => Ok(Repr::EchoRequest {
                ident:  packet.echo_ident(),
                seq_no: packet.echo_seq_no(),
                data:   packet.data(),
            }),
            (Message::EchoReply, 0) => Ok(Repr::EchoReply {
                ident:  packet.echo_ident(),
                seq_no: packet.echo_seq_no(),
                data:   packet.data(),
            }),
            (Message::NeighborSolicit, 0) => Ok(Repr::NeighborSolicit {
                target_addr: packet.target_addr(),
                lladdr:      packet.lladdr_option(),
            }),
            (Message::NeighborAdvert, 0) => Ok(Repr::NeighborAdvert {
                flags:       packet.neighbor_flags(),
                target_addr: packet.target_addr(),
                lladdr:      packet.lladdr_option(),
            }),
            _ => Err(Error::Unrecognized),
        }
    }

    /// Return the length of a message that will be emitted from this high-level representation.
    pub fn buffer_len(&self) -> usize {
        let opt_len = |lladdr: &Option<EthernetAddress>| if lladdr.is_some() { 8 } else { 0 };
        match self {
            Repr::EchoRequest { data, .. } | Repr::EchoReply { data, .. } => HEADER_LEN + data.len(),
            Repr::NeighborSolicit { lladdr, .. } | Repr::NeighborAdvert { lladdr, .. } => {
                field::NDP_TARGET.end + opt_len(lladdr)
            },
        }
    }

    /// Emit a high-level representation into an ICMPv6 message.
    pub fn emit(&self, src_addr: &Ipv6Address, dst_addr: &Ipv6Address, packet: &mut icmpv6) {
        fn emit_lladdr(packet: &mut icmpv6, kind: u8, lladdr: Option<EthernetAddress>) {
            if let Some(lladdr) = lladdr {
                let opt = &mut packet.0[field::NDP_OPTS];
                opt[0] = kind;
                opt[1] = 1;
                opt[2..8].copy_from_slice(lladdr.as_bytes());
            }
        }

        packet.set_msg_code(0);
        match *self {
            Repr::EchoRequest { ident, seq_no, data }
            | Repr::EchoReply { ident, seq_no, data } => {
                let msg_type = match self {
                    Repr::EchoRequest { .. } => Message::EchoRequest,
                    _ => Message::EchoReply,
                };
                packet.set_msg_type(msg_type);
                NetworkEndian::write_u16(&mut packet.0[field::ECHO_IDENT], ident);
                NetworkEndian::write_u16(&mut packet.0[field::ECHO_SEQNO], seq_no);
                packet.0[field::DATA].copy_from_slice(data);
            },
            Repr::NeighborSolicit { target_addr, lladdr } => {
                packet.set_msg_type(Message::NeighborSolicit);
                NetworkEndian::write_u32(&mut packet.0[4..8], 0);
                packet.0[field::NDP_TARGET].copy_from_slice(target_addr.as_bytes());
                emit_lladdr(packet, OPT_SOURCE_LLADDR, lladdr);
            },
            Repr::NeighborAdvert { flags, target_addr, lladdr } => {
                packet.set_msg_type(Message::NeighborAdvert);
                NetworkEndian::write_u32(&mut packet.0[4..8], 0);
                packet.0[field::NDP_FLAGS] = flags.bits();
                packet.0[field::NDP_TARGET].copy_from_slice(target_addr.as_bytes());
                emit_lladdr(packet, OPT_TARGET_LLADDR, lladdr);
            },
        }

        packet.fill_checksum(src_addr, dst_addr);
    }

    /// Allocate and fill a message.
    pub fn to_bytes(&self, src_addr: &Ipv6Address, dst_addr: &Ipv6Address) -> Vec<u8> {
        let mut buffer = vec![0; self.buffer_len()];
        self.emit(src_addr, dst_addr, icmpv6::new_unchecked_mut(&mut buffer));
        buffer
    }
}
