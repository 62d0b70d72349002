use core::fmt;
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Checksum, Result};
use super::ip::checksum;

enum_with_unknown! {
    /// Internet protocol control message type.
    pub doc enum Message(u8) {
        /// Echo reply
        EchoReply      =  0,
        /// Destination unreachable
        DstUnreachable =  3,
        /// Echo request
        EchoRequest    =  8,
        /// Time exceeded
        TimeExceeded   = 11,
        /// Parameter problem
        ParamProblem   = 12,
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Message::EchoReply      => write!(f, "echo reply"),
            Message::DstUnreachable => write!(f, "destination unreachable"),
            Message::EchoRequest    => write!(f, "echo request"),
            Message::TimeExceeded   => write!(f, "time exceeded"),
            Message::ParamProblem   => write!(f, "parameter problem"),
            Message::Unknown(id)    => write!(f, "{}", id)
        }
    }
}

enum_with_unknown! {
    /// Internet protocol control message subtype for type "Destination Unreachable".
    pub doc enum DstUnreachable(u8) {
        /// Destination network unreachable
        NetUnreachable   =  0,
        /// Destination host unreachable
        HostUnreachable  =  1,
        /// Destination protocol unreachable
        ProtoUnreachable =  2,
        /// Destination port unreachable
        PortUnreachable  =  3,
        /// Fragmentation required, and DF flag set
        FragRequired     =  4,
    }
}

enum_with_unknown! {
    /// Internet protocol control message subtype for type "Time Exceeded".
    pub doc enum TimeExceeded(u8) {
        /// TTL expired in transit
        TtlExpired  = 0,
        /// Fragment reassembly time exceeded
        FragExpired = 1,
    }
}

byte_wrapper! {
    /// A byte sequence representing an ICMPv4 packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct icmpv4([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const TYPE:       usize = 0;
    pub(crate) const CODE:       usize = 1;
    pub(crate) const CHECKSUM:   Field = 2..4;

    pub(crate) const UNUSED:     Field = 4..8;

    pub(crate) const ECHO_IDENT: Field = 4..6;
    pub(crate) const ECHO_SEQNO: Field = 6..8;

    pub(crate) const DATA:       Rest  = 8..;
}

/// Length of the fixed part of every message.
pub const HEADER_LEN: usize = field::DATA.start;

impl icmpv4 {
    /// Imbue a raw octet buffer with ICMPv4 packet structure.
    pub fn new_unchecked(buffer: &[u8]) -> &icmpv4 {
        Self::__from_macro_new_unchecked(buffer)
    }

    /// Imbue a mutable octet buffer with ICMPv4 packet structure.
    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut icmpv4 {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// Shorthand for a combination of `new_unchecked` and `check_len`.
    pub fn new_checked(data: &[u8]) -> Result<&icmpv4> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error::Truncated)` if the buffer is too short.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < HEADER_LEN {
            Err(Error::Truncated)
        } else {
            Ok(())
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

    /// Validate the header checksum.
    pub fn verify_checksum(&self) -> bool {
        checksum::data(&self.0) == !0
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

    /// Set the identifier field (for echo request and reply packets).
    #[inline]
    pub fn set_echo_ident(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::ECHO_IDENT], value)
    }

    /// Set the sequence number field (for echo request and reply packets).
    #[inline]
    pub fn set_echo_seq_no(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::ECHO_SEQNO], value)
    }

    /// Compute and fill in the checksum over the whole message.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = !checksum::data(&self.0);
        self.set_checksum(checksum)
    }

    /// Return the data following the fixed header.
    pub fn data(&self) -> &[u8] {
        &self.0[field::DATA]
    }

    /// Return the data following the fixed header mutably.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.0[field::DATA]
    }
}

impl AsRef<[u8]> for icmpv4 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A high-level representation of an ICMPv4 message.
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
    /// Carries the leading bytes of the offending packet.
    DstUnreachable {
        reason: DstUnreachable,
        data:   &'a [u8],
    },
    /// Carries the leading bytes of the offending packet.
    TimeExceeded {
        reason: TimeExceeded,
        data:   &'a [u8],
    },
}

impl<'a> Repr<'a> {
    /// Parse an ICMPv4 message and return a high-level representation.
    pub fn parse(packet: &'a icmpv4, checksum: Checksum) -> Result<Repr<'a>> {
        packet.check_len()?;
        if checksum.manual() && !packet.verify_checksum() {
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
            (Message::DstUnreachable, code) => Ok(Repr::DstUnreachable {
                reason: DstUnreachable::from(code),
                data:   packet.data(),
            }),
            (Message::TimeExceeded, code) => Ok(Repr::TimeExceeded {
                reason: TimeExceeded::from(code),
                data:   packet.data(),
            }),
            _ => Err(Error::Unrecognized),
        }
    }

    /// Return the length of a message that will be emitted from this high-level representation.
    pub fn buffer_len(&self) -> usize {
        match self {
            Repr::EchoRequest { data, .. } | Repr::EchoReply { data, .. } => HEADER_LEN + data.len(),
            Repr::DstUnreachable { data, .. } | Repr::TimeExceeded { data, .. } => {
                HEADER_LEN + data.len()
            },
        }
    }

    /// Emit a high-level representation into an ICMPv4 message.
    ///
    /// # Panics
    /// The function panics if the buffer is not exactly `buffer_len` long.
    pub fn emit(&self, packet: &mut icmpv4, checksum: Checksum) {
        packet.set_msg_code(0);
        match *self {
            Repr::EchoRequest { ident, seq_no, data } => {
                packet.set_msg_type(Message::EchoRequest);
                packet.set_echo_ident(ident);
                packet.set_echo_seq_no(seq_no);
                packet.data_mut().copy_from_slice(data);
            },
            Repr::EchoReply { ident, seq_no, data } => {
                packet.set_msg_type(Message::EchoReply);
                packet.set_echo_ident(ident);
                packet.set_echo_seq_no(seq_no);
                packet.data_mut().copy_from_slice(data);
            },
            Repr::DstUnreachable { reason, data } => {
                packet.set_msg_type(Message::DstUnreachable);
                packet.set_msg_code(reason.into());
                NetworkEndian::write_u32(&mut packet.0[field::UNUSED], 0);
                packet.data_mut().copy_from_slice(data);
            },
            Repr::TimeExceeded { reason, data } => {
                packet.set_msg_type(Message::TimeExceeded);
                packet.set_msg_code(reason.into());
                NetworkEndian::write_u32(&mut packet.0[field::UNUSED], 0);
                packet.data_mut().copy_from_slice(data);
            },
        }

        if checksum.manual() {
            packet.fill_checksum()
        } else {
            packet.set_checksum(0)
        }
    }

    /// Allocate and fill a message.
    pub fn to_bytes(&self, checksum: Checksum) -> Vec<u8> {
        let mut buffer = vec![0; self.buffer_len()];
        self.emit(icmpv4::new_unchecked_mut(&mut buffer), checksum);
        buffer
    }
}

impl fmt::Display for Repr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Repr::EchoRequest { ident, seq_no, data } =>
                write!(f, "ICMPv4 echo request id={} seq={} len={}", ident, seq_no, data.len()),
            Repr::EchoReply { ident, seq_no, data } =>
                write!(f, "ICMPv4 echo reply id={} seq={} len={}", ident, seq_no, data.len()),
            Repr::DstUnreachable { reason, .. } =>
                write!(f, "ICMPv4 destination unreachable ({:?})", reason),
            Repr::TimeExceeded { reason, .. } =>
                write!(f, "ICMPv4 time exceeded ({:?})", reason),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static ECHO_PACKET_BYTES: [u8; 12] =
        [0x08, 0x00, 0x8e, 0xfe,
         0x12, 0x34, 0xab, 0xcd,
         0xaa, 0x00, 0x00, 0xff];

    static ECHO_DATA_BYTES: [u8; 4] =
        [0xaa, 0x00, 0x00, 0xff];

    #[test]
    fn test_echo_deconstruct() {
        let packet = icmpv4::new_checked(&ECHO_PACKET_BYTES[..]).unwrap();
        assert_eq!(packet.msg_type(), Message::EchoRequest);
        assert_eq!(packet.msg_code(), 0);
        assert_eq!(packet.checksum(), 0x8efe);
        assert_eq!(packet.echo_ident(), 0x1234);
        assert_eq!(packet.echo_seq_no(), 0xabcd);
        assert_eq!(packet.data(), &ECHO_DATA_BYTES[..]);
        assert_eq!(packet.verify_checksum(), true);
    }

    #[test]
    fn test_echo_emit() {
        let repr = Repr::EchoRequest {
            ident: 0x1234,
            seq_no: 0xabcd,
            data: &ECHO_DATA_BYTES,
        };
        assert_eq!(&repr.to_bytes(Checksum::Manual)[..], &ECHO_PACKET_BYTES[..]);
    }

    #[test]
    fn test_echo_parse() {
        let packet = icmpv4::new_unchecked(&ECHO_PACKET_BYTES[..]);
        let repr = Repr::parse(packet, Checksum::Manual).unwrap();
        assert_eq!(repr, Repr::EchoRequest {
            ident: 0x1234,
            seq_no: 0xabcd,
            data: &ECHO_DATA_BYTES,
        });
    }

    #[test]
    fn test_time_exceeded() {
        let quoted = [0x45, 0x00, 0x00, 0x14];
        let bytes = Repr::TimeExceeded {
            reason: TimeExceeded::TtlExpired,
            data: &quoted,
        }.to_bytes(Checksum::Manual);
        assert_eq!(bytes[0], 11);
        assert_eq!(bytes[1], 0);
        assert_eq!(&bytes[8..], &quoted);

        let packet = icmpv4::new_checked(&bytes).unwrap();
        assert!(packet.verify_checksum());
        match Repr::parse(packet, Checksum::Manual).unwrap() {
            Repr::TimeExceeded { reason, data } => {
                assert_eq!(reason, TimeExceeded::TtlExpired);
                assert_eq!(data, &quoted);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bad_checksum() {
        let mut bytes = ECHO_PACKET_BYTES;
        bytes[3] ^= 1;
        let packet = icmpv4::new_unchecked(&bytes);
        assert_eq!(Repr::parse(packet, Checksum::Manual), Err(Error::WrongChecksum));
    }
}
