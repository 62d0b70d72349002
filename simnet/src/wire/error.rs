use thiserror::Error;

/// The error type for parsing packets.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// An incoming packet could not be parsed because it was shorter than assumed.
    ///
    /// The packet may be shorter than the minimum length specified, or a length field points
    /// beyond the received data.
    #[error("truncated packet")]
    Truncated,

    /// An incoming packet had an incorrect checksum and was dropped.
    #[error("checksum error")]
    WrongChecksum,

    /// An incoming packet could not be recognized and was dropped.
    ///
    /// E.g. an Ethernet packet with an unknown EtherType.
    #[error("unrecognized packet")]
    Unrecognized,

    /// An incoming packet was recognized but was self-contradictory.
    ///
    /// Examples: an IPv4 header claiming a header length larger than its total length; a UDP
    /// packet claiming to contain less than 8 bytes of data.
    #[error("malformed packet")]
    Malformed,

    /// Parsing depends on a feature that is not implemented.
    ///
    /// An example is an IPv4 fragment, as reassembly is not supported.
    #[error("unsupported option")]
    Unsupported,
}

/// The result type for packet parsing.
pub type Result<T> = core::result::Result<T, Error>;

/// The error returned when an address could not be parsed from text.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[error("{kind}")]
pub struct ParseAddressError {
    kind: ParseAddressErrorKind,
}

/// The reason an address did not parse.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseAddressErrorKind {
    /// A component is not a number in range.
    #[error("invalid address component")]
    Component,

    /// The text did not contain the expected number of components.
    #[error("unexpected number of address components")]
    Separator,

    /// A hardware address did not contain exactly twelve hex digits.
    #[error("hardware address needs twelve hex digits")]
    Length,

    /// An IPv6 address contained `::` more than once, or where no group was elided.
    #[error("invalid zero compression")]
    Compression,

    /// The text is not an address of any supported family.
    #[error("unrecognized address family")]
    Family,

    /// The prefix length of a cidr was not a number or exceeded the address width.
    #[error("invalid prefix length")]
    PrefixLength,
}

impl ParseAddressError {
    pub(crate) fn new(kind: ParseAddressErrorKind) -> Self {
        ParseAddressError { kind }
    }

    /// The reason this address did not parse.
    pub fn kind(&self) -> ParseAddressErrorKind {
        self.kind
    }
}

impl From<ParseAddressErrorKind> for ParseAddressError {
    fn from(kind: ParseAddressErrorKind) -> Self {
        ParseAddressError { kind }
    }
}
