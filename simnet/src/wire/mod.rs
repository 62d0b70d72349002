/*! Low-level packet access and construction.

# Packet representations

The `wire` module deals with the packet *representation*. It provides two levels of
functionality.

 * First, it provides functions to extract fields from sequences of octets, and to insert fields
   into sequences of octets. This happens in the lowercase structures e.g. [`ethernet_frame`] or
   [`udp_packet`]. These are dynamically sized wrappers around `[u8]`.
 * Second, it provides a compact, high-level representation of header data that can be created from
   parsing and emitted into a sequence of octets. This happens through the `Repr` family of structs
   and enums, e.g. [`ArpRepr`] or [`Ipv4Repr`].

[`ethernet_frame`]: struct.ethernet_frame.html
[`udp_packet`]: struct.udp_packet.html
[`ArpRepr`]: struct.ArpRepr.html
[`Ipv4Repr`]: struct.Ipv4Repr.html

The `packet` family of data structures guarantees that, if the `packet::check_len()` method
returned `Ok(())`, then no field accessor or setter method will panic. When parsing untrusted
input, it is *necessary* to use either of the checked constructors. When emitting output, the
buffer length is given by the `Repr` and the unchecked constructor is used.

# Addresses

Every address family has its own fixed size type ([`EthernetAddress`], [`Ipv4Address`],
[`Ipv6Address`]) and the tagged [`IpAddress`] stores any of them. The routing table, neighbor
cache and contacts key on the tagged form. [`Mask`] is a prefix mask of one family and [`Cidr`]
combines an address with one.

[`EthernetAddress`]: struct.EthernetAddress.html
[`Ipv4Address`]: struct.Ipv4Address.html
[`Ipv6Address`]: struct.Ipv6Address.html
[`IpAddress`]: enum.IpAddress.html
[`Mask`]: struct.Mask.html
[`Cidr`]: struct.Cidr.html

# Examples

To emit an IP packet header into an octet buffer, and then parse it back:

```rust
use simnet::wire::*;
let repr = Ipv4Repr {
    src_addr:    Ipv4Address::new(10, 0, 0, 1),
    dst_addr:    Ipv4Address::new(10, 0, 0, 2),
    protocol:    IpProtocol::Udp,
    payload_len: 10,
    hop_limit:   64
};
let buffer = repr.encapsulate(&[0; 10], Checksum::Manual);
let packet = ipv4_packet::new_checked(&buffer)
    .expect("truncated packet");
let parsed = Ipv4Repr::parse(packet, Checksum::Manual)
    .expect("malformed packet");
assert_eq!(repr, parsed);
```
*/
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
//
// Applies to files in this folder unless otherwise noted. These are:
// * `arp.rs`
// * `error.rs`
// * `ethernet.rs`
// * `icmpv4.rs`
// * `icmpv6.rs`
// * `ip.rs`
// * `ipv4.rs`
// * `ipv6.rs`
// * `mod.rs` (this file)
// * `udp.rs`

// Header fields are described by their accessors.
#![allow(missing_docs)]

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
    pub(crate) type Rest  = ::core::ops::RangeFrom<usize>;
}

mod error;
pub mod arp;
pub mod ethernet;
pub mod icmpv4;
pub mod icmpv6;
pub mod ip;
pub mod ipv4;
pub mod ipv6;
pub mod mask;
pub mod udp;

/// Describes how to handle checksums.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Checksum {
    /// Checksum must be computed or checked manually.
    Manual,

    /// The checksum field is neither filled nor checked.
    Ignored,
}

impl Checksum {
    pub(crate) fn manual(self) -> bool {
        self == Checksum::Manual
    }
}

pub use self::ethernet::{
    ethernet as ethernet_frame,
    EtherType,
    Address as EthernetAddress,
    Repr as EthernetRepr};

pub use self::arp::{
    arp as arp_packet,
    Hardware as ArpHardware,
    Operation as ArpOperation,
    Repr as ArpRepr};

pub use self::ip::{
    Address as IpAddress,
    Family,
    Protocol as IpProtocol};

pub use self::ipv4::{
    ipv4 as ipv4_packet,
    Address as Ipv4Address,
    Repr as Ipv4Repr};

pub use self::ipv6::{
    ipv6 as ipv6_packet,
    Address as Ipv6Address,
    Repr as Ipv6Repr};

pub use self::mask::{
    prefix_len,
    Cidr,
    Mask,
    MaskError};

pub use self::icmpv4::{
    icmpv4 as icmpv4_packet,
    Message as Icmpv4Message,
    DstUnreachable as Icmpv4DstUnreachable,
    TimeExceeded as Icmpv4TimeExceeded,
    Repr as Icmpv4Repr};

pub use self::icmpv6::{
    icmpv6 as icmpv6_packet,
    Message as Icmpv6Message,
    NeighborFlags,
    Repr as Icmpv6Repr};

pub use self::udp::{
    udp as udp_packet,
    Checksum as UdpChecksum,
    Repr as UdpRepr};

pub use self::error::{
    Error,
    ParseAddressError,
    ParseAddressErrorKind,
    Result};
