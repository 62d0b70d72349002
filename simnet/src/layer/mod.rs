//! The process logic of protocol layers.
//!
//! ## Layering
//!
//! Each protocol layer is split into two parts; the packet logic contained in `wire` and the
//! processing part in this module. The processing state of all layers of one device lives in the
//! [`Device`] itself: the routing table, the neighbor cache and the contact registry. Each layer
//! module adds the methods of its protocol to the device and keeps the state types that belong to
//! it. The state is open to modifications as part of a user program while processing does not
//! take place, similar to reconfiguration on the OS level with utilities such as `arp`, `route`
//! or `ifconfig`.
//!
//! ## Receiving
//!
//! Frames arrive at an interface and are processed bottom-up: [`eth`] filters and classifies the
//! frame, [`arp`] learns neighbors, [`ip`] validates and classifies the packet and [`udp`] builds
//! the four tuple. Each packet that reaches a listener is handed to the [`Recv`] implementation
//! registered on a [`contact`] together with a [`Meta`] describing how it arrived.
//!
//! ## Sending
//!
//! Sending goes top-down through the same layers and never blocks. The result is either a
//! [`Sent`] outcome or an [`Error`]. A packet whose next hop is not resolved yet is parked in the
//! neighbor cache and sent as soon as the neighbor answers, which is reported as
//! [`Sent::Pending`].
//!
//! [`Device`]: ../device/struct.Device.html
//! [`eth`]: eth/index.html
//! [`arp`]: arp/index.html
//! [`ip`]: ip/index.html
//! [`udp`]: udp/index.html
//! [`contact`]: contact/index.html
//! [`Recv`]: trait.Recv.html
//! [`Meta`]: struct.Meta.html
//! [`Sent`]: enum.Sent.html
//! [`Sent::Pending`]: enum.Sent.html#variant.Pending
//! [`Error`]: enum.Error.html
use thiserror::Error;

use crate::device::Device;
use crate::nic::IfaceId;
use crate::wire::{self, EthernetAddress, MaskError, ParseAddressError};

pub mod arp;
pub mod contact;
pub mod eth;
pub mod icmp;
pub mod ip;
pub mod udp;

pub use self::contact::{ContactAddress, ContactId};

/// The result type of stack operations.
pub type Result<T> = core::result::Result<T, Error>;

/// The error type of stack operations.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
pub enum Error {
    /// No route or no source address for the destination.
    #[error("no route to host")]
    HostUnreachable,

    /// The destination network can not be reached.
    #[error("network is unreachable")]
    NetUnreachable,

    /// The time to live of a forwarded packet ran out.
    #[error("time to live exceeded in transit")]
    TtlExceeded,

    /// Another contact is bound to the same address.
    #[error("address already in use")]
    AlreadyInUse,

    /// The packet exceeds the MTU of the outgoing interface.
    #[error("packet exceeds the mtu, fragmentation is not supported")]
    FragmentationNotSupported,

    /// The operation was not permitted.
    ///
    /// Returned when the contact, interface or device does not allow or implement an operation.
    #[error("illegal operation: {0}")]
    Illegal(&'static str),

    /// A key was stale or an address is not known.
    #[error("no such entry")]
    NotFound,

    /// Not enough space for the requested packet.
    #[error("bad packet size")]
    BadSize,

    /// A packet given to the stack could not be interpreted.
    #[error("invalid packet: {0}")]
    Wire(#[from] wire::Error),

    /// A mask could not be created or applied.
    #[error(transparent)]
    Mask(#[from] MaskError),

    /// An address could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseAddressError),
}

/// The outcome of an output that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sent {
    /// The frame was handed to the interface.
    Transmitted,

    /// The packet waits for neighbor resolution of its next hop.
    Pending,
}

/// How a packet reached this device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Meta {
    /// The receiving interface.
    pub rcvif: IfaceId,

    /// Addressed to every node of a network.
    pub broadcast: bool,

    /// Addressed to a multicast group.
    pub multicast: bool,

    /// Addressed to this device, including subscribed groups and broadcasts.
    pub destination: bool,

    /// Looped back from an output of this device.
    pub loopback: bool,

    /// The hardware source, for packets that arrived in a frame.
    pub src_mac: Option<EthernetAddress>,
}

/// A packet handed to a receiver of a contact.
#[derive(Clone, Copy, Debug)]
pub struct Delivery<'a> {
    /// The contact the packet was dispatched to.
    pub contact: ContactId,

    /// Circumstances of the reception.
    pub meta: Meta,

    /// The four tuple from the perspective of this device, for transport contacts.
    pub address: Option<ContactAddress>,

    /// The content at the layer of the contact.
    ///
    /// A whole frame for link contacts, a whole IP packet for raw IP contacts and the datagram
    /// payload for UDP contacts.
    pub payload: &'a [u8],
}

/// A receiver of the packets of a contact.
///
/// The receiver may use the device freely, for example to answer a packet. Closing its own
/// contact or registering a new receiver from within is allowed.
pub trait Recv {
    /// Inspect one delivered packet.
    fn receive(&mut self, device: &mut Device, delivery: Delivery<'_>);
}

/// A standard wrapper for a function implementing the receive trait.
pub struct FnHandler<F>(pub F);

impl<F> Recv for FnHandler<F>
    where F: FnMut(&mut Device, Delivery<'_>)
{
    fn receive(&mut self, device: &mut Device, delivery: Delivery<'_>) {
        (self.0)(device, delivery)
    }
}

impl Meta {
    pub(crate) fn new(rcvif: IfaceId) -> Self {
        Meta {
            rcvif,
            broadcast: false,
            multicast: false,
            destination: false,
            loopback: false,
            src_mac: None,
        }
    }
}
