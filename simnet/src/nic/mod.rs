//! Interfaces of a simulated device.
//!
//! An interface is the attachment point of a device. It carries the addresses bound to it, an
//! MTU, the up/down state and the multicast groups it listens to. There are three kinds:
//!
//! * [`Ethernet`] interfaces have a hardware address and can be wired to exactly one other
//!   Ethernet interface of some device, optionally applying a VLAN tagging mode.
//! * Loopback interfaces hand every packet straight back to the IP input of their own device.
//! * Vlan interfaces are layer 3 interfaces of one VLAN whose frames travel tagged over the
//!   Ethernet interfaces of the device.
//!
//! Interfaces are stored in an arena of their device and referred to by [`IfaceId`]. A wire
//! between two Ethernet interfaces is nothing but a [`Link`] on each end, naming the other.
//!
//! [`Ethernet`]: struct.Ethernet.html
//! [`IfaceId`]: struct.IfaceId.html
//! [`Link`]: struct.Link.html
use core::fmt;

use crate::managed::Key;
use crate::wire::{EthernetAddress, Family, IpAddress, Mask};

mod ethernet;
mod loopback;
mod personality;

pub use self::ethernet::{Ethernet, Link, VlanMode};
pub use self::loopback::{loopback_bindings, LOOPBACK_V4_PREFIX};
pub use self::personality::{Capabilities, Protocol};

/// The key of an interface within its device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IfaceId(pub(crate) Key);

/// The kind of an interface and its kind specific state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    /// A wired Ethernet port.
    Ethernet(Ethernet),

    /// The loopback interface.
    Loopback,

    /// A layer 3 interface of a single VLAN.
    Vlan {
        /// The VLAN identifier.
        vid: u16,
        /// The hardware address used for frames of this interface.
        mac: EthernetAddress,
    },
}

/// An address bound to an interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Binding {
    /// The address itself.
    pub address: IpAddress,
    /// The mask of the connected network.
    pub mask: Mask,
}

/// Traffic statistics of an interface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Counters {
    /// Frames handed to the wire.
    pub tx_frames: u64,
    /// Octets handed to the wire.
    pub tx_bytes: u64,
    /// Frames accepted from the wire.
    pub rx_frames: u64,
    /// Octets accepted from the wire.
    pub rx_bytes: u64,
    /// Frames discarded by the interface or its filter.
    pub dropped: u64,
}

/// An interface of a device.
#[derive(Clone, Debug)]
pub struct Interface {
    kind: Kind,
    unit: u16,
    addresses: Vec<Binding>,
    mtu: usize,
    up: bool,
    subscriptions: Vec<IpAddress>,
    counters: Counters,
    capabilities: Capabilities,
}

impl Interface {
    /// Create a down Ethernet interface that is not wired.
    pub fn ethernet(unit: u16, mac: EthernetAddress, mtu: usize) -> Self {
        Interface::new(Kind::Ethernet(Ethernet::new(mac)), unit, mtu, Capabilities::baseline())
    }

    /// Create a down loopback interface without addresses.
    pub fn loopback(unit: u16, mtu: usize) -> Self {
        Interface::new(Kind::Loopback, unit, mtu, Capabilities::loopback())
    }

    /// Create a vlan interface.
    ///
    /// A vlan interface does not depend on a wire and is up from the start.
    pub fn vlan(vid: u16, mac: EthernetAddress, mtu: usize) -> Self {
        let mut iface = Interface::new(Kind::Vlan { vid, mac }, vid, mtu, Capabilities::baseline());
        iface.up = true;
        iface
    }

    fn new(kind: Kind, unit: u16, mtu: usize, capabilities: Capabilities) -> Self {
        Interface {
            kind,
            unit,
            addresses: Vec::new(),
            mtu,
            up: false,
            subscriptions: Vec::new(),
            counters: Counters::default(),
            capabilities,
        }
    }

    /// The conventional name, e.g. `eth0`, `lo0` or `vlanif10`.
    pub fn name(&self) -> String {
        format!("{}", self)
    }

    /// The kind and its specific state.
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut Kind {
        &mut self.kind
    }

    /// The unit number; the VID for vlan interfaces.
    pub fn unit(&self) -> u16 {
        self.unit
    }

    /// Query whether this is a loopback interface.
    pub fn is_loopback(&self) -> bool {
        self.kind == Kind::Loopback
    }

    /// The Ethernet specific state, if this is an Ethernet interface.
    pub fn as_ethernet(&self) -> Option<&Ethernet> {
        match &self.kind {
            Kind::Ethernet(eth) => Some(eth),
            _ => None,
        }
    }

    pub(crate) fn as_ethernet_mut(&mut self) -> Option<&mut Ethernet> {
        match &mut self.kind {
            Kind::Ethernet(eth) => Some(eth),
            _ => None,
        }
    }

    /// The hardware address of frames sent from this interface.
    ///
    /// `None` for loopback interfaces.
    pub fn mac(&self) -> Option<EthernetAddress> {
        match &self.kind {
            Kind::Ethernet(eth) => Some(eth.mac()),
            Kind::Vlan { mac, .. } => Some(*mac),
            Kind::Loopback => None,
        }
    }

    /// The VLAN identifier of a vlan interface.
    pub fn vid(&self) -> Option<u16> {
        match self.kind {
            Kind::Vlan { vid, .. } => Some(vid),
            _ => None,
        }
    }

    /// The remote end of the wire, if any.
    pub fn link(&self) -> Option<Link> {
        self.as_ethernet().and_then(Ethernet::link)
    }

    /// All bound addresses.
    pub fn addresses(&self) -> &[Binding] {
        &self.addresses
    }

    /// The bound address of a family.
    pub fn address(&self, family: Family) -> Option<&Binding> {
        self.addresses.iter().find(|binding| binding.address.family() == family)
    }

    /// Query whether `address` is bound to this interface.
    pub fn has_address(&self, address: &IpAddress) -> bool {
        self.addresses.iter().any(|binding| binding.address == *address)
    }

    /// Replace the binding of the address's family.
    ///
    /// Returns the previous binding of that family.
    pub(crate) fn set_address(&mut self, binding: Binding) -> Option<Binding> {
        let family = binding.address.family();
        match self.addresses.iter_mut().find(|old| old.address.family() == family) {
            Some(old) => Some(core::mem::replace(old, binding)),
            None => {
                self.addresses.push(binding);
                None
            },
        }
    }

    pub(crate) fn remove_address(&mut self, address: &IpAddress) -> Option<Binding> {
        let idx = self.addresses.iter().position(|binding| binding.address == *address)?;
        Some(self.addresses.remove(idx))
    }

    /// The maximum size of an IP packet on this interface.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Change the MTU.
    pub fn set_mtu(&mut self, mtu: usize) {
        self.mtu = mtu;
    }

    /// Query whether the interface can send and receive.
    pub fn is_up(&self) -> bool {
        self.up
    }

    pub(crate) fn set_up(&mut self, up: bool) {
        self.up = up;
    }

    /// The multicast groups this interface listens to.
    pub fn subscriptions(&self) -> &[IpAddress] {
        &self.subscriptions
    }

    /// Query whether the interface listens to a multicast group.
    pub fn is_subscribed(&self, group: &IpAddress) -> bool {
        self.subscriptions.contains(group)
    }

    /// Query whether the interface listens to a multicast hardware address.
    ///
    /// Groups subscribed by protocol address listen to their mapped hardware address.
    pub fn is_subscribed_mac(&self, group: &EthernetAddress) -> bool {
        self.subscriptions.iter().any(|sub| group_mac(sub) == *group)
    }

    /// Add a multicast group, returning `false` if it was present already.
    pub(crate) fn subscribe(&mut self, group: IpAddress) -> bool {
        if self.subscriptions.contains(&group) {
            return false;
        }
        self.subscriptions.push(group);
        true
    }

    /// Remove a multicast group, returning `false` if it was not present.
    pub(crate) fn unsubscribe(&mut self, group: &IpAddress) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub != group);
        before != self.subscriptions.len()
    }

    pub(crate) fn clear_subscriptions(&mut self) {
        self.subscriptions.clear();
    }

    /// The traffic statistics.
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub(crate) fn count_tx(&mut self, len: usize) {
        self.counters.tx_frames += 1;
        self.counters.tx_bytes += len as u64;
    }

    pub(crate) fn count_rx(&mut self, len: usize) {
        self.counters.rx_frames += 1;
        self.counters.rx_bytes += len as u64;
    }

    pub(crate) fn count_drop(&mut self) {
        self.counters.dropped += 1;
    }

    /// The checksum handling of this interface.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Change which received checksums are verified.
    pub fn capabilities_mut(&mut self) -> &mut Capabilities {
        &mut self.capabilities
    }
}

/// The hardware address frames to a multicast group are sent to.
fn group_mac(group: &IpAddress) -> EthernetAddress {
    match group {
        IpAddress::Mac(mac) => *mac,
        IpAddress::Ipv4(addr) => {
            let b = addr.as_bytes();
            EthernetAddress([0x01, 0x00, 0x5e, b[1] & 0x7f, b[2], b[3]])
        },
        IpAddress::Ipv6(addr) => {
            let b = addr.as_bytes();
            EthernetAddress([0x33, 0x33, b[12], b[13], b[14], b[15]])
        },
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            Kind::Ethernet(_) => write!(f, "eth{}", self.unit),
            Kind::Loopback => write!(f, "lo{}", self.unit),
            Kind::Vlan { vid, .. } => write!(f, "vlanif{}", vid),
        }
    }
}

impl fmt::Display for IfaceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "if{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::Ipv4Address;

    const MAC: EthernetAddress = EthernetAddress([0xfa, 0xff, 0x0f, 0, 0, 1]);

    fn binding(a: u8, len: usize) -> Binding {
        Binding {
            address: Ipv4Address::new(10, 0, 0, a).into(),
            mask: Mask::new(Family::Ipv4, len).unwrap(),
        }
    }

    #[test]
    fn names() {
        assert_eq!(Interface::ethernet(2, MAC, 1500).name(), "eth2");
        assert_eq!(Interface::loopback(0, 0xfffe).name(), "lo0");
        assert_eq!(Interface::vlan(10, MAC, 1500).name(), "vlanif10");
    }

    #[test]
    fn one_address_per_family() {
        let mut iface = Interface::ethernet(0, MAC, 1500);
        assert_eq!(iface.set_address(binding(1, 24)), None);
        assert_eq!(iface.set_address(binding(2, 16)), Some(binding(1, 24)));
        assert_eq!(iface.addresses(), &[binding(2, 16)]);
        assert!(iface.has_address(&Ipv4Address::new(10, 0, 0, 2).into()));
        assert_eq!(iface.address(Family::Ipv6), None);
        assert_eq!(iface.remove_address(&Ipv4Address::new(10, 0, 0, 2).into()), Some(binding(2, 16)));
        assert!(iface.addresses().is_empty());
    }

    #[test]
    fn subscriptions() {
        let mut iface = Interface::ethernet(0, MAC, 1500);
        let group: IpAddress = Ipv4Address::new(224, 0, 0, 9).into();
        assert!(iface.subscribe(group));
        assert!(!iface.subscribe(group));
        assert!(iface.is_subscribed(&group));
        assert!(iface.is_subscribed_mac(&EthernetAddress([0x01, 0x00, 0x5e, 0, 0, 9])));
        assert!(!iface.is_subscribed_mac(&EthernetAddress([0x01, 0x00, 0x5e, 0, 0, 10])));
        assert!(iface.unsubscribe(&group));
        assert!(!iface.unsubscribe(&group));
    }

    #[test]
    fn kinds_start_state() {
        let eth = Interface::ethernet(0, MAC, 1500);
        assert!(!eth.is_up());
        assert_eq!(eth.mac(), Some(MAC));
        assert_eq!(eth.link(), None);

        let lo = Interface::loopback(0, 0xfffe);
        assert!(lo.is_loopback());
        assert_eq!(lo.mac(), None);

        let vlan = Interface::vlan(7, MAC, 1500);
        assert!(vlan.is_up());
        assert_eq!(vlan.vid(), Some(7));
    }
}
