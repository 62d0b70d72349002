//! A simulated device and the configuration of its interfaces.
//!
//! A [`Device`] owns everything of one node: its interfaces, the routing table, the neighbor
//! cache, the contacts of its programs, a key/value store and the observers of its events. The
//! protocol processing is implemented in the [`layer`] modules as further methods of the device.
//!
//! A device never reaches into another device. Frames it puts on a wire are collected in an
//! outbox that the owning [`Network`] drains into its scheduler.
//!
//! [`Device`]: struct.Device.html
//! [`layer`]: ../layer/index.html
//! [`Network`]: ../network/struct.Network.html
use std::collections::VecDeque;
use core::fmt;

use crate::config::Config;
use crate::layer::{Error, Result};
use crate::layer::arp::NeighborCache;
use crate::layer::contact::Registry;
use crate::layer::ip::Routes;
use crate::managed::{Key, SlotMap};
use crate::nic::{self, Binding, IfaceId, Interface, Kind, Link, VlanMode};
use crate::time::Instant;
use crate::wire::{EthernetAddress, IpAddress, Mask};

mod event;
mod store;

pub use self::event::{Event, Hook};
pub use self::store::{Record, Store};

use self::event::Hooks;

/// The key of a device within its network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub(crate) Key);

/// Something a device wants to have delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Transmit {
    /// A frame for the remote end of the interface's wire.
    Wire { iface: IfaceId, frame: Vec<u8> },
    /// A frame addressed to the sending interface itself.
    Local { iface: IfaceId, frame: Vec<u8> },
    /// An IP packet for the device's own IP input.
    Loopback { iface: IfaceId, packet: Vec<u8> },
}

/// A node of the simulated network.
pub struct Device {
    name: String,
    pub(crate) config: Config,
    pub(crate) now: Instant,
    pub(crate) interfaces: SlotMap<Interface>,
    pub(crate) routes: Routes,
    pub(crate) neighbors: NeighborCache,
    pub(crate) contacts: Registry,
    hooks: Hooks,
    store: Store,
    outbox: VecDeque<Transmit>,
}

impl Device {
    /// Create a device without interfaces.
    pub fn new(name: &str, config: Config) -> Self {
        let contacts = Registry::new(&config);
        Device {
            name: name.to_owned(),
            config,
            now: Instant::ZERO,
            interfaces: SlotMap::new(),
            routes: Routes::new(),
            neighbors: NeighborCache::new(),
            contacts,
            hooks: Hooks::default(),
            store: Store::default(),
            outbox: VecDeque::new(),
        }
    }

    /// The name given at creation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration copied from the network.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The simulation time as last seen by this device.
    pub fn now(&self) -> Instant {
        self.now
    }

    pub(crate) fn set_now(&mut self, now: Instant) {
        self.now = now;
    }

    /// Get an interface.
    pub fn interface(&self, iface: IfaceId) -> Option<&Interface> {
        self.interfaces.get(iface.0)
    }

    /// Get an interface mutably, e.g. to change its MTU.
    pub fn interface_mut(&mut self, iface: IfaceId) -> Option<&mut Interface> {
        self.interfaces.get_mut(iface.0)
    }

    /// All interfaces in creation order.
    pub fn interfaces(&self) -> impl Iterator<Item=(IfaceId, &Interface)> + '_ {
        self.interfaces.iter().map(|(key, iface)| (IfaceId(key), iface))
    }

    /// Find an interface by its name, e.g. `eth0`.
    pub fn interface_by_name(&self, name: &str) -> Option<IfaceId> {
        self.interfaces().find(|(_, iface)| iface.name() == name).map(|(id, _)| id)
    }

    pub(crate) fn iface(&self, iface: IfaceId) -> Result<&Interface> {
        self.interface(iface).ok_or(Error::NotFound)
    }

    pub(crate) fn iface_mut(&mut self, iface: IfaceId) -> Result<&mut Interface> {
        self.interface_mut(iface).ok_or(Error::NotFound)
    }

    pub(crate) fn is_up(&self, iface: IfaceId) -> bool {
        self.interface(iface).map_or(false, Interface::is_up)
    }

    fn next_unit(&self, pred: impl Fn(&Kind) -> bool) -> u16 {
        self.interfaces.iter().filter(|(_, iface)| pred(iface.kind())).count() as u16
    }

    fn interface_insert(&mut self, iface: Interface) -> IfaceId {
        let id = IfaceId(self.interfaces.insert(iface));
        net_debug!("{}: added interface {}", self.name, self.interfaces.get(id.0).map(Interface::name).unwrap_or_default());
        self.emit(Event::InterfaceAdd(id));
        id
    }

    /// Add an Ethernet interface with the given hardware address.
    ///
    /// The interface stays down until it is connected.
    pub fn interface_add_ethernet(&mut self, mac: EthernetAddress) -> IfaceId {
        let unit = self.next_unit(|kind| matches!(kind, Kind::Ethernet(_)));
        let iface = Interface::ethernet(unit, mac, self.config.ethernet_mtu);
        self.interface_insert(iface)
    }

    /// Add a loopback interface.
    ///
    /// It has no addresses and is down until [`loopback_start`] is called.
    ///
    /// [`loopback_start`]: #method.loopback_start
    pub fn interface_add_loopback(&mut self) -> IfaceId {
        let unit = self.next_unit(|kind| *kind == Kind::Loopback);
        let iface = Interface::loopback(unit, self.config.loopback_mtu);
        self.interface_insert(iface)
    }

    /// Add the layer 3 interface of a VLAN.
    pub fn interface_add_vlan(&mut self, vid: u16, mac: EthernetAddress) -> Result<IfaceId> {
        if vid == 0 || vid > 4094 {
            return Err(Error::Illegal("vlan identifier out of range"));
        }
        if self.vlan_interface(vid).is_some() {
            return Err(Error::AlreadyInUse);
        }
        let iface = Interface::vlan(vid, mac, self.config.vlan_mtu);
        Ok(self.interface_insert(iface))
    }

    /// The vlan interface of a VID.
    pub fn vlan_interface(&self, vid: u16) -> Option<IfaceId> {
        self.interfaces().find(|(_, iface)| iface.vid() == Some(vid)).map(|(id, _)| id)
    }

    /// Remove an interface with its routes, neighbor entries and waiting packets.
    ///
    /// Returns the remote end of its wire. The caller is responsible for clearing the remote
    /// end, [`Network::remove_interface`] does both.
    ///
    /// [`Network::remove_interface`]: ../network/struct.Network.html#method.remove_interface
    pub fn interface_remove(&mut self, iface: IfaceId) -> Result<Option<Link>> {
        let link = self.iface(iface)?.link();
        if link.is_some() {
            self.emit(Event::InterfaceDisconnect(iface));
        }
        self.routes.remove_iface(iface);
        self.neighbors.invalidate(iface);
        self.neighbors.drop_pending(iface);
        self.iface_mut(iface)?.clear_subscriptions();
        self.interfaces.remove(iface.0);
        net_debug!("{}: removed interface {}", self.name, iface);
        self.emit(Event::InterfaceRemove(iface));
        Ok(link)
    }

    /// Assign the address of its family to an interface.
    ///
    /// Replaces a previous address of the same family. Routes of the interface that no longer
    /// fit the new network are pruned and the connected route of the new network is added.
    pub fn interface_set_address(&mut self, iface: IfaceId, address: IpAddress, mask: Mask)
        -> Result<()>
    {
        if mask.family() != address.family() {
            return Err(Error::Mask(crate::wire::MaskError::FamilyMismatch));
        }
        if let IpAddress::Mac(_) = address {
            return Err(Error::Illegal("hardware addresses can not be assigned"));
        }
        let binding = Binding { address, mask };
        self.iface_mut(iface)?.set_address(binding);
        self.routes.assign(iface, &binding)?;
        net_debug!("{}: {} has address {}/{}", self.name, iface, address, mask.prefix_len());
        self.emit(Event::InterfaceSetAddress(iface));
        Ok(())
    }

    /// Remove an address from an interface.
    ///
    /// Non-static routes leading into the removed network are removed as well.
    pub fn interface_address_remove(&mut self, iface: IfaceId, address: IpAddress) -> Result<()> {
        let binding = self.iface_mut(iface)?
            .remove_address(&address)
            .ok_or(Error::NotFound)?;
        self.routes.unassign(iface, &binding);
        self.emit(Event::InterfaceSetAddress(iface));
        Ok(())
    }

    /// Join a multicast group, given as protocol or hardware address.
    ///
    /// Returns `false` if the interface was subscribed already.
    pub fn interface_mcast_subscribe(&mut self, iface: IfaceId, group: IpAddress) -> Result<bool> {
        let added = self.iface_mut(iface)?.subscribe(group);
        if added {
            self.emit(Event::McastSubscribe(iface));
        }
        Ok(added)
    }

    /// Leave a multicast group.
    ///
    /// Returns `false` if the interface was not subscribed.
    pub fn interface_mcast_unsubscribe(&mut self, iface: IfaceId, group: IpAddress) -> Result<bool> {
        let removed = self.iface_mut(iface)?.unsubscribe(&group);
        if removed {
            self.emit(Event::McastUnsubscribe(iface));
        }
        Ok(removed)
    }

    /// Set or clear the tagging mode of an Ethernet interface.
    pub fn interface_set_vlan(&mut self, iface: IfaceId, mode: Option<VlanMode>) -> Result<()> {
        if let Some(VlanMode::Trunk(vids)) = &mode {
            if vids.is_empty() {
                return Err(Error::Illegal("a trunk needs at least one vlan"));
            }
        }
        self.iface_mut(iface)?
            .as_ethernet_mut()
            .ok_or(Error::Illegal("only ethernet interfaces carry vlans"))?
            .set_vlan(mode);
        Ok(())
    }

    /// Bring a loopback interface up with its well-known addresses.
    pub fn loopback_start(&mut self, iface: IfaceId) -> Result<()> {
        if !self.iface(iface)?.is_loopback() {
            return Err(Error::Illegal("not a loopback interface"));
        }
        for binding in nic::loopback_bindings()?.iter() {
            self.interface_set_address(iface, binding.address, binding.mask)?;
        }
        self.iface_mut(iface)?.set_up(true);
        Ok(())
    }

    /// Attach or detach the wire of an Ethernet interface.
    ///
    /// Attaching sets the interface up. Detaching sets it down and forgets the neighbors learned
    /// through it. Returns the previous remote end.
    pub(crate) fn interface_link(&mut self, iface: IfaceId, link: Option<Link>) -> Result<Option<Link>> {
        let up = link.is_some();
        let old = {
            let iface = self.iface_mut(iface)?;
            let old = iface.as_ethernet_mut()
                .ok_or(Error::Illegal("only ethernet interfaces can be wired"))?
                .set_link(link);
            iface.set_up(up);
            old
        };

        if up {
            self.emit(Event::InterfaceConnect(iface));
        } else if old.is_some() {
            self.neighbors.invalidate(iface);
            self.neighbors.drop_pending(iface);
            self.emit(Event::InterfaceDisconnect(iface));
        }
        Ok(old)
    }

    /// Register an observer of the device's events.
    pub fn on_event<F>(&mut self, hook: F)
        where F: FnMut(&Event) + 'static
    {
        self.hooks.push(Box::new(hook));
    }

    /// Remove all observers.
    pub fn clear_hooks(&mut self) {
        self.hooks.clear();
    }

    pub(crate) fn emit(&mut self, event: Event) {
        self.hooks.emit(&event);
    }

    /// The key/value store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Get a record of the store.
    pub fn store_get(&self, key: &str) -> Option<&Record> {
        self.store.get(key)
    }

    /// Write a record, returning the previous one.
    pub fn store_set(&mut self, key: &str, record: Record) -> Option<Record> {
        let old = self.store.set(key, record);
        self.emit(Event::StoreSet(key.to_owned()));
        old
    }

    /// Delete a record, returning it.
    pub fn store_delete(&mut self, key: &str) -> Option<Record> {
        let old = self.store.delete(key)?;
        self.emit(Event::StoreDelete(key.to_owned()));
        Some(old)
    }

    pub(crate) fn transmit(&mut self, transmit: Transmit) {
        let iface = match &transmit {
            Transmit::Wire { iface, .. }
            | Transmit::Local { iface, .. }
            | Transmit::Loopback { iface, .. } => *iface,
        };
        self.emit(Event::InterfaceSend(iface));
        self.outbox.push_back(transmit);
    }

    pub(crate) fn take_outbox(&mut self) -> VecDeque<Transmit> {
        core::mem::take(&mut self.outbox)
    }

    /// Query whether frames are waiting to be delivered by the network.
    pub fn has_outgoing(&self) -> bool {
        !self.outbox.is_empty()
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("interfaces", &self.interfaces)
            .field("routes", &self.routes)
            .field("neighbors", &self.neighbors)
            .finish()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "dev{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::wire::{Family, Ipv4Address, Ipv6Address};

    const MAC: EthernetAddress = EthernetAddress([0xfa, 0xff, 0x0f, 0, 0, 1]);

    fn mask(family: Family, len: usize) -> Mask {
        Mask::new(family, len).unwrap()
    }

    #[test]
    fn units_count_per_kind() {
        let mut device = Device::new("host", Config::default());
        let eth0 = device.interface_add_ethernet(MAC);
        let lo0 = device.interface_add_loopback();
        let eth1 = device.interface_add_ethernet(EthernetAddress([0xfa, 0xff, 0x0f, 0, 0, 2]));
        let vlan = device.interface_add_vlan(10, MAC).unwrap();

        let names: Vec<_> = device.interfaces().map(|(_, iface)| iface.name()).collect();
        assert_eq!(names, vec!["eth0", "lo0", "eth1", "vlanif10"]);
        assert_eq!(device.interface_by_name("eth1"), Some(eth1));
        assert_eq!(device.interface_by_name("lo0"), Some(lo0));
        assert_eq!(device.vlan_interface(10), Some(vlan));
        assert_eq!(device.interface_add_vlan(10, MAC), Err(Error::AlreadyInUse));
        assert!(device.interface(eth0).is_some());
    }

    #[test]
    fn loopback_start() {
        let mut device = Device::new("host", Config::default());
        let lo = device.interface_add_loopback();
        device.loopback_start(lo).unwrap();

        let iface = device.interface(lo).unwrap();
        assert!(iface.is_up());
        assert_eq!(iface.address(Family::Ipv4).map(|b| b.address),
            Some(Ipv4Address::LOOPBACK.into()));
        assert_eq!(iface.address(Family::Ipv6).map(|b| b.address),
            Some(Ipv6Address::LOOPBACK.into()));
        assert_eq!(device.routes.len(), 2);
    }

    #[test]
    fn events_are_synchronous() {
        let mut device = Device::new("host", Config::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        device.on_event(move |event| log.borrow_mut().push(event.clone()));

        let eth0 = device.interface_add_ethernet(MAC);
        device.interface_set_address(eth0, Ipv4Address::new(10, 0, 0, 1).into(),
            mask(Family::Ipv4, 24)).unwrap();
        device.interface_mcast_subscribe(eth0, Ipv4Address::new(224, 0, 0, 5).into()).unwrap();
        device.store_set("name", Record::new());
        device.store_delete("name");
        device.interface_remove(eth0).unwrap();

        assert_eq!(*seen.borrow(), vec![
            Event::InterfaceAdd(eth0),
            Event::InterfaceSetAddress(eth0),
            Event::McastSubscribe(eth0),
            Event::StoreSet("name".into()),
            Event::StoreDelete("name".into()),
            Event::InterfaceRemove(eth0),
        ]);
    }

    #[test]
    fn address_removal() {
        let mut device = Device::new("host", Config::default());
        let eth0 = device.interface_add_ethernet(MAC);
        let addr = Ipv4Address::new(10, 0, 0, 1).into();
        device.interface_set_address(eth0, addr, mask(Family::Ipv4, 24)).unwrap();
        assert_eq!(device.routes.len(), 1);

        device.interface_address_remove(eth0, addr).unwrap();
        assert!(device.routes.is_empty());
        assert_eq!(device.interface_address_remove(eth0, addr), Err(Error::NotFound));
    }

    #[test]
    fn family_mismatch() {
        let mut device = Device::new("host", Config::default());
        let eth0 = device.interface_add_ethernet(MAC);
        let result = device.interface_set_address(eth0,
            Ipv4Address::new(10, 0, 0, 1).into(), mask(Family::Ipv6, 64));
        assert_eq!(result, Err(Error::Mask(crate::wire::MaskError::FamilyMismatch)));
    }

    #[test]
    fn stale_interface() {
        let mut device = Device::new("host", Config::default());
        let eth0 = device.interface_add_ethernet(MAC);
        device.interface_remove(eth0).unwrap();
        assert_eq!(device.interface_remove(eth0), Err(Error::NotFound));
        assert!(device.interface(eth0).is_none());
    }
}
