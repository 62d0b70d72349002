//! Contacts, the socket-like handles of programs.
//!
//! A contact is created for an address family and a transport. Raw contacts see whole frames
//! (link family) or whole IP packets, UDP contacts exchange datagram payloads and are bound to a
//! four tuple. Inbound datagrams go to the single most specific matching contact, see
//! [`most_specific`].
//!
//! Every contact can have one receiver and any number of error handlers. Both are taken out of
//! the registry while they run so that they can use the device freely, including closing their
//! own contact.
//!
//! [`most_specific`]: fn.most_specific.html
use core::fmt;

use crate::config::Config;
use crate::device::Device;
use crate::managed::{Key, SlotMap};
use crate::nic::IfaceId;
use crate::wire::{EtherType, EthernetAddress, Family, IpAddress};

use super::{Delivery, Error, Meta, Recv, Result, Sent};

#[cfg(test)]
mod tests;

/// The key of a contact within its device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContactId(pub(crate) Key);

/// The layer at which a contact operates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContactFamily {
    /// Whole Ethernet frames.
    Raw,
    /// IPv4 packets.
    Ipv4,
    /// IPv6 packets.
    Ipv6,
}

/// The transport protocol of a contact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transport {
    /// No transport, the contact sees whole packets of its family.
    Raw,
    /// User datagrams.
    Udp,
}

/// A four tuple from the perspective of the local device.
///
/// Unspecified addresses and port `0` are wildcards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContactAddress {
    /// The local address.
    pub saddr: IpAddress,
    /// The remote address.
    pub daddr: IpAddress,
    /// The local port.
    pub sport: u16,
    /// The remote port.
    pub dport: u16,
}

/// A handler of send errors.
pub type ErrorHandler = Box<dyn FnMut(&Error)>;

struct Receiver {
    handler: Box<dyn Recv>,
    promiscuous: bool,
}

/// A contact and everything registered on it.
pub struct Contact {
    family: ContactFamily,
    transport: Transport,
    address: Option<ContactAddress>,
    receiver: Option<Receiver>,
    errors: Vec<ErrorHandler>,
}

/// The contacts of a device.
pub(crate) struct Registry {
    contacts: SlotMap<Contact>,
    ephemeral: u16,
    min_ephemeral: u16,
    ephemeral_step: u16,
}

impl ContactFamily {
    /// The address family of the tuples of this contact family.
    pub fn address_family(self) -> Option<Family> {
        match self {
            ContactFamily::Raw => None,
            ContactFamily::Ipv4 => Some(Family::Ipv4),
            ContactFamily::Ipv6 => Some(Family::Ipv6),
        }
    }
}

impl ContactAddress {
    /// The tuple matching everything of a family.
    pub fn any(family: Family) -> Self {
        ContactAddress {
            saddr: IpAddress::unspecified(family),
            daddr: IpAddress::unspecified(family),
            sport: 0,
            dport: 0,
        }
    }

    /// A tuple towards a remote address and port.
    pub fn remote(daddr: IpAddress, dport: u16) -> Self {
        ContactAddress { daddr, dport, ..ContactAddress::any(daddr.family()) }
    }

    /// A tuple listening on a local port.
    pub fn local(saddr: IpAddress, sport: u16) -> Self {
        ContactAddress { saddr, sport, ..ContactAddress::any(saddr.family()) }
    }

    /// Query whether both addresses belong to `family`.
    pub fn is_family(&self, family: Family) -> bool {
        self.saddr.family() == family && self.daddr.family() == family
    }

    /// The number of fields that are not wildcards.
    pub fn specificity(&self) -> usize {
        [!self.saddr.is_unspecified(), !self.daddr.is_unspecified(), self.sport != 0, self.dport != 0]
            .iter()
            .filter(|set| **set)
            .count()
    }

    /// Query whether every field that is not a wildcard equals the packet's.
    pub fn matches(&self, packet: &ContactAddress) -> bool {
        (self.saddr.is_unspecified() || self.saddr == packet.saddr)
            && (self.daddr.is_unspecified() || self.daddr == packet.daddr)
            && (self.sport == 0 || self.sport == packet.sport)
            && (self.dport == 0 || self.dport == packet.dport)
    }
}

impl fmt::Display for ContactAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{} -> {}:{}", self.saddr, self.sport, self.daddr, self.dport)
    }
}

/// Select the most specific candidate for a packet.
///
/// A candidate without address matches everything with specificity zero. A bound candidate
/// matches if all of its set fields equal those of the packet. The candidate with the most set
/// fields wins, the first one in iteration order among equals.
pub fn most_specific<K, I>(packet: &ContactAddress, candidates: I) -> Option<K>
    where I: IntoIterator<Item=(K, Option<ContactAddress>)>
{
    let mut best: Option<(K, usize)> = None;
    for (key, address) in candidates {
        let rank = match address {
            None => 0,
            Some(address) if address.matches(packet) => address.specificity(),
            Some(_) => continue,
        };
        match best {
            Some((_, best_rank)) if best_rank >= rank => (),
            _ => best = Some((key, rank)),
        }
    }
    best.map(|(key, _)| key)
}

impl Contact {
    /// The layer of the contact.
    pub fn family(&self) -> ContactFamily {
        self.family
    }

    /// The transport of the contact.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// The bound tuple.
    pub fn address(&self) -> Option<&ContactAddress> {
        self.address.as_ref()
    }

    /// Query whether a receiver is registered.
    pub fn has_receiver(&self) -> bool {
        self.receiver.is_some()
    }

    /// Query whether the registered receiver sees packets for other hosts.
    pub fn is_promiscuous(&self) -> bool {
        self.receiver.as_ref().map_or(false, |receiver| receiver.promiscuous)
    }
}

impl fmt::Debug for Contact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Contact")
            .field("family", &self.family)
            .field("transport", &self.transport)
            .field("address", &self.address)
            .field("receiver", &self.has_receiver())
            .finish()
    }
}

impl Registry {
    pub(crate) fn new(config: &Config) -> Self {
        Registry {
            contacts: SlotMap::new(),
            ephemeral: config.first_ephemeral_port,
            min_ephemeral: config.min_ephemeral_port,
            ephemeral_step: config.ephemeral_step,
        }
    }

    pub(crate) fn get(&self, id: ContactId) -> Option<&Contact> {
        self.contacts.get(id.0)
    }

    fn contact(&self, id: ContactId) -> Result<&Contact> {
        self.contacts.get(id.0).ok_or(Error::NotFound)
    }

    fn contact_mut(&mut self, id: ContactId) -> Result<&mut Contact> {
        self.contacts.get_mut(id.0).ok_or(Error::NotFound)
    }

    fn next_ephemeral(&mut self) -> u16 {
        let next = (u32::from(self.ephemeral) + u32::from(self.ephemeral_step)) % 0xffff;
        self.ephemeral = (next as u16).max(self.min_ephemeral);
        self.ephemeral
    }

    fn bind(&mut self, id: ContactId, address: ContactAddress) -> Result<()> {
        let contact = self.contact(id)?;
        let family = match (contact.family.address_family(), contact.transport) {
            (Some(family), Transport::Udp) => family,
            _ => return Err(Error::Illegal("raw contacts can not be bound")),
        };
        if contact.address.is_some() {
            return Err(Error::Illegal("contact is already bound"));
        }
        if !address.is_family(family) {
            return Err(Error::Illegal("address family does not match the contact"));
        }

        let (transport, contact_family) = (contact.transport, contact.family);
        let in_use = self.contacts.iter().any(|(key, other)| {
            key != id.0
                && other.family == contact_family
                && other.transport == transport
                && other.address == Some(address)
        });
        if in_use {
            return Err(Error::AlreadyInUse);
        }

        self.contact_mut(id)?.address = Some(address);
        Ok(())
    }

    /// Contacts that may receive a raw packet of this family.
    fn raw_listeners(&self, family: ContactFamily, destination: bool) -> Vec<ContactId> {
        self.contacts.iter()
            .filter(|(_, contact)| contact.family == family && contact.transport == Transport::Raw)
            .filter(|(_, contact)| match &contact.receiver {
                Some(receiver) => receiver.promiscuous || destination,
                None => false,
            })
            .map(|(key, _)| ContactId(key))
            .collect()
    }

    /// Query whether some raw contact of the family wants packets for other hosts.
    pub(crate) fn has_promiscuous(&self, family: ContactFamily) -> bool {
        self.contacts.iter().any(|(_, contact)| {
            contact.family == family && contact.transport == Transport::Raw && contact.is_promiscuous()
        })
    }

    fn udp_listener(&self, family: ContactFamily, packet: &ContactAddress) -> Option<ContactId> {
        let candidates = self.contacts.iter()
            .filter(|(_, contact)| contact.family == family && contact.transport == Transport::Udp)
            .filter(|(_, contact)| contact.has_receiver())
            .map(|(key, contact)| (ContactId(key), contact.address));
        most_specific(packet, candidates)
    }
}

/// Contact operations of a device.
impl Device {
    /// Open a new, unbound contact.
    pub fn contact_create(&mut self, family: ContactFamily, transport: Transport) -> ContactId {
        let contact = Contact {
            family,
            transport,
            address: None,
            receiver: None,
            errors: Vec::new(),
        };
        ContactId(self.contacts.contacts.insert(contact))
    }

    /// Inspect a contact.
    pub fn contact(&self, id: ContactId) -> Option<&Contact> {
        self.contacts.get(id)
    }

    /// Bind a UDP contact to a four tuple.
    ///
    /// Fails with `AlreadyInUse` if another contact of the same family and transport is bound
    /// to exactly the same tuple.
    pub fn contact_bind(&mut self, id: ContactId, address: ContactAddress) -> Result<()> {
        self.contacts.bind(id, address)
    }

    /// Register the receiver of a contact, replacing a previous one.
    ///
    /// A promiscuous receiver of a raw contact also sees packets not addressed to this device.
    pub fn contact_receive<R>(&mut self, id: ContactId, receiver: R, promiscuous: bool) -> Result<()>
        where R: Recv + 'static
    {
        self.contacts.contact_mut(id)?.receiver = Some(Receiver {
            handler: Box::new(receiver),
            promiscuous,
        });
        Ok(())
    }

    /// Bind a UDP contact to a tuple and register its receiver.
    pub fn contact_receive_from<R>(&mut self, id: ContactId, receiver: R, address: ContactAddress)
        -> Result<()>
        where R: Recv + 'static
    {
        self.contact_bind(id, address)?;
        self.contact_receive(id, receiver, false)
    }

    /// Register a handler for the errors of send operations on a contact.
    pub fn contact_on_error<F>(&mut self, id: ContactId, handler: F) -> Result<()>
        where F: FnMut(&Error) + 'static
    {
        self.contacts.contact_mut(id)?.errors.push(Box::new(handler));
        Ok(())
    }

    /// Close a contact, dropping its receiver and error handlers.
    ///
    /// Closing a contact that is already closed succeeds.
    pub fn contact_close(&mut self, id: ContactId) -> Result<()> {
        self.contacts.contacts.remove(id.0);
        Ok(())
    }

    /// Send on a contact.
    ///
    /// A bound UDP contact sends `data` as datagram payload to its tuple. A raw IP contact sends
    /// `data` as a complete IP packet of its family, filling in unset header fields.
    pub fn contact_send(&mut self, id: ContactId, data: &[u8]) -> Result<Sent> {
        let result = self.contact_send_inner(id, data);
        self.contact_report(id, result)
    }

    fn contact_send_inner(&mut self, id: ContactId, data: &[u8]) -> Result<Sent> {
        let (family, transport, address) = {
            let contact = self.contacts.contact(id)?;
            (contact.family, contact.transport, contact.address)
        };
        match (family, transport) {
            (ContactFamily::Raw, _) =>
                Err(Error::Illegal("link contacts send with contact_send_link")),
            (ContactFamily::Ipv4, Transport::Raw) => self.output_ipv4(data.to_vec(), None),
            (ContactFamily::Ipv6, Transport::Raw) => self.output_ipv6(data.to_vec(), None),
            (_, Transport::Udp) => match address {
                Some(address) => self.udp_output(address, data),
                None => Err(Error::Illegal("contact must be bound")),
            },
        }
    }

    /// Bind an unbound UDP contact towards `address` and send on it.
    ///
    /// The remote address and port are required. An unset local address stays a wildcard and
    /// is chosen by the route on each send, an unset local port gets the next ephemeral port.
    pub fn contact_send_to(&mut self, id: ContactId, data: &[u8], address: ContactAddress)
        -> Result<Sent>
    {
        let result = self.contact_send_to_inner(id, data, address);
        self.contact_report(id, result)
    }

    fn contact_send_to_inner(&mut self, id: ContactId, data: &[u8], mut address: ContactAddress)
        -> Result<Sent>
    {
        let contact = self.contacts.contact(id)?;
        if contact.transport != Transport::Udp {
            return Err(Error::Illegal("only datagram contacts send to an address"));
        }
        if contact.address.is_some() {
            return Err(Error::Illegal("contact is bound, use contact_send"));
        }
        if address.daddr.is_unspecified() || address.dport == 0 {
            return Err(Error::Illegal("destination address and port are required"));
        }
        if address.sport == 0 {
            address.sport = self.contacts.next_ephemeral();
        }
        self.contact_bind(id, address)?;
        self.contact_send_inner(id, data)
    }

    /// Send a frame through a link contact.
    ///
    /// `payload` is the Ethernet payload, the header is built from the interface's address and
    /// the given destination.
    pub fn contact_send_link(
        &mut self,
        id: ContactId,
        iface: IfaceId,
        dst_addr: EthernetAddress,
        ethertype: EtherType,
        payload: &[u8],
    ) -> Result<Sent> {
        let family = self.contacts.contact(id).map(Contact::family);
        let result = match family {
            Ok(ContactFamily::Raw) => self.output_frame(iface, dst_addr, ethertype, payload),
            Ok(_) => Err(Error::Illegal("not a link contact")),
            Err(err) => Err(err),
        };
        self.contact_report(id, result)
    }

    /// Hand the error of a send to the handlers of the contact.
    fn contact_report(&mut self, id: ContactId, result: Result<Sent>) -> Result<Sent> {
        let err = match result {
            Err(err) => err,
            ok => return ok,
        };
        let mut handlers = match self.contacts.contact_mut(id) {
            Ok(contact) => core::mem::take(&mut contact.errors),
            Err(_) => return Err(err),
        };
        for handler in handlers.iter_mut() {
            handler(&err);
        }
        if let Ok(contact) = self.contacts.contact_mut(id) {
            handlers.append(&mut contact.errors);
            contact.errors = handlers;
        }
        Err(err)
    }

    /// Call the receiver of one contact.
    fn contact_deliver(&mut self, id: ContactId, delivery: Delivery<'_>) {
        let mut receiver = match self.contacts.contact_mut(id) {
            Ok(contact) => match contact.receiver.take() {
                Some(receiver) => receiver,
                None => return,
            },
            Err(_) => return,
        };

        receiver.handler.receive(self, delivery);

        // Keep a receiver registered from within the callback.
        if let Ok(contact) = self.contacts.contact_mut(id) {
            if contact.receiver.is_none() {
                contact.receiver = Some(receiver);
            }
        }
    }

    /// Give a frame or packet to the raw contacts of a family.
    ///
    /// Non-promiscuous receivers only see packets destined to this device.
    pub(crate) fn contact_input_raw(&mut self, family: ContactFamily, meta: Meta, payload: &[u8]) {
        for id in self.contacts.raw_listeners(family, meta.destination) {
            self.contact_deliver(id, Delivery { contact: id, meta, address: None, payload });
        }
    }

    /// Give a datagram to the most specific UDP contact.
    ///
    /// Returns `false` if no contact listens.
    pub(crate) fn contact_input_udp(
        &mut self,
        family: ContactFamily,
        meta: Meta,
        address: ContactAddress,
        payload: &[u8],
    ) -> bool {
        match self.contacts.udp_listener(family, &address) {
            Some(id) => {
                let delivery = Delivery { contact: id, meta, address: Some(address), payload };
                self.contact_deliver(id, delivery);
                true
            },
            None => false,
        }
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "contact{}", self.0)
    }
}
