//! Neighbor resolution.
//!
//! IPv4 next hops are resolved with ARP, IPv6 next hops with the neighbor solicitation and
//! advertisement messages of ICMPv6. Both share one [`NeighborCache`] keyed by the
//! family-tagged protocol address.
//!
//! A packet whose next hop is unknown is parked in the cache and a solicitation is sent for the
//! first packet only. When the answer arrives the queue of that next hop is taken as a whole and
//! every packet is sent again. There are no retransmissions and entries do not expire.
//!
//! [`NeighborCache`]: struct.NeighborCache.html
use crate::device::Device;
use crate::layer::ip::Route;
use crate::nic::{Binding, IfaceId};
use crate::wire::{arp_packet, ArpOperation, ArpRepr, EtherType, EthernetAddress};
use crate::wire::{Icmpv6Repr, IpAddress, IpProtocol, Ipv6Address, Ipv6Repr};
use crate::wire::NeighborFlags;

use super::{Error, Meta, Result, Sent};

mod neighbor;

pub use self::neighbor::{
    Answer,
    Cache as NeighborCache,
    Neighbor,
    Pending,
};

/// The hop limit of neighbor discovery messages.
const NDP_HOP_LIMIT: u8 = 255;

/// The outcome of resolving the hardware address of a next hop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolved {
    /// Send the frame to this address.
    Hardware(EthernetAddress),

    /// The packet was parked until the neighbor answers.
    Pending,
}

/// Neighbor resolution of a device.
impl Device {
    /// The neighbor cache.
    pub fn neighbors(&self) -> &NeighborCache {
        &self.neighbors
    }

    /// Add or refresh a neighbor entry by hand.
    ///
    /// Packets waiting for the address are sent.
    pub fn neighbor_add(&mut self, iface: IfaceId, protocol_addr: IpAddress, hardware_addr: EthernetAddress)
        -> Result<()>
    {
        self.iface(iface)?;
        if !hardware_addr.is_unicast() {
            return Err(Error::Illegal("neighbors have unicast hardware addresses"));
        }
        self.neighbor_learn(iface, protocol_addr, hardware_addr);
        Ok(())
    }

    /// Forget the neighbors learned on an interface.
    pub fn arp_invalidate(&mut self, iface: IfaceId) -> usize {
        self.neighbors.invalidate(iface)
    }

    /// Find the hardware address for a packet, or park the packet.
    ///
    /// Broadcasts and IPv6 multicasts go to the broadcast address. For gateway routes the gateway
    /// is resolved instead of the destination.
    pub(crate) fn arp_resolve(
        &mut self,
        packet: &[u8],
        destination: IpAddress,
        route: &Route,
        broadcast: bool,
    ) -> Result<Resolved> {
        if broadcast || destination.is_multicast() {
            return Ok(Resolved::Hardware(EthernetAddress::BROADCAST));
        }

        let next_hop = route.next_hop(destination);
        if let Answer::Found(hardware_addr) = self.neighbors.lookup(&next_hop) {
            return Ok(Resolved::Hardware(hardware_addr));
        }

        let pending = Pending { packet: packet.to_vec(), destination, route: *route };
        if self.neighbors.enqueue(next_hop, pending) {
            net_debug!("{}: resolving {} for {}", self.name(), next_hop, destination);
            self.solicit(next_hop);
        }
        Ok(Resolved::Pending)
    }

    /// Record a neighbor and send everything that waited for it.
    pub(crate) fn neighbor_learn(&mut self, iface: IfaceId, protocol_addr: IpAddress, hardware_addr: EthernetAddress) {
        if protocol_addr.is_unspecified() || !hardware_addr.is_unicast() {
            return;
        }

        let neighbor = Neighbor { protocol_addr, iface, hardware_addr, created_at: self.now() };
        if self.neighbors.fill(neighbor).is_none() {
            net_trace!("{}: learned {} at {} on {}", self.name(), protocol_addr, hardware_addr, iface);
        }

        for pending in self.neighbors.take_pending(&protocol_addr) {
            let Pending { packet, destination, route } = pending;
            if let Err(_err) = self.interface_output(packet, destination, &route, false) {
                net_debug!("{}: dropped parked packet to {}: {}", self.name(), destination, _err);
            }
        }
    }

    /// Ask for the hardware address of `target`.
    ///
    /// One solicitation goes out on every interface that is up and has both a hardware address
    /// and an address of the target's family.
    fn solicit(&mut self, target: IpAddress) {
        let family = target.family();
        let candidates: Vec<(IfaceId, EthernetAddress, Binding)> = self.interfaces()
            .filter(|(_, iface)| iface.is_up())
            .filter_map(|(id, iface)| Some((id, iface.mac()?, *iface.address(family)?)))
            .collect();

        if candidates.is_empty() {
            net_warn!("{}: no interface to resolve {} on", self.name(), target);
        }

        for (iface, mac, binding) in candidates {
            let sent = match (binding.address, target) {
                (IpAddress::Ipv4(source), IpAddress::Ipv4(target)) => {
                    let request = ArpRepr {
                        operation: ArpOperation::Request,
                        source_hardware_addr: mac,
                        source_protocol_addr: source,
                        target_hardware_addr: EthernetAddress::default(),
                        target_protocol_addr: target,
                    };
                    self.output_frame(iface, EthernetAddress::BROADCAST, EtherType::Arp, &request.to_bytes())
                },
                (IpAddress::Ipv6(source), IpAddress::Ipv6(target)) => {
                    let solicit = Icmpv6Repr::NeighborSolicit { target_addr: target, lladdr: Some(mac) };
                    self.output_ndp(iface, source, Ipv6Address::LINK_LOCAL_ALL_NODES,
                        EthernetAddress::BROADCAST, &solicit)
                },
                _ => continue,
            };
            if let Err(_err) = sent {
                net_debug!("{}: solicitation on {} failed: {}", self.name(), iface, _err);
            }
        }
    }

    /// Handle an ARP packet addressed to this device.
    pub(crate) fn receive_arp(&mut self, meta: Meta, payload: &[u8]) {
        let repr = match arp_packet::new_checked(payload).and_then(ArpRepr::parse) {
            Ok(repr) => repr,
            Err(_err) => {
                net_debug!("{}: dropped arp packet: {}", self.name(), _err);
                return;
            },
        };
        net_trace!("{}: {} received {}", self.name(), meta.rcvif, repr);

        let iface = meta.rcvif;
        let sender = IpAddress::from(repr.source_protocol_addr);
        let target = IpAddress::from(repr.target_protocol_addr);

        match repr.operation {
            ArpOperation::Request => {
                let mac = match self.interface(iface) {
                    Some(interface) if interface.has_address(&target) => interface.mac(),
                    _ => return,
                };
                let mac = match mac {
                    Some(mac) => mac,
                    None => return,
                };
                self.neighbor_learn(iface, sender, repr.source_hardware_addr);

                let reply = ArpRepr {
                    operation: ArpOperation::Reply,
                    source_hardware_addr: mac,
                    source_protocol_addr: repr.target_protocol_addr,
                    target_hardware_addr: repr.source_hardware_addr,
                    target_protocol_addr: repr.source_protocol_addr,
                };
                let sent = self.output_frame(iface, repr.source_hardware_addr, EtherType::Arp,
                    &reply.to_bytes());
                if let Err(_err) = sent {
                    net_debug!("{}: arp reply on {} failed: {}", self.name(), iface, _err);
                }
            },
            ArpOperation::Reply => self.neighbor_learn(iface, sender, repr.source_hardware_addr),
            ArpOperation::Unknown(_op) => {
                net_debug!("{}: unknown arp operation {}", self.name(), _op);
            },
        }
    }

    /// Handle a neighbor solicitation or advertisement.
    pub(crate) fn receive_ndp(&mut self, meta: Meta, src_addr: Ipv6Address, repr: &Icmpv6Repr) {
        let iface = meta.rcvif;
        match *repr {
            Icmpv6Repr::NeighborSolicit { target_addr, lladdr } => {
                let mac = match self.interface(iface) {
                    Some(interface) if interface.has_address(&target_addr.into()) => interface.mac(),
                    _ => return,
                };
                let mac = match mac {
                    Some(mac) => mac,
                    None => return,
                };

                let requester = lladdr.or(meta.src_mac);
                if let Some(requester) = requester {
                    self.neighbor_learn(iface, src_addr.into(), requester);
                }

                // Duplicate address detection uses the unspecified source.
                let (dst_addr, dst_mac) = match requester {
                    Some(requester) if !src_addr.is_unspecified() => (src_addr, requester),
                    _ => (Ipv6Address::LINK_LOCAL_ALL_NODES, EthernetAddress::BROADCAST),
                };
                let advert = Icmpv6Repr::NeighborAdvert {
                    flags: NeighborFlags::SOLICITED | NeighborFlags::OVERRIDE,
                    target_addr,
                    lladdr: Some(mac),
                };
                if let Err(_err) = self.output_ndp(iface, target_addr, dst_addr, dst_mac, &advert) {
                    net_debug!("{}: advertisement on {} failed: {}", self.name(), iface, _err);
                }
            },
            Icmpv6Repr::NeighborAdvert { target_addr, lladdr, .. } => {
                if let Some(hardware_addr) = lladdr.or(meta.src_mac) {
                    self.neighbor_learn(iface, target_addr.into(), hardware_addr);
                }
            },
            _ => (),
        }
    }

    /// Send a neighbor discovery message directly in a frame, bypassing routing.
    fn output_ndp(
        &mut self,
        iface: IfaceId,
        src_addr: Ipv6Address,
        dst_addr: Ipv6Address,
        dst_mac: EthernetAddress,
        repr: &Icmpv6Repr,
    ) -> Result<Sent> {
        let message = repr.to_bytes(&src_addr, &dst_addr);
        let packet = Ipv6Repr {
            src_addr,
            dst_addr,
            next_header: IpProtocol::Icmpv6,
            payload_len: message.len(),
            hop_limit: NDP_HOP_LIMIT,
        }.encapsulate(&message);
        self.output_frame(iface, dst_mac, EtherType::Ipv6, &packet)
    }
}
