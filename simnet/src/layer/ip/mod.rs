//! The IP layer.
//!
//! ## Sending
//!
//! An output takes a complete packet of its family. Header fields left at zero are filled in:
//! version and header length, the hop limit from the configuration, the length fields and an
//! unspecified source, which becomes the address of the outgoing interface. The route is the one
//! passed in or the result of [`route_resolve`]. Packets to one of the device's own addresses
//! never touch a wire but are looped back into the input.
//!
//! After the checks for the MTU (there is no fragmentation) the packet is given to neighbor
//! resolution, which either names the hardware destination or parks the packet.
//!
//! ## Receiving
//!
//! An incoming packet is classified from the perspective of this device: whether it is
//! addressed to it, a broadcast or a multicast. Raw IP contacts see the whole packet, then the
//! payload is dispatched to ICMP or UDP if the packet is for this device. Forwarding of other
//! packets is not done here but by the [`Router`] service.
//!
//! [`route_resolve`]: ../../struct.Device.html#method.route_resolve
//! [`Router`]: ../../service/struct.Router.html
use crate::device::{Device, Event, Transmit};
use crate::nic::{Capabilities, IfaceId, Protocol};
use crate::wire::{ipv4_packet, ipv6_packet, Checksum, EtherType, Family, IpAddress};
use crate::wire::{IpProtocol, Ipv4Address, Ipv4Repr, Ipv6Address, Ipv6Repr};
use crate::wire::{ipv4, ipv6};

use super::{Error, Meta, Result, Sent};
use super::arp::Resolved;
use super::icmp::IcmpError;
use super::contact::ContactFamily;

mod route;
#[cfg(test)]
mod tests;

pub use self::route::{
    Flags,
    Route,
    Routes,
};

/// Routing and the IP pipeline of a device.
impl Device {
    /// The routing table.
    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    /// Add a route.
    ///
    /// Returns `false` if an identical route exists already.
    pub fn route_add(&mut self, route: Route) -> Result<bool> {
        self.iface(route.iface)?;
        Ok(self.routes.add(route))
    }

    /// Remove all routes equal to `route`.
    pub fn route_remove(&mut self, route: &Route) -> Result<()> {
        match self.routes.remove(|other| other == route) {
            0 => Err(Error::NotFound),
            _ => Ok(()),
        }
    }

    /// Find the route for a destination over interfaces that are up.
    pub fn route_resolve(&self, destination: &IpAddress) -> Option<Route> {
        self.routes.resolve(destination, |iface| self.is_up(iface))
    }

    /// The interface with this address, if the device owns it.
    pub fn address_owner(&self, address: &IpAddress) -> Option<IfaceId> {
        self.interfaces()
            .find(|(_, iface)| iface.has_address(address))
            .map(|(id, _)| id)
    }

    /// Query whether the address is the directed broadcast of a network of this device.
    pub fn is_subnet_broadcast(&self, address: &IpAddress) -> bool {
        let bits = address.family().bits();
        self.interfaces()
            .flat_map(|(_, iface)| iface.addresses().iter())
            .filter(|binding| binding.mask.prefix_len() + 1 < bits)
            .any(|binding| binding.mask.broadcast(&binding.address).ok() == Some(*address))
    }

    /// Choose the source address for a packet to `destination`.
    pub(crate) fn select_source(&self, destination: &IpAddress, route: &Route) -> Result<IpAddress> {
        if self.address_owner(destination).is_some() {
            return Ok(*destination);
        }
        self.iface(route.iface)?
            .address(destination.family())
            .map(|binding| binding.address)
            .ok_or(Error::HostUnreachable)
    }

    fn route_for(&self, destination: &IpAddress, route: Option<Route>) -> Result<Route> {
        match route {
            Some(route) => Ok(route),
            None => self.route_resolve(destination).ok_or(Error::HostUnreachable),
        }
    }

    /// Send a complete IPv4 packet.
    ///
    /// Zero fields of the header are filled in, see the module documentation. The header
    /// checksum is always recomputed.
    pub fn output_ipv4(&mut self, mut packet: Vec<u8>, route: Option<Route>) -> Result<Sent> {
        if packet.len() < ipv4::HEADER_LEN {
            return Err(Error::Wire(crate::wire::Error::Truncated));
        }
        if packet.len() > usize::from(u16::max_value()) {
            return Err(Error::BadSize);
        }

        let default_ttl = self.config.default_ttl;
        let total_len = packet.len() as u16;
        {
            let ip = ipv4_packet::new_unchecked_mut(&mut packet);
            if ip.version() == 0 {
                ip.set_version(4);
            }
            if ip.header_len() == 0 {
                ip.set_header_len(ipv4::HEADER_LEN as u8);
            }
            if ip.hop_limit() == 0 {
                ip.set_hop_limit(default_ttl);
            }
            ip.set_total_len(total_len);
        }

        let (src_addr, dst_addr) = {
            let ip = ipv4_packet::new_checked(&packet)?;
            if ip.version() != 4 {
                return Err(Error::Illegal("not an ipv4 packet"));
            }
            (IpAddress::from(ip.src_addr()), IpAddress::from(ip.dst_addr()))
        };

        if let Some(owner) = self.address_owner(&dst_addr) {
            let ip = ipv4_packet::new_unchecked_mut(&mut packet);
            if src_addr.is_unspecified() {
                ip.set_src_addr(ip.dst_addr());
            }
            ip.fill_checksum();
            return self.output_loopback(owner, packet);
        }

        let route = self.route_for(&dst_addr, route)?;
        let (mtu, binding) = {
            let iface = self.iface(route.iface)?;
            (iface.mtu(), iface.address(Family::Ipv4).copied())
        };
        let binding = binding.ok_or(Error::HostUnreachable)?;

        if src_addr.is_unspecified() {
            match binding.address {
                IpAddress::Ipv4(source) => ipv4_packet::new_unchecked_mut(&mut packet).set_src_addr(source),
                _ => return Err(Error::HostUnreachable),
            }
        }

        if packet.len() > mtu {
            return Err(Error::FragmentationNotSupported);
        }

        ipv4_packet::new_unchecked_mut(&mut packet).fill_checksum();

        // Point to point and host masks have no host part to broadcast to.
        let broadcast = dst_addr.is_broadcast()
            || (binding.mask.prefix_len() + 1 < 32 && binding.mask.is_host_broadcast(&dst_addr));

        self.interface_output(packet, dst_addr, &route, broadcast)
    }

    /// Send a complete IPv6 packet.
    ///
    /// Multicast destinations go to the broadcast hardware address of the route's interface.
    pub fn output_ipv6(&mut self, mut packet: Vec<u8>, route: Option<Route>) -> Result<Sent> {
        if packet.len() < ipv6::HEADER_LEN {
            return Err(Error::Wire(crate::wire::Error::Truncated));
        }
        let payload_len = packet.len() - ipv6::HEADER_LEN;
        if payload_len > usize::from(u16::max_value()) {
            return Err(Error::BadSize);
        }

        let default_ttl = self.config.default_ttl;
        {
            let ip = ipv6_packet::new_unchecked_mut(&mut packet);
            if ip.version() == 0 {
                ip.set_version(6);
            }
            if ip.hop_limit() == 0 {
                ip.set_hop_limit(default_ttl);
            }
            ip.set_payload_len(payload_len as u16);
        }

        let (src_addr, dst_addr) = {
            let ip = ipv6_packet::new_checked(&packet)?;
            if ip.version() != 6 {
                return Err(Error::Illegal("not an ipv6 packet"));
            }
            (IpAddress::from(ip.src_addr()), IpAddress::from(ip.dst_addr()))
        };

        if let Some(owner) = self.address_owner(&dst_addr) {
            if src_addr.is_unspecified() {
                let ip = ipv6_packet::new_unchecked_mut(&mut packet);
                let dst = ip.dst_addr();
                ip.set_src_addr(dst);
            }
            return self.output_loopback(owner, packet);
        }

        let route = self.route_for(&dst_addr, route)?;
        let source = self.select_source(&dst_addr, &route)?;
        if src_addr.is_unspecified() {
            match source {
                IpAddress::Ipv6(source) => ipv6_packet::new_unchecked_mut(&mut packet).set_src_addr(source),
                _ => return Err(Error::HostUnreachable),
            }
        }

        if packet.len() > self.iface(route.iface)?.mtu() {
            return Err(Error::FragmentationNotSupported);
        }

        let multicast = dst_addr.is_multicast();
        self.interface_output(packet, dst_addr, &route, multicast)
    }

    /// Hand a finished packet to the interface of its route.
    pub(crate) fn interface_output(
        &mut self,
        packet: Vec<u8>,
        destination: IpAddress,
        route: &Route,
        broadcast: bool,
    ) -> Result<Sent> {
        let iface = self.iface(route.iface)?;
        if !iface.is_up() {
            return Err(Error::HostUnreachable);
        }
        if iface.is_loopback() {
            return self.output_loopback(route.iface, packet);
        }

        let ethertype = match destination.family() {
            Family::Ipv4 => EtherType::Ipv4,
            Family::Ipv6 => EtherType::Ipv6,
            Family::Mac => return Err(Error::Illegal("hardware addresses are not routed")),
        };

        match self.arp_resolve(&packet, destination, route, broadcast)? {
            Resolved::Hardware(dst_addr) => self.output_frame(route.iface, dst_addr, ethertype, &packet),
            Resolved::Pending => Ok(Sent::Pending),
        }
    }

    fn output_loopback(&mut self, iface: IfaceId, packet: Vec<u8>) -> Result<Sent> {
        net_trace!("{}: looping back {} octets on {}", self.name(), packet.len(), iface);
        self.count_tx(iface, packet.len());
        self.transmit(Transmit::Loopback { iface, packet });
        Ok(Sent::Transmitted)
    }

    /// Receive a packet that was looped back by this device.
    pub(crate) fn receive_loopback(&mut self, iface: IfaceId, packet: Vec<u8>) {
        if self.interface(iface).is_none() {
            return;
        }
        self.count_rx(iface, packet.len());
        self.emit(Event::InterfaceRecv(iface));

        let meta = Meta { loopback: true, ..Meta::new(iface) };
        match packet.first().map(|octet| octet >> 4) {
            Some(4) => self.receive_ipv4(meta, &packet),
            Some(6) => self.receive_ipv6(meta, &packet),
            _ => net_debug!("{}: looped back packet is not ip", self.name()),
        }
    }

    /// The checksum handling of an incoming packet.
    ///
    /// Looped back packets never left the device and are not verified.
    pub(crate) fn rx_checksum(&self, meta: &Meta, pick: fn(&Capabilities) -> &Protocol) -> Checksum {
        if !self.config.verify_checksums || meta.loopback {
            return Checksum::Ignored;
        }
        self.interface(meta.rcvif)
            .map_or(Checksum::Manual, |iface| pick(iface.capabilities()).rx_checksum())
    }

    /// Receive an IPv4 packet from the link layer or the loopback path.
    pub(crate) fn receive_ipv4(&mut self, meta: Meta, packet: &[u8]) {
        let checksum = self.rx_checksum(&meta, |caps| caps.ipv4());
        let (repr, packet) = match ipv4_packet::new_checked(packet)
            .and_then(|ip| Ok((Ipv4Repr::parse(ip, checksum)?, ip)))
        {
            Ok((repr, ip)) => (repr, &ip.as_bytes()[..usize::from(ip.total_len())]),
            Err(_err) => {
                net_debug!("{}: dropped ipv4 packet: {}", self.name(), _err);
                return;
            },
        };

        let meta = self.classify_ipv4(meta, repr.dst_addr);
        net_trace!("{}: {} received {}", self.name(), meta.rcvif, repr);
        self.contact_input_raw(ContactFamily::Ipv4, meta, packet);

        if !meta.destination {
            return;
        }

        let payload = ipv4_packet::new_unchecked(packet).payload_slice();
        let (src_addr, dst_addr) = (IpAddress::from(repr.src_addr), IpAddress::from(repr.dst_addr));
        match repr.protocol {
            IpProtocol::Icmp => self.receive_icmpv4(meta, &repr, payload),
            IpProtocol::Udp => self.receive_udp(meta, src_addr, dst_addr, payload),
            _other => net_debug!("{}: no handler for protocol {}", self.name(), _other),
        }
    }

    fn classify_ipv4(&self, meta: Meta, dst_addr: Ipv4Address) -> Meta {
        let address = IpAddress::from(dst_addr);
        let mut meta = Meta { broadcast: false, multicast: false, destination: false, ..meta };
        if meta.loopback || dst_addr.is_loopback() {
            meta.destination = true;
        } else if dst_addr.is_broadcast() {
            meta.broadcast = true;
            meta.destination = true;
        } else if dst_addr.is_multicast() {
            meta.multicast = true;
            meta.destination = self.interface(meta.rcvif)
                .map_or(false, |iface| iface.is_subscribed(&address));
        } else if self.address_owner(&address).is_some() {
            meta.destination = true;
        } else if self.is_subnet_broadcast(&address) {
            meta.broadcast = true;
            meta.destination = true;
        }
        meta
    }

    /// Receive an IPv6 packet from the link layer or the loopback path.
    pub(crate) fn receive_ipv6(&mut self, meta: Meta, packet: &[u8]) {
        let (repr, packet) = match ipv6_packet::new_checked(packet)
            .and_then(|ip| Ok((Ipv6Repr::parse(ip)?, ip)))
        {
            Ok((repr, ip)) => (repr, &ip.as_bytes()[..ip.total_len()]),
            Err(_err) => {
                net_debug!("{}: dropped ipv6 packet: {}", self.name(), _err);
                return;
            },
        };

        let meta = self.classify_ipv6(meta, repr.dst_addr);
        net_trace!("{}: {} received {}", self.name(), meta.rcvif, repr);
        self.contact_input_raw(ContactFamily::Ipv6, meta, packet);

        if !meta.destination {
            return;
        }

        let payload = ipv6_packet::new_unchecked(packet).payload_slice();
        let (src_addr, dst_addr) = (IpAddress::from(repr.src_addr), IpAddress::from(repr.dst_addr));
        match repr.next_header {
            IpProtocol::Icmpv6 => self.receive_icmpv6(meta, &repr, payload),
            IpProtocol::Udp => self.receive_udp(meta, src_addr, dst_addr, payload),
            _other => net_debug!("{}: no handler for next header {}", self.name(), _other),
        }
    }

    fn classify_ipv6(&self, meta: Meta, dst_addr: Ipv6Address) -> Meta {
        let address = IpAddress::from(dst_addr);
        let mut meta = Meta { broadcast: false, multicast: false, destination: false, ..meta };
        if meta.loopback || dst_addr.is_loopback() {
            meta.destination = true;
        } else if dst_addr.is_multicast() {
            // Every node is assumed to be a member of every group.
            meta.multicast = true;
            meta.destination = true;
        } else if self.address_owner(&address).is_some() {
            meta.destination = true;
        }
        meta
    }

    /// Forward an IPv4 packet that is not addressed to this device.
    ///
    /// The time to live is decremented. Packets that would expire are answered with a time
    /// exceeded message, packets without a route with a network unreachable message. The
    /// addresses of the packet are kept.
    pub fn forward_ipv4(&mut self, packet: &[u8]) -> Result<Sent> {
        let ip = ipv4_packet::new_checked(packet)?;
        let packet = &ip.as_bytes()[..usize::from(ip.total_len())];
        let dst_addr = IpAddress::from(ip.dst_addr());

        if ip.hop_limit() <= 1 {
            net_debug!("{}: ttl of packet to {} expired", self.name(), dst_addr);
            self.report_icmpv4(packet, IcmpError::TimeExceeded);
            return Err(Error::TtlExceeded);
        }

        let route = match self.route_resolve(&dst_addr) {
            Some(route) => route,
            None => {
                net_debug!("{}: no route to forward to {}", self.name(), dst_addr);
                self.report_icmpv4(packet, IcmpError::NetUnreachable);
                return Err(Error::NetUnreachable);
            },
        };

        let mut packet = packet.to_vec();
        let ip = ipv4_packet::new_unchecked_mut(&mut packet);
        let hop_limit = ip.hop_limit() - 1;
        ip.set_hop_limit(hop_limit);
        ip.fill_checksum();
        self.output_ipv4(packet, Some(route))
    }

    fn report_icmpv4(&mut self, original: &[u8], error: IcmpError) {
        if let Err(_err) = self.icmpv4_error(original, error) {
            net_debug!("{}: could not send {:?}: {}", self.name(), error, _err);
        }
    }
}
