//! User datagrams.
//!
//! Datagrams are sent from bound contacts only, see [`contact`]. An inbound datagram is turned
//! into the four tuple as seen from this device and given to the most specific listener.
//!
//! [`contact`]: ../contact/index.html
use crate::device::Device;
use crate::wire::{udp_packet, Checksum, IpAddress, IpProtocol, Ipv4Repr, Ipv6Repr};
use crate::wire::{UdpChecksum, UdpRepr};

use super::{Error, Meta, Result, Sent};
use super::contact::{ContactAddress, ContactFamily};

#[cfg(test)]
mod tests;

impl Device {
    /// Send a datagram along a four tuple.
    ///
    /// A wildcard local address is replaced with the address of the outgoing interface.
    pub(crate) fn udp_output(&mut self, address: ContactAddress, data: &[u8]) -> Result<Sent> {
        let route = match self.address_owner(&address.daddr) {
            Some(_) => None,
            None => Some(self.route_resolve(&address.daddr).ok_or(Error::HostUnreachable)?),
        };

        let src_addr = match (address.saddr.is_unspecified(), route) {
            (false, _) => address.saddr,
            (true, Some(route)) => self.select_source(&address.daddr, &route)?,
            (true, None) => address.daddr,
        };

        let checksum = UdpChecksum::for_pseudo_header(src_addr, address.daddr);
        let datagram = UdpRepr::encapsulate(address.sport, address.dport, data, checksum);
        let hop_limit = self.config.default_ttl;

        match (src_addr, address.daddr) {
            (IpAddress::Ipv4(src_addr), IpAddress::Ipv4(dst_addr)) => {
                let packet = Ipv4Repr {
                    src_addr,
                    dst_addr,
                    protocol: IpProtocol::Udp,
                    payload_len: datagram.len(),
                    hop_limit,
                }.encapsulate(&datagram, Checksum::Ignored);
                self.output_ipv4(packet, route)
            },
            (IpAddress::Ipv6(src_addr), IpAddress::Ipv6(dst_addr)) => {
                let packet = Ipv6Repr {
                    src_addr,
                    dst_addr,
                    next_header: IpProtocol::Udp,
                    payload_len: datagram.len(),
                    hop_limit,
                }.encapsulate(&datagram);
                self.output_ipv6(packet, route)
            },
            _ => Err(Error::Illegal("address family does not match the contact")),
        }
    }

    /// Dispatch a datagram to its listener.
    pub(crate) fn receive_udp(&mut self, meta: Meta, src_addr: IpAddress, dst_addr: IpAddress, payload: &[u8]) {
        let checksum = match self.rx_checksum(&meta, |caps| caps.udp()) {
            Checksum::Manual => UdpChecksum::for_pseudo_header(src_addr, dst_addr),
            Checksum::Ignored => UdpChecksum::Ignored,
        };
        let (repr, datagram) = match udp_packet::new_checked(payload)
            .and_then(|udp| Ok((UdpRepr::parse(udp, checksum)?, udp)))
        {
            Ok(parsed) => parsed,
            Err(_err) => {
                net_debug!("{}: dropped datagram from {}: {}", self.name(), src_addr, _err);
                return;
            },
        };

        let address = ContactAddress {
            saddr: dst_addr,
            daddr: src_addr,
            sport: repr.dst_port,
            dport: repr.src_port,
        };
        let family = match dst_addr {
            IpAddress::Ipv6(_) => ContactFamily::Ipv6,
            _ => ContactFamily::Ipv4,
        };

        if !self.contact_input_udp(family, meta, address, datagram.payload_slice()) {
            net_debug!("{}: no listener for {}", self.name(), address);
        }
    }
}
