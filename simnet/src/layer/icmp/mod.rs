//! Control messages of both IP versions.
//!
//! Incoming messages are verified and logged, neighbor discovery is handed to the [`arp`]
//! module. Echo requests are not answered here, that is the job of the [`EchoReplier`] service
//! which sees them through a raw contact.
//!
//! [`arp`]: ../arp/index.html
//! [`EchoReplier`]: ../../service/struct.EchoReplier.html
use core::cmp;

use crate::device::Device;
use crate::wire::{icmpv4_packet, icmpv6_packet, ipv4_packet, Checksum, IpAddress, IpProtocol};
use crate::wire::{Icmpv4DstUnreachable, Icmpv4Message, Icmpv4Repr, Icmpv4TimeExceeded};
use crate::wire::{Icmpv6Repr, Ipv4Address, Ipv4Repr, Ipv6Address, Ipv6Repr};

use super::{Error, Meta, Result, Sent};

#[cfg(test)]
mod tests;

/// The errors a device reports to the source of a packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IcmpError {
    /// Time exceeded, the time to live expired in transit.
    TimeExceeded,
    /// Destination unreachable, no route to the network.
    NetUnreachable,
}

impl Device {
    pub(crate) fn receive_icmpv4(&mut self, meta: Meta, ip: &Ipv4Repr, payload: &[u8]) {
        let checksum = self.rx_checksum(&meta, |caps| caps.icmp());
        let repr = match icmpv4_packet::new_checked(payload)
            .and_then(|packet| Icmpv4Repr::parse(packet, checksum))
        {
            Ok(repr) => repr,
            Err(_err) => {
                net_debug!("{}: dropped icmp message from {}: {}", self.name(), ip.src_addr, _err);
                return;
            },
        };
        net_trace!("{}: {} from {}", self.name(), repr, ip.src_addr);
    }

    pub(crate) fn receive_icmpv6(&mut self, meta: Meta, ip: &Ipv6Repr, payload: &[u8]) {
        let checksum = self.rx_checksum(&meta, |caps| caps.icmp());
        let repr = match icmpv6_packet::new_checked(payload)
            .and_then(|packet| Icmpv6Repr::parse(&ip.src_addr, &ip.dst_addr, packet, checksum))
        {
            Ok(repr) => repr,
            Err(_err) => {
                net_debug!("{}: dropped icmpv6 message from {}: {}", self.name(), ip.src_addr, _err);
                return;
            },
        };

        match repr {
            Icmpv6Repr::NeighborSolicit { .. } | Icmpv6Repr::NeighborAdvert { .. } =>
                self.receive_ndp(meta, ip.src_addr, &repr),
            _ => net_trace!("{}: {:?} from {}", self.name(), repr, ip.src_addr),
        }
    }

    /// Report an error about `original` back to its source.
    ///
    /// The message quotes the leading octets of the original packet. Nothing is sent for
    /// sources that do not identify a single host, or when the original is an error message
    /// itself.
    pub(crate) fn icmpv4_error(&mut self, original: &[u8], error: IcmpError) -> Result<Sent> {
        let ip = ipv4_packet::new_checked(original)?;
        let src_addr = ip.src_addr();
        if src_addr.is_unspecified() || src_addr.is_broadcast() || src_addr.is_multicast() {
            return Err(Error::Illegal("no errors are sent to this source"));
        }
        if ip.protocol() == IpProtocol::Icmp {
            let is_error = icmpv4_packet::new_checked(ip.payload_slice())
                .map_or(true, |icmp| match icmp.msg_type() {
                    Icmpv4Message::EchoRequest | Icmpv4Message::EchoReply => false,
                    _ => true,
                });
            if is_error {
                return Err(Error::Illegal("no errors are sent about errors"));
            }
        }

        let quoted = cmp::min(original.len(), self.config.icmp_error_payload);
        let data = &original[..quoted];
        let repr = match error {
            IcmpError::TimeExceeded => Icmpv4Repr::TimeExceeded {
                reason: Icmpv4TimeExceeded::TtlExpired,
                data,
            },
            IcmpError::NetUnreachable => Icmpv4Repr::DstUnreachable {
                reason: Icmpv4DstUnreachable::NetUnreachable,
                data,
            },
        };
        net_debug!("{}: sending {} to {}", self.name(), repr, src_addr);
        self.send_icmpv4(Ipv4Address::UNSPECIFIED, src_addr, &repr)
    }

    /// Send an ICMPv4 message.
    ///
    /// An unspecified source is replaced with the address of the outgoing interface.
    pub fn send_icmpv4(&mut self, src_addr: Ipv4Address, dst_addr: Ipv4Address, repr: &Icmpv4Repr)
        -> Result<Sent>
    {
        let route = self.route_resolve(&dst_addr.into());
        let message = repr.to_bytes(Checksum::Manual);
        let packet = Ipv4Repr {
            src_addr,
            dst_addr,
            protocol: IpProtocol::Icmp,
            payload_len: message.len(),
            hop_limit: self.config.default_ttl,
        }.encapsulate(&message, Checksum::Ignored);
        self.output_ipv4(packet, route)
    }

    /// Send an ICMPv6 message.
    ///
    /// The source address takes part in the checksum, an unspecified one is chosen before the
    /// message is built.
    pub fn send_icmpv6(&mut self, src_addr: Ipv6Address, dst_addr: Ipv6Address, repr: &Icmpv6Repr)
        -> Result<Sent>
    {
        let destination = IpAddress::from(dst_addr);
        let own = self.address_owner(&destination).is_some();
        let route = if own { None } else { self.route_resolve(&destination) };

        let src_addr = match (src_addr.is_unspecified(), own, route) {
            (false, _, _) => src_addr,
            (true, true, _) => dst_addr,
            (true, false, Some(route)) => match self.select_source(&destination, &route)? {
                IpAddress::Ipv6(source) => source,
                _ => return Err(Error::HostUnreachable),
            },
            (true, false, None) => return Err(Error::HostUnreachable),
        };

        let message = repr.to_bytes(&src_addr, &dst_addr);
        let packet = Ipv6Repr {
            src_addr,
            dst_addr,
            next_header: IpProtocol::Icmpv6,
            payload_len: message.len(),
            hop_limit: self.config.default_ttl,
        }.encapsulate(&message);
        self.output_ipv6(packet, route)
    }

    /// Send an echo request.
    pub fn ping(&mut self, destination: IpAddress, ident: u16, seq_no: u16, data: &[u8]) -> Result<Sent> {
        match destination {
            IpAddress::Ipv4(dst_addr) => {
                let repr = Icmpv4Repr::EchoRequest { ident, seq_no, data };
                self.send_icmpv4(Ipv4Address::UNSPECIFIED, dst_addr, &repr)
            },
            IpAddress::Ipv6(dst_addr) => {
                let repr = Icmpv6Repr::EchoRequest { ident, seq_no, data };
                self.send_icmpv6(Ipv6Address::UNSPECIFIED, dst_addr, &repr)
            },
            IpAddress::Mac(_) => Err(Error::Illegal("can not ping a hardware address")),
        }
    }
}
