use crate::device::Device;
use crate::layer::{Delivery, Recv, Result};
use crate::layer::contact::{ContactFamily, ContactId, Transport};
use crate::wire::{icmpv4_packet, icmpv6_packet, ipv4_packet, ipv6_packet, Checksum, IpProtocol};
use crate::wire::{Icmpv4Repr, Icmpv6Repr, Ipv4Address, Ipv4Repr, Ipv6Address, Ipv6Repr};

/// Answers echo requests addressed to a device.
///
/// Requests sent to a broadcast or multicast address are answered from the address of the
/// outgoing interface.
#[derive(Debug)]
pub struct EchoReplier {
    v4: ContactId,
    v6: ContactId,
    silent: bool,
}

struct Answer;

impl EchoReplier {
    /// Start answering on a device.
    pub fn attach(device: &mut Device) -> Result<Self> {
        let v4 = device.contact_create(ContactFamily::Ipv4, Transport::Raw);
        device.contact_receive(v4, Answer, false)?;
        let v6 = device.contact_create(ContactFamily::Ipv6, Transport::Raw);
        device.contact_receive(v6, Answer, false)?;
        Ok(EchoReplier { v4, v6, silent: false })
    }

    /// The raw contacts of both IP versions.
    pub fn contacts(&self) -> [ContactId; 2] {
        [self.v4, self.v6]
    }

    /// Pause or resume answering.
    ///
    /// While silent the contacts stay open but requests are dropped.
    pub fn silent(&mut self, device: &mut Device, silent: bool) -> Result<()> {
        if silent == self.silent {
            return Ok(());
        }
        for &contact in self.contacts().iter() {
            if silent {
                device.contact_receive(contact, Dropper, false)?;
            } else {
                device.contact_receive(contact, Answer, false)?;
            }
        }
        self.silent = silent;
        Ok(())
    }

    /// Stop answering.
    pub fn detach(self, device: &mut Device) -> Result<()> {
        device.contact_close(self.v4)?;
        device.contact_close(self.v6)
    }
}

struct Dropper;

impl Recv for Dropper {
    fn receive(&mut self, _: &mut Device, _: Delivery<'_>) { }
}

impl Answer {
    fn reply_v4(device: &mut Device, delivery: &Delivery<'_>) -> crate::wire::Result<()> {
        let packet = ipv4_packet::new_checked(delivery.payload)?;
        let ip = Ipv4Repr::parse(packet, Checksum::Ignored)?;
        if ip.protocol != IpProtocol::Icmp {
            return Ok(());
        }
        let icmp = icmpv4_packet::new_checked(packet.payload_slice())?;
        if let Icmpv4Repr::EchoRequest { ident, seq_no, data } = Icmpv4Repr::parse(icmp, Checksum::Ignored)? {
            let src_addr = if delivery.meta.broadcast || delivery.meta.multicast {
                Ipv4Address::UNSPECIFIED
            } else {
                ip.dst_addr
            };
            let reply = Icmpv4Repr::EchoReply { ident, seq_no, data };
            if let Err(_err) = device.send_icmpv4(src_addr, ip.src_addr, &reply) {
                net_debug!("{}: echo reply to {} failed: {}", device.name(), ip.src_addr, _err);
            }
        }
        Ok(())
    }

    fn reply_v6(device: &mut Device, delivery: &Delivery<'_>) -> crate::wire::Result<()> {
        let packet = ipv6_packet::new_checked(delivery.payload)?;
        let ip = Ipv6Repr::parse(packet)?;
        if ip.next_header != IpProtocol::Icmpv6 {
            return Ok(());
        }
        let icmp = icmpv6_packet::new_checked(packet.payload_slice())?;
        let repr = Icmpv6Repr::parse(&ip.src_addr, &ip.dst_addr, icmp, Checksum::Ignored)?;
        if let Icmpv6Repr::EchoRequest { ident, seq_no, data } = repr {
            let src_addr = if delivery.meta.multicast {
                Ipv6Address::UNSPECIFIED
            } else {
                ip.dst_addr
            };
            let reply = Icmpv6Repr::EchoReply { ident, seq_no, data };
            if let Err(_err) = device.send_icmpv6(src_addr, ip.src_addr, &reply) {
                net_debug!("{}: echo reply to {} failed: {}", device.name(), ip.src_addr, _err);
            }
        }
        Ok(())
    }
}

impl Recv for Answer {
    fn receive(&mut self, device: &mut Device, delivery: Delivery<'_>) {
        let result = match delivery.payload.first().map(|octet| octet >> 4) {
            Some(4) => Answer::reply_v4(device, &delivery),
            Some(6) => Answer::reply_v6(device, &delivery),
            _ => Ok(()),
        };
        if let Err(_err) = result {
            net_trace!("{}: ignored packet: {}", device.name(), _err);
        }
    }
}
