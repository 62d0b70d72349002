//! The Ethernet layer of a device.
//!
//! Frames arriving at an interface first pass its 802.1Q mode, then the receive filter. A frame
//! passes the filter when it is addressed to the interface, to the broadcast address or to a
//! subscribed multicast group, or when some raw link contact is promiscuous. Tagged frames are
//! handed to the vlan interface of their VID.
//!
//! Accepted frames are given to the raw link contacts and, if they are addressed to this device,
//! to the protocol of their EtherType.
use crate::device::{Device, Event, Transmit};
use crate::nic::{IfaceId, Kind, VlanMode};
use crate::wire::{ethernet_frame, EtherType, EthernetAddress, EthernetRepr};
use crate::wire::ethernet::{pop_vlan_tag, push_vlan_tag};

use super::{Error, Meta, Result, Sent};
use super::contact::ContactFamily;


/// Frame input and output.
impl Device {
    /// Receive a frame from the wire of an interface.
    ///
    /// Frames on interfaces that are down or unknown are dropped silently.
    pub fn receive_frame(&mut self, iface: IfaceId, frame: Vec<u8>) {
        let frame = match self.interface(iface) {
            None => {
                net_debug!("{}: frame for unknown interface {}", self.name(), iface);
                return;
            },
            Some(interface) if !interface.is_up() => None,
            Some(interface) => match interface.as_ethernet() {
                Some(eth) => eth.ingress(frame),
                None => Some(frame),
            },
        };

        match frame {
            Some(frame) => self.input_frame(iface, frame),
            None => self.drop_frame(iface, "ingress"),
        }
    }

    /// Process a frame after the tagging mode of the port was applied.
    pub(crate) fn input_frame(&mut self, iface: IfaceId, mut frame: Vec<u8>) {
        let vid = match ethernet_frame::new_checked(&frame) {
            Ok(eth) => eth.vlan_id(),
            Err(_) => return self.drop_frame(iface, "truncated"),
        };

        if let Some(vid) = vid {
            let is_access = self.interface(iface)
                .and_then(|iface| iface.as_ethernet())
                .and_then(|eth| eth.vlan())
                .map_or(false, |mode| *mode == VlanMode::Access(vid));
            match self.vlan_interface(vid) {
                Some(vlanif) if self.is_up(vlanif) => {
                    pop_vlan_tag(&mut frame);
                    self.count_rx(iface, frame.len());
                    return self.input_frame(vlanif, frame);
                },
                // The device itself is a member of the access vlan.
                _ if is_access => {
                    pop_vlan_tag(&mut frame);
                },
                _ => return self.input_foreign_tag(iface, &frame),
            }
        }

        let (dst_addr, src_addr, accept) = {
            let eth = ethernet_frame::new_unchecked(&frame);
            let (dst_addr, src_addr) = (eth.dst_addr(), eth.src_addr());
            let interface = match self.interface(iface) {
                Some(interface) => interface,
                None => return,
            };
            let broadcast = dst_addr.is_broadcast();
            let multicast = !broadcast && dst_addr.is_multicast();
            let destination = broadcast
                || (multicast && interface.is_subscribed_mac(&dst_addr))
                || interface.mac() == Some(dst_addr);
            (dst_addr, src_addr, (broadcast, multicast, destination))
        };

        let (broadcast, multicast, destination) = accept;
        if !destination && !self.contacts.has_promiscuous(ContactFamily::Raw) {
            net_trace!("{}: {} filtered frame to {}", self.name(), iface, dst_addr);
            return self.drop_frame(iface, "filtered");
        }

        self.count_rx(iface, frame.len());
        self.emit(Event::InterfaceRecv(iface));

        let meta = Meta {
            broadcast,
            multicast,
            destination,
            src_mac: Some(src_addr),
            ..Meta::new(iface)
        };
        self.contact_input_raw(ContactFamily::Raw, meta, &frame);

        if !destination {
            return;
        }

        let eth = ethernet_frame::new_unchecked(&frame);
        match eth.ethertype() {
            EtherType::Ipv4 => self.receive_ipv4(meta, eth.payload()),
            EtherType::Ipv6 => self.receive_ipv6(meta, eth.payload()),
            EtherType::Arp => self.receive_arp(meta, eth.payload()),
            other => net_debug!("{}: unsupported ethertype {} on {}", self.name(), other, iface),
        }
    }

    /// A tagged frame of a vlan this device has no interface for.
    fn input_foreign_tag(&mut self, iface: IfaceId, frame: &[u8]) {
        if !self.contacts.has_promiscuous(ContactFamily::Raw) {
            return self.drop_frame(iface, "unknown vlan");
        }
        self.count_rx(iface, frame.len());
        self.emit(Event::InterfaceRecv(iface));
        let meta = Meta {
            src_mac: Some(ethernet_frame::new_unchecked(frame).src_addr()),
            ..Meta::new(iface)
        };
        self.contact_input_raw(ContactFamily::Raw, meta, frame);
    }

    /// Send an Ethernet payload through an interface.
    ///
    /// The source is the hardware address of the interface. A frame addressed to that same
    /// address is delivered back to the interface instead of the wire.
    pub(crate) fn output_frame(
        &mut self,
        iface: IfaceId,
        dst_addr: EthernetAddress,
        ethertype: EtherType,
        payload: &[u8],
    ) -> Result<Sent> {
        let interface = self.iface(iface)?;
        if !interface.is_up() {
            return Err(Error::Illegal("interface is down"));
        }
        let src_addr = interface.mac()
            .ok_or(Error::Illegal("interface has no hardware address"))?;

        let frame = EthernetRepr { src_addr, dst_addr, ethertype }.encapsulate(payload);
        net_trace!("{}: {} sends {} frame to {}", self.name(), iface, ethertype, dst_addr);

        if dst_addr == src_addr {
            self.count_tx(iface, frame.len());
            self.transmit(Transmit::Local { iface, frame });
            return Ok(Sent::Transmitted);
        }

        let egress = match self.iface(iface)?.kind() {
            Kind::Ethernet(eth) if eth.link().is_none() =>
                return Err(Error::Illegal("interface is not connected")),
            Kind::Ethernet(eth) => eth.egress(frame),
            Kind::Vlan { vid, .. } => {
                let vid = *vid;
                self.output_vlan(iface, vid, frame);
                return Ok(Sent::Transmitted);
            },
            Kind::Loopback => return Err(Error::Illegal("loopback interfaces carry no frames")),
        };

        match egress {
            Some(frame) => {
                self.count_tx(iface, frame.len());
                self.transmit(Transmit::Wire { iface, frame });
            },
            None => self.drop_frame(iface, "egress"),
        }
        Ok(Sent::Transmitted)
    }

    /// Tag a frame and flood it through every port carrying the vlan.
    fn output_vlan(&mut self, vlanif: IfaceId, vid: u16, mut frame: Vec<u8>) {
        push_vlan_tag(&mut frame, vid);

        let ports: Vec<_> = self.interfaces()
            .filter(|(_, port)| port.is_up())
            .filter_map(|(id, port)| port.as_ethernet().map(|eth| (id, eth)))
            .filter(|(_, eth)| eth.link().is_some() && eth.admits(vid))
            .filter_map(|(id, eth)| eth.egress(frame.clone()).map(|frame| (id, frame)))
            .collect();

        if ports.is_empty() {
            return self.drop_frame(vlanif, "no port carries the vlan");
        }

        self.count_tx(vlanif, frame.len());
        for (port, frame) in ports {
            self.count_tx(port, frame.len());
            self.transmit(Transmit::Wire { iface: port, frame });
        }
    }

    pub(crate) fn drop_frame(&mut self, iface: IfaceId, reason: &'static str) {
        net_debug!("{}: {} dropped frame ({})", self.name(), iface, reason);
        if let Some(interface) = self.interface_mut(iface) {
            interface.count_drop();
        }
    }

    pub(crate) fn count_rx(&mut self, iface: IfaceId, len: usize) {
        if let Some(interface) = self.interface_mut(iface) {
            interface.count_rx(len);
        }
    }

    pub(crate) fn count_tx(&mut self, iface: IfaceId, len: usize) {
        if let Some(interface) = self.interface_mut(iface) {
            interface.count_tx(len);
        }
    }
}
