use std::cell::RefCell;
use std::rc::Rc;

use crate::config::Config;
use crate::device::{Device, DeviceId, Transmit};
use crate::layer::{Delivery, Error, FnHandler, Sent};
use crate::layer::contact::{ContactAddress, ContactFamily, ContactId, Transport};
use crate::managed::SlotMap;
use crate::nic::{IfaceId, Link};
use crate::wire::{ethernet_frame, ipv4_packet, udp_packet, Checksum, EtherType, EthernetAddress};
use crate::wire::{EthernetRepr, Family, IpAddress, IpProtocol, Ipv4Address, Ipv4Repr, Mask};
use crate::wire::{UdpChecksum, UdpRepr};

const MAC_HOST: EthernetAddress = EthernetAddress([0xfa, 0xff, 0x0f, 0, 0, 1]);
const MAC_OTHER: EthernetAddress = EthernetAddress([0xfa, 0xff, 0x0f, 0, 0, 9]);
const IP_HOST: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
const IP_OTHER: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);

fn host() -> (Device, IfaceId) {
    let mut device = Device::new("host", Config::default());
    let iface = device.interface_add_ethernet(MAC_HOST);
    let mut keys = SlotMap::new();
    let peer = Link { device: DeviceId(keys.insert(())), iface: IfaceId(keys.insert(())) };
    device.interface_link(iface, Some(peer)).unwrap();
    device.interface_set_address(iface, IP_HOST.into(), Mask::new(Family::Ipv4, 24).unwrap())
        .unwrap();
    device.neighbor_add(iface, IP_OTHER.into(), MAC_OTHER).unwrap();
    (device, iface)
}

/// A datagram from `IP_OTHER` in a frame.
fn incoming(sport: u16, dport: u16, payload: &[u8], checksum: UdpChecksum) -> Vec<u8> {
    let datagram = UdpRepr::encapsulate(sport, dport, payload, checksum);
    let packet = Ipv4Repr {
        src_addr: IP_OTHER,
        dst_addr: IP_HOST,
        protocol: IpProtocol::Udp,
        payload_len: datagram.len(),
        hop_limit: 64,
    }.encapsulate(&datagram, Checksum::Manual);
    EthernetRepr { src_addr: MAC_OTHER, dst_addr: MAC_HOST, ethertype: EtherType::Ipv4 }
        .encapsulate(&packet)
}

/// The IP packets put on the wire.
fn sent(device: &mut Device) -> Vec<Vec<u8>> {
    device.take_outbox().into_iter()
        .filter_map(|transmit| match transmit {
            Transmit::Wire { frame, .. } => {
                Some(ethernet_frame::new_checked(&frame).unwrap().payload().to_vec())
            },
            _ => None,
        })
        .collect()
}

type Received = Rc<RefCell<Vec<(Option<ContactAddress>, Vec<u8>)>>>;

fn listen(device: &mut Device, address: ContactAddress) -> (ContactId, Received) {
    let received = Received::default();
    let log = received.clone();
    let contact = device.contact_create(ContactFamily::Ipv4, Transport::Udp);
    device.contact_receive_from(contact, FnHandler(move |_: &mut Device, delivery: Delivery| {
        log.borrow_mut().push((delivery.address, delivery.payload.to_vec()));
    }), address).unwrap();
    (contact, received)
}

#[test]
fn send_fills_source() {
    let (mut device, _) = host();
    let contact = device.contact_create(ContactFamily::Ipv4, Transport::Udp);
    device.contact_bind(contact, ContactAddress {
        sport: 5000,
        ..ContactAddress::remote(IP_OTHER.into(), 53)
    }).unwrap();
    assert_eq!(device.contact_send(contact, b"query"), Ok(Sent::Transmitted));

    let sent = sent(&mut device);
    let ip = ipv4_packet::new_checked(&sent[0]).unwrap();
    assert_eq!(ip.src_addr(), IP_HOST);
    assert_eq!(ip.protocol(), IpProtocol::Udp);

    let udp = udp_packet::new_checked(ip.payload_slice()).unwrap();
    let repr = UdpRepr::parse(udp, UdpChecksum::for_pseudo_header(IP_HOST, IP_OTHER)).unwrap();
    assert_eq!((repr.src_port, repr.dst_port), (5000, 53));
    assert_eq!(udp.payload_slice(), b"query");
}

#[test]
fn trusted_checksum() {
    let (mut device, eth0) = host();
    *device.interface_mut(eth0).unwrap()
        .capabilities_mut().udp_mut().rx_checksum_mut() = Checksum::Ignored;
    let (_, received) = listen(&mut device, ContactAddress::local(IP_HOST.into(), 53));

    let mut frame = incoming(4000, 53, b"hello", UdpChecksum::for_pseudo_header(IP_OTHER, IP_HOST));
    let last = frame.len() - 1;
    frame[last] ^= 0x01;
    device.receive_frame(eth0, frame);
    assert_eq!(received.borrow().len(), 1);

    // Trusting received checksums does not stop computing them.
    let contact = device.contact_create(ContactFamily::Ipv4, Transport::Udp);
    device.contact_send_to(contact, b"x", ContactAddress::remote(IP_OTHER.into(), 7)).unwrap();
    let sent = sent(&mut device);
    let ip = ipv4_packet::new_checked(&sent[0]).unwrap();
    let udp = udp_packet::new_checked(ip.payload_slice()).unwrap();
    assert_ne!(udp.checksum(), 0);
    assert!(UdpRepr::parse(udp, UdpChecksum::for_pseudo_header(IP_HOST, IP_OTHER)).is_ok());
}

#[test]
fn send_to_picks_ephemeral_port() {
    let (mut device, _) = host();
    let contact = device.contact_create(ContactFamily::Ipv4, Transport::Udp);
    let remote = ContactAddress::remote(IP_OTHER.into(), 7);
    assert_eq!(device.contact_send_to(contact, b"x", remote), Ok(Sent::Transmitted));

    let bound = device.contact(contact).unwrap().address().unwrap();
    assert_eq!(bound.sport, 10_011);
    assert!(bound.saddr.is_unspecified());

    assert_eq!(device.contact_send_to(contact, b"x", remote),
        Err(Error::Illegal("contact is bound, use contact_send")));
    assert_eq!(device.contact_send(contact, b"y"), Ok(Sent::Transmitted));
    assert_eq!(sent(&mut device).len(), 2);
}

#[test]
fn no_route() {
    let (mut device, _) = host();
    let failures = Rc::new(RefCell::new(Vec::new()));
    let log = failures.clone();
    let contact = device.contact_create(ContactFamily::Ipv4, Transport::Udp);
    device.contact_on_error(contact, move |err| log.borrow_mut().push(*err)).unwrap();

    let remote = ContactAddress::remote(Ipv4Address::new(192, 168, 1, 1).into(), 7);
    assert_eq!(device.contact_send_to(contact, b"x", remote), Err(Error::HostUnreachable));
    assert_eq!(*failures.borrow(), vec![Error::HostUnreachable]);
}

#[test]
fn receive_builds_local_tuple() {
    let (mut device, eth0) = host();
    let (_, received) = listen(&mut device, ContactAddress::local(IP_HOST.into(), 53));

    device.receive_frame(eth0, incoming(4000, 53, b"hello", UdpChecksum::for_pseudo_header(IP_OTHER, IP_HOST)));
    device.receive_frame(eth0, incoming(4000, 54, b"elsewhere", UdpChecksum::Ignored));

    let received = received.borrow();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].0, Some(ContactAddress {
        saddr: IP_HOST.into(),
        daddr: IP_OTHER.into(),
        sport: 53,
        dport: 4000,
    }));
    assert_eq!(received[0].1, b"hello".to_vec());
}

#[test]
fn wrong_checksum_is_dropped() {
    let (mut device, eth0) = host();
    let (_, received) = listen(&mut device, ContactAddress::local(IP_HOST.into(), 53));

    let mut frame = incoming(4000, 53, b"hello", UdpChecksum::for_pseudo_header(IP_OTHER, IP_HOST));
    let last = frame.len() - 1;
    frame[last] ^= 0x01;
    device.receive_frame(eth0, frame);
    assert!(received.borrow().is_empty());

    // A zero checksum means none was computed.
    device.receive_frame(eth0, incoming(4000, 53, b"hello", UdpChecksum::Ignored));
    assert_eq!(received.borrow().len(), 1);
}

#[test]
fn own_address_is_looped_back() {
    let (mut device, eth0) = host();
    let (_, received) = listen(&mut device, ContactAddress::local(IpAddress::unspecified(Family::Ipv4), 9));

    let contact = device.contact_create(ContactFamily::Ipv4, Transport::Udp);
    device.contact_send_to(contact, b"self", ContactAddress::remote(IP_HOST.into(), 9)).unwrap();

    let outbox: Vec<_> = device.take_outbox().into_iter().collect();
    let packet = match &outbox[..] {
        [Transmit::Loopback { packet, .. }] => packet.clone(),
        other => panic!("expected a looped back packet, got {:?}", other),
    };
    device.receive_loopback(eth0, packet);

    let received = received.borrow();
    assert_eq!(received.len(), 1);
    let tuple = received[0].0.unwrap();
    assert_eq!((tuple.saddr, tuple.daddr), (IP_HOST.into(), IP_HOST.into()));
    assert_eq!(received[0].1, b"self".to_vec());
}
