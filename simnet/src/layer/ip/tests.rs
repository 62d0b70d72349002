use std::cell::RefCell;
use std::rc::Rc;

use crate::config::Config;
use crate::device::{Device, DeviceId, Transmit};
use crate::layer::{Delivery, Error, FnHandler, Meta, Sent};
use crate::layer::contact::{ContactFamily, Transport};
use crate::managed::SlotMap;
use crate::nic::{IfaceId, Link};
use crate::wire::{ethernet_frame, icmpv4_packet, ipv4_packet, Checksum, EtherType, EthernetAddress};
use crate::wire::{EthernetRepr, Family, Icmpv4Message, IpProtocol, Ipv4Address, Ipv4Repr, Mask};

use super::Route;

const MAC_HOST: EthernetAddress = EthernetAddress([0xfa, 0xff, 0x0f, 0, 0, 1]);
const MAC_OTHER: EthernetAddress = EthernetAddress([0xfa, 0xff, 0x0f, 0, 0, 9]);
const IP_HOST: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
const IP_OTHER: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);
const IP_GATEWAY: Ipv4Address = Ipv4Address::new(10, 0, 0, 254);
const IP_REMOTE: Ipv4Address = Ipv4Address::new(192, 168, 1, 1);

fn host(config: Config) -> (Device, IfaceId) {
    let mut device = Device::new("host", config);
    let iface = device.interface_add_ethernet(MAC_HOST);
    let mut keys = SlotMap::new();
    let peer = Link { device: DeviceId(keys.insert(())), iface: IfaceId(keys.insert(())) };
    device.interface_link(iface, Some(peer)).unwrap();
    device.interface_set_address(iface, IP_HOST.into(), Mask::new(Family::Ipv4, 24).unwrap())
        .unwrap();
    device.neighbor_add(iface, IP_OTHER.into(), MAC_OTHER).unwrap();
    (device, iface)
}

fn packet(src_addr: Ipv4Address, dst_addr: Ipv4Address, hop_limit: u8) -> Vec<u8> {
    Ipv4Repr {
        src_addr,
        dst_addr,
        protocol: IpProtocol::Unknown(253),
        payload_len: 100,
        hop_limit,
    }.encapsulate(&[0xa5; 100], Checksum::Manual)
}

fn frame(packet: &[u8]) -> Vec<u8> {
    EthernetRepr { src_addr: MAC_OTHER, dst_addr: MAC_HOST, ethertype: EtherType::Ipv4 }
        .encapsulate(packet)
}

/// The IP packets put on the wire.
fn sent(device: &mut Device) -> Vec<Vec<u8>> {
    device.take_outbox().into_iter()
        .filter_map(|transmit| match transmit {
            Transmit::Wire { frame, .. } => {
                let eth = ethernet_frame::new_checked(&frame).unwrap();
                assert_eq!(eth.ethertype(), EtherType::Ipv4);
                Some(eth.payload().to_vec())
            },
            _ => None,
        })
        .collect()
}

/// Record the metadata of everything a promiscuous raw IPv4 contact sees.
fn sniff(device: &mut Device) -> Rc<RefCell<Vec<Meta>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = seen.clone();
    let contact = device.contact_create(ContactFamily::Ipv4, Transport::Raw);
    device.contact_receive(contact, FnHandler(move |_: &mut Device, delivery: Delivery| {
        log.borrow_mut().push(delivery.meta);
    }), true).unwrap();
    seen
}

#[test]
fn output_fills_header() {
    let (mut device, _) = host(Config::default());
    let mut raw = vec![0; 28];
    {
        let ip = ipv4_packet::new_unchecked_mut(&mut raw);
        ip.set_protocol(IpProtocol::Udp);
        ip.set_dst_addr(IP_OTHER);
    }
    assert_eq!(device.output_ipv4(raw, None), Ok(Sent::Transmitted));

    let sent = sent(&mut device);
    let ip = ipv4_packet::new_checked(&sent[0]).unwrap();
    assert_eq!(ip.version(), 4);
    assert_eq!(ip.header_len(), 20);
    assert_eq!(ip.total_len(), 28);
    assert_eq!(ip.hop_limit(), 64);
    assert_eq!(ip.src_addr(), IP_HOST);
    assert!(ip.verify_checksum());
}

#[test]
fn output_keeps_given_fields() {
    let (mut device, _) = host(Config::default());
    let source = Ipv4Address::new(10, 0, 0, 77);
    device.output_ipv4(packet(source, IP_OTHER, 7), None).unwrap();

    let sent = sent(&mut device);
    let ip = ipv4_packet::new_checked(&sent[0]).unwrap();
    assert_eq!(ip.hop_limit(), 7);
    assert_eq!(ip.src_addr(), source);
}

#[test]
fn output_errors() {
    let (mut device, eth0) = host(Config::default());
    assert_eq!(device.output_ipv4(vec![0x45; 10], None),
        Err(Error::Wire(crate::wire::Error::Truncated)));
    assert_eq!(device.output_ipv4(packet(IP_HOST, IP_REMOTE, 0), None), Err(Error::HostUnreachable));

    device.interface_mut(eth0).unwrap().set_mtu(100);
    assert_eq!(device.output_ipv4(packet(IP_HOST, IP_OTHER, 0), None),
        Err(Error::FragmentationNotSupported));
    assert!(!device.has_outgoing());
}

#[test]
fn host_part_all_ones_is_broadcast() {
    let (mut device, eth0) = host(Config::default());
    let default = Route::via(Ipv4Address::UNSPECIFIED.into(), Mask::new(Family::Ipv4, 0).unwrap(),
        IP_GATEWAY.into(), eth0).unwrap();
    device.route_add(default).unwrap();

    // Outside of the own network, still sent without asking for the gateway.
    let destination = Ipv4Address::new(10, 9, 9, 255);
    assert_eq!(device.output_ipv4(packet(IP_HOST, destination, 0), None), Ok(Sent::Transmitted));
    let frames: Vec<_> = device.take_outbox().into_iter().collect();
    match &frames[..] {
        [Transmit::Wire { iface, frame }] => {
            assert_eq!(*iface, eth0);
            let eth = ethernet_frame::new_checked(frame).unwrap();
            assert_eq!(eth.dst_addr(), EthernetAddress::BROADCAST);
            assert_eq!(eth.ethertype(), EtherType::Ipv4);
            assert_eq!(ipv4_packet::new_checked(eth.payload()).unwrap().dst_addr(), destination);
        },
        other => panic!("expected one broadcast frame, got {:?}", other),
    }

    assert_eq!(device.output_ipv4(packet(IP_HOST, Ipv4Address::new(10, 9, 9, 254), 0), None),
        Ok(Sent::Pending));
}

#[test]
fn interface_without_address() {
    let (mut device, _) = host(Config::default());
    let eth1 = device.interface_add_ethernet(EthernetAddress([0xfa, 0xff, 0x0f, 0, 0, 2]));
    let mut keys = SlotMap::new();
    let peer = Link { device: DeviceId(keys.insert(())), iface: IfaceId(keys.insert(())) };
    device.interface_link(eth1, Some(peer)).unwrap();
    device.route_add(Route::host(IP_REMOTE.into(), Ipv4Address::UNSPECIFIED.into(), eth1).unwrap())
        .unwrap();

    // A given source does not make up for the missing address.
    assert_eq!(device.output_ipv4(packet(IP_HOST, IP_REMOTE, 0), None), Err(Error::HostUnreachable));
    assert_eq!(device.output_ipv4(packet(Ipv4Address::UNSPECIFIED, IP_REMOTE, 0), None),
        Err(Error::HostUnreachable));
    assert_eq!(device.forward_ipv4(&packet(IP_OTHER, IP_REMOTE, 9)), Err(Error::HostUnreachable));
    assert!(!device.has_outgoing());
}

#[test]
fn own_address_loops_back() {
    let (mut device, eth0) = host(Config::default());
    let seen = sniff(&mut device);

    device.output_ipv4(packet(Ipv4Address::UNSPECIFIED, IP_HOST, 0), None).unwrap();
    let outbox: Vec<_> = device.take_outbox().into_iter().collect();
    let looped = match &outbox[..] {
        [Transmit::Loopback { iface, packet }] => {
            assert_eq!(*iface, eth0);
            packet.clone()
        },
        other => panic!("expected a looped back packet, got {:?}", other),
    };
    assert_eq!(ipv4_packet::new_checked(&looped).unwrap().src_addr(), IP_HOST);

    device.receive_loopback(eth0, looped);
    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].loopback && seen[0].destination);
}

#[test]
fn routes() {
    let (mut device, eth0) = host(Config::default());
    let route = Route::via(Ipv4Address::new(192, 168, 0, 0).into(),
        Mask::new(Family::Ipv4, 16).unwrap(), IP_GATEWAY.into(), eth0).unwrap();

    assert_eq!(device.route_add(route), Ok(true));
    assert_eq!(device.route_add(route), Ok(false));
    assert_eq!(device.route_resolve(&IP_REMOTE.into()), Some(route));

    assert_eq!(device.route_remove(&route), Ok(()));
    assert_eq!(device.route_remove(&route), Err(Error::NotFound));
    assert_eq!(device.route_resolve(&IP_REMOTE.into()), None);

    device.interface_remove(eth0).unwrap();
    assert_eq!(device.route_add(route), Err(Error::NotFound));
}

#[test]
fn receive_classification() {
    let (mut device, eth0) = host(Config::default());
    let seen = sniff(&mut device);

    let targets = [
        IP_HOST,
        Ipv4Address::BROADCAST,
        Ipv4Address::new(10, 0, 0, 255),
        Ipv4Address::new(10, 0, 0, 77),
        Ipv4Address::new(224, 0, 0, 9),
    ];
    for &target in targets.iter() {
        device.receive_frame(eth0, frame(&packet(IP_OTHER, target, 64)));
    }
    device.interface_mcast_subscribe(eth0, Ipv4Address::new(224, 0, 0, 9).into()).unwrap();
    device.receive_frame(eth0, frame(&packet(IP_OTHER, Ipv4Address::new(224, 0, 0, 9), 64)));

    let flags: Vec<_> = seen.borrow().iter()
        .map(|meta| (meta.destination, meta.broadcast, meta.multicast))
        .collect();
    assert_eq!(flags, vec![
        (true, false, false),
        (true, true, false),
        (true, true, false),
        (false, false, false),
        (false, false, true),
        (true, false, true),
    ]);
}

#[test]
fn wrong_checksum() {
    let mut broken = packet(IP_OTHER, IP_HOST, 64);
    broken[10] ^= 0xff;

    let (mut device, eth0) = host(Config::default());
    let seen = sniff(&mut device);
    device.receive_frame(eth0, frame(&broken));
    assert!(seen.borrow().is_empty());

    let config = Config { verify_checksums: false, ..Config::default() };
    let (mut device, eth0) = host(config);
    let seen = sniff(&mut device);
    device.receive_frame(eth0, frame(&broken));
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn trailing_octets_are_trimmed() {
    let (mut device, eth0) = host(Config::default());
    let lengths = Rc::new(RefCell::new(Vec::new()));
    let log = lengths.clone();
    let contact = device.contact_create(ContactFamily::Ipv4, Transport::Raw);
    device.contact_receive(contact, FnHandler(move |_: &mut Device, delivery: Delivery| {
        log.borrow_mut().push(delivery.payload.len());
    }), false).unwrap();

    let mut padded = packet(IP_OTHER, IP_HOST, 64);
    padded.extend_from_slice(&[0; 12]);
    device.receive_frame(eth0, frame(&padded));
    assert_eq!(*lengths.borrow(), vec![120]);
}

#[test]
fn forward_decrements_ttl() {
    let (mut device, eth0) = host(Config::default());
    let route = Route::via(Ipv4Address::new(192, 168, 0, 0).into(),
        Mask::new(Family::Ipv4, 16).unwrap(), IP_OTHER.into(), eth0).unwrap();
    device.route_add(route).unwrap();

    let source = Ipv4Address::new(172, 16, 0, 1);
    assert_eq!(device.forward_ipv4(&packet(source, IP_REMOTE, 5)), Ok(Sent::Transmitted));

    let sent = sent(&mut device);
    let ip = ipv4_packet::new_checked(&sent[0]).unwrap();
    assert_eq!(ip.hop_limit(), 4);
    assert_eq!(ip.src_addr(), source);
    assert_eq!(ip.dst_addr(), IP_REMOTE);
    assert!(ip.verify_checksum());
}

fn icmp_error(sent: &[u8]) -> (Icmpv4Message, u8, usize) {
    let ip = ipv4_packet::new_checked(sent).unwrap();
    assert_eq!(ip.protocol(), IpProtocol::Icmp);
    assert_eq!(ip.src_addr(), IP_HOST);
    assert_eq!(ip.dst_addr(), IP_OTHER);
    let icmp = icmpv4_packet::new_checked(ip.payload_slice()).unwrap();
    assert!(icmp.verify_checksum());
    (icmp.msg_type(), icmp.msg_code(), icmp.data().len())
}

#[test]
fn forward_expired() {
    let (mut device, _) = host(Config::default());
    assert_eq!(device.forward_ipv4(&packet(IP_OTHER, IP_REMOTE, 1)), Err(Error::TtlExceeded));

    let sent = sent(&mut device);
    assert_eq!(sent.len(), 1);
    assert_eq!(icmp_error(&sent[0]), (Icmpv4Message::TimeExceeded, 0, 64));
}

#[test]
fn forward_without_route() {
    let config = Config { icmp_error_payload: 28, ..Config::default() };
    let (mut device, _) = host(config);
    assert_eq!(device.forward_ipv4(&packet(IP_OTHER, IP_REMOTE, 64)), Err(Error::NetUnreachable));

    let sent = sent(&mut device);
    assert_eq!(icmp_error(&sent[0]), (Icmpv4Message::DstUnreachable, 0, 28));
}
