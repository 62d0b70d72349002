use crate::config::Config;
use crate::device::{Device, DeviceId, Transmit};
use crate::layer::{Error, Sent};
use crate::managed::SlotMap;
use crate::nic::{IfaceId, Link};
use crate::wire::{ethernet_frame, icmpv4_packet, icmpv6_packet, ipv4_packet, ipv6_packet};
use crate::wire::{Checksum, EtherType, EthernetAddress, Family, Icmpv4DstUnreachable};
use crate::wire::{Icmpv4Repr, Icmpv6Repr, IpAddress, IpProtocol, Ipv4Address, Ipv4Repr};
use crate::wire::{Ipv6Address, Mask};

use super::IcmpError;

const MAC_HOST: EthernetAddress = EthernetAddress([0xfa, 0xff, 0x0f, 0, 0, 1]);
const MAC_OTHER: EthernetAddress = EthernetAddress([0xfa, 0xff, 0x0f, 0, 0, 9]);
const IP_HOST: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
const IP_OTHER: Ipv4Address = Ipv4Address::new(10, 0, 0, 2);
const DATA: &[u8] = b"simnet echo";

fn v6(last: u16) -> Ipv6Address {
    Ipv6Address::new(0xfd00, 0, 0, 0, 0, 0, 0, last)
}

fn host() -> (Device, IfaceId) {
    let mut device = Device::new("host", Config::default());
    let iface = device.interface_add_ethernet(MAC_HOST);
    let mut keys = SlotMap::new();
    let peer = Link { device: DeviceId(keys.insert(())), iface: IfaceId(keys.insert(())) };
    device.interface_link(iface, Some(peer)).unwrap();
    device.interface_set_address(iface, IP_HOST.into(), Mask::new(Family::Ipv4, 24).unwrap())
        .unwrap();
    device.interface_set_address(iface, v6(1).into(), Mask::new(Family::Ipv6, 64).unwrap())
        .unwrap();
    device.neighbor_add(iface, IP_OTHER.into(), MAC_OTHER).unwrap();
    device.neighbor_add(iface, v6(2).into(), MAC_OTHER).unwrap();
    (device, iface)
}

/// Payloads of the frames on the wire.
fn sent(device: &mut Device) -> Vec<(EtherType, Vec<u8>)> {
    device.take_outbox().into_iter()
        .filter_map(|transmit| match transmit {
            Transmit::Wire { frame, .. } => {
                let eth = ethernet_frame::new_checked(&frame).unwrap();
                Some((eth.ethertype(), eth.payload().to_vec()))
            },
            _ => None,
        })
        .collect()
}

fn original(protocol: IpProtocol, src_addr: Ipv4Address, payload: &[u8]) -> Vec<u8> {
    Ipv4Repr {
        src_addr,
        dst_addr: Ipv4Address::new(192, 168, 1, 1),
        protocol,
        payload_len: payload.len(),
        hop_limit: 1,
    }.encapsulate(payload, Checksum::Manual)
}

#[test]
fn ping_ipv4() {
    let (mut device, _) = host();
    assert_eq!(device.ping(IP_OTHER.into(), 0x1234, 7, DATA), Ok(Sent::Transmitted));

    let sent = sent(&mut device);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, EtherType::Ipv4);
    let ip = ipv4_packet::new_checked(&sent[0].1).unwrap();
    assert_eq!(ip.protocol(), IpProtocol::Icmp);
    assert_eq!(ip.src_addr(), IP_HOST);
    assert_eq!(ip.dst_addr(), IP_OTHER);

    let icmp = icmpv4_packet::new_checked(ip.payload_slice()).unwrap();
    assert_eq!(Icmpv4Repr::parse(icmp, Checksum::Manual), Ok(Icmpv4Repr::EchoRequest {
        ident: 0x1234,
        seq_no: 7,
        data: DATA,
    }));
}

#[test]
fn checksums_are_always_computed() {
    let (mut device, eth0) = host();
    {
        let caps = device.interface_mut(eth0).unwrap().capabilities_mut();
        *caps.ipv4_mut().rx_checksum_mut() = Checksum::Ignored;
        *caps.icmp_mut().rx_checksum_mut() = Checksum::Ignored;
    }
    device.ping(IP_OTHER.into(), 1, 1, DATA).unwrap();

    let sent = sent(&mut device);
    let ip = ipv4_packet::new_checked(&sent[0].1).unwrap();
    assert!(ip.verify_checksum());
    assert!(icmpv4_packet::new_checked(ip.payload_slice()).unwrap().verify_checksum());
}

#[test]
fn ping_ipv6() {
    let (mut device, _) = host();
    assert_eq!(device.ping(v6(2).into(), 9, 3, DATA), Ok(Sent::Transmitted));

    let sent = sent(&mut device);
    assert_eq!(sent[0].0, EtherType::Ipv6);
    let ip = ipv6_packet::new_checked(&sent[0].1).unwrap();
    assert_eq!(ip.next_header(), IpProtocol::Icmpv6);
    assert_eq!(ip.src_addr(), v6(1));

    let icmp = icmpv6_packet::new_checked(ip.payload_slice()).unwrap();
    let repr = Icmpv6Repr::parse(&v6(1), &v6(2), icmp, Checksum::Manual);
    assert_eq!(repr, Ok(Icmpv6Repr::EchoRequest { ident: 9, seq_no: 3, data: DATA }));
}

#[test]
fn ping_errors() {
    let (mut device, _) = host();
    assert_eq!(device.ping(IpAddress::Mac(MAC_OTHER), 1, 1, DATA),
        Err(Error::Illegal("can not ping a hardware address")));
    assert_eq!(device.ping(Ipv4Address::new(192, 168, 1, 1).into(), 1, 1, DATA),
        Err(Error::HostUnreachable));
    assert_eq!(device.ping(Ipv6Address::new(0xfd01, 0, 0, 0, 0, 0, 0, 1).into(), 1, 1, DATA),
        Err(Error::HostUnreachable));
    assert!(!device.has_outgoing());
}

#[test]
fn error_quotes_original() {
    let (mut device, _) = host();
    let packet = original(IpProtocol::Udp, IP_OTHER, &[0; 8]);
    assert_eq!(device.icmpv4_error(&packet, IcmpError::NetUnreachable), Ok(Sent::Transmitted));

    let sent = sent(&mut device);
    let ip = ipv4_packet::new_checked(&sent[0].1).unwrap();
    assert_eq!(ip.dst_addr(), IP_OTHER);
    let icmp = icmpv4_packet::new_checked(ip.payload_slice()).unwrap();
    assert_eq!(Icmpv4Repr::parse(icmp, Checksum::Manual), Ok(Icmpv4Repr::DstUnreachable {
        reason: Icmpv4DstUnreachable::NetUnreachable,
        data: &packet,
    }));
}

#[test]
fn no_error_to_groups() {
    let (mut device, _) = host();
    for &source in [Ipv4Address::UNSPECIFIED, Ipv4Address::BROADCAST, Ipv4Address::new(224, 0, 0, 1)].iter() {
        let packet = original(IpProtocol::Udp, source, &[0; 8]);
        assert!(matches!(device.icmpv4_error(&packet, IcmpError::TimeExceeded),
            Err(Error::Illegal(_))));
    }
    assert!(!device.has_outgoing());
}

#[test]
fn no_error_about_errors() {
    let (mut device, _) = host();
    let quoted = original(IpProtocol::Udp, IP_HOST, &[0; 8]);
    let error = Icmpv4Repr::DstUnreachable {
        reason: Icmpv4DstUnreachable::PortUnreachable,
        data: &quoted,
    }.to_bytes(Checksum::Manual);
    let packet = original(IpProtocol::Icmp, IP_OTHER, &error);
    assert!(matches!(device.icmpv4_error(&packet, IcmpError::TimeExceeded),
        Err(Error::Illegal(_))));

    // Echo messages are not errors and may be reported on.
    let echo = Icmpv4Repr::EchoRequest { ident: 1, seq_no: 1, data: DATA }.to_bytes(Checksum::Manual);
    let packet = original(IpProtocol::Icmp, IP_OTHER, &echo);
    assert_eq!(device.icmpv4_error(&packet, IcmpError::TimeExceeded), Ok(Sent::Transmitted));
}
