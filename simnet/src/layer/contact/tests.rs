use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use crate::layer::FnHandler;
use crate::wire::Ipv4Address;

mod mock {
    use crate::wire::{IpAddress, Ipv4Address};

    pub fn lb() -> IpAddress {
        Ipv4Address::LOOPBACK.into()
    }

    pub fn unset() -> IpAddress {
        Ipv4Address::UNSPECIFIED.into()
    }

    pub fn all_ones() -> IpAddress {
        Ipv4Address::BROADCAST.into()
    }
}

fn device() -> Device {
    Device::new("host", Config::default())
}

/// The candidate set of increasing specificity, in scrambled order.
fn ladder() -> Vec<(u32, Option<ContactAddress>)> {
    let default = ContactAddress::any(Family::Ipv4);
    vec![
        (20, Some(ContactAddress { sport: 10, dport: 20, ..default })),
        (3_000, Some(ContactAddress { saddr: mock::lb(), daddr: mock::lb(), sport: 10, dport: 20 })),
        (1_000_000_000, Some(default)),
        (2_000, Some(ContactAddress { saddr: mock::lb(), sport: 10, dport: 20, ..default })),
        (10, Some(ContactAddress { sport: 10, ..default })),
    ]
}

fn best(saddr: IpAddress, daddr: IpAddress, sport: u16, dport: u16) -> Option<u32> {
    most_specific(&ContactAddress { saddr, daddr, sport, dport }, ladder())
}

#[test]
fn specificity_ladder() {
    assert_eq!(best(mock::all_ones(), mock::unset(), 0xff1f, 1000), Some(1_000_000_000));
    assert_eq!(best(mock::all_ones(), mock::unset(), 10, 1000), Some(10));
    assert_eq!(best(mock::all_ones(), mock::unset(), 10, 20), Some(20));
    assert_eq!(best(mock::lb(), mock::all_ones(), 10, 20), Some(2_000));
    assert_eq!(best(mock::lb(), mock::lb(), 10, 20), Some(3_000));
}

#[test]
fn ladder_order_does_not_matter() {
    let packet = ContactAddress { saddr: mock::lb(), daddr: mock::lb(), sport: 10, dport: 20 };
    let mut candidates = ladder();
    candidates.reverse();
    assert_eq!(most_specific(&packet, candidates), Some(3_000));
}

#[test]
fn unbound_matches_everything() {
    let packet = ContactAddress { saddr: mock::lb(), daddr: mock::lb(), sport: 1, dport: 2 };
    let candidates = vec![
        (1, Some(ContactAddress { sport: 99, ..ContactAddress::any(Family::Ipv4) })),
        (2, None),
        (3, None),
    ];
    assert_eq!(most_specific(&packet, candidates), Some(2));
    assert_eq!(most_specific(&packet, Vec::<(u8, _)>::new()), None);
}

#[test]
fn bind_uniqueness() {
    let mut device = device();
    let address = ContactAddress { saddr: mock::unset(), daddr: mock::lb(), sport: 6000, dport: 80 };

    let first = device.contact_create(ContactFamily::Ipv4, Transport::Udp);
    device.contact_bind(first, address).unwrap();

    let second = device.contact_create(ContactFamily::Ipv4, Transport::Udp);
    assert_eq!(device.contact_bind(second, address), Err(Error::AlreadyInUse));

    // A different port is fine.
    device.contact_bind(second, ContactAddress { sport: 6001, ..address }).unwrap();

    // Closing frees the tuple.
    device.contact_close(first).unwrap();
    let third = device.contact_create(ContactFamily::Ipv4, Transport::Udp);
    device.contact_bind(third, address).unwrap();
}

#[test]
fn bind_rules() {
    let mut device = device();
    let address = ContactAddress::local(mock::lb(), 53);

    let raw = device.contact_create(ContactFamily::Ipv4, Transport::Raw);
    assert_eq!(device.contact_bind(raw, address),
        Err(Error::Illegal("raw contacts can not be bound")));

    let v6 = device.contact_create(ContactFamily::Ipv6, Transport::Udp);
    assert_eq!(device.contact_bind(v6, address),
        Err(Error::Illegal("address family does not match the contact")));

    let udp = device.contact_create(ContactFamily::Ipv4, Transport::Udp);
    device.contact_bind(udp, address).unwrap();
    assert_eq!(device.contact_bind(udp, address),
        Err(Error::Illegal("contact is already bound")));
    assert_eq!(device.contact(udp).and_then(Contact::address), Some(&address));
}

#[test]
fn ephemeral_ports() {
    let mut registry = Registry::new(&Config::default());
    assert_eq!(registry.next_ephemeral(), 10_011);
    assert_eq!(registry.next_ephemeral(), 10_016);

    registry.ephemeral = 0xfffc;
    // Wraps modulo 0xffff and is clamped to the minimum.
    assert_eq!(registry.next_ephemeral(), 10_011);
}

#[test]
fn close_is_idempotent() {
    let mut device = device();
    let contact = device.contact_create(ContactFamily::Ipv4, Transport::Udp);
    device.contact_receive(contact, FnHandler(|_: &mut Device, _: Delivery| ()), false).unwrap();
    assert_eq!(device.contact_close(contact), Ok(()));
    assert_eq!(device.contact_close(contact), Ok(()));
    assert!(device.contact(contact).is_none());
    assert_eq!(device.contact_receive(contact, FnHandler(|_: &mut Device, _: Delivery| ()), false),
        Err(Error::NotFound));
}

#[test]
fn send_to_requires_destination() {
    let mut device = device();
    let contact = device.contact_create(ContactFamily::Ipv4, Transport::Udp);
    let errors = Rc::new(RefCell::new(Vec::new()));
    let log = errors.clone();
    device.contact_on_error(contact, move |err| log.borrow_mut().push(*err)).unwrap();

    let result = device.contact_send_to(contact, b"x", ContactAddress::local(mock::unset(), 7));
    assert_eq!(result, Err(Error::Illegal("destination address and port are required")));
    assert_eq!(device.contact_send(contact, b"x"), Err(Error::Illegal("contact must be bound")));
    assert_eq!(errors.borrow().len(), 2);
}

#[test]
fn send_to_without_route() {
    let mut device = device();
    let contact = device.contact_create(ContactFamily::Ipv4, Transport::Udp);
    let target = ContactAddress::remote(Ipv4Address::new(10, 0, 0, 1).into(), 53);

    assert_eq!(device.contact_send_to(contact, b"query", target), Err(Error::HostUnreachable));

    // The contact was bound with an ephemeral source port nonetheless.
    let bound = device.contact(contact).and_then(Contact::address).cloned().unwrap();
    assert_eq!(bound.sport, 10_011);
    assert_eq!(bound.daddr, target.daddr);
    assert!(bound.saddr.is_unspecified());
}

#[test]
fn receiver_replaced_from_within() {
    let mut device = device();
    let contact = device.contact_create(ContactFamily::Raw, Transport::Raw);
    let calls = Rc::new(RefCell::new(Vec::new()));

    let log = calls.clone();
    device.contact_receive(contact, FnHandler(move |device: &mut Device, delivery: Delivery| {
        log.borrow_mut().push("first");
        let log = log.clone();
        device.contact_receive(delivery.contact, FnHandler(move |_: &mut Device, _: Delivery| {
            log.borrow_mut().push("second");
        }), false).unwrap();
    }), false).unwrap();

    let iface = device.interface_add_ethernet(EthernetAddress([2, 0, 0, 0, 0, 1]));
    let mut meta = Meta::new(iface);
    meta.destination = true;
    device.contact_input_raw(ContactFamily::Raw, meta, &[0; 14]);
    device.contact_input_raw(ContactFamily::Raw, meta, &[0; 14]);
    assert_eq!(*calls.borrow(), vec!["first", "second"]);
}

#[test]
fn receiver_may_close_its_contact() {
    let mut device = device();
    let contact = device.contact_create(ContactFamily::Raw, Transport::Raw);
    device.contact_receive(contact, FnHandler(|device: &mut Device, delivery: Delivery| {
        device.contact_close(delivery.contact).unwrap();
    }), true).unwrap();

    let iface = device.interface_add_ethernet(EthernetAddress([2, 0, 0, 0, 0, 1]));
    device.contact_input_raw(ContactFamily::Raw, Meta::new(iface), &[0; 14]);
    assert!(device.contact(contact).is_none());
}

#[test]
fn raw_needs_destination_unless_promiscuous() {
    let mut device = device();
    let count = Rc::new(RefCell::new((0, 0)));

    let quiet = device.contact_create(ContactFamily::Ipv4, Transport::Raw);
    let log = count.clone();
    device.contact_receive(quiet, FnHandler(move |_: &mut Device, _: Delivery| {
        log.borrow_mut().0 += 1;
    }), false).unwrap();

    let sniffer = device.contact_create(ContactFamily::Ipv4, Transport::Raw);
    let log = count.clone();
    device.contact_receive(sniffer, FnHandler(move |_: &mut Device, _: Delivery| {
        log.borrow_mut().1 += 1;
    }), true).unwrap();
    assert!(device.contacts.has_promiscuous(ContactFamily::Ipv4));

    let iface = device.interface_add_ethernet(EthernetAddress([2, 0, 0, 0, 0, 1]));
    let mut meta = Meta::new(iface);
    device.contact_input_raw(ContactFamily::Ipv4, meta, &[0x45; 20]);
    meta.destination = true;
    device.contact_input_raw(ContactFamily::Ipv4, meta, &[0x45; 20]);
    assert_eq!(*count.borrow(), (1, 2));
}
