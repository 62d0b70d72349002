//! Pings across a router in a simulated network.
//!
//! # Usage
//!
//! Two hosts in different networks are connected through a router. The left host sends echo
//! requests to the right host, which answers them, and every reply is printed together with its
//! time to live. Set `RUST_LOG=simnet=debug` to watch neighbor resolution and forwarding.
//!
//!   > $ cargo run --example ping_topology -- --count 5
//!
//! Pinging an address outside both networks shows the router's unreachable reports.
//!
//!   > $ cargo run --example ping_topology -- --target 192.168.0.1
use std::cell::Cell;
use std::rc::Rc;
use structopt::StructOpt;

use simnet::{Device, Network};
use simnet::layer::{Delivery, FnHandler};
use simnet::layer::contact::{ContactFamily, Transport};
use simnet::layer::ip::Route;
use simnet::service::{EchoReplier, Router};
use simnet::time::Duration;
use simnet::wire::{icmpv4_packet, ipv4_packet, Cidr, Family, IpAddress, IpProtocol, Mask};

fn main() -> Result<(), simnet::Error> {
    env_logger::init();

    let Config {
        left,
        left_gateway,
        right,
        right_gateway,
        target,
        count,
        interval,
    } = Config::from_args();

    let mut net = Network::new();
    let host = net.add_device("left");
    let router = net.add_device("router");
    let peer = net.add_device("right");

    let host0 = net.add_ethernet(host)?;
    let router0 = net.add_ethernet(router)?;
    let router1 = net.add_ethernet(router)?;
    let peer0 = net.add_ethernet(peer)?;
    net.connect(host0, router0)?;
    net.connect(router1, peer0)?;

    let any = IpAddress::unspecified(Family::Ipv4);
    let default = Mask::new(Family::Ipv4, 0)?;
    {
        let dev = net.device_mut(host).ok_or(simnet::Error::NotFound)?;
        dev.interface_set_address(host0.iface, left.address(), left.mask())?;
        dev.route_add(Route::via(any, default, left_gateway, host0.iface)?)?;
    }
    {
        let dev = net.device_mut(router).ok_or(simnet::Error::NotFound)?;
        dev.interface_set_address(router0.iface, left_gateway, left.mask())?;
        dev.interface_set_address(router1.iface, right_gateway, right.mask())?;
        Router::attach(dev)?;
    }
    {
        let dev = net.device_mut(peer).ok_or(simnet::Error::NotFound)?;
        dev.interface_set_address(peer0.iface, right.address(), right.mask())?;
        dev.route_add(Route::via(any, default, right_gateway, peer0.iface)?)?;
        EchoReplier::attach(dev)?;
    }

    let replies = Rc::new(Cell::new(0u16));
    {
        let replies = replies.clone();
        let dev = net.device_mut(host).ok_or(simnet::Error::NotFound)?;
        let contact = dev.contact_create(ContactFamily::Ipv4, Transport::Raw);
        dev.contact_receive(contact, FnHandler(move |dev: &mut Device, delivery: Delivery| {
            let ip = match ipv4_packet::new_checked(delivery.payload) {
                Ok(ip) if ip.protocol() == IpProtocol::Icmp => ip,
                _ => return,
            };
            let icmp = match icmpv4_packet::new_checked(ip.payload_slice()) {
                Ok(icmp) => icmp,
                Err(_) => return,
            };
            println!("{} {} from {}: ttl={} seq={}",
                dev.now(), icmp.msg_type(), ip.src_addr(), ip.hop_limit(), icmp.echo_seq_no());
            replies.set(replies.get() + 1);
        }), false)?;
    }

    let target = target.unwrap_or_else(|| right.address());
    println!("PING {} from {}", target, left.address());
    for seq_no in 0..count {
        let delay = Duration::from_millis(interval * u64::from(seq_no));
        net.schedule(delay, move |net: &mut Network| {
            let dev = match net.device_mut(host) {
                Some(dev) => dev,
                None => return,
            };
            if let Err(err) = dev.ping(target, 0x5157, seq_no, b"simnet ping") {
                println!("{} ping {} failed: {}", dev.now(), seq_no, err);
            }
        });
    }

    let steps = net.run_until_idle();
    println!("--- {} requests, {} answers, {} tasks run ---", count, replies.get(), steps);
    Ok(())
}

#[derive(StructOpt)]
struct Config {
    /// Address and network of the left host.
    #[structopt(long = "left", default_value = "10.0.0.1/24")]
    left: Cidr,
    /// Address of the router in the left network.
    #[structopt(long = "left-gateway", default_value = "10.0.0.254")]
    left_gateway: IpAddress,
    /// Address and network of the right host.
    #[structopt(long = "right", default_value = "10.1.0.1/24")]
    right: Cidr,
    /// Address of the router in the right network.
    #[structopt(long = "right-gateway", default_value = "10.1.0.254")]
    right_gateway: IpAddress,
    /// Ping this address instead of the right host.
    #[structopt(long = "target")]
    target: Option<IpAddress>,
    /// Number of echo requests.
    #[structopt(short = "c", long = "count", default_value = "3")]
    count: u16,
    /// Milliseconds between two requests.
    #[structopt(long = "interval", default_value = "1000")]
    interval: u64,
}
