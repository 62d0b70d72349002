//! The routing table of a device.
//!
//! Routes are kept in insertion order. Resolution prefers an exact host route and otherwise the
//! network route with the longest mask, see [`Routes::resolve`].
//!
//! [`Routes::resolve`]: struct.Routes.html#method.resolve
use core::{fmt, ops};

use crate::layer::{Error, Result};
use crate::nic::{Binding, IfaceId};
use crate::wire::{IpAddress, Mask};

/// Properties of a route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Flags(u8);

impl Flags {
    /// The route targets a single address.
    pub const HOST: Flags = Flags(0x01);
    /// Packets are sent to the gateway instead of the destination.
    pub const GATEWAY: Flags = Flags(0x02);
    /// Configured by hand, never pruned automatically.
    pub const STATIC: Flags = Flags(0x04);
    /// Created by a protocol.
    pub const DYNAMIC: Flags = Flags(0x08);

    /// No flags set.
    pub const fn empty() -> Self {
        Flags(0)
    }

    /// Query whether all flags of `other` are set.
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// An entry of the routing table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Route {
    /// The targeted network or host.
    pub destination: IpAddress,
    /// The mask of the targeted network.
    pub mask: Mask,
    /// The next hop, unspecified for directly connected networks.
    pub gateway: IpAddress,
    /// The outgoing interface.
    pub iface: IfaceId,
    /// Properties of the route.
    pub flags: Flags,
}

impl Route {
    /// Create a route, checking that all addresses share one family.
    pub fn new(destination: IpAddress, mask: Mask, gateway: IpAddress, iface: IfaceId, flags: Flags)
        -> Result<Self>
    {
        let family = destination.family();
        if mask.family() != family || gateway.family() != family {
            return Err(Error::Illegal("route mixes address families"));
        }
        Ok(Route { destination, mask, gateway, iface, flags })
    }

    /// A route to the connected network of an interface address.
    pub fn connected(binding: &Binding, iface: IfaceId) -> Result<Self> {
        let destination = binding.mask.mask(&binding.address)?;
        let gateway = IpAddress::unspecified(destination.family());
        Route::new(destination, binding.mask, gateway, iface, Flags::empty())
    }

    /// A static route via a gateway.
    pub fn via(destination: IpAddress, mask: Mask, gateway: IpAddress, iface: IfaceId) -> Result<Self> {
        Route::new(destination, mask, gateway, iface, Flags::GATEWAY | Flags::STATIC)
    }

    /// A static route to a single host.
    pub fn host(destination: IpAddress, gateway: IpAddress, iface: IfaceId) -> Result<Self> {
        let mask = Mask::host(destination.family());
        let mut flags = Flags::HOST | Flags::STATIC;
        if !gateway.is_unspecified() {
            flags = flags | Flags::GATEWAY;
        }
        Route::new(destination, mask, gateway, iface, flags)
    }

    /// Query whether this is a host route.
    pub fn is_host(&self) -> bool {
        self.flags.contains(Flags::HOST)
    }

    /// Query whether the packets are sent to a gateway.
    pub fn is_gateway(&self) -> bool {
        self.flags.contains(Flags::GATEWAY)
    }

    /// Query whether the route is protected from pruning.
    pub fn is_static(&self) -> bool {
        self.flags.contains(Flags::STATIC)
    }

    /// The neighbor a packet to `destination` is handed to.
    pub fn next_hop(&self, destination: IpAddress) -> IpAddress {
        if self.is_gateway() {
            self.gateway
        } else {
            destination
        }
    }

    /// The address that has to be reachable through the interface.
    ///
    /// The gateway for gateway routes, the destination otherwise.
    fn effective_destination(&self) -> IpAddress {
        self.next_hop(self.destination)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.destination, self.mask.prefix_len())?;
        if self.is_gateway() {
            write!(f, " via {}", self.gateway)?;
        }
        write!(f, " dev {}", self.iface)
    }
}

/// A routing table.
///
/// ```
/// use simnet::layer::ip::{Route, Routes};
/// # use simnet::Network;
/// # let mut network = Network::new();
/// # let host = network.add_device("host");
/// # let eth0 = network.add_ethernet(host).unwrap().iface;
/// use simnet::wire::{Family, Mask, Ipv4Address};
///
/// let mut routes = Routes::new();
/// let gateway = Ipv4Address::new(10, 0, 0, 1).into();
/// let default = Ipv4Address::UNSPECIFIED.into();
/// routes.add(Route::via(default, Mask::new(Family::Ipv4, 0)?, gateway, eth0)?);
///
/// let found = routes.resolve(&Ipv4Address::new(8, 8, 8, 8).into(), |_| true);
/// assert_eq!(found.map(|route| route.gateway), Some(gateway));
/// # Ok::<(), simnet::Error>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct Routes {
    routes: Vec<Route>,
}

impl Routes {
    /// Create an empty table.
    pub fn new() -> Self {
        Routes::default()
    }

    /// Append a route.
    ///
    /// A route identical to an existing one is not added twice. Returns whether the table changed.
    pub fn add(&mut self, route: Route) -> bool {
        if self.routes.contains(&route) {
            return false;
        }
        self.routes.push(route);
        true
    }

    /// Remove all routes matching a predicate, returning how many were removed.
    pub fn remove<F: FnMut(&Route) -> bool>(&mut self, mut pred: F) -> usize {
        let before = self.routes.len();
        self.routes.retain(|route| !pred(route));
        before - self.routes.len()
    }

    /// All routes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item=&Route> + '_ {
        self.routes.iter()
    }

    /// The number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Query whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the route for a destination.
    ///
    /// Only routes of the destination's family whose interface is up (as reported by `is_up`)
    /// are considered. A host route for exactly the destination wins. Otherwise the network route
    /// with the longest mask containing the destination is chosen; among equally long masks the
    /// one whose destination shares the most leading bits with the address wins, and the first
    /// added among complete ties.
    pub fn resolve<F>(&self, destination: &IpAddress, is_up: F) -> Option<Route>
        where F: Fn(IfaceId) -> bool
    {
        let family = destination.family();
        let is_up = &is_up;
        let candidates = || self.routes.iter()
            .filter(move |route| route.destination.family() == family && is_up(route.iface));

        if let Some(host) = candidates()
            .find(|route| route.is_host() && route.destination == *destination)
        {
            return Some(*host);
        }

        let mut best: Option<(&Route, (usize, usize))> = None;
        for route in candidates().filter(|route| !route.is_host()) {
            if !route.mask.compare(&route.destination, destination) {
                continue;
            }
            let rank = (route.mask.prefix_len(), route.destination.common_prefix_len(destination));
            match best {
                Some((_, best_rank)) if best_rank >= rank => (),
                _ => best = Some((route, rank)),
            }
        }
        best.map(|(route, _)| *route)
    }

    /// Adjust the routes of an interface to a newly assigned address.
    ///
    /// Removes the routes of the interface in that family which are not static and are either
    /// network routes with a shorter mask than the new one, or whose destination (the gateway for
    /// gateway routes) lies outside of the new network. Then adds the connected route of the new
    /// address.
    pub fn assign(&mut self, iface: IfaceId, binding: &Binding) -> Result<()> {
        let family = binding.address.family();
        let new_len = binding.mask.prefix_len();
        self.remove(|route| {
            route.iface == iface
                && route.destination.family() == family
                && !route.is_static()
                && ((!route.is_gateway() && route.mask.prefix_len() < new_len)
                    || !binding.mask.compare(&route.effective_destination(), &binding.address))
        });
        self.add(Route::connected(binding, iface)?);
        Ok(())
    }

    /// Remove the non-static routes of an interface that lead into a removed network.
    pub fn unassign(&mut self, iface: IfaceId, binding: &Binding) -> usize {
        let family = binding.address.family();
        self.remove(|route| {
            route.iface == iface
                && route.destination.family() == family
                && !route.is_static()
                && binding.mask.compare(&route.effective_destination(), &binding.address)
        })
    }

    /// Remove every route over an interface.
    pub fn remove_iface(&mut self, iface: IfaceId) -> usize {
        self.remove(|route| route.iface == iface)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::managed::SlotMap;
    use crate::wire::{Family, Ipv4Address};

    fn ifaces() -> (IfaceId, IfaceId) {
        let mut map = SlotMap::new();
        (IfaceId(map.insert(())), IfaceId(map.insert(())))
    }

    fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddress {
        Ipv4Address::new(a, b, c, d).into()
    }

    fn mask(len: usize) -> Mask {
        Mask::new(Family::Ipv4, len).unwrap()
    }

    /// The table used by the longest match tests.
    ///
    /// All routes have the same `/8` mask and differ only in their destinations.
    fn loopback_table(iface: IfaceId) -> Routes {
        let mut routes = Routes::new();
        for &(dst, gw) in &[
            (v4(127, 0, 0, 0), v4(127, 0, 0, 10)),
            (v4(127, 0, 30, 0), v4(127, 0, 0, 30)),
            (v4(127, 0, 20, 0), v4(127, 0, 0, 20)),
            (v4(127, 0, 20, 128), v4(127, 0, 0, 128)),
        ] {
            routes.add(Route::via(dst, mask(8), gw, iface).unwrap());
        }
        routes
    }

    #[test]
    fn longest_match() {
        let (iface, _) = ifaces();
        let routes = loopback_table(iface);
        let gateway = |dst| routes.resolve(&dst, |_| true).map(|route| route.gateway);

        assert_eq!(gateway(v4(127, 0, 0, 1)), Some(v4(127, 0, 0, 10)));
        assert_eq!(gateway(v4(127, 0, 30, 1)), Some(v4(127, 0, 0, 30)));
        assert_eq!(gateway(v4(127, 0, 20, 1)), Some(v4(127, 0, 0, 20)));
        assert_eq!(gateway(v4(127, 0, 20, 254)), Some(v4(127, 0, 0, 128)));
        assert_eq!(gateway(v4(10, 0, 0, 1)), None);
    }

    #[test]
    fn host_route_precedence() {
        let (iface, _) = ifaces();
        let mut routes = loopback_table(iface);
        routes.add(Route::host(v4(127, 0, 0, 100), v4(127, 0, 0, 99), iface).unwrap());

        let found = routes.resolve(&v4(127, 0, 0, 100), |_| true).unwrap();
        assert!(found.is_host());
        assert_eq!(found.gateway, v4(127, 0, 0, 99));
        assert_eq!(found.next_hop(v4(127, 0, 0, 100)), v4(127, 0, 0, 99));
    }

    #[test]
    fn longer_mask_wins() {
        let (iface, _) = ifaces();
        let mut routes = Routes::new();
        routes.add(Route::via(v4(0, 0, 0, 0), mask(0), v4(10, 0, 0, 1), iface).unwrap());
        routes.add(Route::via(v4(10, 1, 0, 0), mask(16), v4(10, 0, 0, 2), iface).unwrap());

        let gateway = |dst| routes.resolve(&dst, |_| true).map(|route| route.gateway);
        assert_eq!(gateway(v4(10, 1, 7, 7)), Some(v4(10, 0, 0, 2)));
        assert_eq!(gateway(v4(10, 2, 7, 7)), Some(v4(10, 0, 0, 1)));
    }

    #[test]
    fn down_interfaces_are_skipped() {
        let (up, down) = ifaces();
        let mut routes = Routes::new();
        routes.add(Route::via(v4(10, 0, 0, 0), mask(24), v4(10, 0, 0, 1), down).unwrap());
        routes.add(Route::via(v4(10, 0, 0, 0), mask(8), v4(10, 0, 0, 2), up).unwrap());

        let found = routes.resolve(&v4(10, 0, 0, 9), |iface| iface == up).unwrap();
        assert_eq!(found.iface, up);
    }

    #[test]
    fn reassignment_prunes() {
        let (iface, other) = ifaces();
        let mut routes = Routes::new();
        let old = Binding { address: v4(192, 168, 1, 5), mask: mask(24) };
        routes.assign(iface, &old).unwrap();
        // A dynamic route into the old network and a route on another interface.
        routes.add(Route::new(v4(192, 168, 1, 0), mask(24), v4(192, 168, 1, 1), iface,
            Flags::GATEWAY | Flags::DYNAMIC).unwrap());
        routes.add(Route::via(v4(0, 0, 0, 0), mask(0), v4(172, 16, 0, 1), other).unwrap());
        assert_eq!(routes.len(), 3);

        let new = Binding { address: v4(10, 0, 0, 5), mask: mask(8) };
        routes.assign(iface, &new).unwrap();

        let on_iface: Vec<_> = routes.iter().filter(|route| route.iface == iface).collect();
        assert_eq!(on_iface.len(), 1);
        assert_eq!(*on_iface[0], Route::connected(&new, iface).unwrap());
        assert_eq!(on_iface[0].destination, v4(10, 0, 0, 0));
        assert_eq!(routes.len(), 2);
    }

    #[test]
    fn new_network_leaves_only_its_route() {
        let (iface, _) = ifaces();
        let mut routes = Routes::new();
        routes.add(Route::new(v4(10, 0, 0, 0), mask(8), v4(0, 0, 0, 0), iface,
            Flags::DYNAMIC).unwrap());
        routes.add(Route::new(v4(0, 0, 0, 0), mask(0), v4(10, 0, 0, 1), iface,
            Flags::GATEWAY).unwrap());
        assert_eq!(routes.len(), 2);

        let new = Binding { address: v4(192, 168, 1, 5), mask: mask(24) };
        routes.assign(iface, &new).unwrap();

        let all: Vec<_> = routes.iter().collect();
        assert_eq!(all.len(), 1);
        assert_eq!(*all[0], Route::connected(&new, iface).unwrap());
    }

    #[test]
    fn narrower_mask_prunes_looser_connected_route() {
        let (iface, _) = ifaces();
        let mut routes = Routes::new();
        routes.assign(iface, &Binding { address: v4(10, 0, 0, 5), mask: mask(8) }).unwrap();
        routes.assign(iface, &Binding { address: v4(10, 0, 0, 5), mask: mask(24) }).unwrap();

        let all: Vec<_> = routes.iter().collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].mask.prefix_len(), 24);
    }

    #[test]
    fn static_routes_survive() {
        let (iface, _) = ifaces();
        let mut routes = Routes::new();
        routes.assign(iface, &Binding { address: v4(192, 168, 1, 5), mask: mask(24) }).unwrap();
        routes.add(Route::via(v4(0, 0, 0, 0), mask(0), v4(192, 168, 1, 1), iface).unwrap());
        routes.assign(iface, &Binding { address: v4(10, 0, 0, 5), mask: mask(8) }).unwrap();
        assert!(routes.iter().any(|route| route.is_static()));
        assert_eq!(routes.len(), 2);
    }

    #[test]
    fn mixed_families_rejected() {
        let (iface, _) = ifaces();
        let v6 = crate::wire::Ipv6Address::LOOPBACK.into();
        assert_eq!(Route::via(v4(0, 0, 0, 0), mask(0), v6, iface),
            Err(Error::Illegal("route mixes address families")));
    }
}
