// Heads up! Before working on this file you should read, at least,
// the parts of RFC 1122 that discuss ARP.
use std::collections::BTreeMap;

use crate::layer::ip::Route;
use crate::nic::IfaceId;
use crate::time::Instant;
use crate::wire::{EthernetAddress, IpAddress};

/// A cached neighbor.
///
/// A neighbor mapping translates from a protocol address (IPv4 and IPv6) to a hardware address.
/// Entries do not expire, they are refreshed by every answer and dropped when the interface they
/// were learned on goes away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Neighbor {
    /// The protocol address of the neighbor.
    pub protocol_addr: IpAddress,
    /// The interface on which the neighbor answered.
    pub iface: IfaceId,
    /// The hardware address of the neighbor.
    pub hardware_addr: EthernetAddress,
    /// When the mapping was learned or last refreshed.
    pub created_at: Instant,
}

/// An answer to a neighbor cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// The neighbor address is in the cache.
    Found(EthernetAddress),
    /// The neighbor address is not in the cache.
    NotFound,
}

/// A packet waiting for its next hop to be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    /// The complete IP packet.
    pub packet: Vec<u8>,
    /// The destination the packet was sent to.
    pub destination: IpAddress,
    /// The route chosen when the packet was sent.
    pub route: Route,
}

/// The neighbor cache of a device together with the packets waiting on it.
///
/// Both maps are keyed by the family-tagged protocol address of the next hop. The cache is
/// ordered by that address which keeps listing and flushing deterministic.
#[derive(Debug, Default, Clone)]
pub struct Cache {
    entries: BTreeMap<IpAddress, Neighbor>,
    pending: BTreeMap<IpAddress, Vec<Pending>>,
}

impl Cache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Cache::default()
    }

    /// Add or refresh an entry, returning the previous one.
    pub fn fill(&mut self, neighbor: Neighbor) -> Option<Neighbor> {
        debug_assert!(neighbor.hardware_addr.is_unicast());
        self.entries.insert(neighbor.protocol_addr, neighbor)
    }

    /// Get the entry of a neighbor.
    pub fn get(&self, protocol_addr: &IpAddress) -> Option<&Neighbor> {
        self.entries.get(protocol_addr)
    }

    /// Look up the hardware address of a neighbor.
    pub fn lookup(&self, protocol_addr: &IpAddress) -> Answer {
        match self.entries.get(protocol_addr) {
            Some(neighbor) => Answer::Found(neighbor.hardware_addr),
            None => Answer::NotFound,
        }
    }

    /// Remove the entry of a neighbor.
    pub fn remove(&mut self, protocol_addr: &IpAddress) -> Option<Neighbor> {
        self.entries.remove(protocol_addr)
    }

    /// Drop all entries learned on an interface, returning how many were dropped.
    pub fn invalidate(&mut self, iface: IfaceId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, neighbor| neighbor.iface != iface);
        before - self.entries.len()
    }

    /// All entries ordered by protocol address.
    pub fn iter(&self) -> impl Iterator<Item=&Neighbor> + '_ {
        self.entries.values()
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Query whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Park a packet until `next_hop` is resolved.
    ///
    /// Returns `true` if it is the first packet for that neighbor, i.e. a resolution needs to be
    /// started.
    pub fn enqueue(&mut self, next_hop: IpAddress, pending: Pending) -> bool {
        let queue = self.pending.entry(next_hop).or_insert_with(Vec::new);
        queue.push(pending);
        queue.len() == 1
    }

    /// Remove and return every packet waiting for `next_hop`.
    pub fn take_pending(&mut self, next_hop: &IpAddress) -> Vec<Pending> {
        self.pending.remove(next_hop).unwrap_or_default()
    }

    /// The number of packets waiting for `next_hop`.
    pub fn pending_len(&self, next_hop: &IpAddress) -> usize {
        self.pending.get(next_hop).map_or(0, Vec::len)
    }

    /// Drop every waiting packet routed over an interface.
    pub fn drop_pending(&mut self, iface: IfaceId) -> usize {
        let mut dropped = 0;
        for queue in self.pending.values_mut() {
            let before = queue.len();
            queue.retain(|pending| pending.route.iface != iface);
            dropped += before - queue.len();
        }
        self.pending.retain(|_, queue| !queue.is_empty());
        dropped
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::ip::Route;
    use crate::managed::SlotMap;
    use crate::wire::{Family, Ipv4Address, Mask};

    const HADDR_A: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 1]);
    const HADDR_B: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 2]);

    fn iface() -> IfaceId {
        IfaceId(SlotMap::new().insert(()))
    }

    fn neighbor(last: u8, hardware_addr: EthernetAddress, iface: IfaceId) -> Neighbor {
        Neighbor {
            protocol_addr: Ipv4Address::new(10, 0, 0, last).into(),
            iface,
            hardware_addr,
            created_at: Instant::from_millis(5),
        }
    }

    #[test]
    fn fill_and_refresh() {
        let mut cache = Cache::new();
        let iface = iface();
        let addr = Ipv4Address::new(10, 0, 0, 1).into();
        assert_eq!(cache.lookup(&addr), Answer::NotFound);

        assert_eq!(cache.fill(neighbor(1, HADDR_A, iface)), None);
        assert_eq!(cache.lookup(&addr), Answer::Found(HADDR_A));

        let old = cache.fill(neighbor(1, HADDR_B, iface));
        assert_eq!(old.map(|n| n.hardware_addr), Some(HADDR_A));
        assert_eq!(cache.lookup(&addr), Answer::Found(HADDR_B));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_by_iface() {
        let mut map = SlotMap::new();
        let (a, b) = (IfaceId(map.insert(())), IfaceId(map.insert(())));
        let mut cache = Cache::new();
        cache.fill(neighbor(1, HADDR_A, a));
        cache.fill(neighbor(2, HADDR_B, b));
        assert_eq!(cache.invalidate(a), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.iter().next().map(|n| n.iface), Some(b));
    }

    #[test]
    fn pending_queue() {
        let iface = iface();
        let hop: IpAddress = Ipv4Address::new(10, 0, 0, 1).into();
        let route = Route::connected(&crate::nic::Binding {
            address: Ipv4Address::new(10, 0, 0, 2).into(),
            mask: Mask::new(Family::Ipv4, 24).unwrap(),
        }, iface).unwrap();
        let pending = |byte| Pending { packet: vec![byte], destination: hop, route };

        let mut cache = Cache::new();
        assert!(cache.enqueue(hop, pending(1)));
        assert!(!cache.enqueue(hop, pending(2)));
        assert_eq!(cache.pending_len(&hop), 2);

        let taken = cache.take_pending(&hop);
        assert_eq!(taken.iter().map(|p| p.packet[0]).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(cache.pending_len(&hop), 0);
        assert!(cache.take_pending(&hop).is_empty());

        cache.enqueue(hop, pending(3));
        assert_eq!(cache.drop_pending(iface), 1);
        assert!(cache.enqueue(hop, pending(4)));
    }
}
