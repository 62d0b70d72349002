use crate::device::DeviceId;
use crate::wire::{ethernet_frame, EthernetAddress};
use crate::wire::ethernet::{pop_vlan_tag, push_vlan_tag};

use super::IfaceId;

/// The remote end of a wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Link {
    /// The device on the other end.
    pub device: DeviceId,
    /// The interface of that device.
    pub iface: IfaceId,
}

/// The 802.1Q behaviour of an Ethernet port.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VlanMode {
    /// Member of exactly one VLAN, untagged on the wire.
    Access(u16),

    /// Carries tagged frames of the listed VLANs.
    Trunk(Vec<u16>),
}

/// State of an Ethernet interface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ethernet {
    mac: EthernetAddress,
    link: Option<Link>,
    vlan: Option<VlanMode>,
}

impl Ethernet {
    pub(crate) fn new(mac: EthernetAddress) -> Self {
        Ethernet { mac, link: None, vlan: None }
    }

    /// The hardware address.
    pub fn mac(&self) -> EthernetAddress {
        self.mac
    }

    /// The remote end of the wire.
    pub fn link(&self) -> Option<Link> {
        self.link
    }

    pub(crate) fn set_link(&mut self, link: Option<Link>) -> Option<Link> {
        core::mem::replace(&mut self.link, link)
    }

    /// The tagging mode, if any.
    pub fn vlan(&self) -> Option<&VlanMode> {
        self.vlan.as_ref()
    }

    pub(crate) fn set_vlan(&mut self, mode: Option<VlanMode>) {
        self.vlan = mode;
    }

    /// Query whether frames of `vid` may use this port.
    pub fn admits(&self, vid: u16) -> bool {
        self.vlan.as_ref().map_or(true, |mode| mode.admits(vid))
    }

    /// Apply the tagging mode to a frame leaving through this port.
    ///
    /// Returns `None` when the frame must not leave.
    pub fn egress(&self, frame: Vec<u8>) -> Option<Vec<u8>> {
        match &self.vlan {
            None => Some(frame),
            Some(mode) => mode.egress(frame),
        }
    }

    /// Apply the tagging mode to a frame arriving at this port.
    ///
    /// Returns `None` when the frame must be dropped.
    pub fn ingress(&self, frame: Vec<u8>) -> Option<Vec<u8>> {
        match &self.vlan {
            None => Some(frame),
            Some(mode) => mode.ingress(frame),
        }
    }
}

impl VlanMode {
    /// Query whether the VLAN is carried.
    pub fn admits(&self, vid: u16) -> bool {
        match self {
            VlanMode::Access(own) => *own == vid,
            VlanMode::Trunk(vids) => vids.contains(&vid),
        }
    }

    /// Access ports strip the tag, trunks forward unchanged.
    pub fn egress(&self, mut frame: Vec<u8>) -> Option<Vec<u8>> {
        match self {
            VlanMode::Access(_) => {
                pop_vlan_tag(&mut frame);
                Some(frame)
            },
            VlanMode::Trunk(_) => Some(frame),
        }
    }

    /// Access ports tag untagged frames, trunks only accept listed tags.
    pub fn ingress(&self, mut frame: Vec<u8>) -> Option<Vec<u8>> {
        let vid = ethernet_frame::new_checked(&frame).ok()?.vlan_id();
        match (self, vid) {
            (VlanMode::Access(own), None) => {
                push_vlan_tag(&mut frame, *own);
                Some(frame)
            },
            (VlanMode::Access(own), Some(vid)) if *own == vid => Some(frame),
            (VlanMode::Trunk(vids), Some(vid)) if vids.contains(&vid) => Some(frame),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::{EtherType, EthernetRepr};

    fn untagged() -> Vec<u8> {
        EthernetRepr {
            src_addr: EthernetAddress([2, 0, 0, 0, 0, 1]),
            dst_addr: EthernetAddress::BROADCAST,
            ethertype: EtherType::Ipv4,
        }.encapsulate(&[0xaa; 20])
    }

    fn tagged(vid: u16) -> Vec<u8> {
        let mut frame = untagged();
        push_vlan_tag(&mut frame, vid);
        frame
    }

    fn vid_of(frame: &[u8]) -> Option<u16> {
        ethernet_frame::new_checked(frame).unwrap().vlan_id()
    }

    #[test]
    fn access_port() {
        let mode = VlanMode::Access(10);
        let frame = mode.ingress(untagged()).unwrap();
        assert_eq!(vid_of(&frame), Some(10));
        assert_eq!(mode.ingress(tagged(10)).map(|f| vid_of(&f)), Some(Some(10)));
        assert_eq!(mode.ingress(tagged(20)), None);

        let out = mode.egress(tagged(10)).unwrap();
        assert_eq!(out, untagged());
    }

    #[test]
    fn trunk_port() {
        let mode = VlanMode::Trunk(vec![10, 30]);
        assert_eq!(mode.ingress(untagged()), None);
        assert_eq!(mode.ingress(tagged(20)), None);
        assert_eq!(mode.ingress(tagged(30)), Some(tagged(30)));
        assert_eq!(mode.egress(tagged(30)), Some(tagged(30)));
        assert!(mode.admits(10));
        assert!(!mode.admits(20));
    }

    #[test]
    fn no_mode_is_transparent() {
        let eth = Ethernet::new(EthernetAddress([2, 0, 0, 0, 0, 2]));
        assert!(eth.admits(4000));
        assert_eq!(eth.ingress(tagged(5)), Some(tagged(5)));
        assert_eq!(eth.egress(untagged()), Some(untagged()));
    }
}
