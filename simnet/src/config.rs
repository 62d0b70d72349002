//! Tunables of a simulated network.
//!
//! Every device copies the configuration of the network it was created in. Changing the
//! configuration of the network afterwards only affects devices added later.
use crate::wire::EthernetAddress;

/// Configuration shared by the devices of a network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Hop limit filled into outgoing packets that do not set their own.
    pub default_ttl: u8,

    /// MTU of newly created Ethernet interfaces.
    pub ethernet_mtu: usize,

    /// MTU of newly created loopback interfaces.
    pub loopback_mtu: usize,

    /// MTU of newly created vlan interfaces.
    pub vlan_mtu: usize,

    /// The ephemeral port counter starts here.
    pub first_ephemeral_port: u16,

    /// Ephemeral ports handed out are never below this value.
    pub min_ephemeral_port: u16,

    /// Distance between two consecutively allocated ephemeral ports.
    pub ephemeral_step: u16,

    /// Number of bytes of the offending packet quoted in an ICMP error.
    pub icmp_error_payload: usize,

    /// Drop incoming packets with a wrong checksum.
    pub verify_checksums: bool,

    /// The first four octets of generated MAC addresses.
    ///
    /// The remaining two octets count the interfaces created in the network.
    pub mac_prefix: [u8; 4],
}

impl Config {
    /// Generate the hardware address of the `count`-th Ethernet interface.
    pub fn mac_address(&self, count: u16) -> EthernetAddress {
        let p = self.mac_prefix;
        let [hi, lo] = count.to_be_bytes();
        EthernetAddress([p[0], p[1], p[2], p[3], hi, lo])
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_ttl: 64,
            ethernet_mtu: 1500,
            loopback_mtu: 0xfffe,
            vlan_mtu: 1500,
            first_ephemeral_port: 4001,
            min_ephemeral_port: 10_011,
            ephemeral_step: 5,
            icmp_error_payload: 64,
            verify_checksums: true,
            mac_prefix: [0xfa, 0xff, 0x0f, 0x00],
        }
    }
}
