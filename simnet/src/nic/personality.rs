use crate::wire::Checksum;

/// Checksum verification of an interface per protocol.
///
/// Outgoing checksums are always computed. An interface may however trust the checksums of the
/// packets it receives, as the loopback interface does since its packets never touch a wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    ipv4: Protocol,
    icmp: Protocol,
    udp: Protocol,
}

/// How received packets of one protocol are checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Protocol {
    receive: Checksum,
}

impl Capabilities {
    /// Verify every checksum.
    pub fn baseline() -> Self {
        Capabilities {
            ipv4: Protocol::verified(),
            icmp: Protocol::verified(),
            udp: Protocol::verified(),
        }
    }

    /// Trust received checksums.
    pub fn loopback() -> Self {
        Capabilities {
            ipv4: Protocol::trusted(),
            icmp: Protocol::trusted(),
            udp: Protocol::trusted(),
        }
    }

    pub fn ipv4(&self) -> &Protocol {
        &self.ipv4
    }

    pub fn ipv4_mut(&mut self) -> &mut Protocol {
        &mut self.ipv4
    }

    pub fn icmp(&self) -> &Protocol {
        &self.icmp
    }

    pub fn icmp_mut(&mut self) -> &mut Protocol {
        &mut self.icmp
    }

    pub fn udp(&self) -> &Protocol {
        &self.udp
    }

    pub fn udp_mut(&mut self) -> &mut Protocol {
        &mut self.udp
    }
}

impl Protocol {
    /// Received checksums are verified.
    pub fn verified() -> Self {
        Protocol { receive: Checksum::Manual }
    }

    /// Received checksums are not looked at.
    pub fn trusted() -> Self {
        Protocol { receive: Checksum::Ignored }
    }

    pub fn rx_checksum(&self) -> Checksum {
        self.receive
    }

    pub fn rx_checksum_mut(&mut self) -> &mut Checksum {
        &mut self.receive
    }
}
