use crate::device::Device;
use crate::layer::{Delivery, Recv, Result};
use crate::layer::contact::{ContactFamily, ContactId, Transport};

/// Forwards IPv4 packets between the interfaces of a device.
///
/// The router listens promiscuously on a raw IPv4 contact. Packets addressed to the device
/// itself, broadcasts, multicasts and looped back packets are left alone, everything else is
/// handed to [`Device::forward_ipv4`].
///
/// [`Device::forward_ipv4`]: ../device/struct.Device.html#method.forward_ipv4
#[derive(Debug)]
pub struct Router {
    contact: ContactId,
}

struct Forwarder;

impl Router {
    /// Start forwarding on a device.
    pub fn attach(device: &mut Device) -> Result<Self> {
        let contact = device.contact_create(ContactFamily::Ipv4, Transport::Raw);
        device.contact_receive(contact, Forwarder, true)?;
        net_debug!("{}: forwarding on {}", device.name(), contact);
        Ok(Router { contact })
    }

    /// The raw contact the router listens on.
    pub fn contact(&self) -> ContactId {
        self.contact
    }

    /// Stop forwarding.
    pub fn detach(self, device: &mut Device) -> Result<()> {
        device.contact_close(self.contact)
    }
}

impl Recv for Forwarder {
    fn receive(&mut self, device: &mut Device, delivery: Delivery<'_>) {
        let meta = delivery.meta;
        if meta.destination || meta.broadcast || meta.multicast || meta.loopback {
            return;
        }
        if let Err(_err) = device.forward_ipv4(delivery.payload) {
            net_debug!("{}: not forwarded: {}", device.name(), _err);
        }
    }
}
