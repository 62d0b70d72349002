use core::fmt;

use crate::nic::IfaceId;

/// Something observable that happened on a device.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// An interface was created.
    InterfaceAdd(IfaceId),
    /// An interface was removed.
    InterfaceRemove(IfaceId),
    /// An address was assigned to or removed from the interface.
    InterfaceSetAddress(IfaceId),
    /// A wire was attached.
    InterfaceConnect(IfaceId),
    /// The wire was detached.
    InterfaceDisconnect(IfaceId),
    /// A frame or looped back packet left the interface.
    InterfaceSend(IfaceId),
    /// A frame passed the filter of the interface.
    InterfaceRecv(IfaceId),
    /// The interface joined a multicast group.
    McastSubscribe(IfaceId),
    /// The interface left a multicast group.
    McastUnsubscribe(IfaceId),
    /// A store key was written.
    StoreSet(String),
    /// A store key was deleted.
    StoreDelete(String),
}

/// A registered observer.
pub type Hook = Box<dyn FnMut(&Event)>;

/// The observers of one device, called in registration order.
#[derive(Default)]
pub(crate) struct Hooks {
    hooks: Vec<Hook>,
}

impl Hooks {
    pub(crate) fn push(&mut self, hook: Hook) {
        self.hooks.push(hook);
    }

    pub(crate) fn emit(&mut self, event: &Event) {
        for hook in self.hooks.iter_mut() {
            hook(event);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.hooks.clear();
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Hooks({})", self.hooks.len())
    }
}
