//! The network owning all devices and the wires between them.
//!
//! Devices only ever talk to each other through the [`Network`]. Everything a device transmits
//! is collected in its outbox, the network drains all outboxes into its [`Scheduler`] and
//! delivers each frame as a separate task. A program drives the simulation with [`step`],
//! [`run_until_idle`] or [`advance`].
//!
//! [`Network`]: struct.Network.html
//! [`Scheduler`]: ../sched/struct.Scheduler.html
//! [`step`]: struct.Network.html#method.step
//! [`run_until_idle`]: struct.Network.html#method.run_until_idle
//! [`advance`]: struct.Network.html#method.advance
use core::fmt;

use crate::config::Config;
use crate::device::{Device, DeviceId, Transmit};
use crate::layer::{Error, Result};
use crate::managed::SlotMap;
use crate::nic::{IfaceId, Link};
use crate::sched::{Scheduler, TaskId};
use crate::time::{Duration, Instant};
use crate::wire::EthernetAddress;

/// Upper bound of tasks run by one call to `run_until_idle`.
pub const STEP_LIMIT: usize = 100_000;

/// An interface of a device in the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port {
    /// The device.
    pub device: DeviceId,
    /// The interface of the device.
    pub iface: IfaceId,
}

enum Task {
    Frame { device: DeviceId, iface: IfaceId, frame: Vec<u8> },
    Local { device: DeviceId, iface: IfaceId, frame: Vec<u8> },
    Loopback { device: DeviceId, iface: IfaceId, packet: Vec<u8> },
    Call(Box<dyn FnOnce(&mut Network)>),
}

/// A set of devices and the wires between their Ethernet interfaces.
pub struct Network {
    config: Config,
    devices: SlotMap<Device>,
    scheduler: Scheduler<Task>,
    macs: u16,
}

impl Network {
    /// An empty network with the default configuration.
    pub fn new() -> Self {
        Network::with_config(Config::default())
    }

    /// An empty network whose devices use `config`.
    pub fn with_config(config: Config) -> Self {
        Network {
            config,
            devices: SlotMap::new(),
            scheduler: Scheduler::new(),
            macs: 0,
        }
    }

    /// The configuration handed to new devices.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Change the configuration of devices added from now on.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// The current virtual time.
    pub fn now(&self) -> Instant {
        self.scheduler.now()
    }

    /// Add a device without interfaces.
    pub fn add_device(&mut self, name: &str) -> DeviceId {
        let mut device = Device::new(name, self.config.clone());
        device.set_now(self.now());
        let id = DeviceId(self.devices.insert(device));
        net_debug!("network: added device {} as {}", name, id);
        id
    }

    /// Get a device.
    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(id.0)
    }

    /// Get a device mutably, e.g. to configure it or to send from it.
    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(id.0)
    }

    /// Find a device by its name.
    pub fn device_by_name(&self, name: &str) -> Option<DeviceId> {
        self.devices().find(|(_, device)| device.name() == name).map(|(id, _)| id)
    }

    /// All devices in creation order.
    pub fn devices(&self) -> impl Iterator<Item=(DeviceId, &Device)> + '_ {
        self.devices.iter().map(|(key, device)| (DeviceId(key), device))
    }

    fn dev(&self, id: DeviceId) -> Result<&Device> {
        self.device(id).ok_or(Error::NotFound)
    }

    fn dev_mut(&mut self, id: DeviceId) -> Result<&mut Device> {
        self.device_mut(id).ok_or(Error::NotFound)
    }

    /// Remove a device, unplugging all of its wires.
    pub fn remove_device(&mut self, id: DeviceId) -> Result<Device> {
        let ports: Vec<IfaceId> = self.dev(id)?.interfaces()
            .filter(|(_, iface)| iface.link().is_some())
            .map(|(iface, _)| iface)
            .collect();
        for iface in ports {
            self.disconnect(Port { device: id, iface })?;
        }
        let device = self.devices.remove(id.0).ok_or(Error::NotFound)?;
        net_debug!("network: removed device {}", device.name());
        Ok(device)
    }

    fn next_mac(&mut self) -> EthernetAddress {
        let mac = self.config.mac_address(self.macs);
        self.macs = self.macs.wrapping_add(1);
        mac
    }

    /// Add an Ethernet interface with a generated hardware address.
    pub fn add_ethernet(&mut self, device: DeviceId) -> Result<Port> {
        self.dev(device)?;
        let mac = self.next_mac();
        self.add_ethernet_with_mac(device, mac)
    }

    /// Add an Ethernet interface with the given hardware address.
    pub fn add_ethernet_with_mac(&mut self, device: DeviceId, mac: EthernetAddress) -> Result<Port> {
        if !mac.is_unicast() {
            return Err(Error::Illegal("interfaces have unicast hardware addresses"));
        }
        let iface = self.dev_mut(device)?.interface_add_ethernet(mac);
        Ok(Port { device, iface })
    }

    /// Add a loopback interface and bring it up.
    pub fn add_loopback(&mut self, device: DeviceId) -> Result<Port> {
        let dev = self.dev_mut(device)?;
        let iface = dev.interface_add_loopback();
        dev.loopback_start(iface)?;
        Ok(Port { device, iface })
    }

    /// Add the layer 3 interface of a vlan with a generated hardware address.
    pub fn add_vlan(&mut self, device: DeviceId, vid: u16) -> Result<Port> {
        self.dev(device)?;
        let mac = self.next_mac();
        let iface = self.dev_mut(device)?.interface_add_vlan(vid, mac)?;
        Ok(Port { device, iface })
    }

    /// Remove an interface, unplugging its wire.
    pub fn remove_interface(&mut self, port: Port) -> Result<()> {
        let link = self.dev_mut(port.device)?.interface_remove(port.iface)?;
        if let Some(link) = link {
            self.unplug_remote(port, link);
        }
        Ok(())
    }

    /// Connect two Ethernet interfaces with a wire.
    ///
    /// Wires the ports had before are unplugged. Both ends are up afterwards.
    pub fn connect(&mut self, a: Port, b: Port) -> Result<()> {
        if a == b {
            return Err(Error::Illegal("can not connect an interface to itself"));
        }
        for port in [a, b].iter() {
            self.dev(port.device)?
                .interface(port.iface)
                .ok_or(Error::NotFound)?
                .as_ethernet()
                .ok_or(Error::Illegal("only ethernet interfaces can be wired"))?;
        }

        self.disconnect(a)?;
        self.disconnect(b)?;
        self.dev_mut(a.device)?.interface_link(a.iface, Some(Link { device: b.device, iface: b.iface }))?;
        self.dev_mut(b.device)?.interface_link(b.iface, Some(Link { device: a.device, iface: a.iface }))?;
        net_debug!("network: connected {} {} with {} {}", a.device, a.iface, b.device, b.iface);
        Ok(())
    }

    /// Unplug the wire of an interface.
    ///
    /// Returns the port on the other end, if there was one.
    pub fn disconnect(&mut self, port: Port) -> Result<Option<Port>> {
        let link = match self.dev_mut(port.device)?.interface_link(port.iface, None)? {
            Some(link) => link,
            None => return Ok(None),
        };
        self.unplug_remote(port, link);
        Ok(Some(Port { device: link.device, iface: link.iface }))
    }

    /// Clear the remote end of a wire if it still leads back to `port`.
    fn unplug_remote(&mut self, port: Port, link: Link) {
        let remote = match self.device_mut(link.device) {
            Some(remote) => remote,
            None => return,
        };
        let back = remote.interface(link.iface).and_then(|iface| iface.link());
        if back == Some(Link { device: port.device, iface: port.iface }) {
            if let Err(_err) = remote.interface_link(link.iface, None) {
                net_debug!("network: could not unplug {}: {}", link.iface, _err);
            }
        }
    }

    /// Run a function on the network after `delay`.
    pub fn schedule<F>(&mut self, delay: Duration, f: F) -> TaskId
        where F: FnOnce(&mut Network) + 'static
    {
        self.scheduler.schedule(Task::Call(Box::new(f)), delay)
    }

    /// Cancel a scheduled function.
    ///
    /// Returns `false` if it already ran or was cancelled.
    pub fn unschedule(&mut self, id: TaskId) -> bool {
        self.scheduler.unschedule(id).is_some()
    }

    /// The number of tasks waiting, including frames in flight.
    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len() + self.devices.iter()
            .filter(|(_, device)| device.has_outgoing())
            .count()
    }

    /// Turn everything the devices transmitted into delivery tasks.
    pub fn flush(&mut self) {
        let keys = self.devices.keys();
        for key in keys {
            let device = DeviceId(key);
            let outbox = match self.devices.get_mut(key) {
                Some(dev) => dev.take_outbox(),
                None => continue,
            };
            for transmit in outbox {
                let task = match transmit {
                    Transmit::Wire { iface, frame } => {
                        let link = self.device(device)
                            .and_then(|dev| dev.interface(iface))
                            .and_then(|iface| iface.link());
                        match link {
                            Some(link) => Task::Frame { device: link.device, iface: link.iface, frame },
                            None => {
                                net_debug!("network: {} {} sent into an unplugged wire", device, iface);
                                continue;
                            },
                        }
                    },
                    Transmit::Local { iface, frame } => Task::Local { device, iface, frame },
                    Transmit::Loopback { iface, packet } => Task::Loopback { device, iface, packet },
                };
                self.scheduler.schedule(task, Duration::from_millis(0));
            }
        }
    }

    fn sync_clocks(&mut self) {
        let now = self.scheduler.now();
        for (_, device) in self.devices.iter_mut() {
            device.set_now(now);
        }
    }

    fn run(&mut self, task: Task) {
        self.sync_clocks();
        match task {
            Task::Frame { device, iface, frame } => match self.device_mut(device) {
                Some(dev) => dev.receive_frame(iface, frame),
                None => net_debug!("network: frame for removed device {}", device),
            },
            Task::Local { device, iface, frame } => {
                if let Some(dev) = self.device_mut(device) {
                    dev.input_frame(iface, frame);
                }
            },
            Task::Loopback { device, iface, packet } => {
                if let Some(dev) = self.device_mut(device) {
                    dev.receive_loopback(iface, packet);
                }
            },
            Task::Call(f) => f(self),
        }
        self.flush();
    }

    /// Run the next task.
    ///
    /// Returns `false` if there was nothing to do.
    pub fn step(&mut self) -> bool {
        self.flush();
        match self.scheduler.pop() {
            Some(task) => {
                self.run(task);
                true
            },
            None => false,
        }
    }

    /// Run tasks until none are left, regardless of their due time.
    ///
    /// Returns the number of tasks run. Stops after [`STEP_LIMIT`] tasks, which indicates
    /// a forwarding loop or a program that keeps rescheduling itself.
    ///
    /// [`STEP_LIMIT`]: constant.STEP_LIMIT.html
    pub fn run_until_idle(&mut self) -> usize {
        let mut steps = 0;
        while steps < STEP_LIMIT {
            if !self.step() {
                return steps;
            }
            steps += 1;
        }
        net_warn!("network: still busy after {} steps", steps);
        steps
    }

    /// Run all tasks due within `duration` and move the clock to its end.
    ///
    /// Returns the number of tasks run.
    pub fn advance(&mut self, duration: Duration) -> usize {
        let deadline = self.now() + duration;
        let mut steps = 0;
        self.flush();
        while steps < STEP_LIMIT {
            match self.scheduler.pop_due(deadline) {
                Some(task) => self.run(task),
                None => break,
            }
            steps += 1;
        }
        if steps == STEP_LIMIT {
            net_warn!("network: still busy after {} steps", steps);
        }
        self.scheduler.advance_to(deadline);
        self.sync_clocks();
        steps
    }
}

impl Default for Network {
    fn default() -> Self {
        Network::new()
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Network")
            .field("now", &self.scheduler.now())
            .field("devices", &self.devices)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.iface)
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn connect_rules() {
        let mut net = Network::new();
        let a = net.add_device("a");
        let b = net.add_device("b");
        let a0 = net.add_ethernet(a).unwrap();
        let b0 = net.add_ethernet(b).unwrap();
        let lo = net.add_loopback(a).unwrap();

        assert_eq!(net.connect(a0, a0), Err(Error::Illegal("can not connect an interface to itself")));
        assert_eq!(net.connect(a0, lo), Err(Error::Illegal("only ethernet interfaces can be wired")));
        assert!(!net.device(a).unwrap().interface(a0.iface).unwrap().is_up());

        net.connect(a0, b0).unwrap();
        assert!(net.device(a).unwrap().interface(a0.iface).unwrap().is_up());
        assert_eq!(net.device(b).unwrap().interface(b0.iface).unwrap().link(),
            Some(Link { device: a, iface: a0.iface }));

        assert_eq!(net.disconnect(b0), Ok(Some(a0)));
        assert_eq!(net.device(a).unwrap().interface(a0.iface).unwrap().link(), None);
        assert!(!net.device(b).unwrap().interface(b0.iface).unwrap().is_up());
        assert_eq!(net.disconnect(b0), Ok(None));
    }

    #[test]
    fn reconnect_unplugs_old_wire() {
        let mut net = Network::new();
        let devs: Vec<_> = ["a", "b", "c"].iter().map(|name| net.add_device(name)).collect();
        let ports: Vec<_> = devs.iter().map(|&dev| net.add_ethernet(dev).unwrap()).collect();

        net.connect(ports[0], ports[1]).unwrap();
        net.connect(ports[0], ports[2]).unwrap();
        assert_eq!(net.device(devs[1]).unwrap().interface(ports[1].iface).unwrap().link(), None);
        assert_eq!(net.device(devs[2]).unwrap().interface(ports[2].iface).unwrap().link(),
            Some(Link { device: devs[0], iface: ports[0].iface }));
    }

    #[test]
    fn generated_macs_differ() {
        let mut net = Network::new();
        let a = net.add_device("a");
        let first = net.add_ethernet(a).unwrap();
        let second = net.add_ethernet(a).unwrap();
        let device = net.device(a).unwrap();
        assert_ne!(device.interface(first.iface).unwrap().mac(),
            device.interface(second.iface).unwrap().mac());
    }

    #[test]
    fn scheduled_calls_run_in_order() {
        let mut net = Network::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for (name, delay) in [("slow", 20), ("fast", 5), ("cancelled", 1)].iter().cloned() {
            let log = seen.clone();
            let id = net.schedule(Duration::from_millis(delay), move |net: &mut Network| {
                log.borrow_mut().push((name, net.now()));
            });
            if name == "cancelled" {
                assert!(net.unschedule(id));
            }
        }

        assert_eq!(net.advance(Duration::from_millis(10)), 1);
        assert_eq!(net.now(), Instant::from_millis(10));
        assert_eq!(net.run_until_idle(), 1);
        assert_eq!(*seen.borrow(), vec![
            ("fast", Instant::from_millis(5)),
            ("slow", Instant::from_millis(20)),
        ]);
    }

    #[test]
    fn remove_device_unplugs() {
        let mut net = Network::new();
        let a = net.add_device("a");
        let b = net.add_device("b");
        let a0 = net.add_ethernet(a).unwrap();
        let b0 = net.add_ethernet(b).unwrap();
        net.connect(a0, b0).unwrap();

        let removed = net.remove_device(a).unwrap();
        assert_eq!(removed.name(), "a");
        assert!(net.device(a).is_none());
        assert_eq!(net.device(b).unwrap().interface(b0.iface).unwrap().link(), None);
        assert_eq!(net.device_by_name("b"), Some(b));
    }
}
