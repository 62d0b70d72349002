//! An in-memory network stack for simulated topologies.
//!
//! ## Table of contents
//!
//! 1. [Design](#design-and-relevant-core-concepts)
//! 2. [The wire module](wire/index.html)
//!    1. [Addresses and masks](wire/index.html#addresses)
//!    1. [Packet views](wire/index.html#packet-views)
//! 3. [The layers](layer/index.html)
//!    1. [Ethernet input](layer/eth/index.html)
//!    1. [Neighbor resolution](layer/arp/index.html)
//!    1. [Ip pipeline and routes](layer/ip/index.html)
//!    1. [Contacts](layer/contact/index.html)
//! 4. [Interfaces](nic/index.html)
//! 5. [Devices](device/index.html) and the [network](network/index.html) connecting them
//! 6. Internals
//!    1. [The managed module](managed/index.html)
//!    2. [The scheduler](sched/index.html)
//!
//! ## Design and relevant core concepts
//!
//! A [`Network`] owns a set of [`Device`]s. Each device owns its interfaces, a routing table, a
//! neighbor cache with the packets waiting for resolution, and a registry of contacts (the socket
//! like handles through which programs send and receive). Ethernet interfaces of different devices
//! are connected by a wire, which is nothing more than a pair of keys into the network's arenas.
//!
//! Nothing ever calls into another device directly. Whenever a device puts a frame on a wire it
//! lands in the device's outbox and the network turns it into a message on its [`Scheduler`]. The
//! message is delivered on a later turn, even when the delay is zero. All processing is
//! single-threaded and fully deterministic for a given sequence of calls.
//!
//! Sending never blocks. An output either transmits, reports that the packet is parked until the
//! neighbor answers ([`Sent::Pending`]) or fails with a [`layer::Error`].
//!
//! [`Network`]: network/struct.Network.html
//! [`Device`]: device/struct.Device.html
//! [`Scheduler`]: sched/struct.Scheduler.html
//! [`Sent::Pending`]: layer/enum.Sent.html
//! [`layer::Error`]: layer/enum.Error.html
#![warn(missing_docs)]
#![warn(unreachable_pub)]

#[macro_use] mod macros;

pub mod config;
pub mod device;
pub mod layer;
pub mod managed;
pub mod network;
pub mod nic;
pub mod sched;
pub mod service;
pub mod time;
pub mod wire;

pub use crate::config::Config;
pub use crate::device::{Device, DeviceId};
pub use crate::layer::{Error, Result, Sent};
pub use crate::network::{Network, Port};
