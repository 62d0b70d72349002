//! Programs attached to a device.
//!
//! A service is nothing but a set of contacts with receivers registered on them. It is attached
//! to one device and keeps running until it is detached or its device is removed.
mod echo;
mod router;

pub use self::echo::EchoReplier;
pub use self::router::Router;
